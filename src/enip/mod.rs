//! ENIP encapsulation framing.
//!
//! ```text
//! offset  field            width
//! 0       command          2
//! 2       length           2
//! 4       session_handle   4
//! 8       status           4
//! 12      sender_context   8
//! 20      options          4
//! 24      payload          length
//! ```
//!
//! All multi-byte fields little-endian. `length` must equal the encoded
//! payload's byte count on both decode and encode — checked by
//! [`Frame::decode`] and guaranteed by construction in [`Frame::encode`].

pub mod cpf;
pub mod identity;

use crate::codec::primitives::{decode_udint, decode_uint, encode_udint, encode_uint};
use crate::automata::SliceSource;
use crate::error::{CipError, Result};

pub const COMMAND_NOP: u16 = 0x0001;
pub const COMMAND_LIST_SERVICES: u16 = 0x0004;
pub const COMMAND_LIST_IDENTITY: u16 = 0x0063;
pub const COMMAND_LIST_INTERFACES: u16 = 0x0064;
pub const COMMAND_REGISTER_SESSION: u16 = 0x0065;
pub const COMMAND_UNREGISTER_SESSION: u16 = 0x0066;
pub const COMMAND_SEND_RR_DATA: u16 = 0x006F;
pub const COMMAND_SEND_UNIT_DATA: u16 = 0x0070;

/// One encapsulation frame, header fields plus raw (still-undecoded)
/// payload. The CPF/RegisterSession payload shape depends on `command`, so
/// higher layers (`crate::cip`) decode `payload` once they know it.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub command: u16,
    pub session_handle: u32,
    pub status: u32,
    pub sender_context: [u8; 8],
    pub options: u32,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(command: u16, session_handle: u32, sender_context: [u8; 8], payload: Vec<u8>) -> Self {
        Frame {
            command,
            session_handle,
            status: 0,
            sender_context,
            options: 0,
            payload,
        }
    }

    pub fn reply(&self, status: u32, payload: Vec<u8>) -> Self {
        Frame {
            command: self.command,
            session_handle: self.session_handle,
            status,
            sender_context: self.sender_context,
            options: self.options,
            payload,
        }
    }

    /// Decode a header plus payload from `bytes`. Returns the frame and the
    /// total number of bytes consumed (24 + payload length), so callers
    /// reading from a streaming socket buffer know how much to drop.
    pub fn decode(bytes: &[u8]) -> Result<(Frame, usize)> {
        if bytes.len() < 24 {
            return Err(CipError::frame(0, "encapsulation header truncated"));
        }
        let mut src = SliceSource::new(bytes);
        let command = decode_uint(&mut src)?;
        let length = decode_uint(&mut src)? as usize;
        let session_handle = decode_udint(&mut src)?;
        let status = decode_udint(&mut src)?;
        let mut sender_context = [0u8; 8];
        sender_context.copy_from_slice(&bytes[12..20]);
        let mut src = SliceSource::new(&bytes[20..24]);
        let options = decode_udint(&mut src)?;

        let payload = bytes
            .get(24..24 + length)
            .ok_or_else(|| CipError::frame(24, "encapsulation payload shorter than declared length"))?
            .to_vec();

        Ok((
            Frame {
                command,
                session_handle,
                status,
                sender_context,
                options,
                payload,
            },
            24 + length,
        ))
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(24 + self.payload.len());
        encode_uint(self.command, &mut out);
        encode_uint(self.payload.len() as u16, &mut out);
        encode_udint(self.session_handle, &mut out);
        encode_udint(self.status, &mut out);
        out.extend_from_slice(&self.sender_context);
        encode_udint(self.options, &mut out);
        out.extend_from_slice(&self.payload);
        out
    }
}

/// RegisterSession request/reply payload: `protocol_version(2)=1 +
/// options(2)=0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegisterSession {
    pub protocol_version: u16,
    pub options: u16,
}

impl Default for RegisterSession {
    fn default() -> Self {
        RegisterSession {
            protocol_version: 1,
            options: 0,
        }
    }
}

impl RegisterSession {
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 4 {
            return Err(CipError::frame(0, "truncated RegisterSession payload"));
        }
        let mut src = SliceSource::new(bytes);
        let protocol_version = decode_uint(&mut src)?;
        let options = decode_uint(&mut src)?;
        Ok(RegisterSession {
            protocol_version,
            options,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4);
        encode_uint(self.protocol_version, &mut out);
        encode_uint(self.options, &mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_round_trips_with_matching_length() {
        let frame = Frame::new(COMMAND_REGISTER_SESSION, 0, [0; 8], RegisterSession::default().encode());
        let bytes = frame.encode();
        let (decoded, consumed) = Frame::decode(&bytes).unwrap();
        assert_eq!(decoded, frame);
        assert_eq!(consumed, bytes.len());
    }

    #[test]
    fn decode_rejects_payload_shorter_than_declared_length() {
        let mut bytes = vec![0u8; 24];
        bytes[2] = 10; // claims a 10-byte payload that doesn't exist
        assert!(Frame::decode(&bytes).is_err());
    }

    #[test]
    fn register_session_round_trips() {
        let rs = RegisterSession::default();
        let bytes = rs.encode();
        assert_eq!(RegisterSession::decode(&bytes).unwrap(), rs);
    }
}
