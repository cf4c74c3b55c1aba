//! Payload structs carried inside the legacy List-Identity / List-Services
//! / List-Interfaces CPF items.

use crate::codec::primitives::{decode_uint, decode_usint, encode_uint, encode_usint};
use crate::codec::strings::{decode_sstring, encode_sstring};
use crate::automata::SliceSource;
use crate::error::{CipError, Result};

/// The body of a `ListIdentity` reply's `ITEM_LIST_IDENTITY` CPF item
/// (protocol-version header omitted — only the identity object fields).
#[derive(Debug, Clone, PartialEq)]
pub struct IdentityObject {
    pub vendor_id: u16,
    pub device_type: u16,
    pub product_code: u16,
    pub revision_major: u8,
    pub revision_minor: u8,
    pub status: u16,
    pub serial_number: u32,
    pub product_name: String,
    pub state: u8,
}

impl IdentityObject {
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut src = SliceSource::new(bytes);
        let vendor_id = decode_uint(&mut src)?;
        let device_type = decode_uint(&mut src)?;
        let product_code = decode_uint(&mut src)?;
        let revision_major = decode_usint(&mut src)?;
        let revision_minor = decode_usint(&mut src)?;
        let status = decode_uint(&mut src)?;
        let serial_number = {
            let lo = decode_uint(&mut src)? as u32;
            let hi = decode_uint(&mut src)? as u32;
            lo | (hi << 16)
        };
        let consumed_so_far = 2 + 2 + 2 + 1 + 1 + 2 + 4;
        let (product_name, name_len) = decode_sstring(&bytes[consumed_so_far..])?;
        let state = bytes
            .get(consumed_so_far + name_len)
            .copied()
            .ok_or_else(|| CipError::frame(consumed_so_far + name_len, "truncated identity state byte"))?;
        Ok(IdentityObject {
            vendor_id,
            device_type,
            product_code,
            revision_major,
            revision_minor,
            status,
            serial_number,
            product_name,
            state,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        encode_uint(self.vendor_id, &mut out);
        encode_uint(self.device_type, &mut out);
        encode_uint(self.product_code, &mut out);
        encode_usint(self.revision_major, &mut out);
        encode_usint(self.revision_minor, &mut out);
        encode_uint(self.status, &mut out);
        encode_uint((self.serial_number & 0xFFFF) as u16, &mut out);
        encode_uint((self.serial_number >> 16) as u16, &mut out);
        encode_sstring(&self.product_name, &mut out);
        encode_usint(self.state, &mut out);
        out
    }
}

/// One entry of a `ListServices` reply: a service supported over this
/// encapsulation instance (e.g. "Communications").
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceEntry {
    pub protocol_version: u16,
    pub capability_flags: u16,
    pub service_name: String,
}

impl ServiceEntry {
    pub fn decode(bytes: &[u8]) -> Result<(Self, usize)> {
        if bytes.len() < 4 + 16 {
            return Err(CipError::frame(0, "truncated ListServices entry"));
        }
        let mut src = SliceSource::new(bytes);
        let protocol_version = decode_uint(&mut src)?;
        let capability_flags = decode_uint(&mut src)?;
        let name_bytes = &bytes[4..20];
        let end = name_bytes.iter().position(|&b| b == 0).unwrap_or(16);
        let service_name = String::from_utf8_lossy(&name_bytes[..end]).into_owned();
        Ok((
            ServiceEntry {
                protocol_version,
                capability_flags,
                service_name,
            },
            20,
        ))
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(20);
        encode_uint(self.protocol_version, &mut out);
        encode_uint(self.capability_flags, &mut out);
        let mut name_field = [0u8; 16];
        let bytes = self.service_name.as_bytes();
        let len = bytes.len().min(16);
        name_field[..len].copy_from_slice(&bytes[..len]);
        out.extend_from_slice(&name_field);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_object_round_trips() {
        let identity = IdentityObject {
            vendor_id: 1,
            device_type: 0x0E,
            product_code: 100,
            revision_major: 20,
            revision_minor: 11,
            status: 0x0030,
            serial_number: 0xDEADBEEF,
            product_name: "1756-L61".to_string(),
            state: 3,
        };
        let bytes = identity.encode();
        assert_eq!(IdentityObject::decode(&bytes).unwrap(), identity);
    }

    #[test]
    fn service_entry_round_trips_with_padding() {
        let entry = ServiceEntry {
            protocol_version: 1,
            capability_flags: 0x0120,
            service_name: "Communications".to_string(),
        };
        let bytes = entry.encode();
        let (decoded, consumed) = ServiceEntry::decode(&bytes).unwrap();
        assert_eq!(decoded, entry);
        assert_eq!(consumed, 20);
    }
}
