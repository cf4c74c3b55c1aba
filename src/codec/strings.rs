//! Length-prefixed CIP string types.
//!
//! SSTRING is `length(1) + bytes(length)`; STRING is `length(2) +
//! bytes(length) + optional pad byte to make the total even`. Firmware in
//! the wild is inconsistent about emitting that pad byte, so decode accepts
//! both the padded and unpadded forms (tracked as an open question, decided
//! in DESIGN.md); encode always emits the padded form.

use super::primitives::{decode_uint, decode_usint, encode_uint, encode_usint};
use crate::automata::SliceSource;
use crate::error::{CipError, Result};

pub fn decode_sstring(bytes: &[u8]) -> Result<(String, usize)> {
    let mut src = SliceSource::new(bytes);
    let len = decode_usint(&mut src)? as usize;
    let body = bytes
        .get(1..1 + len)
        .ok_or_else(|| CipError::frame(1, "truncated SSTRING body"))?;
    let text = String::from_utf8_lossy(body).into_owned();
    Ok((text, 1 + len))
}

pub fn encode_sstring(value: &str, out: &mut Vec<u8>) {
    let bytes = value.as_bytes();
    encode_usint(bytes.len() as u8, out);
    out.extend_from_slice(bytes);
}

pub fn decode_string(bytes: &[u8]) -> Result<(String, usize)> {
    let mut src = SliceSource::new(bytes);
    let len = decode_uint(&mut src)? as usize;
    let body = bytes
        .get(2..2 + len)
        .ok_or_else(|| CipError::frame(2, "truncated STRING body"))?;
    let text = String::from_utf8_lossy(body).into_owned();

    // Accept either padded or unpadded encodings: if an odd-length payload
    // is followed by one more byte and the total so far is odd, treat that
    // byte as padding and consume it; otherwise leave it for the caller.
    let unpadded_end = 2 + len;
    let consumed = if unpadded_end % 2 != 0 && bytes.len() > unpadded_end {
        unpadded_end + 1
    } else {
        unpadded_end
    };
    Ok((text, consumed))
}

pub fn encode_string(value: &str, out: &mut Vec<u8>) {
    let bytes = value.as_bytes();
    encode_uint(bytes.len() as u16, out);
    out.extend_from_slice(bytes);
    if bytes.len() % 2 != 0 {
        out.push(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sstring_round_trips() {
        let mut out = Vec::new();
        encode_sstring("1756-L61", &mut out);
        let (text, consumed) = decode_sstring(&out).unwrap();
        assert_eq!(text, "1756-L61");
        assert_eq!(consumed, out.len());
    }

    #[test]
    fn string_encode_pads_odd_length_to_even() {
        let mut out = Vec::new();
        encode_string("abc", &mut out);
        assert_eq!(out.len() % 2, 0);
        let (text, consumed) = decode_string(&out).unwrap();
        assert_eq!(text, "abc");
        assert_eq!(consumed, out.len());
    }

    #[test]
    fn string_decode_accepts_unpadded_form() {
        // length=3, "abc", no pad byte at all.
        let mut bytes = vec![3, 0];
        bytes.extend_from_slice(b"abc");
        let (text, consumed) = decode_string(&bytes).unwrap();
        assert_eq!(text, "abc");
        assert_eq!(consumed, 5);
    }
}
