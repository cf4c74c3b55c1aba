//! CIP type codecs.
//!
//! Each CIP primitive type is exposed as a small DFA (see
//! [`primitives::fixed_width_collector`]) that genuinely drives its
//! decoding through the automata runtime, plus a direct little-endian
//! encoder — encoding a fixed-width value never needs a state machine, it
//! is exactly `to_le_bytes`, so unlike decoding it is not routed through
//! [`crate::automata`].
//!
//! [`TypeTag`] is the 16-bit CIP type code namespace; [`decode`]/[`encode`]
//! dispatch on it to the primitive or string codec, and [`array::typed_data`]
//! builds a homogeneous array codec for a tag and element count.

pub mod array;
pub mod primitives;
pub mod strings;

use crate::automata::SliceSource;
use crate::error::{CipError, Result};

/// A decoded CIP value, tagged by its originating [`TypeTag`].
#[derive(Debug, Clone, PartialEq)]
pub enum CipValue {
    Sint(i8),
    Usint(u8),
    Int(i16),
    Uint(u16),
    Dint(i32),
    Udint(u32),
    Real(f32),
    Bool(bool),
    Sstring(String),
    Str(String),
    Array(Vec<CipValue>),
}

/// The 16-bit CIP elementary data type codes (CIP Vol 1, Appendix C).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Bool,
    Sint,
    Int,
    Dint,
    Usint,
    Uint,
    Udint,
    Real,
    Sstring,
    Str,
}

impl TypeTag {
    pub fn code(self) -> u16 {
        match self {
            TypeTag::Bool => 0x00C1,
            TypeTag::Sint => 0x00C2,
            TypeTag::Int => 0x00C3,
            TypeTag::Dint => 0x00C4,
            TypeTag::Usint => 0x00C6,
            TypeTag::Uint => 0x00C7,
            TypeTag::Udint => 0x00C8,
            TypeTag::Real => 0x00CA,
            TypeTag::Sstring => 0x00DA,
            TypeTag::Str => 0x00D0,
        }
    }

    pub fn from_code(code: u16) -> Result<Self> {
        Ok(match code {
            0x00C1 => TypeTag::Bool,
            0x00C2 => TypeTag::Sint,
            0x00C3 => TypeTag::Int,
            0x00C4 => TypeTag::Dint,
            0x00C6 => TypeTag::Usint,
            0x00C7 => TypeTag::Uint,
            0x00C8 => TypeTag::Udint,
            0x00CA => TypeTag::Real,
            0x00DA => TypeTag::Sstring,
            0x00D0 => TypeTag::Str,
            other => {
                return Err(CipError::frame(0, format!("unrecognized CIP type code 0x{other:04X}")))
            }
        })
    }

    /// `Some(width)` for fixed-width primitives, `None` for length-prefixed
    /// string types.
    pub fn fixed_width(self) -> Option<usize> {
        match self {
            TypeTag::Bool | TypeTag::Sint | TypeTag::Usint => Some(1),
            TypeTag::Int | TypeTag::Uint => Some(2),
            TypeTag::Dint | TypeTag::Udint | TypeTag::Real => Some(4),
            TypeTag::Sstring | TypeTag::Str => None,
        }
    }

    pub fn from_case_insensitive_name(name: &str) -> Result<Self> {
        Ok(match name.to_ascii_uppercase().as_str() {
            "BOOL" => TypeTag::Bool,
            "SINT" => TypeTag::Sint,
            "INT" => TypeTag::Int,
            "DINT" => TypeTag::Dint,
            "USINT" => TypeTag::Usint,
            "UINT" => TypeTag::Uint,
            "UDINT" => TypeTag::Udint,
            "REAL" => TypeTag::Real,
            "SSTRING" => TypeTag::Sstring,
            "STRING" => TypeTag::Str,
            other => return Err(CipError::Configuration(format!("unknown CIP type name '{other}'"))),
        })
    }
}

/// Decode one value of `tag` from the front of `bytes`, returning the value
/// and the number of bytes consumed.
pub fn decode(tag: TypeTag, bytes: &[u8]) -> Result<(CipValue, usize)> {
    let mut src = SliceSource::new(bytes);
    match tag {
        TypeTag::Bool => primitives::decode_bool(&mut src).map(|v| (CipValue::Bool(v), 1)),
        TypeTag::Sint => primitives::decode_sint(&mut src).map(|v| (CipValue::Sint(v), 1)),
        TypeTag::Usint => primitives::decode_usint(&mut src).map(|v| (CipValue::Usint(v), 1)),
        TypeTag::Int => primitives::decode_int(&mut src).map(|v| (CipValue::Int(v), 2)),
        TypeTag::Uint => primitives::decode_uint(&mut src).map(|v| (CipValue::Uint(v), 2)),
        TypeTag::Dint => primitives::decode_dint(&mut src).map(|v| (CipValue::Dint(v), 4)),
        TypeTag::Udint => primitives::decode_udint(&mut src).map(|v| (CipValue::Udint(v), 4)),
        TypeTag::Real => primitives::decode_real(&mut src).map(|v| (CipValue::Real(v), 4)),
        TypeTag::Sstring => {
            let (s, consumed) = strings::decode_sstring(bytes)?;
            Ok((CipValue::Sstring(s), consumed))
        }
        TypeTag::Str => {
            let (s, consumed) = strings::decode_string(bytes)?;
            Ok((CipValue::Str(s), consumed))
        }
    }
}

/// Encode `value` (which must match `tag`'s shape) onto the end of `out`.
pub fn encode(tag: TypeTag, value: &CipValue, out: &mut Vec<u8>) -> Result<()> {
    match (tag, value) {
        (TypeTag::Bool, CipValue::Bool(b)) => primitives::encode_bool(*b, out),
        (TypeTag::Sint, CipValue::Sint(v)) => primitives::encode_sint(*v, out),
        (TypeTag::Usint, CipValue::Usint(v)) => primitives::encode_usint(*v, out),
        (TypeTag::Int, CipValue::Int(v)) => primitives::encode_int(*v, out),
        (TypeTag::Uint, CipValue::Uint(v)) => primitives::encode_uint(*v, out),
        (TypeTag::Dint, CipValue::Dint(v)) => primitives::encode_dint(*v, out),
        (TypeTag::Udint, CipValue::Udint(v)) => primitives::encode_udint(*v, out),
        (TypeTag::Real, CipValue::Real(v)) => primitives::encode_real(*v, out),
        (TypeTag::Sstring, CipValue::Sstring(s)) => strings::encode_sstring(s, out),
        (TypeTag::Str, CipValue::Str(s)) => strings::encode_string(s, out),
        _ => {
            return Err(CipError::frame(0, format!("value shape does not match type tag {tag:?}")))
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dint_round_trips() {
        let mut out = Vec::new();
        encode(TypeTag::Dint, &CipValue::Dint(-12345), &mut out).unwrap();
        assert_eq!(out, (-12345i32).to_le_bytes().to_vec());
        let (value, consumed) = decode(TypeTag::Dint, &out).unwrap();
        assert_eq!(value, CipValue::Dint(-12345));
        assert_eq!(consumed, 4);
    }

    #[test]
    fn type_tag_code_round_trips() {
        for tag in [
            TypeTag::Bool,
            TypeTag::Sint,
            TypeTag::Int,
            TypeTag::Dint,
            TypeTag::Usint,
            TypeTag::Uint,
            TypeTag::Udint,
            TypeTag::Real,
            TypeTag::Sstring,
            TypeTag::Str,
        ] {
            assert_eq!(TypeTag::from_code(tag.code()).unwrap(), tag);
        }
    }
}
