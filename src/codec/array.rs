//! The `typed_data` array combinator: decode/encode `count` contiguous
//! elements of one [`super::TypeTag`].

use super::{decode, encode, CipValue, TypeTag};
use crate::error::{CipError, Result};

/// Decode `count` consecutive elements of `tag` from the front of `bytes`.
/// Returns the elements and the total number of bytes consumed.
pub fn decode_typed_data(tag: TypeTag, count: usize, bytes: &[u8]) -> Result<(Vec<CipValue>, usize)> {
    let mut offset = 0;
    let mut values = Vec::with_capacity(count);
    for _ in 0..count {
        let slice = bytes
            .get(offset..)
            .ok_or_else(|| CipError::frame(offset, "truncated typed_data array"))?;
        let (value, consumed) = decode(tag, slice)?;
        offset += consumed;
        values.push(value);
    }
    Ok((values, offset))
}

/// Encode a homogeneous array of `tag`-typed values.
pub fn encode_typed_data(tag: TypeTag, values: &[CipValue], out: &mut Vec<u8>) -> Result<()> {
    for value in values {
        encode(tag, value, out)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_fixed_width_array() {
        let mut bytes = Vec::new();
        for v in [1i16, -2, 3] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        let (values, consumed) = decode_typed_data(TypeTag::Int, 3, &bytes).unwrap();
        assert_eq!(
            values,
            vec![CipValue::Int(1), CipValue::Int(-2), CipValue::Int(3)]
        );
        assert_eq!(consumed, 6);
    }

    #[test]
    fn round_trips_through_encode() {
        let values = vec![CipValue::Dint(10), CipValue::Dint(-10)];
        let mut out = Vec::new();
        encode_typed_data(TypeTag::Dint, &values, &mut out).unwrap();
        let (decoded, consumed) = decode_typed_data(TypeTag::Dint, 2, &out).unwrap();
        assert_eq!(decoded, values);
        assert_eq!(consumed, out.len());
    }
}
