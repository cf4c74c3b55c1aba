//! Fixed-width little-endian primitive codecs.
//!
//! Decoding genuinely runs through the automata runtime: [`fixed_width_collector`]
//! builds a tiny non-greedy DFA of exactly `width` states, each one wired to
//! accept any byte (the `True` wildcard) and append it to a shared buffer via
//! its entry action, terminal on the last state. Running that DFA over a
//! [`PeekableSource`] is what actually pulls the bytes out — this module then
//! interprets the collected buffer with `from_le_bytes`. Encoding a
//! fixed-width value has no grammar to speak of, so it skips the automaton
//! and writes `to_le_bytes` straight into the output buffer.

use std::cell::RefCell;
use std::rc::Rc;

use crate::automata::{run_to_completion, Dfa, PeekableSource, State};
use crate::error::{CipError, Result};

/// Build a non-greedy DFA with `width` states, each consuming any one byte
/// and appending it to `buffer`, terminal after the last byte.
fn fixed_width_collector(name: &str, width: usize, buffer: Rc<RefCell<Vec<u8>>>) -> Rc<Dfa> {
    let mut states = Vec::with_capacity(width + 1);
    for i in 0..width {
        let buf = buffer.clone();
        let action: Rc<dyn Fn(u8)> = Rc::new(move |b| buf.borrow_mut().push(b));
        let mut state = State::new(format!("{name}_{i}")).with_action(action);
        state = state.on_any(i + 1);
        states.push(state);
    }
    states.push(State::new(format!("{name}_done")).terminal());
    Rc::new(Dfa::new(name.to_string(), states, 0))
}

fn collect(name: &str, width: usize, source: &mut dyn PeekableSource) -> Result<Vec<u8>> {
    let buffer = Rc::new(RefCell::new(Vec::with_capacity(width)));
    let dfa = fixed_width_collector(name, width, buffer.clone());
    let (terminal, consumed) = run_to_completion(dfa, source);
    if !terminal || consumed != width {
        return Err(CipError::frame(source.position(), format!("truncated {name} value")));
    }
    Ok(Rc::try_unwrap(buffer).unwrap().into_inner())
}

macro_rules! fixed_codec {
    ($decode:ident, $encode:ident, $ty:ty, $width:expr, $label:expr) => {
        pub fn $decode(source: &mut dyn PeekableSource) -> Result<$ty> {
            let bytes = collect($label, $width, source)?;
            let mut arr = [0u8; $width];
            arr.copy_from_slice(&bytes);
            Ok(<$ty>::from_le_bytes(arr))
        }

        pub fn $encode(value: $ty, out: &mut Vec<u8>) {
            out.extend_from_slice(&value.to_le_bytes());
        }
    };
}

fixed_codec!(decode_sint, encode_sint, i8, 1, "sint");
fixed_codec!(decode_usint, encode_usint, u8, 1, "usint");
fixed_codec!(decode_int, encode_int, i16, 2, "int");
fixed_codec!(decode_uint, encode_uint, u16, 2, "uint");
fixed_codec!(decode_dint, encode_dint, i32, 4, "dint");
fixed_codec!(decode_udint, encode_udint, u32, 4, "udint");
fixed_codec!(decode_real, encode_real, f32, 4, "real");

pub fn decode_bool(source: &mut dyn PeekableSource) -> Result<bool> {
    Ok(decode_usint(source)? != 0)
}

pub fn encode_bool(value: bool, out: &mut Vec<u8>) {
    out.push(if value { 0xFF } else { 0x00 });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automata::SliceSource;

    #[test]
    fn decode_dint_reads_four_bytes_little_endian() {
        let mut src = SliceSource::new(&[0x01, 0x00, 0x00, 0x00, 0xAA]);
        assert_eq!(decode_dint(&mut src).unwrap(), 1);
        assert_eq!(src.position(), 4);
    }

    #[test]
    fn decode_real_matches_native_bit_pattern() {
        let bytes = 3.5f32.to_le_bytes();
        let mut src = SliceSource::new(&bytes);
        assert_eq!(decode_real(&mut src).unwrap(), 3.5);
    }

    #[test]
    fn truncated_input_is_a_frame_error() {
        let mut src = SliceSource::new(&[0x01, 0x00]);
        assert!(decode_dint(&mut src).is_err());
    }

    #[test]
    fn bool_nonzero_byte_is_true() {
        let mut src = SliceSource::new(&[0x01]);
        assert!(decode_bool(&mut src).unwrap());
    }
}
