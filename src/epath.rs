//! EPATH (CIP path) segments: parsing, encoding, and minimum-width selection.

use crate::codec::primitives::{decode_uint, decode_usint, encode_uint, encode_usint};
use crate::automata::SliceSource;
use crate::error::{CipError, Result};

/// One EPATH segment.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Class(u32),
    Instance(u32),
    Attribute(u32),
    Element(u32),
    Connection(u32),
    Port { port: u16, link: Link },
    Symbolic { name: String, member: Option<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Link {
    Number(u32),
    Address(String),
}

/// A full ordered EPATH.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EPath(pub Vec<Segment>);

impl EPath {
    pub fn new(segments: Vec<Segment>) -> Self {
        EPath(segments)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Convenience constructor for the common `class/instance/attribute`
    /// numeric addressing form.
    pub fn class_instance_attribute(class: u32, instance: u32, attribute: Option<u32>) -> Self {
        let mut segments = vec![Segment::Class(class), Segment::Instance(instance)];
        if let Some(attr) = attribute {
            segments.push(Segment::Attribute(attr));
        }
        EPath(segments)
    }

    /// Pop the leading segment (used by the route-path matching rule in the
    /// CIP dispatcher) returning it along with the remaining path.
    pub fn pop_front(&self) -> Option<(Segment, EPath)> {
        let mut iter = self.0.iter().cloned();
        let first = iter.next()?;
        Some((first, EPath(iter.collect())))
    }
}

/// Logical segment type codes (CIP Vol 1, Appendix C, segment type field
/// upper 3 bits of the first byte; only the "logical" and "port" segment
/// families used by this stack are implemented).
mod segment_type {
    pub const LOGICAL: u8 = 0b001_00000;
    pub const PORT: u8 = 0b000_00000;
    pub const SYMBOLIC: u8 = 0b011_00000;

    pub const LOGICAL_CLASS: u8 = 0b000;
    pub const LOGICAL_INSTANCE: u8 = 0b001;
    pub const LOGICAL_ATTRIBUTE: u8 = 0b010;
    pub const LOGICAL_CONNECTION: u8 = 0b011;
    pub const LOGICAL_ELEMENT: u8 = 0b100;
}

/// Parse `word_count` 16-bit words worth of EPATH bytes (as carried in a
/// CIP request/route path, which is prefixed with a word count elsewhere).
pub fn parse(bytes: &[u8]) -> Result<(EPath, usize)> {
    let mut offset = 0;
    let mut segments = Vec::new();
    while offset < bytes.len() {
        let tag = bytes[offset];
        let family = tag & 0b111_00000;
        if family == segment_type::LOGICAL {
            let format = tag & 0b000_11100;
            let logical_type = tag & 0b000_00011;
            let (value, consumed) = parse_logical_value(bytes, offset + 1, logical_type)?;
            offset += 1 + consumed;
            let kind = format >> 2;
            segments.push(match kind {
                x if x == segment_type::LOGICAL_CLASS => Segment::Class(value),
                x if x == segment_type::LOGICAL_INSTANCE => Segment::Instance(value),
                x if x == segment_type::LOGICAL_ATTRIBUTE => Segment::Attribute(value),
                x if x == segment_type::LOGICAL_CONNECTION => Segment::Connection(value),
                x if x == segment_type::LOGICAL_ELEMENT => Segment::Element(value),
                other => {
                    return Err(CipError::frame(
                        offset,
                        format!("unsupported logical segment format {other:#04b}"),
                    ))
                }
            });
        } else if family == segment_type::PORT {
            let extended_link = tag & 0b0001_0000 != 0;
            let port_low = tag & 0b0000_1111;
            offset += 1;
            let port = if port_low == 0b1111 {
                let p = decode_uint(&mut SliceSource::new(&bytes[offset..]))?;
                offset += 2;
                p
            } else {
                port_low as u16
            };
            let link = if extended_link {
                let len = bytes
                    .get(offset)
                    .copied()
                    .ok_or_else(|| CipError::frame(offset, "truncated port segment link size"))?
                    as usize;
                offset += 1;
                let text = bytes
                    .get(offset..offset + len)
                    .ok_or_else(|| CipError::frame(offset, "truncated port segment link address"))?;
                offset += len;
                if (1 + len) % 2 != 0 {
                    offset += 1; // pad
                }
                Link::Address(String::from_utf8_lossy(text).into_owned())
            } else {
                let n = bytes
                    .get(offset)
                    .copied()
                    .ok_or_else(|| CipError::frame(offset, "truncated port segment link number"))?;
                offset += 1;
                Link::Number(n as u32)
            };
            segments.push(Segment::Port { port, link });
        } else if family == segment_type::SYMBOLIC {
            let len = (tag & 0b0001_1111) as usize;
            offset += 1;
            let name_bytes = bytes
                .get(offset..offset + len)
                .ok_or_else(|| CipError::frame(offset, "truncated symbolic segment"))?;
            let name = String::from_utf8_lossy(name_bytes).into_owned();
            offset += len;
            if len % 2 != 0 {
                offset += 1; // pad to even
            }
            segments.push(Segment::Symbolic { name, member: None });
        } else {
            return Err(CipError::frame(offset, format!("unsupported segment family {family:#05b}")));
        }
    }
    Ok((EPath(segments), offset))
}

fn parse_logical_value(bytes: &[u8], offset: usize, logical_type: u8) -> Result<(u32, usize)> {
    match logical_type {
        0 => {
            let v = bytes
                .get(offset)
                .copied()
                .ok_or_else(|| CipError::frame(offset, "truncated 8-bit logical segment"))?;
            Ok((v as u32, 1))
        }
        1 => {
            // 16-bit form is padded: a reserved byte, then the 16-bit value.
            let start = offset + 1;
            let v = decode_uint(&mut SliceSource::new(&bytes[start..]))?;
            Ok((v as u32, 3))
        }
        2 => {
            let start = offset + 1;
            let lo = decode_uint(&mut SliceSource::new(&bytes[start..]))? as u32;
            let hi = decode_uint(&mut SliceSource::new(&bytes[start + 2..]))? as u32;
            Ok((lo | (hi << 16), 5))
        }
        other => Err(CipError::frame(offset, format!("unsupported logical value size code {other}"))),
    }
}

/// Encode `path` choosing the minimum representable width for each logical
/// segment.
pub fn encode(path: &EPath, out: &mut Vec<u8>) {
    for segment in &path.0 {
        match segment {
            Segment::Class(v) => encode_logical(segment_type::LOGICAL_CLASS, *v, out),
            Segment::Instance(v) => encode_logical(segment_type::LOGICAL_INSTANCE, *v, out),
            Segment::Attribute(v) => encode_logical(segment_type::LOGICAL_ATTRIBUTE, *v, out),
            Segment::Connection(v) => encode_logical(segment_type::LOGICAL_CONNECTION, *v, out),
            Segment::Element(v) => encode_logical(segment_type::LOGICAL_ELEMENT, *v, out),
            Segment::Port { port, link } => encode_port(*port, link, out),
            Segment::Symbolic { name, member } => {
                encode_symbolic(name, out);
                if let Some(member) = member {
                    encode_symbolic(member, out);
                }
            }
        }
    }
}

fn encode_logical(kind: u8, value: u32, out: &mut Vec<u8>) {
    if value <= u8::MAX as u32 {
        out.push(segment_type::LOGICAL | (kind << 2));
        encode_usint(value as u8, out);
    } else if value <= u16::MAX as u32 {
        out.push(segment_type::LOGICAL | (kind << 2) | 0b01);
        out.push(0); // reserved pad byte before the 16-bit value
        encode_uint(value as u16, out);
    } else {
        out.push(segment_type::LOGICAL | (kind << 2) | 0b10);
        out.push(0);
        encode_uint((value & 0xFFFF) as u16, out);
        encode_uint((value >> 16) as u16, out);
    }
}

fn encode_port(port: u16, link: &Link, out: &mut Vec<u8>) {
    let extended_link = matches!(link, Link::Address(_));
    let mut tag = segment_type::PORT;
    if extended_link {
        tag |= 0b0001_0000;
    }
    if port < 0b1111 {
        tag |= port as u8;
        out.push(tag);
    } else {
        tag |= 0b1111;
        out.push(tag);
        encode_uint(port, out);
    }
    match link {
        Link::Number(n) => out.push(*n as u8),
        Link::Address(addr) => {
            let bytes = addr.as_bytes();
            out.push(bytes.len() as u8);
            out.extend_from_slice(bytes);
            if (1 + bytes.len()) % 2 != 0 {
                out.push(0);
            }
        }
    }
}

fn encode_symbolic(name: &str, out: &mut Vec<u8>) {
    let bytes = name.as_bytes();
    out.push(segment_type::SYMBOLIC | (bytes.len() as u8 & 0b0001_1111));
    out.extend_from_slice(bytes);
    if bytes.len() % 2 != 0 {
        out.push(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_instance_attribute_round_trips_minimal_width() {
        let path = EPath::class_instance_attribute(0x01, 1, Some(7));
        let mut bytes = Vec::new();
        encode(&path, &mut bytes);
        // class/instance/attribute all fit in 8 bits: 2 bytes each.
        assert_eq!(bytes.len(), 6);
        let (parsed, consumed) = parse(&bytes).unwrap();
        assert_eq!(parsed, path);
        assert_eq!(consumed, bytes.len());
    }

    #[test]
    fn sixteen_bit_class_round_trips() {
        let path = EPath::class_instance_attribute(0x1234, 1, None);
        let mut bytes = Vec::new();
        encode(&path, &mut bytes);
        let (parsed, _) = parse(&bytes).unwrap();
        assert_eq!(parsed, path);
    }

    #[test]
    fn symbolic_segment_pads_odd_length_names() {
        let path = EPath(vec![Segment::Symbolic {
            name: "SCADA".to_string(),
            member: None,
        }]);
        let mut bytes = Vec::new();
        encode(&path, &mut bytes);
        assert_eq!(bytes.len() % 2, 0);
        let (parsed, consumed) = parse(&bytes).unwrap();
        assert_eq!(parsed, path);
        assert_eq!(consumed, bytes.len());
    }

    #[test]
    fn port_segment_with_ip_link_round_trips() {
        let path = EPath(vec![Segment::Port {
            port: 2,
            link: Link::Address("10.0.0.5".to_string()),
        }]);
        let mut bytes = Vec::new();
        encode(&path, &mut bytes);
        let (parsed, _) = parse(&bytes).unwrap();
        assert_eq!(parsed, path);
    }
}
