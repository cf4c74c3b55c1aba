//! Tag/operation syntax: `TAG[lo-hi]=(TYPE)v1,v2,…` (symbolic),
//! `@c/i/a[e]=…` (numeric), plus a JSON segment form for non-default
//! segment kinds (e.g. `{"connection": 100}`).

use crate::codec::{CipValue, TypeTag};
use crate::epath::{EPath, Link, Segment};
use crate::error::{CipError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Read,
    Write,
    GetAttributeSingle,
    GetAttributesAll,
    SetAttributeSingle,
}

/// One logical CIP request, as compiled from the command-line operation
/// syntax (§6).
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub method: Method,
    pub path: EPath,
    pub element_low: usize,
    pub element_high: usize,
    pub type_tag: Option<TypeTag>,
    pub values: Vec<CipValue>,
}

impl Operation {
    pub fn element_count(&self) -> usize {
        self.element_high - self.element_low + 1
    }
}

/// Parse one operation descriptor. Accepts:
/// - `SCADA[0-9]=(INT)1,2,3` — symbolic write of a range
/// - `SCADA` — symbolic read of element 0
/// - `@22/1/1[5]=(DINT)7` — numeric write
/// - `@22/1/1` — numeric read
pub fn parse(spec: &str) -> Result<Operation> {
    let (target, assignment) = match spec.split_once('=') {
        Some((t, a)) => (t, Some(a)),
        None => (spec, None),
    };

    let (path, element_low, element_high) = if target.trim_start().starts_with('{') || target.trim_start().starts_with('[') {
        (parse_json_path(target.trim())?, 0, 0)
    } else {
        let (base, element_low, element_high) = parse_target_and_range(target)?;
        let path = if let Some(numeric) = base.strip_prefix('@') {
            parse_numeric_path(numeric)?
        } else {
            EPath(vec![Segment::Symbolic { name: base.to_string(), member: None }])
        };
        (path, element_low, element_high)
    };

    let (method, type_tag, values) = match assignment {
        None => (Method::Read, None, Vec::new()),
        Some(rhs) => {
            let (type_name, value_list) = rhs
                .strip_prefix('(')
                .and_then(|rest| rest.split_once(')'))
                .ok_or_else(|| CipError::Configuration(format!("malformed operation assignment '{rhs}'")))?;
            let type_tag = TypeTag::from_case_insensitive_name(type_name)?;
            let values = value_list
                .split(',')
                .map(|v| parse_scalar(type_tag, v.trim()))
                .collect::<Result<Vec<_>>>()?;
            (Method::Write, Some(type_tag), values)
        }
    };

    Ok(Operation {
        method,
        path,
        element_low,
        element_high,
        type_tag,
        values,
    })
}

fn parse_target_and_range(target: &str) -> Result<(&str, usize, usize)> {
    if let Some(bracket) = target.find('[') {
        let (base, rest) = target.split_at(bracket);
        let range = rest
            .trim_start_matches('[')
            .trim_end_matches(']');
        let (low, high) = match range.split_once('-') {
            Some((lo, hi)) => (
                lo.parse().map_err(|_| CipError::Configuration(format!("bad range '{range}'")))?,
                hi.parse().map_err(|_| CipError::Configuration(format!("bad range '{range}'")))?,
            ),
            None => {
                let n = range
                    .parse()
                    .map_err(|_| CipError::Configuration(format!("bad element index '{range}'")))?;
                (n, n)
            }
        };
        Ok((base, low, high))
    } else {
        Ok((target, 0, 0))
    }
}

fn parse_numeric_path(numeric: &str) -> Result<EPath> {
    let parts: Vec<&str> = numeric.split('/').collect();
    let mut segments = Vec::new();
    let kinds = [Segment::Class as fn(u32) -> Segment, Segment::Instance, Segment::Attribute];
    for (part, make) in parts.iter().zip(kinds.iter()) {
        let value: u32 = part
            .parse()
            .map_err(|_| CipError::Configuration(format!("bad numeric path segment '{part}'")))?;
        segments.push(make(value));
    }
    if segments.len() < 2 {
        return Err(CipError::Configuration(format!("numeric path '{numeric}' needs at least class/instance")));
    }
    Ok(EPath(segments))
}

/// Parses the JSON segment form: a single segment object like
/// `{"connection": 100}`, or an array of them for a multi-segment path.
/// Covers the segment kinds the numeric `@c/i/a` shorthand can't reach
/// (connection points, ports/links).
fn parse_json_path(text: &str) -> Result<EPath> {
    let json: serde_json::Value =
        serde_json::from_str(text).map_err(|e| CipError::Configuration(format!("invalid JSON path '{text}': {e}")))?;
    let entries = match json {
        serde_json::Value::Array(items) => items,
        object @ serde_json::Value::Object(_) => vec![object],
        other => return Err(CipError::Configuration(format!("JSON path '{other}' must be an object or array of objects"))),
    };

    let mut segments = Vec::with_capacity(entries.len());
    for entry in entries {
        let object = entry
            .as_object()
            .ok_or_else(|| CipError::Configuration(format!("JSON path segment '{entry}' must be an object")))?;
        if let Some(port) = object.get("port") {
            let port = port
                .as_u64()
                .ok_or_else(|| CipError::Configuration("'port' segment needs a numeric port number".to_string()))? as u16;
            let link = match object.get("link") {
                Some(serde_json::Value::String(address)) => Link::Address(address.clone()),
                Some(serde_json::Value::Number(n)) => {
                    Link::Number(n.as_u64().ok_or_else(|| CipError::Configuration("'link' must be a non-negative integer".to_string()))? as u32)
                }
                _ => return Err(CipError::Configuration("'port' segment needs a 'link'".to_string())),
            };
            segments.push(Segment::Port { port, link });
            continue;
        }
        let (key, value) = object
            .iter()
            .next()
            .ok_or_else(|| CipError::Configuration("empty JSON path segment".to_string()))?;
        segments.push(match key.as_str() {
            "class" => Segment::Class(json_segment_value(value)?),
            "instance" => Segment::Instance(json_segment_value(value)?),
            "attribute" => Segment::Attribute(json_segment_value(value)?),
            "element" => Segment::Element(json_segment_value(value)?),
            "connection" => Segment::Connection(json_segment_value(value)?),
            "symbolic" => Segment::Symbolic { name: value.as_str().unwrap_or_default().to_string(), member: None },
            other => return Err(CipError::Configuration(format!("unknown JSON path segment kind '{other}'"))),
        });
    }
    Ok(EPath(segments))
}

fn json_segment_value(value: &serde_json::Value) -> Result<u32> {
    value
        .as_u64()
        .map(|v| v as u32)
        .ok_or_else(|| CipError::Configuration(format!("expected a non-negative integer segment value, got '{value}'")))
}

fn parse_scalar(tag: TypeTag, text: &str) -> Result<CipValue> {
    let bad = || CipError::Configuration(format!("cannot parse '{text}' as {tag:?}"));
    Ok(match tag {
        TypeTag::Bool => CipValue::Bool(text == "1" || text.eq_ignore_ascii_case("true")),
        TypeTag::Sint => CipValue::Sint(text.parse().map_err(|_| bad())?),
        TypeTag::Int => CipValue::Int(text.parse().map_err(|_| bad())?),
        TypeTag::Dint => CipValue::Dint(text.parse().map_err(|_| bad())?),
        TypeTag::Usint => CipValue::Usint(text.parse().map_err(|_| bad())?),
        TypeTag::Uint => CipValue::Uint(text.parse().map_err(|_| bad())?),
        TypeTag::Udint => CipValue::Udint(text.parse().map_err(|_| bad())?),
        TypeTag::Real => CipValue::Real(text.parse().map_err(|_| bad())?),
        TypeTag::Sstring => CipValue::Sstring(text.to_string()),
        TypeTag::Str => CipValue::Str(text.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_symbolic_write_with_range() {
        let op = parse("SCADA[0-2]=(INT)1,2,3").unwrap();
        assert_eq!(op.method, Method::Write);
        assert_eq!(op.element_low, 0);
        assert_eq!(op.element_high, 2);
        assert_eq!(op.values.len(), 3);
    }

    #[test]
    fn parses_numeric_read() {
        let op = parse("@22/1/1").unwrap();
        assert_eq!(op.method, Method::Read);
        assert_eq!(op.path.0.len(), 3);
    }

    #[test]
    fn parses_symbolic_read() {
        let op = parse("SCADA").unwrap();
        assert_eq!(op.method, Method::Read);
        assert_eq!(op.element_low, 0);
        assert_eq!(op.element_high, 0);
    }

    #[test]
    fn parses_json_single_segment() {
        let op = parse(r#"{"connection": 100}"#).unwrap();
        assert_eq!(op.path.0, vec![Segment::Connection(100)]);
    }

    #[test]
    fn parses_json_multi_segment_path() {
        let op = parse(r#"[{"class": 22}, {"instance": 1}, {"attribute": 3}]"#).unwrap();
        assert_eq!(op.path.0, vec![Segment::Class(22), Segment::Instance(1), Segment::Attribute(3)]);
    }
}
