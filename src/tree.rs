//! Dotted-path data tree.
//!
//! A small hierarchical key/value store keyed by dot-separated paths such
//! as `enip.CIP.send_data.CPF.item[1].unconnected_send.request.service`.
//! It backs two things: the automata runtime's own parse/produce side
//! channel (kept for debugging and for the introspection snapshot) and the
//! `[UCMM]` route table's embedded JSON values once decoded. Concrete
//! protocol records (`crate::enip`, `crate::cip`, `crate::epath`) are the
//! real parse targets — per Design Notes §9 this tree is not the backbone
//! of the wire codecs, just a side channel and a debug/introspection
//! surface.

use std::collections::BTreeMap;
use std::fmt;

/// A value stored at a tree path.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
    Bytes(Vec<u8>),
    Node(Tree),
    Seq(Vec<Value>),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Value::Node(_) => write!(f, "{{...}}"),
            Value::Seq(items) => write!(f, "[{} items]", items.len()),
        }
    }
}

/// One path segment: either a plain field name or an indexed element of a
/// sequence under that name (`item[1]` → `Field("item")`, then `Index(1)`).
#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Field(String),
    Index(usize),
}

fn parse_path(path: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    for part in path.split('.') {
        if let Some(bracket) = part.find('[') {
            let (name, rest) = part.split_at(bracket);
            if !name.is_empty() {
                segments.push(Segment::Field(name.to_string()));
            }
            let idx_str = rest.trim_start_matches('[').trim_end_matches(']');
            if let Ok(idx) = idx_str.parse::<usize>() {
                segments.push(Segment::Index(idx));
            }
        } else if !part.is_empty() {
            segments.push(Segment::Field(part.to_string()));
        }
    }
    segments
}

/// A node of the tree: an ordered map from field name to [`Value`].
/// `BTreeMap` gives deterministic iteration order for pretty-printing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tree {
    fields: BTreeMap<String, Value>,
}

impl Tree {
    pub fn new() -> Self {
        Tree::default()
    }

    /// Fetch a value by dotted path, returning `None` if any intermediate
    /// container is missing or is the wrong shape.
    pub fn get(&self, path: &str) -> Option<&Value> {
        let segments = parse_path(path);
        let mut current = self;
        let mut pending_value: Option<&Value> = None;
        for (i, seg) in segments.iter().enumerate() {
            match seg {
                Segment::Field(name) => {
                    let value = current.fields.get(name)?;
                    if i == segments.len() - 1 {
                        return Some(value);
                    }
                    match value {
                        Value::Node(node) => current = node,
                        other => {
                            pending_value = Some(other);
                            if i + 1 < segments.len() {
                                return None;
                            }
                        }
                    }
                }
                Segment::Index(idx) => {
                    let seq = pending_value?;
                    if let Value::Seq(items) = seq {
                        let item = items.get(*idx)?;
                        if i == segments.len() - 1 {
                            return Some(item);
                        }
                        pending_value = Some(item);
                    } else {
                        return None;
                    }
                }
            }
        }
        None
    }

    /// Set a value at a dotted path, autovivifying intermediate `Node`
    /// containers and `Seq` sequences as needed.
    pub fn set(&mut self, path: &str, value: Value) {
        let segments = parse_path(path);
        self.set_segments(&segments, value);
    }

    fn set_segments(&mut self, segments: &[Segment], value: Value) {
        match segments.first() {
            None => {}
            Some(Segment::Field(name)) => {
                if segments.len() == 1 {
                    self.fields.insert(name.clone(), value);
                    return;
                }
                let entry = self
                    .fields
                    .entry(name.clone())
                    .or_insert_with(|| match segments.get(1) {
                        Some(Segment::Index(_)) => Value::Seq(Vec::new()),
                        _ => Value::Node(Tree::new()),
                    });
                set_into_value(entry, &segments[1..], value);
            }
            Some(Segment::Index(_)) => {
                // A bare leading index has no containing field; ignored.
            }
        }
    }

    /// Insert `value` at `path` only if nothing is already stored there.
    pub fn setdefault(&mut self, path: &str, value: Value) -> &Value {
        if self.get(path).is_none() {
            self.set(path, value);
        }
        self.get(path).expect("just inserted")
    }

    /// Merge every entry of `other` into `self`, overwriting on conflict.
    pub fn update(&mut self, other: Tree) {
        for (key, value) in other.fields {
            self.fields.insert(key, value);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// A debug-log-friendly multi-line rendering, indented by nesting depth.
    pub fn pretty(&self) -> String {
        let mut out = String::new();
        self.pretty_into(&mut out, 0);
        out
    }

    fn pretty_into(&self, out: &mut String, depth: usize) {
        let indent = "  ".repeat(depth);
        for (key, value) in &self.fields {
            match value {
                Value::Node(node) => {
                    out.push_str(&format!("{indent}{key}:\n"));
                    node.pretty_into(out, depth + 1);
                }
                Value::Seq(items) => {
                    out.push_str(&format!("{indent}{key}:\n"));
                    for (i, item) in items.iter().enumerate() {
                        if let Value::Node(node) = item {
                            out.push_str(&format!("{indent}  [{i}]:\n"));
                            node.pretty_into(out, depth + 2);
                        } else {
                            out.push_str(&format!("{indent}  [{i}] = {item}\n"));
                        }
                    }
                }
                other => out.push_str(&format!("{indent}{key} = {other}\n")),
            }
        }
    }
}

fn set_into_value(slot: &mut Value, remaining: &[Segment], value: Value) {
    match remaining.first() {
        None => *slot = value,
        Some(Segment::Field(_)) => {
            if let Value::Node(node) = slot {
                node.set_segments(remaining, value);
            } else {
                let mut node = Tree::new();
                node.set_segments(remaining, value);
                *slot = Value::Node(node);
            }
        }
        Some(Segment::Index(idx)) => {
            if !matches!(slot, Value::Seq(_)) {
                *slot = Value::Seq(Vec::new());
            }
            if let Value::Seq(items) = slot {
                while items.len() <= *idx {
                    items.push(Value::Null);
                }
                if remaining.len() == 1 {
                    items[*idx] = value;
                } else {
                    set_into_value(&mut items[*idx], &remaining[1..], value);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn autovivifies_nested_path() {
        let mut tree = Tree::new();
        tree.set("enip.CIP.send_data.CPF.item[1].unconnected_send.request.service", Value::Int(0x52));
        assert_eq!(
            tree.get("enip.CIP.send_data.CPF.item[1].unconnected_send.request.service"),
            Some(&Value::Int(0x52))
        );
    }

    #[test]
    fn numeric_field_name_is_not_an_index() {
        let mut tree = Tree::new();
        tree.set("item.1.value", Value::Int(7));
        assert_eq!(tree.get("item.1.value"), Some(&Value::Int(7)));
    }

    #[test]
    fn setdefault_does_not_overwrite() {
        let mut tree = Tree::new();
        tree.set("a.b", Value::Int(1));
        tree.setdefault("a.b", Value::Int(99));
        assert_eq!(tree.get("a.b"), Some(&Value::Int(1)));
    }

    #[test]
    fn update_merges_top_level_fields() {
        let mut a = Tree::new();
        a.set("x", Value::Int(1));
        let mut b = Tree::new();
        b.set("y", Value::Int(2));
        a.update(b);
        assert_eq!(a.get("x"), Some(&Value::Int(1)));
        assert_eq!(a.get("y"), Some(&Value::Int(2)));
    }
}
