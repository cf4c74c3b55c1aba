//! The Logix tag namespace: a synthetic class whose instances represent
//! named tags, plus the symbolic-name → `(class, instance, attribute)`
//! lookup table used to resolve a `{symbolic: "SCADA"}` EPATH segment.
//!
//! A tag declared `SCADA@22/1/1=INT[1000]` binds straight to an explicit
//! triple instead of the synthetic class; `TagNamespace::resolve` returns
//! that triple directly in that case.

use std::collections::BTreeMap;

use super::{Attribute, CipClass, CipInstance};
use crate::codec::CipValue;
use crate::config::TagDef;

/// Arbitrary class code for the synthetic tag namespace — chosen outside
/// the standard CIP class range (0x01-0x07, 0xF0-0xFF) to avoid colliding
/// with a real device's own classes.
pub const CLASS_TAG_NAMESPACE: u16 = 0x6B;

/// One tag's resolved address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagAddress {
    pub class: u16,
    pub instance: u16,
    pub attribute: u16,
}

#[derive(Debug, Clone, Default)]
pub struct TagNamespace {
    by_name: BTreeMap<String, TagAddress>,
}

impl TagNamespace {
    pub fn resolve(&self, name: &str) -> Option<TagAddress> {
        self.by_name.get(name).copied()
    }
}

pub fn build_class_and_namespace(defs: &[TagDef]) -> (CipClass, TagNamespace) {
    let mut class = CipClass::new(CLASS_TAG_NAMESPACE);
    let mut namespace = TagNamespace::default();
    let mut next_synthetic_instance: u16 = 1;

    for def in defs {
        let address = match (def.bound_class, def.bound_instance, def.bound_attribute) {
            (Some(class_code), Some(instance), Some(attribute)) => TagAddress {
                class: class_code,
                instance,
                attribute,
            },
            _ => {
                let instance_number = next_synthetic_instance;
                next_synthetic_instance += 1;
                let storage = Attribute::array(def.type_tag, vec![default_value(def.type_tag); def.count]);
                let instance = CipInstance::new(instance_number)
                    .with_attribute(1, storage);
                class = class.with_instance(CipInstance { tag_name: Some(def.name.clone()), ..instance });
                TagAddress {
                    class: CLASS_TAG_NAMESPACE,
                    instance: instance_number,
                    attribute: 1,
                }
            }
        };
        namespace.by_name.insert(def.name.clone(), address);
    }

    (class, namespace)
}

fn default_value(tag: crate::codec::TypeTag) -> CipValue {
    use crate::codec::TypeTag::*;
    match tag {
        Bool => CipValue::Bool(false),
        Sint => CipValue::Sint(0),
        Int => CipValue::Int(0),
        Dint => CipValue::Dint(0),
        Usint => CipValue::Usint(0),
        Uint => CipValue::Uint(0),
        Udint => CipValue::Udint(0),
        Real => CipValue::Real(0.0),
        Sstring => CipValue::Sstring(String::new()),
        Str => CipValue::Str(String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::TypeTag;

    #[test]
    fn unbound_tag_gets_synthetic_instance() {
        let defs = vec![TagDef {
            name: "SCADA".to_string(),
            bound_class: None,
            bound_instance: None,
            bound_attribute: None,
            type_tag: TypeTag::Int,
            count: 1000,
        }];
        let (class, namespace) = build_class_and_namespace(&defs);
        let address = namespace.resolve("SCADA").unwrap();
        assert_eq!(address.class, CLASS_TAG_NAMESPACE);
        assert!(class.instances.contains_key(&address.instance));
    }

    #[test]
    fn bound_tag_resolves_to_explicit_triple() {
        let defs = vec![TagDef {
            name: "SCADA".to_string(),
            bound_class: Some(22),
            bound_instance: Some(1),
            bound_attribute: Some(1),
            type_tag: TypeTag::Int,
            count: 1000,
        }];
        let (_, namespace) = build_class_and_namespace(&defs);
        assert_eq!(
            namespace.resolve("SCADA"),
            Some(TagAddress { class: 22, instance: 1, attribute: 1 })
        );
    }
}
