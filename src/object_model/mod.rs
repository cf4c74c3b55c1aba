//! CIP class/instance/attribute registry and the standard object
//! implementations that populate it by default.
//!
//! The registry is write-once: `ClassRegistry::build` assembles every
//! class at startup from `crate::config::DeviceConfig`, and from then on is
//! only ever read (`§5` shared resource policy). Within a class, each
//! instance's attribute storage is guarded by its own `tokio::sync::Mutex`
//! so concurrent connections never tear a multi-attribute read/write.

pub mod assembly;
pub mod connection_manager;
pub mod ethernet_link;
pub mod identity;
pub mod message_router;
pub mod tags;
pub mod tcpip;

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::codec::{self, CipValue, TypeTag};
use crate::config::DeviceConfig;
use crate::error::{CipError, CipStatus, Result};
use crate::error::{
    STATUS_ATTRIBUTE_NOT_SETTABLE, STATUS_OBJECT_DOES_NOT_EXIST, STATUS_PATH_DESTINATION_UNKNOWN,
};

pub const CLASS_IDENTITY: u16 = 0x01;
pub const CLASS_MESSAGE_ROUTER: u16 = 0x02;
pub const CLASS_ASSEMBLY: u16 = 0x04;
pub const CLASS_CONNECTION_MANAGER: u16 = 0x06;
pub const CLASS_TCPIP_INTERFACE: u16 = 0xF5;
pub const CLASS_ETHERNET_LINK: u16 = 0xF6;

/// Read/write interception hooks for one attribute's storage policy. The
/// default (`RawAttributeAccess`) simply serves the backing buffer;
/// dynamic attributes (e.g. a heartbeat-driven status word) implement this
/// to synthesize values instead.
pub trait AttributeAccess: Send + Sync {
    fn read(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn write(&self, data: &mut Vec<u8>, new_value: &[u8]) -> Result<()> {
        *data = new_value.to_vec();
        Ok(())
    }

    fn settable(&self) -> bool {
        true
    }
}

pub struct RawAttributeAccess;
impl AttributeAccess for RawAttributeAccess {}

pub struct ReadOnlyAccess;
impl AttributeAccess for ReadOnlyAccess {
    fn write(&self, _data: &mut Vec<u8>, _new_value: &[u8]) -> Result<()> {
        Err(CipError::service(STATUS_ATTRIBUTE_NOT_SETTABLE, "attribute is read-only"))
    }

    fn settable(&self) -> bool {
        false
    }
}

/// An addressable attribute: a CIP type tag, an optional array length, a
/// raw storage buffer, and an access policy.
pub struct Attribute {
    pub codec: TypeTag,
    pub length: Option<usize>,
    pub data: Vec<u8>,
    pub access: Box<dyn AttributeAccess>,
}

impl Attribute {
    pub fn scalar(codec: TypeTag, value: CipValue) -> Self {
        let mut data = Vec::new();
        codec::encode(codec, &value, &mut data).expect("matching value shape");
        Attribute {
            codec,
            length: None,
            data,
            access: Box::new(RawAttributeAccess),
        }
    }

    pub fn read_only(mut self) -> Self {
        self.access = Box::new(ReadOnlyAccess);
        self
    }

    pub fn array(codec: TypeTag, values: Vec<CipValue>) -> Self {
        let mut data = Vec::new();
        codec::array::encode_typed_data(codec, &values, &mut data).expect("matching value shapes");
        Attribute {
            codec,
            length: Some(values.len()),
            data,
            access: Box::new(RawAttributeAccess),
        }
    }

    pub fn read(&self) -> Result<Vec<u8>> {
        self.access.read(&self.data)
    }

    pub fn write(&mut self, new_value: &[u8]) -> Result<()> {
        let mut data = std::mem::take(&mut self.data);
        let result = self.access.write(&mut data, new_value);
        self.data = data;
        result
    }
}

/// One numbered instance of a class, owning a set of attributes keyed by
/// attribute number.
pub struct CipInstance {
    pub number: u16,
    pub attributes: BTreeMap<u16, Attribute>,
    /// Set for instances of the synthetic Logix tag-namespace class.
    pub tag_name: Option<String>,
}

impl CipInstance {
    pub fn new(number: u16) -> Self {
        CipInstance {
            number,
            attributes: BTreeMap::new(),
            tag_name: None,
        }
    }

    pub fn with_attribute(mut self, number: u16, attribute: Attribute) -> Self {
        self.attributes.insert(number, attribute);
        self
    }

    pub fn get_attribute_single(&self, attribute: u16) -> Result<Vec<u8>> {
        self.attributes
            .get(&attribute)
            .ok_or_else(|| CipError::service(STATUS_OBJECT_DOES_NOT_EXIST, "no such attribute"))?
            .read()
    }

    pub fn set_attribute_single(&mut self, attribute: u16, data: &[u8]) -> Result<()> {
        self.attributes
            .get_mut(&attribute)
            .ok_or_else(|| CipError::service(STATUS_OBJECT_DOES_NOT_EXIST, "no such attribute"))?
            .write(data)
    }

    /// Get-Attribute-All: every attribute, in numeric order, concatenated.
    pub fn get_attributes_all(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        for attribute in self.attributes.values() {
            out.extend(attribute.read()?);
        }
        Ok(out)
    }
}

/// A class: a process-wide registry for one CIP class code, its
/// class-level attributes (instance 0), and its numbered instances.
pub struct CipClass {
    pub code: u16,
    pub class_attributes: Mutex<CipInstance>,
    pub instances: BTreeMap<u16, Arc<Mutex<CipInstance>>>,
}

impl CipClass {
    pub fn new(code: u16) -> Self {
        CipClass {
            code,
            class_attributes: Mutex::new(CipInstance::new(0)),
            instances: BTreeMap::new(),
        }
    }

    pub fn with_instance(mut self, instance: CipInstance) -> Self {
        self.instances.insert(instance.number, Arc::new(Mutex::new(instance)));
        self
    }

    pub fn instance(&self, number: u16) -> Result<Arc<Mutex<CipInstance>>> {
        self.instances
            .get(&number)
            .cloned()
            .ok_or_else(|| CipError::service(STATUS_PATH_DESTINATION_UNKNOWN, "no such instance"))
    }
}

/// The write-once, read-many class registry built at startup.
pub struct ClassRegistry {
    classes: BTreeMap<u16, CipClass>,
    pub tags: tags::TagNamespace,
}

impl ClassRegistry {
    pub fn build(config: &DeviceConfig) -> Self {
        let mut classes = BTreeMap::new();
        classes.insert(CLASS_IDENTITY, identity::build_class(config));
        classes.insert(CLASS_TCPIP_INTERFACE, tcpip::build_class(config));
        classes.insert(CLASS_ETHERNET_LINK, ethernet_link::build_class());
        classes.insert(CLASS_MESSAGE_ROUTER, message_router::build_class());
        classes.insert(CLASS_CONNECTION_MANAGER, connection_manager::build_class());
        if let Some(assembly_config) = &config.assembly {
            classes.insert(CLASS_ASSEMBLY, assembly::build_class(assembly_config));
        }

        let (tag_class, tags) = tags::build_class_and_namespace(&config.tags);
        classes.insert(tags::CLASS_TAG_NAMESPACE, tag_class);

        ClassRegistry { classes, tags }
    }

    pub fn class(&self, code: u16) -> Result<&CipClass> {
        self.classes
            .get(&code)
            .ok_or_else(|| CipError::service(STATUS_PATH_DESTINATION_UNKNOWN, "no such class"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceConfig;

    #[test]
    fn registry_build_includes_standard_classes() {
        let config = DeviceConfig::default();
        let registry = ClassRegistry::build(&config);
        assert!(registry.class(CLASS_IDENTITY).is_ok());
        assert!(registry.class(CLASS_TCPIP_INTERFACE).is_ok());
        assert!(registry.class(CLASS_ETHERNET_LINK).is_ok());
        assert!(registry.class(CLASS_MESSAGE_ROUTER).is_ok());
        assert!(registry.class(CLASS_CONNECTION_MANAGER).is_ok());
    }

    #[tokio::test]
    async fn instance_attribute_round_trips_through_mutex() {
        let config = DeviceConfig::default();
        let registry = ClassRegistry::build(&config);
        let identity = registry.class(CLASS_IDENTITY).unwrap();
        let instance = identity.instance(1).unwrap();
        let guard = instance.lock().await;
        assert!(guard.get_attribute_single(1).is_ok());
    }
}
