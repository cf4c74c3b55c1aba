//! CIP TCP/IP Interface object (class 0xF5).

use super::{Attribute, CipClass, CipInstance};
use crate::codec::{CipValue, TypeTag};
use crate::config::DeviceConfig;
use crate::epath;

pub fn build_class(config: &DeviceConfig) -> CipClass {
    let tcpip = &config.tcpip;
    let mut path_bytes = Vec::new();
    epath::encode(&tcpip.path_to_physical_link, &mut path_bytes);

    let instance = CipInstance::new(1)
        .with_attribute(1, Attribute::scalar(TypeTag::Udint, CipValue::Udint(tcpip.interface_status)).read_only())
        .with_attribute(
            2,
            Attribute::scalar(TypeTag::Udint, CipValue::Udint(tcpip.configuration_capability)).read_only(),
        )
        .with_attribute(3, Attribute::scalar(TypeTag::Udint, CipValue::Udint(tcpip.configuration_control)))
        .with_attribute(5, Attribute::scalar(TypeTag::Sstring, CipValue::Sstring(tcpip.host_name.clone())))
        .with_attribute(6, raw_bytes_attribute(path_bytes))
        .with_attribute(
            10,
            Attribute::scalar(TypeTag::Sstring, CipValue::Sstring(tcpip.interface_configuration.domain_name.clone())),
        );
    CipClass::new(super::CLASS_TCPIP_INTERFACE).with_instance(instance)
}

/// `Path to Physical Link` is stored as a raw undecoded EPATH byte string
/// rather than a CIP elementary type; `Usint` array encoding matches its
/// wire shape closely enough for the storage layer without inventing a new
/// codec variant just for one attribute.
fn raw_bytes_attribute(bytes: Vec<u8>) -> Attribute {
    let values = bytes.into_iter().map(CipValue::Usint).collect::<Vec<_>>();
    Attribute::array(TypeTag::Usint, values).read_only()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exposes_host_name_attribute() {
        let class = build_class(&DeviceConfig::default());
        assert!(class.instances.contains_key(&1));
    }
}
