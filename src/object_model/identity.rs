//! CIP Identity object (class 0x01).

use super::{Attribute, CipClass, CipInstance};
use crate::codec::{CipValue, TypeTag};
use crate::config::DeviceConfig;

pub fn build_class(config: &DeviceConfig) -> CipClass {
    let identity = &config.identity;
    let instance = CipInstance::new(1)
        .with_attribute(1, Attribute::scalar(TypeTag::Uint, CipValue::Uint(identity.vendor_number)).read_only())
        .with_attribute(2, Attribute::scalar(TypeTag::Uint, CipValue::Uint(identity.device_type)).read_only())
        .with_attribute(3, Attribute::scalar(TypeTag::Uint, CipValue::Uint(identity.product_code_number)).read_only())
        .with_attribute(
            4,
            Attribute::array(
                TypeTag::Usint,
                vec![
                    CipValue::Usint(identity.product_revision.0),
                    CipValue::Usint(identity.product_revision.1),
                ],
            )
            .read_only(),
        )
        .with_attribute(5, Attribute::scalar(TypeTag::Uint, CipValue::Uint(identity.status_word)))
        .with_attribute(6, Attribute::scalar(TypeTag::Udint, CipValue::Udint(identity.serial_number)).read_only())
        .with_attribute(
            7,
            Attribute::scalar(TypeTag::Sstring, CipValue::Sstring(identity.product_name.clone())).read_only(),
        )
        .with_attribute(8, Attribute::scalar(TypeTag::Usint, CipValue::Usint(identity.state)))
        .with_attribute(
            9,
            Attribute::scalar(TypeTag::Uint, CipValue::Uint(identity.configuration_consistency_value)),
        )
        .with_attribute(
            10,
            Attribute::scalar(TypeTag::Uint, CipValue::Uint(identity.heartbeat_interval)),
        );
    CipClass::new(super::CLASS_IDENTITY).with_instance(instance)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn instance_one_exposes_product_name() {
        let class = build_class(&DeviceConfig::default());
        let instance = class.instances.get(&1).unwrap();
        let guard = instance.lock().await;
        assert!(guard.get_attribute_single(7).is_ok());
    }
}
