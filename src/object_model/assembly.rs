//! CIP Assembly object (class 0x04), instantiated only when `[Assembly]`
//! instances are configured.

use super::{Attribute, CipClass, CipInstance};
use crate::codec::{CipValue, TypeTag};
use crate::config::AssemblyConfig;

pub fn build_class(config: &AssemblyConfig) -> CipClass {
    let mut class = CipClass::new(super::CLASS_ASSEMBLY);
    for entry in &config.instances {
        let data = Attribute::array(TypeTag::Usint, vec![CipValue::Usint(0); entry.size_bytes]);
        let instance = CipInstance::new(entry.instance).with_attribute(3, data);
        class = class.with_instance(instance);
    }
    class
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AssemblyInstanceConfig;

    #[test]
    fn builds_one_instance_per_configured_entry() {
        let config = AssemblyConfig {
            instances: vec![AssemblyInstanceConfig { instance: 100, size_bytes: 16 }],
        };
        let class = build_class(&config);
        assert!(class.instances.contains_key(&100));
    }
}
