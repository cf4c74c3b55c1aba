//! CIP Ethernet Link object (class 0xF6) — link status/counters as a
//! simulator would report them: statically good, zeroed counters.

use super::{Attribute, CipClass, CipInstance};
use crate::codec::{CipValue, TypeTag};

pub fn build_class() -> CipClass {
    let instance = CipInstance::new(1)
        .with_attribute(1, Attribute::scalar(TypeTag::Udint, CipValue::Udint(100_000_000)).read_only()) // interface speed (bps)
        .with_attribute(2, Attribute::scalar(TypeTag::Udint, CipValue::Udint(0b11)).read_only()) // interface flags: link up, full duplex
        .with_attribute(
            3,
            Attribute::array(TypeTag::Usint, vec![CipValue::Usint(0); 6]).read_only(), // physical address (MAC)
        );
    CipClass::new(super::CLASS_ETHERNET_LINK).with_instance(instance)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_link_up_full_duplex() {
        let class = build_class();
        let instance = class.instances.get(&1).unwrap();
        assert!(instance.try_lock().is_ok());
    }
}
