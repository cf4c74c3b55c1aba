//! CIP Connection Manager object (class 0x06).
//!
//! Only the addressable shell is modeled — Forward-Open/Forward-Close
//! ("Connected"/"Implicit" I/O) are an explicit Non-goal; Unconnected-Send
//! is handled directly by `crate::cip::unconnected_send`.

use super::{Attribute, CipClass, CipInstance};
use crate::codec::{CipValue, TypeTag};

pub fn build_class() -> CipClass {
    let instance = CipInstance::new(1).with_attribute(
        1,
        Attribute::scalar(TypeTag::Uint, CipValue::Uint(0)).read_only(), // open connections count
    );
    CipClass::new(super::CLASS_CONNECTION_MANAGER).with_instance(instance)
}
