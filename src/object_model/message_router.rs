//! CIP Message Router object (class 0x02).
//!
//! The router's real job — routing a Message Router request to the right
//! class/instance/attribute — is done by `crate::cip::dispatch`, not by
//! this object; this class only exists so the router itself is addressable
//! (e.g. Get-Attribute-Single on its own instance 1).

use super::{Attribute, CipClass, CipInstance};
use crate::codec::{CipValue, TypeTag};

pub fn build_class() -> CipClass {
    let instance = CipInstance::new(1).with_attribute(
        2,
        Attribute::scalar(TypeTag::Uint, CipValue::Uint(1)).read_only(), // number of active connections
    );
    CipClass::new(super::CLASS_MESSAGE_ROUTER).with_instance(instance)
}
