//! The CIP request dispatcher: EPATH resolution, Unconnected-Send framing,
//! Multiple Service Packet bundling, and the Logix/generic attribute
//! services, all sitting on top of the object model (`crate::object_model`).

pub mod logix;
pub mod multiple_service_packet;
pub mod route;
pub mod status;
pub mod unconnected_send;

use crate::config::DeviceConfig;
use crate::epath::{EPath, Segment};
use crate::error::{CipError, Result};
use crate::object_model::ClassRegistry;

pub const SERVICE_GET_ATTRIBUTE_ALL: u8 = 0x01;
pub const SERVICE_GET_ATTRIBUTE_SINGLE: u8 = 0x0E;
pub const SERVICE_SET_ATTRIBUTE_SINGLE: u8 = 0x10;
pub const SERVICE_UNCONNECTED_SEND: u8 = 0x52;
pub const SERVICE_MULTIPLE_SERVICE_PACKET: u8 = 0x0A;
pub const SERVICE_READ_TAG: u8 = 0x4C;
pub const SERVICE_READ_TAG_FRAGMENTED: u8 = 0x52;
pub const SERVICE_WRITE_TAG: u8 = 0x4D;
pub const SERVICE_WRITE_TAG_FRAGMENTED: u8 = 0x53;

pub const REPLY_FLAG: u8 = 0x80;

/// One CIP service request: a service code, the EPATH it targets, and any
/// service-specific request data that follows the path in the wire
/// encoding.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceRequest {
    pub service: u8,
    pub path: EPath,
    pub data: Vec<u8>,
}

/// The corresponding reply: `service | REPLY_FLAG`, a general status byte,
/// optional extended status words, and reply data (empty on failure except
/// where the failing service still defines a partial payload).
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceResponse {
    pub service: u8,
    pub status: u8,
    pub extended_status: Vec<u16>,
    pub data: Vec<u8>,
}

impl ServiceResponse {
    pub fn ok(service: u8, data: Vec<u8>) -> Self {
        ServiceResponse {
            service: service | REPLY_FLAG,
            status: status::STATUS_SUCCESS,
            extended_status: Vec::new(),
            data,
        }
    }

    pub fn from_error(service: u8, error: &CipError) -> Self {
        let mut extended = Vec::new();
        if let Some(ext) = error.extended_status() {
            extended.push(ext);
        }
        ServiceResponse {
            service: service | REPLY_FLAG,
            status: error.as_general_status(),
            extended_status: extended,
            data: Vec::new(),
        }
    }
}

/// A resolved, numeric `(class, instance, attribute)` triple — the target
/// of every attribute-level service once symbolic segments have been
/// translated through the tag namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub class: u16,
    pub instance: u16,
    pub attribute: Option<u16>,
}

/// Resolve an EPATH (which may use a symbolic segment for Logix tag
/// access, or plain numeric class/instance/attribute segments) to a
/// concrete triple.
pub fn resolve_target(registry: &ClassRegistry, path: &EPath) -> Result<ResolvedTarget> {
    if let Some(Segment::Symbolic { name, .. }) = path.0.first() {
        let address = registry
            .tags
            .resolve(name)
            .ok_or_else(|| CipError::service(status::STATUS_PATH_DESTINATION_UNKNOWN, format!("unknown tag '{name}'")))?;
        return Ok(ResolvedTarget {
            class: address.class,
            instance: address.instance,
            attribute: Some(address.attribute),
        });
    }

    let mut class = None;
    let mut instance = None;
    let mut attribute = None;
    for segment in &path.0 {
        match segment {
            Segment::Class(v) => class = Some(*v as u16),
            Segment::Instance(v) => instance = Some(*v as u16),
            Segment::Attribute(v) => attribute = Some(*v as u16),
            _ => {}
        }
    }
    Ok(ResolvedTarget {
        class: class.ok_or_else(|| CipError::service(status::STATUS_PATH_SEGMENT_ERROR, "missing class segment"))?,
        instance: instance.ok_or_else(|| CipError::service(status::STATUS_PATH_SEGMENT_ERROR, "missing instance segment"))?,
        attribute,
    })
}

/// Dispatch one service request against the local object model, routing
/// through Unconnected-Send / Multiple Service Packet / Logix as the
/// service code requires. This is the single entry point the server
/// session (`crate::server::session`) and the route forwarder
/// (`crate::cip::route`) both call.
pub async fn dispatch(registry: &ClassRegistry, config: &DeviceConfig, request: ServiceRequest) -> ServiceResponse {
    let service = request.service;
    let result = dispatch_inner(registry, config, request).await;
    match result {
        Ok(response) => response,
        Err(error) => {
            tracing::warn!(service = format!("0x{service:02X}"), %error, "service request failed");
            ServiceResponse::from_error(service, &error)
        }
    }
}

async fn dispatch_inner(registry: &ClassRegistry, config: &DeviceConfig, request: ServiceRequest) -> Result<ServiceResponse> {
    match request.service {
        // 0x52 is overloaded: against the Connection Manager (or an empty
        // path, as arrives directly off SendRRData) it means
        // Unconnected-Send; against a tag target it means
        // Read-Tag-Fragmented. Real ControlLogix firmware disambiguates the
        // same way, by which object the service is addressed to.
        SERVICE_UNCONNECTED_SEND if targets_connection_manager(&request.path) => {
            unconnected_send::handle(registry, config, &request.data).await
        }
        SERVICE_UNCONNECTED_SEND => logix::handle(registry, &request).await,
        SERVICE_MULTIPLE_SERVICE_PACKET => multiple_service_packet::handle(registry, config, &request.data).await,
        SERVICE_READ_TAG | SERVICE_WRITE_TAG | SERVICE_WRITE_TAG_FRAGMENTED => {
            logix::handle(registry, &request).await
        }
        SERVICE_GET_ATTRIBUTE_ALL | SERVICE_GET_ATTRIBUTE_SINGLE | SERVICE_SET_ATTRIBUTE_SINGLE => {
            handle_generic_attribute_service(registry, &request).await
        }
        other => Err(CipError::service(status::STATUS_SERVICE_NOT_SUPPORTED, format!("unsupported service 0x{other:02X}"))),
    }
}

fn targets_connection_manager(path: &EPath) -> bool {
    path.is_empty()
        || path
            .0
            .iter()
            .any(|segment| matches!(segment, Segment::Class(0x06)))
}

async fn handle_generic_attribute_service(registry: &ClassRegistry, request: &ServiceRequest) -> Result<ServiceResponse> {
    let target = resolve_target(registry, &request.path)?;
    let class = registry.class(target.class)?;
    let instance_handle = class.instance(target.instance)?;
    let mut instance = instance_handle.lock().await;

    let data = match request.service {
        SERVICE_GET_ATTRIBUTE_ALL => instance.get_attributes_all()?,
        SERVICE_GET_ATTRIBUTE_SINGLE => {
            let attribute = target
                .attribute
                .ok_or_else(|| CipError::service(status::STATUS_PATH_SEGMENT_ERROR, "missing attribute segment"))?;
            instance.get_attribute_single(attribute)?
        }
        SERVICE_SET_ATTRIBUTE_SINGLE => {
            let attribute = target
                .attribute
                .ok_or_else(|| CipError::service(status::STATUS_PATH_SEGMENT_ERROR, "missing attribute segment"))?;
            instance.set_attribute_single(attribute, &request.data)?;
            Vec::new()
        }
        _ => unreachable!("filtered by dispatch_inner"),
    };

    Ok(ServiceResponse::ok(request.service, data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceConfig;
    use crate::object_model::CLASS_IDENTITY;

    #[tokio::test]
    async fn get_attribute_single_reads_identity_product_name() {
        let config = DeviceConfig::default();
        let registry = ClassRegistry::build(&config);
        let request = ServiceRequest {
            service: SERVICE_GET_ATTRIBUTE_SINGLE,
            path: EPath::class_instance_attribute(CLASS_IDENTITY as u32, 1, Some(7)),
            data: Vec::new(),
        };
        let response = dispatch(&registry, &config, request).await;
        assert_eq!(response.status, status::STATUS_SUCCESS);
        assert_eq!(response.service, SERVICE_GET_ATTRIBUTE_SINGLE | REPLY_FLAG);
    }

    #[tokio::test]
    async fn unsupported_service_yields_service_not_supported() {
        let config = DeviceConfig::default();
        let registry = ClassRegistry::build(&config);
        let request = ServiceRequest {
            service: 0x99,
            path: EPath::class_instance_attribute(CLASS_IDENTITY as u32, 1, None),
            data: Vec::new(),
        };
        let response = dispatch(&registry, &config, request).await;
        assert_eq!(response.status, status::STATUS_SERVICE_NOT_SUPPORTED);
    }
}
