//! Logix Read/Write-Tag [Fragmented] services.
//!
//! - Read-Tag (`0x4C`): request data is `element_count(2)`; reply is
//!   `type_tag(2) + element data`.
//! - Read-Tag-Fragmented (`0x52` against a tag target): same as Read-Tag
//!   plus a trailing `byte_offset(4)`, returning only the slice of element
//!   data starting at that offset, truncated to the fragment-size ceiling
//!   (`[UCMM] Fragment Size`, default ~500 bytes); a reply status of
//!   `STATUS_PARTIAL_TRANSFER` signals more data remains.
//! - Write-Tag (`0x4D`): request data is `type_tag(2) + element_count(2) +
//!   data`.
//! - Write-Tag-Fragmented (`0x53`): same plus a trailing `byte_offset(4)`
//!   indicating where `data` starts within the tag's backing buffer.

use super::status::{STATUS_INVALID_ATTRIBUTE_VALUE, STATUS_NOT_ENOUGH_DATA, STATUS_PARTIAL_TRANSFER, STATUS_SUCCESS};
use super::{resolve_target, ServiceRequest, ServiceResponse};
use crate::codec::primitives::{decode_uint, encode_uint};
use crate::codec::TypeTag;
use crate::automata::SliceSource;
use crate::error::{CipError, Result};
use crate::object_model::ClassRegistry;

const DEFAULT_FRAGMENT_SIZE: usize = 500;

pub async fn handle(registry: &ClassRegistry, request: &ServiceRequest) -> Result<ServiceResponse> {
    let target = resolve_target(registry, &request.path)?;
    let attribute_number = target
        .attribute
        .ok_or_else(|| CipError::service(STATUS_INVALID_ATTRIBUTE_VALUE, "tag path has no attribute segment"))?;
    let class = registry.class(target.class)?;
    let instance_handle = class.instance(target.instance)?;
    let mut instance = instance_handle.lock().await;
    let attribute = instance
        .attributes
        .get_mut(&attribute_number)
        .ok_or_else(|| CipError::service(STATUS_INVALID_ATTRIBUTE_VALUE, "no such tag attribute"))?;

    match request.service {
        super::SERVICE_READ_TAG => read_tag(attribute, &request.data, None),
        super::SERVICE_UNCONNECTED_SEND => read_tag(attribute, &request.data, Some(())), // fragmented, disambiguated by caller
        super::SERVICE_WRITE_TAG => write_tag(attribute, &request.data, None),
        super::SERVICE_WRITE_TAG_FRAGMENTED => write_tag(attribute, &request.data, Some(())),
        other => Err(CipError::service(crate::error::STATUS_SERVICE_NOT_SUPPORTED, format!("0x{other:02X} is not a tag service"))),
    }
}

fn read_tag(attribute: &mut crate::object_model::Attribute, data: &[u8], fragmented: Option<()>) -> Result<ServiceResponse> {
    if data.len() < 2 {
        return Err(CipError::service(STATUS_NOT_ENOUGH_DATA, "missing element_count"));
    }
    let mut src = SliceSource::new(data);
    let _element_count = decode_uint(&mut src)?;

    let byte_offset = if fragmented.is_some() {
        let word = data
            .get(2..6)
            .ok_or_else(|| CipError::service(STATUS_NOT_ENOUGH_DATA, "missing byte_offset"))?;
        u32::from_le_bytes([word[0], word[1], word[2], word[3]]) as usize
    } else {
        0
    };

    let body = attribute.read()?;
    let available = body.get(byte_offset..).unwrap_or(&[]);
    let (chunk, status) = if fragmented.is_some() && available.len() > DEFAULT_FRAGMENT_SIZE {
        (&available[..DEFAULT_FRAGMENT_SIZE], STATUS_PARTIAL_TRANSFER)
    } else {
        (available, STATUS_SUCCESS)
    };

    let mut reply_data = Vec::with_capacity(2 + chunk.len());
    encode_uint(attribute.codec.code(), &mut reply_data);
    reply_data.extend_from_slice(chunk);

    Ok(ServiceResponse {
        service: super::SERVICE_READ_TAG | super::REPLY_FLAG,
        status,
        extended_status: Vec::new(),
        data: reply_data,
    })
}

fn write_tag(attribute: &mut crate::object_model::Attribute, data: &[u8], fragmented: Option<()>) -> Result<ServiceResponse> {
    if data.len() < 4 {
        return Err(CipError::service(STATUS_NOT_ENOUGH_DATA, "missing type_tag/element_count"));
    }
    let mut src = SliceSource::new(data);
    let type_code = decode_uint(&mut src)?;
    let _element_count = decode_uint(&mut src)?;
    let incoming_tag = TypeTag::from_code(type_code)?;
    if incoming_tag != attribute.codec {
        return Err(CipError::service(STATUS_INVALID_ATTRIBUTE_VALUE, "write type tag does not match attribute"));
    }

    if fragmented.is_some() {
        let word = data
            .get(4..8)
            .ok_or_else(|| CipError::service(STATUS_NOT_ENOUGH_DATA, "missing byte_offset"))?;
        let byte_offset = u32::from_le_bytes([word[0], word[1], word[2], word[3]]) as usize;
        let payload = &data[8..];
        let mut buffer = attribute.data.clone();
        if byte_offset + payload.len() > buffer.len() {
            buffer.resize(byte_offset + payload.len(), 0);
        }
        buffer[byte_offset..byte_offset + payload.len()].copy_from_slice(payload);
        attribute.write(&buffer)?;
    } else {
        let payload = &data[4..];
        attribute.write(payload)?;
    }

    Ok(ServiceResponse::ok(super::SERVICE_WRITE_TAG, Vec::new()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DeviceConfig, TagDef};
    use crate::epath::EPath;

    fn config_with_tag() -> DeviceConfig {
        let mut config = DeviceConfig::default();
        config.tags.push(TagDef {
            name: "SCADA".to_string(),
            bound_class: None,
            bound_instance: None,
            bound_attribute: None,
            type_tag: TypeTag::Int,
            count: 10,
        });
        config
    }

    #[tokio::test]
    async fn write_then_read_round_trips_fragmented() {
        let config = config_with_tag();
        let registry = ClassRegistry::build(&config);
        let address = registry.tags.resolve("SCADA").unwrap();
        let path = EPath::class_instance_attribute(address.class as u32, address.instance, Some(address.attribute));

        let mut write_data = Vec::new();
        encode_uint(TypeTag::Int.code(), &mut write_data);
        encode_uint(1, &mut write_data);
        write_data.extend_from_slice(&42i16.to_le_bytes());

        let write_request = ServiceRequest {
            service: super::super::SERVICE_WRITE_TAG,
            path: path.clone(),
            data: write_data,
        };
        let write_response = handle(&registry, &write_request).await.unwrap();
        assert_eq!(write_response.status, STATUS_SUCCESS);

        let mut read_data = Vec::new();
        encode_uint(1, &mut read_data);
        let read_request = ServiceRequest {
            service: super::super::SERVICE_READ_TAG,
            path,
            data: read_data,
        };
        let read_response = handle(&registry, &read_request).await.unwrap();
        assert_eq!(read_response.status, STATUS_SUCCESS);
        assert_eq!(&read_response.data[2..4], &42i16.to_le_bytes());
    }
}
