//! Unconnected-Send (service `0x52`) framing and the routing rule layered
//! on top of it (§4.5).
//!
//! ```text
//! priority_time_tick(1) + timeout_ticks(1)
//! message_request_size(2) + encapsulated request
//! route_path_size_words(1) + reserved(1) + route_path(EPATH)
//! ```
//!
//! The caller (`crate::cip::dispatch`) has already stripped the leading
//! service byte and the Connection Manager request_path; `data` starts at
//! `priority_time_tick`.

use super::route;
use super::status::{EXTENDED_NO_ROUTE, EXTENDED_ROUTE_PATH_REJECTED};
use crate::codec::primitives::{decode_uint, decode_usint};
use crate::automata::SliceSource;
use crate::config::{DeviceConfig, RoutePathPolicy};
use crate::epath::{self, EPath};
use crate::error::{CipError, Result};
use crate::object_model::ClassRegistry;

use super::{ServiceRequest, ServiceResponse};

pub async fn handle(registry: &ClassRegistry, config: &DeviceConfig, data: &[u8]) -> Result<ServiceResponse> {
    if data.len() < 4 {
        return Err(CipError::frame(0, "truncated Unconnected-Send header"));
    }
    let mut src = SliceSource::new(data);
    let _priority_time_tick = decode_usint(&mut src)?;
    let _timeout_ticks = decode_usint(&mut src)?;
    let message_request_size = decode_uint(&mut src)? as usize;

    let encapsulated = data
        .get(4..4 + message_request_size)
        .ok_or_else(|| CipError::frame(4, "truncated embedded Unconnected-Send request"))?;

    let mut offset = 4 + message_request_size;
    if offset % 2 != 0 {
        offset += 1; // embedded request is padded to an even boundary
    }

    let route_path_words = *data
        .get(offset)
        .ok_or_else(|| CipError::frame(offset, "truncated route_path_size_words"))?;
    offset += 2; // word count byte + one reserved byte

    let route_path_bytes = route_path_words as usize * 2;
    let route_path_slice = data
        .get(offset..offset + route_path_bytes)
        .ok_or_else(|| CipError::frame(offset, "truncated route_path"))?;
    let (route_path, _) = epath::parse(route_path_slice)?;

    // If a Route table is configured and the leading segment matches, the
    // request is forwarded downstream with that segment popped.
    if !config.ucmm.route.is_empty() {
        if let Some(entry) = route::match_entry(&config.ucmm.route, &route_path) {
            let (_, remaining) = route_path.pop_front().expect("matched a non-empty route_path");
            return route::forward(entry, remaining, encapsulated).await;
        }
        return Err(routing_error(EXTENDED_NO_ROUTE, "no Route table entry matches route_path"));
    }

    // No Route table: accept locally per the configured Route Path policy.
    match &config.ucmm.route_path {
        RoutePathPolicy::Any => {}
        RoutePathPolicy::EmptyOnly => {
            if !route_path.is_empty() {
                return Err(routing_error(EXTENDED_ROUTE_PATH_REJECTED, "Route Path = false rejects non-empty route_path"));
            }
        }
        RoutePathPolicy::Exact(expected) => {
            if &route_path != expected {
                return Err(routing_error(EXTENDED_ROUTE_PATH_REJECTED, "route_path does not match configured Route Path"));
            }
        }
    }

    dispatch_embedded(registry, config, encapsulated).await
}

fn routing_error(extended: u16, message: &str) -> CipError {
    CipError::Service {
        status: crate::error::STATUS_CONNECTION_FAILURE,
        message: message.to_string(),
        extended: Some(extended),
    }
}

/// Parse and dispatch the embedded (post Unconnected-Send) request: one
/// service byte, an EPATH (size in words then the path itself), then
/// service-specific data.
pub async fn dispatch_embedded(registry: &ClassRegistry, config: &DeviceConfig, bytes: &[u8]) -> Result<ServiceResponse> {
    if bytes.is_empty() {
        return Err(CipError::frame(0, "empty embedded request"));
    }
    let service = bytes[0];
    let path_size_words = *bytes
        .get(1)
        .ok_or_else(|| CipError::frame(1, "truncated embedded request path size"))? as usize;
    let path_bytes_len = path_size_words * 2;
    let path_bytes = bytes
        .get(2..2 + path_bytes_len)
        .ok_or_else(|| CipError::frame(2, "truncated embedded request path"))?;
    let (path, _) = epath::parse(path_bytes)?;
    let data = bytes[2 + path_bytes_len..].to_vec();

    let request = ServiceRequest { service, path, data };
    Ok(super::dispatch(registry, config, request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_model::CLASS_IDENTITY;

    fn build_unconnected_send(embedded: &[u8], route_path: &EPath) -> Vec<u8> {
        let mut out = Vec::new();
        out.push(0x0A); // priority/tick
        out.push(0x05); // timeout ticks
        let mut embedded_padded = embedded.to_vec();
        if embedded_padded.len() % 2 != 0 {
            embedded_padded.push(0);
        }
        crate::codec::primitives::encode_uint(embedded.len() as u16, &mut out);
        out.extend_from_slice(&embedded_padded);
        let mut route_bytes = Vec::new();
        epath::encode(route_path, &mut route_bytes);
        out.push((route_bytes.len() / 2) as u8);
        out.push(0); // reserved
        out.extend_from_slice(&route_bytes);
        out
    }

    #[tokio::test]
    async fn empty_route_path_accepted_when_policy_is_any() {
        let config = DeviceConfig::default();
        let registry = ClassRegistry::build(&config);

        let mut embedded = vec![super::super::SERVICE_GET_ATTRIBUTE_SINGLE];
        let mut path_bytes = Vec::new();
        epath::encode(&EPath::class_instance_attribute(CLASS_IDENTITY as u32, 1, Some(7)), &mut path_bytes);
        embedded.push((path_bytes.len() / 2) as u8);
        embedded.extend_from_slice(&path_bytes);

        let data = build_unconnected_send(&embedded, &EPath::default());
        let response = handle(&registry, &config, &data).await.unwrap();
        assert_eq!(response.status, crate::error::STATUS_SUCCESS);
    }
}
