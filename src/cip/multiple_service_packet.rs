//! Multiple Service Packet (service `0x0A`): `count(2) + offsets[count](2
//! each) + sub-requests`, each sub-request itself a full
//! `service(1) + path_size(1) + path + data` record.
//!
//! Offsets are measured from the start of the `count` field. Sub-requests
//! are dispatched sequentially against the local object model; one
//! sub-request failing never aborts its siblings, and the composite reply
//! mirrors the request's offsets exactly.

use super::unconnected_send::dispatch_embedded;
use super::ServiceResponse;
use crate::codec::primitives::{decode_uint, encode_uint};
use crate::automata::SliceSource;
use crate::config::DeviceConfig;
use crate::error::{CipError, Result};
use crate::object_model::ClassRegistry;

use super::SERVICE_MULTIPLE_SERVICE_PACKET;

pub async fn handle(registry: &ClassRegistry, config: &DeviceConfig, data: &[u8]) -> Result<ServiceResponse> {
    if data.len() < 2 {
        return Err(CipError::frame(0, "truncated Multiple Service Packet count"));
    }
    let mut src = SliceSource::new(data);
    let count = decode_uint(&mut src)? as usize;

    let mut offsets = Vec::with_capacity(count);
    for i in 0..count {
        let slot = data
            .get(2 + i * 2..4 + i * 2)
            .ok_or_else(|| CipError::frame(2 + i * 2, "truncated Multiple Service Packet offset table"))?;
        offsets.push(u16::from_le_bytes([slot[0], slot[1]]) as usize);
    }

    let mut sub_responses = Vec::with_capacity(count);
    for (i, &offset) in offsets.iter().enumerate() {
        let end = offsets.get(i + 1).copied().unwrap_or(data.len());
        let sub_bytes = data
            .get(offset..end)
            .ok_or_else(|| CipError::frame(offset, "Multiple Service Packet offset out of range"))?;
        let response = dispatch_embedded(registry, config, sub_bytes)
            .await
            .unwrap_or_else(|error| ServiceResponse::from_error(sub_bytes.first().copied().unwrap_or(0), &error));
        sub_responses.push(response);
    }

    Ok(ServiceResponse::ok(SERVICE_MULTIPLE_SERVICE_PACKET, encode_composite_reply(&sub_responses)))
}

fn encode_composite_reply(responses: &[ServiceResponse]) -> Vec<u8> {
    let mut bodies = Vec::with_capacity(responses.len());
    for response in responses {
        let mut body = vec![response.service, 0, response.status, response.extended_status.len() as u8];
        for word in &response.extended_status {
            encode_uint(*word, &mut body);
        }
        body.extend_from_slice(&response.data);
        bodies.push(body);
    }

    let header_len = 2 + responses.len() * 2;
    let mut offsets = Vec::with_capacity(responses.len());
    let mut running = header_len;
    for body in &bodies {
        offsets.push(running);
        running += body.len();
    }

    let mut out = Vec::with_capacity(running);
    encode_uint(responses.len() as u16, &mut out);
    for offset in &offsets {
        encode_uint(*offset as u16, &mut out);
    }
    for body in &bodies {
        out.extend_from_slice(body);
    }
    out
}
