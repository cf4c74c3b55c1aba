//! Request pipelining: keep up to `depth` requests outstanding on one
//! connection instead of waiting for each reply before sending the next.
//!
//! `Connector::context` stamps a monotonic index into each frame's
//! sender_context, but ENIP/CIP request/reply pairs arrive strictly in
//! order over one TCP connection, so this module tracks outstanding
//! requests by simple FIFO position rather than building a waiting-map
//! correlator (see DESIGN.md). Genuine pipelining still happens at the
//! transport level: `run` writes up to `depth` requests ahead before it
//! reads back any of their replies.

use crate::cip::{ServiceRequest, ServiceResponse};
use crate::client::operation::{Method, Operation};
use crate::client::Connector;
use crate::codec::{self, CipValue, TypeTag};
use crate::epath::EPath;
use crate::error::{CipError, Result};

/// One operation's outcome, in original submission order.
pub struct Outcome {
    pub index: usize,
    pub operation: Operation,
    pub result: Result<Vec<CipValue>>,
}

/// Run `operations` against `connector`, keeping up to `depth` requests
/// outstanding at once. When `multiple_budget` is non-zero, consecutive
/// operations are batched into Multiple Service Packet requests as long
/// as the encoded batch stays under the byte budget.
pub async fn run(connector: &mut Connector, operations: Vec<Operation>, depth: usize, multiple_budget: usize) -> Vec<Outcome> {
    let depth = depth.max(1);
    let batches = batch_operations(&operations, multiple_budget);

    let mut outcomes = Vec::with_capacity(operations.len());
    let mut pos = 0;
    while pos < batches.len() {
        let end = (pos + depth).min(batches.len());
        outcomes.extend(send_window(connector, &operations, &batches[pos..end]).await);
        pos = end;
    }
    outcomes
}

/// Group operation indices into batches that fit under `multiple_budget`
/// encoded bytes. A budget of 0 disables aggregation (one operation per
/// batch).
fn batch_operations(operations: &[Operation], multiple_budget: usize) -> Vec<Vec<usize>> {
    if multiple_budget == 0 {
        return (0..operations.len()).map(|i| vec![i]).collect();
    }

    let mut batches = Vec::new();
    let mut current = Vec::new();
    let mut current_size = 2; // Multiple Service Packet count field

    for (index, operation) in operations.iter().enumerate() {
        let estimate = estimate_request_size(operation) + 2; // + offset table entry
        if !current.is_empty() && current_size + estimate > multiple_budget {
            batches.push(std::mem::take(&mut current));
            current_size = 2;
        }
        current.push(index);
        current_size += estimate;
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

fn estimate_request_size(operation: &Operation) -> usize {
    let mut path_bytes = Vec::new();
    crate::epath::encode(&operation.path, &mut path_bytes);
    4 + path_bytes.len() + operation.values.len() * 8
}

/// Issue every batch in `window` before awaiting any of their replies, then
/// drain replies back in the same order — up to `depth` requests genuinely
/// outstanding on the wire at once.
async fn send_window(connector: &mut Connector, operations: &[Operation], window: &[Vec<usize>]) -> Vec<Outcome> {
    let built: Vec<Result<ServiceRequest>> = window.iter().map(|batch| build_batch_request(operations, batch)).collect();

    // A write failure is session-fatal (the connection is now
    // desynchronized), so once one occurs every batch from that point on,
    // including the one that failed to write, never gets a reply to read.
    let mut broken_from = None;
    for (i, request) in built.iter().enumerate() {
        let Ok(request) = request else { continue }; // build errors never touch the wire
        if let Err(error) = connector.write_service_request(request).await {
            broken_from = Some((i, error));
            break;
        }
    }

    let mut outcomes = Vec::new();
    for (i, batch) in window.iter().enumerate() {
        let response = match &built[i] {
            Err(build_error) => Err(build_error.clone_for_batch()),
            Ok(_) => match &broken_from {
                Some((broken_at, error)) if i >= *broken_at => Err(error.clone_for_batch()),
                _ => connector.read_service_response().await,
            },
        };
        outcomes.extend(finish_batch(operations, batch, response));
    }
    outcomes
}

/// Build the one `ServiceRequest` a batch puts on the wire: the operation's
/// own request for a singleton batch, or a Multiple Service Packet
/// aggregating every operation in the batch.
fn build_batch_request(operations: &[Operation], batch: &[usize]) -> Result<ServiceRequest> {
    if batch.len() == 1 {
        return build_request(&operations[batch[0]]);
    }

    let mut sub_requests = Vec::new();
    for &index in batch {
        let request = build_request(&operations[index])?;
        let mut path_bytes = Vec::new();
        crate::epath::encode(&request.path, &mut path_bytes);
        let mut encoded = vec![request.service, (path_bytes.len() / 2) as u8];
        encoded.extend_from_slice(&path_bytes);
        encoded.extend_from_slice(&request.data);
        sub_requests.push(encoded);
    }

    let mut body = Vec::new();
    codec::primitives::encode_uint(sub_requests.len() as u16, &mut body);
    let mut offset = 2 + sub_requests.len() * 2;
    for sub in &sub_requests {
        codec::primitives::encode_uint(offset as u16, &mut body);
        offset += sub.len();
    }
    for sub in &sub_requests {
        body.extend_from_slice(sub);
    }

    let target_path = EPath::class_instance_attribute(crate::object_model::CLASS_MESSAGE_ROUTER, 1, None);
    Ok(ServiceRequest { service: crate::cip::SERVICE_MULTIPLE_SERVICE_PACKET, path: target_path, data: body })
}

/// Turn one batch's raw `ServiceResponse` (or transport/build failure) back
/// into per-operation outcomes, disaggregating a Multiple Service Packet
/// reply when the batch held more than one operation (§4.4 — a sub-request
/// failure never aborts its siblings).
fn finish_batch(operations: &[Operation], batch: &[usize], response: Result<ServiceResponse>) -> Vec<Outcome> {
    if batch.len() == 1 {
        let index = batch[0];
        let result = response.and_then(|r| decode_reply_values(&operations[index], &r));
        return vec![Outcome { index, operation: operations[index].clone(), result }];
    }

    let sub_results = match response.and_then(|r| parse_composite_reply(&r.data, batch.len())) {
        Ok(sub_results) => sub_results,
        Err(error) => {
            return batch
                .iter()
                .map(|&index| Outcome { index, operation: operations[index].clone(), result: Err(error.clone_for_batch()) })
                .collect()
        }
    };

    batch
        .iter()
        .zip(sub_results.into_iter())
        .map(|(&index, reply)| {
            let result = reply.and_then(|response| decode_reply_values(&operations[index], &response));
            Outcome { index, operation: operations[index].clone(), result }
        })
        .collect()
}

fn hex_string(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// `byte_offset = element_low * sizeof(type_tag)` — the offset a
/// Read/Write-Tag-Fragmented request carries into the tag's backing byte
/// buffer. Variable-length string types have no fixed stride to offset by.
fn byte_offset_for(element_low: usize, tag: TypeTag) -> Result<usize> {
    if element_low == 0 {
        return Ok(0);
    }
    let width = tag
        .fixed_width()
        .ok_or_else(|| CipError::Configuration(format!("element offset addressing is not supported for {tag:?} tags")))?;
    Ok(element_low * width)
}

fn build_request(operation: &Operation) -> Result<ServiceRequest> {
    let (service, data) = match operation.method {
        Method::Read => {
            // Request through element_high regardless of element_low — the
            // device's own Read-Tag reply carries the whole attribute body
            // irrespective of element_count, so the range is recovered by
            // slicing after decode in `decode_reply_values`.
            let mut data = Vec::new();
            codec::primitives::encode_uint((operation.element_high + 1) as u16, &mut data);
            (crate::cip::SERVICE_READ_TAG, data)
        }
        Method::Write => {
            let tag = operation.type_tag.ok_or_else(|| CipError::Configuration("write without a type".into()))?;
            let byte_offset = byte_offset_for(operation.element_low, tag)?;
            let mut data = Vec::new();
            codec::primitives::encode_uint(tag.code(), &mut data);
            codec::primitives::encode_uint(operation.values.len() as u16, &mut data);
            let service = if byte_offset == 0 {
                crate::cip::SERVICE_WRITE_TAG
            } else {
                codec::primitives::encode_udint(byte_offset as u32, &mut data);
                crate::cip::SERVICE_WRITE_TAG_FRAGMENTED
            };
            codec::array::encode_typed_data(tag, &operation.values, &mut data)?;
            (service, data)
        }
        Method::GetAttributeSingle => (crate::cip::SERVICE_GET_ATTRIBUTE_SINGLE, Vec::new()),
        Method::GetAttributesAll => (crate::cip::SERVICE_GET_ATTRIBUTE_ALL, Vec::new()),
        Method::SetAttributeSingle => {
            let mut data = Vec::new();
            if let Some(tag) = operation.type_tag {
                codec::array::encode_typed_data(tag, &operation.values, &mut data)?;
            }
            (crate::cip::SERVICE_SET_ATTRIBUTE_SINGLE, data)
        }
    };
    Ok(ServiceRequest { service, path: operation.path.clone(), data })
}

fn decode_reply_values(operation: &Operation, response: &ServiceResponse) -> Result<Vec<CipValue>> {
    match operation.method {
        Method::Read => {
            if response.data.len() < 2 {
                return Err(CipError::frame(0, "truncated read-tag reply"));
            }
            let type_code = u16::from_le_bytes([response.data[0], response.data[1]]);
            let tag = crate::codec::TypeTag::from_code(type_code)?;
            let (values, _) = codec::array::decode_typed_data(tag, operation.element_high + 1, &response.data[2..])?;
            values
                .get(operation.element_low..=operation.element_high)
                .map(|slice| slice.to_vec())
                .ok_or_else(|| CipError::frame(0, "read reply shorter than the requested element range"))
        }
        Method::GetAttributeSingle | Method::GetAttributesAll => Ok(vec![CipValue::Sstring(hex_string(&response.data))]),
        Method::Write | Method::SetAttributeSingle => Ok(Vec::new()),
    }
}

fn parse_composite_reply(data: &[u8], expected_count: usize) -> Result<Vec<Result<ServiceResponse>>> {
    if data.len() < 2 {
        return Err(CipError::frame(0, "truncated multiple service packet reply"));
    }
    let count = u16::from_le_bytes([data[0], data[1]]) as usize;
    if count != expected_count {
        return Err(CipError::frame(0, "multiple service packet reply count mismatch"));
    }
    let mut offsets = Vec::with_capacity(count);
    for i in 0..count {
        let start = 2 + i * 2;
        let bytes = data.get(start..start + 2).ok_or_else(|| CipError::frame(start, "truncated offset table"))?;
        offsets.push(u16::from_le_bytes([bytes[0], bytes[1]]) as usize);
    }

    let mut results = Vec::with_capacity(count);
    for i in 0..count {
        let start = offsets[i];
        let end = offsets.get(i + 1).copied().unwrap_or(data.len());
        let sub = data.get(start..end).ok_or_else(|| CipError::frame(start, "sub-reply offset out of range"))?;
        results.push(parse_sub_reply(sub));
    }
    Ok(results)
}

fn parse_sub_reply(bytes: &[u8]) -> Result<ServiceResponse> {
    if bytes.len() < 4 {
        return Err(CipError::frame(0, "truncated sub-reply"));
    }
    let service = bytes[0];
    let status = bytes[2];
    let extended_count = bytes[3] as usize;
    let mut extended_status = Vec::with_capacity(extended_count);
    let mut offset = 4;
    for _ in 0..extended_count {
        let word = bytes.get(offset..offset + 2).ok_or_else(|| CipError::frame(offset, "truncated extended status"))?;
        extended_status.push(u16::from_le_bytes([word[0], word[1]]));
        offset += 2;
    }
    if status != crate::error::STATUS_SUCCESS {
        return Err(CipError::Service { status, message: "sub-request rejected".to_string(), extended: extended_status.first().copied() });
    }
    Ok(ServiceResponse { service, status, extended_status, data: bytes[offset..].to_vec() })
}

impl CipError {
    /// Clone-ish helper for fanning one transport failure out across every
    /// operation in a batch; CipError itself is not Clone because some
    /// variants wrap an io::Error.
    fn clone_for_batch(&self) -> CipError {
        CipError::Configuration(format!("{self}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::operation;

    #[test]
    fn budget_of_zero_sends_one_operation_per_batch() {
        let ops = vec![operation::parse("SCADA").unwrap(), operation::parse("OTHER").unwrap()];
        let batches = batch_operations(&ops, 0);
        assert_eq!(batches, vec![vec![0], vec![1]]);
    }

    #[test]
    fn generous_budget_aggregates_into_one_batch() {
        let ops = vec![operation::parse("A").unwrap(), operation::parse("B").unwrap(), operation::parse("C").unwrap()];
        let batches = batch_operations(&ops, 4096);
        assert_eq!(batches, vec![vec![0, 1, 2]]);
    }

    #[test]
    fn tight_budget_splits_into_multiple_batches() {
        let ops = vec![operation::parse("A").unwrap(), operation::parse("B").unwrap(), operation::parse("C").unwrap()];
        let batches = batch_operations(&ops, 16);
        assert!(batches.len() > 1);
    }

    #[test]
    fn byte_offset_is_zero_at_element_zero() {
        assert_eq!(byte_offset_for(0, TypeTag::Dint).unwrap(), 0);
    }

    #[test]
    fn byte_offset_scales_by_type_width() {
        assert_eq!(byte_offset_for(3, TypeTag::Dint).unwrap(), 12);
        assert_eq!(byte_offset_for(3, TypeTag::Int).unwrap(), 6);
    }

    #[test]
    fn byte_offset_rejects_variable_length_types() {
        assert!(byte_offset_for(1, TypeTag::Sstring).is_err());
    }
}
