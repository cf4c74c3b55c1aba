//! Two-hop routing: matching a route_path's leading segment against the
//! configured `[UCMM] Route` table and forwarding the request downstream.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use super::{ServiceResponse, SERVICE_UNCONNECTED_SEND};
use crate::config::RouteEntry;
use crate::enip::cpf::{CommonPacketFormat, ITEM_UNCONNECTED_DATA};
use crate::enip::{Frame, RegisterSession, COMMAND_REGISTER_SESSION, COMMAND_SEND_RR_DATA};
use crate::epath::{self, EPath, Link, Segment};
use crate::error::{CipError, Result};

pub fn match_entry<'a>(table: &'a [RouteEntry], route_path: &EPath) -> Option<&'a RouteEntry> {
    let (first, _) = route_path.pop_front()?;
    let Segment::Port { port, link } = first else {
        return None;
    };
    let link_value = match link {
        Link::Number(n) => n,
        Link::Address(addr) => addr
            .split('.')
            .map(|o| o.parse::<u32>().unwrap_or(0))
            .fold(0u32, |acc, o| (acc << 8) | o),
    };
    table.iter().find(|entry| entry.matches(port, link_value))
}

/// Forward `encapsulated_request` to `entry.downstream`, wrapped in a fresh
/// Unconnected-Send carrying `remaining_route_path` if it is non-empty, or
/// re-framed as a bare ("Simple") request if the trimmed route_path emptied
/// out. Opens a short-lived session: register, send, await reply, close.
pub async fn forward(entry: &RouteEntry, remaining_route_path: EPath, encapsulated_request: &[u8]) -> Result<ServiceResponse> {
    let mut stream = TcpStream::connect(&entry.downstream)
        .await
        .map_err(CipError::Io)?;

    let register = Frame::new(COMMAND_REGISTER_SESSION, 0, [0; 8], RegisterSession::default().encode());
    write_frame(&mut stream, &register).await?;
    let register_reply = read_frame(&mut stream).await?;
    let session_handle = register_reply.session_handle;

    let payload = if remaining_route_path.is_empty() {
        encapsulated_request.to_vec()
    } else {
        build_unconnected_send(&remaining_route_path, encapsulated_request)
    };
    let cpf = CommonPacketFormat::unconnected(payload);
    let request_frame = Frame::new(COMMAND_SEND_RR_DATA, session_handle, [0; 8], cpf.encode());
    write_frame(&mut stream, &request_frame).await?;

    let reply_frame = read_frame(&mut stream).await?;
    let reply_cpf = CommonPacketFormat::decode(&reply_frame.payload)?;
    let data = reply_cpf
        .find(ITEM_UNCONNECTED_DATA)
        .ok_or_else(|| CipError::frame(0, "downstream reply missing unconnected_data item"))?;

    parse_service_response(&data.data)
}

fn build_unconnected_send(route_path: &EPath, encapsulated_request: &[u8]) -> Vec<u8> {
    let mut connection_manager_path = Vec::new();
    epath::encode(&EPath::class_instance_attribute(0x06, 1, None), &mut connection_manager_path);

    let mut out = vec![SERVICE_UNCONNECTED_SEND, (connection_manager_path.len() / 2) as u8];
    out.extend_from_slice(&connection_manager_path);
    out.push(0x0A);
    out.push(0x05);
    let mut embedded = encapsulated_request.to_vec();
    out.extend_from_slice(&(embedded.len() as u16).to_le_bytes());
    if embedded.len() % 2 != 0 {
        embedded.push(0);
    }
    out.extend_from_slice(&embedded);
    let mut route_bytes = Vec::new();
    epath::encode(route_path, &mut route_bytes);
    out.push((route_bytes.len() / 2) as u8);
    out.push(0);
    out.extend_from_slice(&route_bytes);
    out
}

fn parse_service_response(bytes: &[u8]) -> Result<ServiceResponse> {
    if bytes.len() < 4 {
        return Err(CipError::frame(0, "truncated downstream service reply"));
    }
    let service = bytes[0];
    let status = bytes[2];
    let extended_count = bytes[3] as usize;
    let mut extended_status = Vec::with_capacity(extended_count);
    let mut offset = 4;
    for _ in 0..extended_count {
        let word = bytes
            .get(offset..offset + 2)
            .ok_or_else(|| CipError::frame(offset, "truncated extended status"))?;
        extended_status.push(u16::from_le_bytes([word[0], word[1]]));
        offset += 2;
    }
    Ok(ServiceResponse {
        service,
        status,
        extended_status,
        data: bytes[offset..].to_vec(),
    })
}

async fn write_frame(stream: &mut TcpStream, frame: &Frame) -> Result<()> {
    stream.write_all(&frame.encode()).await.map_err(CipError::Io)
}

async fn read_frame(stream: &mut TcpStream) -> Result<Frame> {
    let mut header = [0u8; 24];
    stream.read_exact(&mut header).await.map_err(CipError::Io)?;
    let length = u16::from_le_bytes([header[2], header[3]]) as usize;
    let mut payload = vec![0u8; length];
    if length > 0 {
        stream.read_exact(&mut payload).await.map_err(CipError::Io)?;
    }
    let mut full = header.to_vec();
    full.extend_from_slice(&payload);
    let (frame, _) = Frame::decode(&full)?;
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RouteEntry;

    #[test]
    fn matches_leading_port_link_segment() {
        let table = vec![RouteEntry {
            port: 1,
            link_low: 0,
            link_high: 10,
            downstream: "10.0.0.5:44818".to_string(),
        }];
        let path = EPath(vec![Segment::Port { port: 1, link: Link::Number(5) }]);
        assert!(match_entry(&table, &path).is_some());
    }

    #[test]
    fn non_port_leading_segment_does_not_match() {
        let table = vec![RouteEntry {
            port: 1,
            link_low: 0,
            link_high: 10,
            downstream: "10.0.0.5:44818".to_string(),
        }];
        let path = EPath(vec![Segment::Class(1)]);
        assert!(match_entry(&table, &path).is_none());
    }
}
