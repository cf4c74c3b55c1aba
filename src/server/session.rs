//! Per-connection handler: one Tokio task per accepted TCP connection,
//! running the ENIP parser/dispatch/respond loop strictly serialized (one
//! outstanding request at a time — Unconnected-Explicit session semantics).

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::cip::unconnected_send::dispatch_embedded;
use crate::config::DeviceConfig;
use crate::enip::cpf::{CommonPacketFormat, Item, ITEM_CONNECTED_DATA, ITEM_NULL_ADDRESS, ITEM_UNCONNECTED_DATA};
use crate::enip::identity::{IdentityObject, ServiceEntry};
use crate::enip::{
    Frame, RegisterSession, COMMAND_LIST_IDENTITY, COMMAND_LIST_INTERFACES, COMMAND_LIST_SERVICES, COMMAND_NOP,
    COMMAND_REGISTER_SESSION, COMMAND_SEND_RR_DATA, COMMAND_SEND_UNIT_DATA, COMMAND_UNREGISTER_SESSION,
};
use crate::error::{CipError, Result};
use crate::object_model::ClassRegistry;
use crate::server::introspection::{SessionState, SharedSnapshot};

static NEXT_SESSION_HANDLE: AtomicU32 = AtomicU32::new(1);

/// Drives one connection to completion: register, serve requests, tear
/// down on Unregister/EOF. Errors that reach this function's caller are
/// always I/O-level (frame errors are caught and turned into an
/// encapsulation status reply without dropping the connection, except
/// where the frame itself cannot even be delimited).
pub async fn run(
    mut stream: TcpStream,
    peer_addr: std::net::SocketAddr,
    registry: Arc<ClassRegistry>,
    config: Arc<DeviceConfig>,
    snapshot: SharedSnapshot,
) {
    let mut session_handle = 0u32;
    let mut buffer = Vec::new();

    loop {
        match read_frame(&mut stream, &mut buffer).await {
            Ok(Some(frame)) => {
                if frame.command == COMMAND_REGISTER_SESSION && session_handle == 0 {
                    session_handle = NEXT_SESSION_HANDLE.fetch_add(1, Ordering::Relaxed);
                    snapshot
                        .record_session(SessionState {
                            session_handle,
                            peer_addr: peer_addr.to_string(),
                            requests_served: 0,
                            enabled: true,
                        })
                        .await;
                }

                if frame.command == COMMAND_UNREGISTER_SESSION {
                    break;
                }

                let reply = handle_frame(&frame, session_handle, &registry, &config).await;
                if session_handle != 0 {
                    snapshot.bump_request_count(session_handle).await;
                }
                if let Some(reply) = reply {
                    if stream.write_all(&reply.encode()).await.is_err() {
                        break;
                    }
                }
            }
            Ok(None) => break, // EOF
            Err(error) => {
                tracing::warn!(%error, %peer_addr, "frame error, closing session");
                break;
            }
        }
    }

    if session_handle != 0 {
        snapshot.remove_session(session_handle).await;
    }
}

async fn handle_frame(frame: &Frame, session_handle: u32, registry: &ClassRegistry, config: &DeviceConfig) -> Option<Frame> {
    match frame.command {
        COMMAND_NOP => None, // legacy probe, no reply per Design Notes §9
        COMMAND_REGISTER_SESSION => {
            let request = RegisterSession::decode(&frame.payload).ok()?;
            Some(Frame {
                command: frame.command,
                session_handle,
                status: 0,
                sender_context: frame.sender_context,
                options: frame.options,
                payload: request.encode(),
            })
        }
        COMMAND_LIST_SERVICES | COMMAND_LIST_IDENTITY | COMMAND_LIST_INTERFACES => discovery_reply(frame, config),
        COMMAND_SEND_RR_DATA | COMMAND_SEND_UNIT_DATA => {
            Some(handle_send_data(frame, registry, config).await)
        }
        _ => Some(frame.reply(1, Vec::new())), // unrecognized command: nonzero encapsulation status
    }
}

/// Builds the reply for the three discovery commands that ENIP serves
/// datagram-per-request over UDP as well as within a registered TCP
/// session (§4.7): List-Services, List-Identity, List-Interfaces. Shared
/// by the TCP session loop and the UDP listener so both answer exactly
/// the same way.
pub(crate) fn discovery_reply(frame: &Frame, config: &DeviceConfig) -> Option<Frame> {
    match frame.command {
        COMMAND_LIST_SERVICES => {
            let entry = ServiceEntry {
                protocol_version: 1,
                // bit 0x20: supports CIP encapsulation; bit 0x100: supports
                // UDP-based class 0/1 (implicit) messaging.
                capability_flags: 0x0120,
                service_name: "Communications".to_string(),
            };
            let cpf = CommonPacketFormat::new(vec![Item::new(crate::enip::cpf::ITEM_LIST_SERVICES, entry.encode())]);
            Some(frame.reply(0, cpf.encode()))
        }
        COMMAND_LIST_IDENTITY => {
            let identity = IdentityObject {
                vendor_id: config.identity.vendor_number,
                device_type: config.identity.device_type,
                product_code: config.identity.product_code_number,
                revision_major: config.identity.product_revision.0,
                revision_minor: config.identity.product_revision.1,
                status: config.identity.status_word,
                serial_number: config.identity.serial_number,
                product_name: config.identity.product_name.clone(),
                state: config.identity.state,
            };
            let cpf = CommonPacketFormat::new(vec![Item::new(crate::enip::cpf::ITEM_LIST_IDENTITY, identity.encode())]);
            Some(frame.reply(0, cpf.encode()))
        }
        COMMAND_LIST_INTERFACES => {
            let cpf = CommonPacketFormat::new(Vec::new());
            Some(frame.reply(0, cpf.encode()))
        }
        _ => None,
    }
}

async fn handle_send_data(frame: &Frame, registry: &ClassRegistry, config: &DeviceConfig) -> Frame {
    match handle_send_data_inner(frame, registry, config).await {
        Ok(reply) => reply,
        Err(error) => {
            tracing::warn!(%error, "SendRRData frame error");
            frame.reply(1, Vec::new())
        }
    }
}

async fn handle_send_data_inner(frame: &Frame, registry: &ClassRegistry, config: &DeviceConfig) -> Result<Frame> {
    let cpf = CommonPacketFormat::decode(&frame.payload)?;
    let request_item = cpf
        .find(ITEM_UNCONNECTED_DATA)
        .or_else(|| cpf.find(ITEM_CONNECTED_DATA))
        .ok_or_else(|| CipError::frame(0, "SendRRData/SendUnitData missing a data item"))?;

    let response = dispatch_embedded(registry, config, &request_item.data).await?;
    let mut reply_data = vec![response.service, 0, response.status, response.extended_status.len() as u8];
    for word in &response.extended_status {
        reply_data.extend_from_slice(&word.to_le_bytes());
    }
    reply_data.extend_from_slice(&response.data);

    let reply_cpf = CommonPacketFormat::new(vec![
        Item::new(ITEM_NULL_ADDRESS, Vec::new()),
        Item::new(request_item.type_id, reply_data),
    ]);
    Ok(frame.reply(0, reply_cpf.encode()))
}

/// Read one encapsulation frame from `stream`, buffering partial reads.
/// Returns `Ok(None)` on a clean EOF before any bytes of the next frame
/// arrive.
async fn read_frame(stream: &mut TcpStream, buffer: &mut Vec<u8>) -> Result<Option<Frame>> {
    loop {
        if buffer.len() >= 4 {
            let declared_len = u16::from_le_bytes([buffer[2], buffer[3]]) as usize;
            if buffer.len() >= 24 + declared_len {
                let (frame, consumed) = Frame::decode(buffer)?;
                buffer.drain(..consumed);
                return Ok(Some(frame));
            }
        }
        let mut chunk = [0u8; 4096];
        let n = stream.read(&mut chunk).await.map_err(CipError::Io)?;
        if n == 0 {
            return Ok(None);
        }
        buffer.extend_from_slice(&chunk[..n]);
    }
}
