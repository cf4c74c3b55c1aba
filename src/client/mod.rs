//! The pipelining client connector: session registration, request
//! pipelining with index-based correlation, Multiple Service Packet
//! aggregation, and the Proxy/Poller convenience layers built on top.

pub mod operation;
pub mod pipeline;
pub mod poller;
pub mod proxy;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::cip::{ServiceRequest, ServiceResponse};
use crate::codec::{self, CipValue, TypeTag};
use crate::enip::cpf::{CommonPacketFormat, ITEM_UNCONNECTED_DATA};
use crate::enip::identity::{IdentityObject, ServiceEntry};
use crate::enip::{Frame, RegisterSession, COMMAND_LIST_IDENTITY, COMMAND_LIST_SERVICES, COMMAND_SEND_RR_DATA};
use crate::epath::EPath;
use crate::error::{CipError, Result};

/// A live session with one ENIP/CIP device.
pub struct Connector {
    stream: TcpStream,
    session_handle: u32,
    next_context: u64,
}

impl Connector {
    pub async fn connect(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr).await.map_err(CipError::Io)?;
        {
            let sock_ref = socket2::SockRef::from(&stream);
            sock_ref.set_nodelay(true).map_err(CipError::Io)?;
            sock_ref.set_recv_buffer_size(64 * 1024).map_err(CipError::Io)?;
            sock_ref.set_send_buffer_size(64 * 1024).map_err(CipError::Io)?;
        }
        let mut connector = Connector {
            stream,
            session_handle: 0,
            next_context: 0,
        };
        connector.register_session().await?;
        Ok(connector)
    }

    async fn register_session(&mut self) -> Result<()> {
        let request = Frame::new(crate::enip::COMMAND_REGISTER_SESSION, 0, self.context(), RegisterSession::default().encode());
        self.write_frame(&request).await?;
        let reply = self.read_frame().await?;
        self.session_handle = reply.session_handle;
        Ok(())
    }

    fn context(&mut self) -> [u8; 8] {
        let idx = self.next_context;
        self.next_context += 1;
        let mut ctx = [0u8; 8];
        ctx[..8].copy_from_slice(&idx.to_le_bytes());
        ctx
    }

    pub(crate) async fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.stream.write_all(&frame.encode()).await.map_err(CipError::Io)
    }

    pub(crate) async fn read_frame(&mut self) -> Result<Frame> {
        let mut header = [0u8; 24];
        self.stream.read_exact(&mut header).await.map_err(CipError::Io)?;
        let length = u16::from_le_bytes([header[2], header[3]]) as usize;
        let mut payload = vec![0u8; length];
        if length > 0 {
            self.stream.read_exact(&mut payload).await.map_err(CipError::Io)?;
        }
        let mut full = header.to_vec();
        full.extend_from_slice(&payload);
        let (frame, _) = Frame::decode(&full)?;
        Ok(frame)
    }

    fn build_unconnected_send_frame(&mut self, request: &ServiceRequest) -> Frame {
        let mut path_bytes = Vec::new();
        crate::epath::encode(&request.path, &mut path_bytes);
        let mut embedded = vec![request.service, (path_bytes.len() / 2) as u8];
        embedded.extend_from_slice(&path_bytes);
        embedded.extend_from_slice(&request.data);

        let connection_manager_path = {
            let mut bytes = Vec::new();
            crate::epath::encode(&EPath::class_instance_attribute(0x06, 1, None), &mut bytes);
            bytes
        };
        let mut unconnected_send = vec![0x52u8, (connection_manager_path.len() / 2) as u8];
        unconnected_send.extend_from_slice(&connection_manager_path);
        unconnected_send.push(0x0A);
        unconnected_send.push(0x05);
        let mut padded = embedded.clone();
        unconnected_send.extend_from_slice(&(embedded.len() as u16).to_le_bytes());
        if padded.len() % 2 != 0 {
            padded.push(0);
        }
        unconnected_send.extend_from_slice(&padded);
        unconnected_send.push(0); // empty route_path
        unconnected_send.push(0);

        let cpf = CommonPacketFormat::unconnected(unconnected_send);
        let context = self.context();
        Frame::new(COMMAND_SEND_RR_DATA, self.session_handle, context, cpf.encode())
    }

    /// Send one CIP service request wrapped in an empty-route-path
    /// Unconnected-Send and return the decoded reply.
    pub async fn send_service(&mut self, request: &ServiceRequest) -> Result<ServiceResponse> {
        self.write_service_request(request).await?;
        self.read_service_response().await
    }

    /// Write half of `send_service`. Split out so the pipelining layer can
    /// keep several requests outstanding on the wire before reading back
    /// any of their replies.
    pub(crate) async fn write_service_request(&mut self, request: &ServiceRequest) -> Result<()> {
        let frame = self.build_unconnected_send_frame(request);
        self.write_frame(&frame).await
    }

    /// Read half of `send_service`: one reply frame, decoded into a
    /// `ServiceResponse`. Callers must read replies in the same order their
    /// requests were written — ENIP/CIP replies are strictly FIFO on one
    /// connection (§5).
    pub(crate) async fn read_service_response(&mut self) -> Result<ServiceResponse> {
        let reply = self.read_frame().await?;
        let reply_cpf = CommonPacketFormat::decode(&reply.payload)?;
        let data = reply_cpf
            .find(ITEM_UNCONNECTED_DATA)
            .ok_or_else(|| CipError::frame(0, "reply missing unconnected_data item"))?;
        parse_service_response(&data.data)
    }

    /// Reads `element_count` elements starting `byte_offset` bytes into the
    /// tag's backing buffer. `byte_offset == 0` uses the plain Read-Tag
    /// service; a non-zero offset switches to Read-Tag-Fragmented, which
    /// shares its service code with Unconnected-Send but is disambiguated
    /// server-side by `path` targeting a tag rather than the Connection
    /// Manager (`crate::cip::targets_connection_manager`).
    pub async fn read(&mut self, path: EPath, element_count: u16, byte_offset: usize) -> Result<Vec<CipValue>> {
        let mut data = Vec::new();
        codec::primitives::encode_uint(element_count, &mut data);
        let service = if byte_offset == 0 {
            crate::cip::SERVICE_READ_TAG
        } else {
            codec::primitives::encode_udint(byte_offset as u32, &mut data);
            crate::cip::SERVICE_READ_TAG_FRAGMENTED
        };
        let response = self.send_service(&ServiceRequest { service, path, data }).await?;
        decode_read_reply(&response.data, element_count as usize)
    }

    /// Writes `values` starting `byte_offset` bytes into the tag's backing
    /// buffer, via Write-Tag-Fragmented whenever the offset is non-zero so
    /// that earlier elements are left untouched.
    pub async fn write(&mut self, path: EPath, tag: TypeTag, values: &[CipValue], byte_offset: usize) -> Result<()> {
        let mut data = Vec::new();
        codec::primitives::encode_uint(tag.code(), &mut data);
        codec::primitives::encode_uint(values.len() as u16, &mut data);
        let service = if byte_offset == 0 {
            crate::cip::SERVICE_WRITE_TAG
        } else {
            codec::primitives::encode_udint(byte_offset as u32, &mut data);
            crate::cip::SERVICE_WRITE_TAG_FRAGMENTED
        };
        codec::array::encode_typed_data(tag, values, &mut data)?;
        self.send_service(&ServiceRequest { service, path, data }).await?;
        Ok(())
    }

    pub async fn get_attribute_single(&mut self, path: EPath) -> Result<Vec<u8>> {
        Ok(self
            .send_service(&ServiceRequest { service: crate::cip::SERVICE_GET_ATTRIBUTE_SINGLE, path, data: Vec::new() })
            .await?
            .data)
    }

    pub async fn set_attribute_single(&mut self, path: EPath, data: Vec<u8>) -> Result<()> {
        self.send_service(&ServiceRequest { service: crate::cip::SERVICE_SET_ATTRIBUTE_SINGLE, path, data })
            .await?;
        Ok(())
    }

    pub async fn get_attributes_all(&mut self, path: EPath) -> Result<Vec<u8>> {
        Ok(self
            .send_service(&ServiceRequest { service: crate::cip::SERVICE_GET_ATTRIBUTE_ALL, path, data: Vec::new() })
            .await?
            .data)
    }

    pub async fn list_identity(&mut self) -> Result<IdentityObject> {
        let context = self.context();
        let frame = Frame::new(COMMAND_LIST_IDENTITY, 0, context, Vec::new());
        self.write_frame(&frame).await?;
        let reply = self.read_frame().await?;
        let cpf = CommonPacketFormat::decode(&reply.payload)?;
        let item = cpf
            .find(crate::enip::cpf::ITEM_LIST_IDENTITY)
            .ok_or_else(|| CipError::frame(0, "ListIdentity reply missing identity item"))?;
        IdentityObject::decode(&item.data)
    }

    pub async fn list_services(&mut self) -> Result<ServiceEntry> {
        let context = self.context();
        let frame = Frame::new(COMMAND_LIST_SERVICES, 0, context, Vec::new());
        self.write_frame(&frame).await?;
        let reply = self.read_frame().await?;
        let cpf = CommonPacketFormat::decode(&reply.payload)?;
        let item = cpf
            .find(crate::enip::cpf::ITEM_LIST_SERVICES)
            .ok_or_else(|| CipError::frame(0, "ListServices reply missing service item"))?;
        Ok(ServiceEntry::decode(&item.data)?.0)
    }

    /// Returns each interface item's raw CPF payload; this device never
    /// advertises more than the one it's already connected over, so the
    /// reply is typically empty.
    pub async fn list_interfaces(&mut self) -> Result<Vec<Vec<u8>>> {
        let context = self.context();
        let frame = Frame::new(crate::enip::COMMAND_LIST_INTERFACES, 0, context, Vec::new());
        self.write_frame(&frame).await?;
        let reply = self.read_frame().await?;
        let cpf = CommonPacketFormat::decode(&reply.payload)?;
        Ok(cpf.items.into_iter().map(|item| item.data).collect())
    }

    /// Run one operation, wait for its reply, return. The degenerate case
    /// of `pipeline` with `depth == 1`.
    pub async fn synchronous(&mut self, operation: operation::Operation) -> pipeline::Outcome {
        pipeline::run(self, vec![operation], 1, 0).await.into_iter().next().expect("one operation yields one outcome")
    }

    /// Run `operations` with up to `depth` requests outstanding and
    /// optional Multiple Service Packet aggregation under `multiple`
    /// bytes; the top-level orchestrator named in the client design.
    pub async fn operate(&mut self, operations: Vec<operation::Operation>, depth: usize, multiple: usize) -> Vec<pipeline::Outcome> {
        pipeline::run(self, operations, depth, multiple).await
    }

    /// Up to `depth` requests kept outstanding at once, no aggregation.
    pub async fn pipeline(&mut self, operations: Vec<operation::Operation>, depth: usize) -> Vec<pipeline::Outcome> {
        pipeline::run(self, operations, depth, 0).await
    }
}

fn decode_read_reply(data: &[u8], element_count: usize) -> Result<Vec<CipValue>> {
    if data.len() < 2 {
        return Err(CipError::frame(0, "truncated read-tag reply"));
    }
    let type_code = u16::from_le_bytes([data[0], data[1]]);
    let tag = TypeTag::from_code(type_code)?;
    let (values, _) = codec::array::decode_typed_data(tag, element_count, &data[2..])?;
    Ok(values)
}

fn parse_service_response(bytes: &[u8]) -> Result<ServiceResponse> {
    if bytes.len() < 4 {
        return Err(CipError::frame(0, "truncated service reply"));
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
        return Err(CipError::Service {
            status,
            message: "device rejected request".to_string(),
            extended: extended_status.first().copied(),
        });
    }
    Ok(ServiceResponse { service, status, extended_status, data: bytes[offset..].to_vec() })
}
