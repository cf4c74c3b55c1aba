//! Bring up a downstream device and a gateway device with a `[UCMM]
//! Route` table entry pointing at it, then drive the gateway with a raw
//! Unconnected-Send whose route_path names that entry's port/link and
//! confirm the request is forwarded and the downstream reply comes back
//! through the gateway unchanged.

use enip_cip::config::{DeviceConfig, RouteEntry, TagDef};
use enip_cip::codec::TypeTag;
use enip_cip::enip::cpf::{CommonPacketFormat, ITEM_UNCONNECTED_DATA};
use enip_cip::enip::{Frame, RegisterSession, COMMAND_REGISTER_SESSION, COMMAND_SEND_RR_DATA};
use enip_cip::epath::{self, EPath, Link, Segment};
use enip_cip::server::Server;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

async fn bind_ephemeral() -> std::net::SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

async fn write_frame(stream: &mut TcpStream, frame: &Frame) {
    stream.write_all(&frame.encode()).await.unwrap();
}

async fn read_frame(stream: &mut TcpStream) -> Frame {
    let mut header = [0u8; 24];
    stream.read_exact(&mut header).await.unwrap();
    let length = u16::from_le_bytes([header[2], header[3]]) as usize;
    let mut payload = vec![0u8; length];
    if length > 0 {
        stream.read_exact(&mut payload).await.unwrap();
    }
    let mut full = header.to_vec();
    full.extend_from_slice(&payload);
    Frame::decode(&full).unwrap().0
}

fn build_unconnected_send(embedded: &[u8], route_path: &EPath) -> Vec<u8> {
    let connection_manager_path = {
        let mut bytes = Vec::new();
        epath::encode(&EPath::class_instance_attribute(0x06, 1, None), &mut bytes);
        bytes
    };
    let mut out = vec![0x52u8, (connection_manager_path.len() / 2) as u8];
    out.extend_from_slice(&connection_manager_path);
    out.push(0x0A);
    out.push(0x05);
    let mut embedded_padded = embedded.to_vec();
    enip_cip::codec::primitives::encode_uint(embedded.len() as u16, &mut out);
    if embedded_padded.len() % 2 != 0 {
        embedded_padded.push(0);
    }
    out.extend_from_slice(&embedded_padded);
    let mut route_bytes = Vec::new();
    epath::encode(route_path, &mut route_bytes);
    out.push((route_bytes.len() / 2) as u8);
    out.push(0);
    out.extend_from_slice(&route_bytes);
    out
}

#[tokio::test]
async fn unconnected_send_forwards_across_a_route_table_entry() {
    let mut downstream_config = DeviceConfig::default();
    downstream_config.tags.push(TagDef {
        name: "FARSIDE".to_string(),
        bound_class: None,
        bound_instance: None,
        bound_attribute: None,
        type_tag: TypeTag::Dint,
        count: 1,
    });
    let downstream_addr = bind_ephemeral().await;
    let downstream_server = Server::new(downstream_config);
    let downstream_task = tokio::spawn(async move {
        let _ = downstream_server.serve_tcp(downstream_addr).await;
    });

    let mut gateway_config = DeviceConfig::default();
    gateway_config.ucmm.route.push(RouteEntry {
        port: 2,
        link_low: 5,
        link_high: 5,
        downstream: downstream_addr.to_string(),
    });
    let gateway_addr = bind_ephemeral().await;
    let gateway_server = Server::new(gateway_config);
    let gateway_task = tokio::spawn(async move {
        let _ = gateway_server.serve_tcp(gateway_addr).await;
    });

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let mut stream = TcpStream::connect(gateway_addr).await.unwrap();
    let register = Frame::new(COMMAND_REGISTER_SESSION, 0, [0; 8], RegisterSession::default().encode());
    write_frame(&mut stream, &register).await;
    let register_reply = read_frame(&mut stream).await;

    let mut embedded = vec![enip_cip::cip::SERVICE_WRITE_TAG];
    let mut path_bytes = Vec::new();
    epath::encode(&EPath(vec![Segment::Symbolic { name: "FARSIDE".to_string(), member: None }]), &mut path_bytes);
    embedded.push((path_bytes.len() / 2) as u8);
    embedded.extend_from_slice(&path_bytes);
    enip_cip::codec::primitives::encode_uint(TypeTag::Dint.code(), &mut embedded);
    enip_cip::codec::primitives::encode_uint(1, &mut embedded);
    enip_cip::codec::array::encode_typed_data(TypeTag::Dint, &[enip_cip::codec::CipValue::Dint(42)], &mut embedded).unwrap();

    let route_path = EPath(vec![Segment::Port { port: 2, link: Link::Number(5) }]);
    let data = build_unconnected_send(&embedded, &route_path);

    let cpf = CommonPacketFormat::unconnected(data);
    let request = Frame::new(COMMAND_SEND_RR_DATA, register_reply.session_handle, [1; 8], cpf.encode());
    write_frame(&mut stream, &request).await;

    let reply = read_frame(&mut stream).await;
    let reply_cpf = CommonPacketFormat::decode(&reply.payload).unwrap();
    let item = reply_cpf.find(ITEM_UNCONNECTED_DATA).unwrap();
    let status = item.data[2];
    assert_eq!(status, enip_cip::error::STATUS_SUCCESS, "downstream write should succeed through the gateway");

    gateway_task.abort();
    downstream_task.abort();
}
