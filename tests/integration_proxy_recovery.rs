//! Drive a `Proxy` against a connection that completes the session
//! handshake and then goes silent, confirm the stalled read surfaces as
//! an `Io` error, and confirm `close_gateway` recovers once a real
//! device is listening at the same address again.

use enip_cip::client::proxy::Proxy;
use enip_cip::codec::{CipValue, TypeTag};
use enip_cip::config::{DeviceConfig, TagDef};
use enip_cip::enip::{Frame, RegisterSession, COMMAND_REGISTER_SESSION};
use enip_cip::error::CipError;
use enip_cip::server::Server;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Accepts exactly one connection, answers RegisterSession like a real
/// device, then drops the stream without answering anything else.
async fn run_flaky_listener(listener: TcpListener) {
    let (mut stream, _) = listener.accept().await.unwrap();

    let mut header = [0u8; 24];
    stream.read_exact(&mut header).await.unwrap();
    let length = u16::from_le_bytes([header[2], header[3]]) as usize;
    let mut payload = vec![0u8; length];
    if length > 0 {
        stream.read_exact(&mut payload).await.unwrap();
    }
    let mut full = header.to_vec();
    full.extend_from_slice(&payload);
    let (request, _) = Frame::decode(&full).unwrap();
    assert_eq!(request.command, COMMAND_REGISTER_SESSION);

    let reply = Frame::new(COMMAND_REGISTER_SESSION, 7, request.sender_context, RegisterSession::default().encode());
    stream.write_all(&reply.encode()).await.unwrap();
    // Drop the stream instead of ever answering the next request.
}

#[tokio::test]
async fn close_gateway_recovers_after_a_stalled_connection() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let flaky_task = tokio::spawn(run_flaky_listener(listener));

    let mut proxy = Proxy::connect(&addr.to_string()).await.unwrap();
    let tag = TagDef {
        name: "PING".to_string(),
        bound_class: None,
        bound_instance: None,
        bound_attribute: None,
        type_tag: TypeTag::Dint,
        count: 1,
    };
    proxy.register("PING", &tag);

    let failure = proxy.read("PING").await;
    assert!(matches!(failure, Err(CipError::Io(_))), "expected an Io error from the stalled connection, got {failure:?}");
    flaky_task.await.unwrap();

    let mut config = DeviceConfig::default();
    config.tags.push(tag.clone());
    let server = Server::new(config);
    let server_task = tokio::spawn(async move {
        let _ = server.serve_tcp(addr).await;
    });
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    proxy.close_gateway().await.unwrap();
    proxy.write("PING", CipValue::Dint(99)).await.unwrap();
    let value = proxy.read("PING").await.unwrap();
    assert_eq!(value, CipValue::Dint(99));

    server_task.abort();
}
