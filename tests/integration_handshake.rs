//! End-to-end smoke test: bring up the device simulator on a loopback
//! port, connect with the pipelining client, and confirm RegisterSession
//! and List-Services both complete.

use enip_cip::client::Connector;
use enip_cip::config::DeviceConfig;
use enip_cip::server::Server;

#[tokio::test]
async fn register_session_and_list_services_round_trip() {
    let server = Server::new(DeviceConfig::default());
    let listen_addr: std::net::SocketAddr = "127.0.0.1:0".parse().unwrap();
    let listener = tokio::net::TcpListener::bind(listen_addr).await.unwrap();
    let bound_addr = listener.local_addr().unwrap();
    drop(listener);

    let server_task = tokio::spawn(async move {
        let _ = server.serve_tcp(bound_addr).await;
    });

    // Give the listener a moment to rebind at the same address.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let mut connector = Connector::connect(&bound_addr.to_string()).await.unwrap();
    let entry = connector.list_services().await.unwrap();
    assert_eq!(entry.service_name, "Communications");

    server_task.abort();
}
