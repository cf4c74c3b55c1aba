//! Send a ListIdentity datagram to the UDP listener and confirm the
//! identity reply matches the configured identity section.

use enip_cip::config::DeviceConfig;
use enip_cip::enip::cpf::{CommonPacketFormat, ITEM_LIST_IDENTITY};
use enip_cip::enip::identity::IdentityObject;
use enip_cip::enip::{Frame, COMMAND_LIST_IDENTITY};
use enip_cip::server::Server;
use tokio::net::UdpSocket;

#[tokio::test]
async fn udp_list_identity_reports_configured_identity() {
    let config = DeviceConfig::default();
    let expected_product_name = config.identity.product_name.clone();
    let expected_serial = config.identity.serial_number;

    let server = Server::new(config);
    let bind_probe = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = bind_probe.local_addr().unwrap();
    drop(bind_probe);

    let server_task = tokio::spawn(async move {
        let _ = server.serve_udp(addr).await;
    });
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let request = Frame::new(COMMAND_LIST_IDENTITY, 0, [9; 8], Vec::new());
    client.send_to(&request.encode(), addr).await.unwrap();

    let mut buffer = [0u8; 4096];
    let (n, _) = tokio::time::timeout(std::time::Duration::from_secs(2), client.recv_from(&mut buffer))
        .await
        .expect("no ListIdentity reply within timeout")
        .unwrap();

    let (reply, _) = Frame::decode(&buffer[..n]).unwrap();
    assert_eq!(reply.sender_context, [9; 8]);
    let cpf = CommonPacketFormat::decode(&reply.payload).unwrap();
    let item = cpf.find(ITEM_LIST_IDENTITY).unwrap();
    let identity = IdentityObject::decode(&item.data).unwrap();
    assert_eq!(identity.product_name, expected_product_name);
    assert_eq!(identity.serial_number, expected_serial);

    server_task.abort();
}
