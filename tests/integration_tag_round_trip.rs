//! Write a tag through the client, read it back, and confirm the value
//! survives the round trip through the server's tag namespace.

use enip_cip::client::Connector;
use enip_cip::codec::{CipValue, TypeTag};
use enip_cip::config::{DeviceConfig, TagDef};
use enip_cip::epath::{EPath, Segment};
use enip_cip::server::Server;

#[tokio::test]
async fn write_then_read_symbolic_tag() {
    let mut config = DeviceConfig::default();
    config.tags.push(TagDef {
        name: "SCADA".to_string(),
        bound_class: None,
        bound_instance: None,
        bound_attribute: None,
        type_tag: TypeTag::Dint,
        count: 4,
    });

    let server = Server::new(config);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let bound_addr = listener.local_addr().unwrap();
    drop(listener);

    let server_task = tokio::spawn(async move {
        let _ = server.serve_tcp(bound_addr).await;
    });
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let mut connector = Connector::connect(&bound_addr.to_string()).await.unwrap();

    let path = EPath(vec![Segment::Symbolic { name: "SCADA".to_string(), member: None }]);
    connector
        .write(path.clone(), TypeTag::Dint, &[CipValue::Dint(7), CipValue::Dint(8), CipValue::Dint(9), CipValue::Dint(10)], 0)
        .await
        .unwrap();

    let values = connector.read(path, 4, 0).await.unwrap();
    assert_eq!(values, vec![CipValue::Dint(7), CipValue::Dint(8), CipValue::Dint(9), CipValue::Dint(10)]);

    server_task.abort();
}

/// Writing at a non-zero element offset must only touch that element's
/// bytes, and reading back from the same offset must see exactly what was
/// written there — the element-addressing path Write/Read-Tag-Fragmented
/// exists for.
#[tokio::test]
async fn write_then_read_at_a_non_zero_element_offset() {
    let mut config = DeviceConfig::default();
    config.tags.push(TagDef {
        name: "SCADA".to_string(),
        bound_class: None,
        bound_instance: None,
        bound_attribute: None,
        type_tag: TypeTag::Dint,
        count: 11,
    });

    let server = Server::new(config);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let bound_addr = listener.local_addr().unwrap();
    drop(listener);

    let server_task = tokio::spawn(async move {
        let _ = server.serve_tcp(bound_addr).await;
    });
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let mut connector = Connector::connect(&bound_addr.to_string()).await.unwrap();
    let path = EPath(vec![Segment::Symbolic { name: "SCADA".to_string(), member: None }]);

    let element_width = TypeTag::Dint.fixed_width().unwrap();
    connector.write(path.clone(), TypeTag::Dint, &[CipValue::Dint(4)], 3 * element_width).await.unwrap();

    let values = connector.read(path, 11, 0).await.unwrap();
    assert_eq!(
        values,
        vec![
            CipValue::Dint(0),
            CipValue::Dint(0),
            CipValue::Dint(0),
            CipValue::Dint(4),
            CipValue::Dint(0),
            CipValue::Dint(0),
            CipValue::Dint(0),
            CipValue::Dint(0),
            CipValue::Dint(0),
            CipValue::Dint(0),
            CipValue::Dint(0),
        ]
    );

    server_task.abort();
}
