//! Exercise the pipelining client's Multiple Service Packet aggregation
//! path against several symbolic tags at once.

use enip_cip::client::operation;
use enip_cip::client::pipeline;
use enip_cip::client::Connector;
use enip_cip::config::{DeviceConfig, TagDef};
use enip_cip::codec::TypeTag;
use enip_cip::server::Server;

#[tokio::test]
async fn pipelined_reads_preserve_submission_order() {
    let mut config = DeviceConfig::default();
    for name in ["ALPHA", "BRAVO", "CHARLIE"] {
        config.tags.push(TagDef {
            name: name.to_string(),
            bound_class: None,
            bound_instance: None,
            bound_attribute: None,
            type_tag: TypeTag::Int,
            count: 1,
        });
    }

    let server = Server::new(config);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let bound_addr = listener.local_addr().unwrap();
    drop(listener);

    let server_task = tokio::spawn(async move {
        let _ = server.serve_tcp(bound_addr).await;
    });
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let mut connector = Connector::connect(&bound_addr.to_string()).await.unwrap();

    let operations = vec![
        operation::parse("ALPHA").unwrap(),
        operation::parse("BRAVO").unwrap(),
        operation::parse("CHARLIE").unwrap(),
    ];

    let outcomes = pipeline::run(&mut connector, operations, 2, 4096).await;
    assert_eq!(outcomes.len(), 3);
    for (expected_index, outcome) in outcomes.iter().enumerate() {
        assert_eq!(outcome.index, expected_index);
        assert!(outcome.result.is_ok(), "operation {expected_index} failed: {:?}", outcome.result);
    }

    server_task.abort();
}
