//! Drive the cyclic poller against a live tag for a couple of cycles and
//! confirm it keeps reporting successful batches without ever invoking
//! the transport-failure callback.

use enip_cip::client::poller::{self, PollerConfig};
use enip_cip::client::proxy::Proxy;
use enip_cip::codec::TypeTag;
use enip_cip::config::{DeviceConfig, TagDef};
use enip_cip::server::Server;

#[tokio::test]
async fn poller_reports_successful_cycles_on_a_live_tag() {
    let mut config = DeviceConfig::default();
    config.tags.push(TagDef {
        name: "HEARTBEAT".to_string(),
        bound_class: None,
        bound_instance: None,
        bound_attribute: None,
        type_tag: TypeTag::Int,
        count: 1,
    });

    let server = Server::new(config);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let server_task = tokio::spawn(async move {
        let _ = server.serve_tcp(addr).await;
    });
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let mut proxy = Proxy::connect(&addr.to_string()).await.unwrap();

    let poller_config = PollerConfig {
        parameters: vec!["HEARTBEAT".to_string()],
        cycle: std::time::Duration::from_millis(10),
        max_backoff: std::time::Duration::from_secs(5),
        depth: 1,
        multiple_budget: 0,
    };

    let cycles = std::cell::Cell::new(0u32);
    let saw_failure = std::cell::Cell::new(false);
    poller::run(
        &mut proxy,
        &poller_config,
        |outcomes| {
            cycles.set(cycles.get() + 1);
            assert_eq!(outcomes.len(), 1);
            assert!(outcomes[0].result.is_ok());
        },
        |_error, _failures| saw_failure.set(true),
        || cycles.get() >= 3,
    )
    .await;

    assert!(cycles.get() >= 3);
    assert!(!saw_failure.get());

    server_task.abort();
}
