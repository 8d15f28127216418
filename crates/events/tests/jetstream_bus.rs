//! JetStream bus tests against a real NATS server.
//!
//! These tests start NATS in a container and need Docker. Run with:
//!
//! ```bash
//! cargo test -p events --test jetstream_bus -- --ignored
//! ```

use std::time::Duration;

use events::{EventBus, JetStreamBus};
use testcontainers::core::{IntoContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, GenericImage, ImageExt};

const SUBJECT: &str = "ordersvc.EventOrderCreated";

async fn start_nats() -> (ContainerAsync<GenericImage>, String) {
    let container = GenericImage::new("nats", "2.10")
        .with_exposed_port(4222.tcp())
        .with_wait_for(WaitFor::message_on_stderr(
            "Listening for client connections",
        ))
        .with_cmd(vec!["-js"])
        .start()
        .await
        .unwrap();
    let host = container.get_host().await.unwrap();
    let port = container.get_host_port_ipv4(4222).await.unwrap();
    (container, format!("nats://{host}:{port}"))
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn delivers_to_each_consumer_subject() {
    let (_container, url) = start_nats().await;
    let bus = JetStreamBus::connect(&url, "events-test").await.unwrap();

    let mut inventory = bus.subscribe(SUBJECT, "inventorysvc").await.unwrap();
    assert_eq!(inventory.subject(), "ordersvc.EventOrderCreated.inventorysvc");

    bus.publish(SUBJECT, b"{\"k\":1}".to_vec()).await.unwrap();

    let delivery = tokio::time::timeout(Duration::from_secs(5), inventory.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(delivery.subject, "ordersvc.EventOrderCreated.inventorysvc");
    assert_eq!(delivery.payload, b"{\"k\":1}");
    assert_eq!(delivery.attempt, 1);
    delivery.ack().await.unwrap();

    drop(inventory);
    bus.close().await.unwrap();
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn close_drains_the_connection() {
    let (_container, url) = start_nats().await;
    let bus = JetStreamBus::connect(&url, "events-test").await.unwrap();
    bus.publish(SUBJECT, b"{}".to_vec()).await.unwrap();

    bus.close().await.unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let attempt =
            tokio::time::timeout(Duration::from_secs(1), bus.publish(SUBJECT, b"{}".to_vec()))
                .await;
        if !matches!(attempt, Ok(Ok(()))) {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "connection still accepts publishes after close"
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
