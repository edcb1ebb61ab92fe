//! MQTT driver tests.
//!
//! The round-trip tests need a broker on `localhost:1883`
//! (e.g. `docker run -p 1883:1883 eclipse-mosquitto:2 mosquitto -c /mosquitto-no-auth.conf`)
//! and are ignored by default.

use std::time::{Duration, Instant};

use databus_common::{ContextDescriptor, ErrorKind, Payload, TopicDescriptor, TransportOptions};
use databus_core::{DataBus, DriverRegistry, Message};
use databus_mqtt::MqttDriver;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

fn bus(connect_timeout_ms: u64) -> DataBus {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("databus_mqtt=debug")
        .with_test_writer()
        .try_init();

    let options = TransportOptions {
        connect_timeout_ms,
        ..Default::default()
    };
    DataBus::new(DriverRegistry::new().with(MqttDriver::new(options)))
}

#[tokio::test]
async fn test_refused_connection_is_connect_failed() {
    // Grab a free port, then close it so nothing is listening.
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let bus = bus(2000);
    let err = bus
        .context_create(ContextDescriptor::publisher(
            "sm",
            format!("mqtt://127.0.0.1:{}/", port),
        ))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ConnectFailed);
    assert!(bus.contexts().is_empty());
}

#[tokio::test]
async fn test_silent_broker_times_out() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    // Accept and hold connections without ever answering CONNECT.
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    let bus = bus(300);
    let started = Instant::now();
    let err = bus
        .context_create(ContextDescriptor::subscriber(
            "listener",
            format!("mqtt://127.0.0.1:{}/", port),
        ))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ConnectFailed);
    assert!(started.elapsed() < Duration::from_secs(3));
}

#[tokio::test]
async fn test_mqtts_without_tls_settings_fails_before_connect() {
    let bus = bus(2000);
    let err = bus
        .context_create(ContextDescriptor::publisher("sm", "mqtts://localhost:8883/"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Config);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[ignore = "requires an MQTT broker on localhost:1883"]
async fn test_round_trip_through_broker() {
    let bus = bus(5000);
    bus.context_create(ContextDescriptor::subscriber("listener", "mqtt://localhost:1883/"))
        .await
        .unwrap();
    bus.context_create(ContextDescriptor::publisher("sm", "mqtt://localhost:1883/"))
        .await
        .unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let topic = TopicDescriptor::string("sm/topic1");
    bus.subscribe("listener", &topic, move |msg| {
        let _ = tx.send(msg);
    })
    .await
    .unwrap();

    bus.publish("sm", &topic, "hello").await.unwrap();

    let msg = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timeout waiting for message")
        .expect("channel closed");
    assert_eq!(msg.topic, "sm/topic1");
    assert_eq!(msg.payload, Payload::Text("hello".into()));

    let extra = tokio::time::timeout(Duration::from_millis(500), rx.recv()).await;
    assert!(extra.is_err(), "message delivered more than once");

    bus.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[ignore = "requires an MQTT broker on localhost:1883"]
async fn test_destroy_twice_through_context_handle() {
    let bus = bus(5000);
    let ctx = bus
        .context_create(ContextDescriptor::publisher("sm", "mqtt://localhost:1883/"))
        .await
        .unwrap();

    bus.context_destroy("sm").await.unwrap();
    ctx.destroy().await.unwrap();
    assert!(ctx.topics().await.is_empty());
}
