//! End-to-end tests for the facade over the in-process transport.

use std::time::Duration;

use databus_common::{
    ContextDescriptor, DataType, Direction, ErrorKind, Format, Payload, TopicDescriptor,
    TransportOptions,
};
use databus_core::{ContextState, DataBus, DriverRegistry, MemoryDriver, Message};
use tokio::sync::mpsc;

const ENDPOINT: &str = "mem://localhost:1883/";

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("databus_core=debug")
        .with_test_writer()
        .try_init();
}

fn bus_with(options: TransportOptions) -> DataBus {
    init_logging();
    DataBus::new(DriverRegistry::new().with(MemoryDriver::new(options)))
}

fn bus() -> DataBus {
    bus_with(TransportOptions::default())
}

fn collector() -> (
    impl Fn(Message) + Send + Sync + 'static,
    mpsc::UnboundedReceiver<Message>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        move |msg| {
            let _ = tx.send(msg);
        },
        rx,
    )
}

async fn next(rx: &mut mpsc::UnboundedReceiver<Message>) -> Message {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timeout waiting for message")
        .expect("channel closed")
}

async fn assert_silent(rx: &mut mpsc::UnboundedReceiver<Message>) {
    let extra = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;
    assert!(extra.is_err(), "unexpected message: {:?}", extra);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_publish_reaches_subscriber_exactly_once() {
    let bus = bus();
    bus.context_create(ContextDescriptor::subscriber("listener", ENDPOINT))
        .await
        .unwrap();
    bus.context_create(ContextDescriptor::publisher("sm", ENDPOINT))
        .await
        .unwrap();

    let topic = TopicDescriptor::string("sm/topic1");
    let (handler, mut rx) = collector();
    bus.subscribe("listener", &topic, handler).await.unwrap();

    bus.publish("sm", &topic, "hello").await.unwrap();

    let msg = next(&mut rx).await;
    assert_eq!(msg.topic, "sm/topic1");
    assert_eq!(msg.payload, Payload::Text("hello".into()));
    assert_silent(&mut rx).await;

    bus.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_bytes_are_preserved_exactly() {
    let bus = bus();
    bus.context_create(ContextDescriptor::subscriber("sub", ENDPOINT))
        .await
        .unwrap();
    bus.context_create(ContextDescriptor::publisher("pub", ENDPOINT))
        .await
        .unwrap();

    let topic = TopicDescriptor::bytes("raw/frame");
    let (handler, mut rx) = collector();
    bus.subscribe("sub", &topic, handler).await.unwrap();

    let data: Vec<u8> = (0..=255).collect();
    bus.publish("pub", &topic, data.clone()).await.unwrap();

    assert_eq!(next(&mut rx).await.payload, Payload::Bytes(data));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_json_payload_over_cbor() {
    let bus = bus_with(TransportOptions {
        serialization: Format::Cbor,
        ..Default::default()
    });
    bus.context_create(ContextDescriptor::subscriber("sub", ENDPOINT))
        .await
        .unwrap();
    bus.context_create(ContextDescriptor::publisher("pub", ENDPOINT))
        .await
        .unwrap();

    let value = serde_json::json!({ "speed": 42, "unit": "rpm" });
    let (handler, mut rx) = collector();
    bus.subscribe("sub", &TopicDescriptor::json("line1/+/speed"), handler)
        .await
        .unwrap();

    bus.publish("pub", &TopicDescriptor::json("line1/motor3/speed"), value.clone())
        .await
        .unwrap();

    let msg = next(&mut rx).await;
    assert_eq!(msg.topic, "line1/motor3/speed");
    assert_eq!(msg.payload, Payload::Json(value));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_json_scalars_over_cbor_arrive_unchanged() {
    let bus = bus_with(TransportOptions {
        serialization: Format::Cbor,
        ..Default::default()
    });
    bus.context_create(ContextDescriptor::subscriber("sub", ENDPOINT))
        .await
        .unwrap();
    bus.context_create(ContextDescriptor::publisher("pub", ENDPOINT))
        .await
        .unwrap();

    let topic = TopicDescriptor::json("plant/level");
    let (handler, mut rx) = collector();
    bus.subscribe("sub", &topic, handler).await.unwrap();

    let values = [
        serde_json::json!(-20),
        serde_json::json!(-17),
        serde_json::json!(-3),
        serde_json::json!(-14),
        serde_json::json!("sixchr"),
        serde_json::json!("fourteen chars"),
    ];
    for value in &values {
        bus.publish("pub", &topic, value.clone()).await.unwrap();
    }

    for value in values {
        assert_eq!(next(&mut rx).await.payload, Payload::Json(value));
    }

    bus.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_topics_do_not_block_each_other() {
    let bus = bus();
    bus.context_create(ContextDescriptor::subscriber("sub", ENDPOINT))
        .await
        .unwrap();
    bus.context_create(ContextDescriptor::publisher("sm", ENDPOINT))
        .await
        .unwrap();

    // topic1's handler blocks until released.
    let (gate_tx, gate_rx) = std::sync::mpsc::channel::<()>();
    let gate_rx = std::sync::Mutex::new(gate_rx);
    let (slow_tx, mut slow_rx) = mpsc::unbounded_channel();
    bus.subscribe("sub", &TopicDescriptor::string("sm/topic1"), move |msg| {
        let _ = gate_rx.lock().unwrap().recv();
        let _ = slow_tx.send(msg);
    })
    .await
    .unwrap();

    let (handler, mut fast_rx) = collector();
    bus.subscribe("sub", &TopicDescriptor::string("sm/topic2"), handler)
        .await
        .unwrap();

    bus.publish("sm", &TopicDescriptor::string("sm/topic1"), "one")
        .await
        .unwrap();
    bus.publish("sm", &TopicDescriptor::string("sm/topic2"), "two")
        .await
        .unwrap();

    assert_eq!(next(&mut fast_rx).await.payload, Payload::Text("two".into()));

    gate_tx.send(()).unwrap();
    assert_eq!(next(&mut slow_rx).await.payload, Payload::Text("one".into()));
}

#[tokio::test]
async fn test_direction_is_enforced() {
    let bus = bus();
    bus.context_create(ContextDescriptor::publisher("pub", ENDPOINT))
        .await
        .unwrap();
    bus.context_create(ContextDescriptor::subscriber("sub", ENDPOINT))
        .await
        .unwrap();

    let topic = TopicDescriptor::string("sm/topic1");

    let err = bus.subscribe("pub", &topic, |_| {}).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DirectionMismatch);

    let err = bus.publish("sub", &topic, "hello").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DirectionMismatch);

    assert!(!bus.context("pub").unwrap().is_topic_active("sm/topic1").await);
    assert!(!bus.context("sub").unwrap().is_topic_active("sm/topic1").await);
}

#[tokio::test]
async fn test_create_then_destroy_leaves_no_bindings() {
    let bus = bus();
    let ctx = bus
        .context_create(ContextDescriptor::subscriber("sub", ENDPOINT))
        .await
        .unwrap();
    assert_eq!(ctx.state().await, ContextState::Connected);

    bus.subscribe("sub", &TopicDescriptor::string("a"), |_| {})
        .await
        .unwrap();
    bus.subscribe("sub", &TopicDescriptor::string("b/#"), |_| {})
        .await
        .unwrap();
    assert_eq!(ctx.state().await, ContextState::TopicActive);
    assert_eq!(ctx.topics().await.len(), 2);

    bus.context_destroy("sub").await.unwrap();

    assert_eq!(ctx.state().await, ContextState::Destroyed);
    assert!(ctx.topics().await.is_empty());

    // A held handle stays destroyed; destroying it again is harmless.
    ctx.destroy().await.unwrap();
    let err = ctx
        .start_topic(&TopicDescriptor::string("a"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ContextDestroyed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_topic_ends_delivery() {
    let bus = bus();
    bus.context_create(ContextDescriptor::subscriber("sub", ENDPOINT))
        .await
        .unwrap();
    bus.context_create(ContextDescriptor::publisher("pub", ENDPOINT))
        .await
        .unwrap();

    let topic = TopicDescriptor::string("sm/topic1");
    let (handler, mut rx) = collector();
    bus.subscribe("sub", &topic, handler).await.unwrap();

    bus.publish("pub", &topic, "first").await.unwrap();
    assert_eq!(next(&mut rx).await.payload, Payload::Text("first".into()));

    bus.stop_topic("sub", "sm/topic1").await.unwrap();
    bus.publish("pub", &topic, "second").await.unwrap();
    assert_silent(&mut rx).await;

    let err = bus.stop_topic("sub", "sm/topic1").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TopicUnbindFailed);
}

#[tokio::test]
async fn test_publish_without_subscribers_succeeds() {
    let bus = bus();
    let ctx = bus
        .context_create(ContextDescriptor::publisher("sm", ENDPOINT))
        .await
        .unwrap();

    bus.publish("sm", &TopicDescriptor::string("sm/topic1"), "hello")
        .await
        .unwrap();

    // Publishing binds the topic on first use.
    assert!(ctx.is_topic_active("sm/topic1").await);
    let binding = ctx.binding("sm/topic1").await.unwrap();
    assert_eq!(binding.direction(), Direction::Publisher);
    assert_eq!(binding.descriptor().data_type, DataType::String);
    assert!(!binding.has_handler());
}

#[tokio::test]
async fn test_subscriber_binding_holds_handler() {
    let bus = bus();
    let ctx = bus
        .context_create(ContextDescriptor::subscriber("sub", ENDPOINT))
        .await
        .unwrap();

    bus.subscribe("sub", &TopicDescriptor::json("sm/#"), |_| {})
        .await
        .unwrap();

    let binding = ctx.binding("sm/#").await.unwrap();
    assert_eq!(binding.direction(), Direction::Subscriber);
    assert!(binding.has_handler());
    assert!(ctx.binding("sm/other").await.is_none());
}

#[tokio::test]
async fn test_missing_port_is_bad_endpoint() {
    let bus = bus();
    let err = bus
        .context_create(ContextDescriptor::publisher("sm", "mem://localhost/"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::BadEndpoint);
    assert!(bus.contexts().is_empty());
}
