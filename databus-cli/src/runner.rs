//! Command execution.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use tokio::signal;
use tokio::sync::mpsc;

use databus_common::{
    BusConfig, DataType, Direction, Error, Payload, TopicDescriptor, TransportOptions,
};
use databus_core::{DataBus, DriverRegistry, MemoryDriver, Message};
use databus_mqtt::MqttDriver;
use databus_opcua::OpcUaDriver;
use databus_zenoh::ZenohDriver;

use crate::args::{PublishArgs, SubscribeArgs};

/// Registry with every built-in transport.
pub fn registry(options: &TransportOptions) -> DriverRegistry {
    DriverRegistry::new()
        .with(MemoryDriver::new(options.clone()))
        .with(MqttDriver::new(options.clone()))
        .with(OpcUaDriver::new(options.clone()))
        .with(ZenohDriver::new(options.clone()))
}

fn require_direction(
    config: &BusConfig,
    expected: Direction,
    operation: &'static str,
) -> Result<()> {
    if config.context.direction != expected {
        return Err(Error::DirectionMismatch {
            direction: config.context.direction,
            operation,
        })
        .context(format!(
            "context '{}' must be declared with direction {}",
            config.context.name, expected
        ));
    }
    Ok(())
}

/// Build the payload for `message` according to `data_type`.
pub fn payload(message: &str, data_type: DataType) -> Result<Payload> {
    Ok(match data_type {
        DataType::String => Payload::Text(message.to_string()),
        DataType::Bytes => Payload::Bytes(message.as_bytes().to_vec()),
        DataType::Json => Payload::Json(
            serde_json::from_str(message).context("--message is not valid JSON")?,
        ),
    })
}

/// Topic descriptor for `name`, taking the declared type from the
/// configuration when the topic is listed there.
fn topic_for(config: &BusConfig, name: &str, fallback: DataType) -> TopicDescriptor {
    config
        .topics
        .iter()
        .find(|t| t.name == name)
        .cloned()
        .unwrap_or_else(|| TopicDescriptor::new(name, fallback))
}

/// One line of subscriber output.
pub fn render(message: &Message) -> String {
    let body = match &message.payload {
        Payload::Text(text) => text.clone(),
        Payload::Json(value) => value.to_string(),
        Payload::Bytes(bytes) => bytes
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect::<Vec<_>>()
            .join(" "),
    };
    format!(
        "{} {} {}",
        message.received_at.format("%H:%M:%S%.3f"),
        message.topic,
        body
    )
}

pub async fn publish(bus: &DataBus, config: &BusConfig, args: &PublishArgs) -> Result<()> {
    require_direction(config, Direction::Publisher, "publish")?;

    let topic = match args.data_type {
        Some(data_type) => TopicDescriptor::new(args.topic.as_str(), data_type),
        None => topic_for(config, &args.topic, DataType::String),
    };
    let payload = payload(&args.message, topic.data_type)?;
    let name = config.context.name.as_str();

    bus.context_create(config.context.clone())
        .await
        .with_context(|| format!("Failed to create context '{}'", name))?;

    let mut result = Ok(());
    for i in 0..args.count {
        if i > 0 {
            tokio::time::sleep(Duration::from_millis(args.interval_ms)).await;
        }
        if let Err(e) = bus.publish(name, &topic, payload.clone()).await {
            result = Err(e).with_context(|| format!("Failed to publish on '{}'", topic.name));
            break;
        }
        tracing::info!(topic = %topic.name, seq = i + 1, "Published");
    }

    bus.shutdown().await;
    result
}

pub async fn subscribe(bus: &DataBus, config: &BusConfig, args: &SubscribeArgs) -> Result<()> {
    require_direction(config, Direction::Subscriber, "subscribe")?;

    let topics: Vec<TopicDescriptor> = if args.topic.is_empty() {
        config.topics.clone()
    } else {
        args.topic
            .iter()
            .map(|name| topic_for(config, name, DataType::String))
            .collect()
    };
    if topics.is_empty() {
        bail!("no topics to subscribe to: pass --topic or list topics in the configuration");
    }

    let name = config.context.name.as_str();
    bus.context_create(config.context.clone())
        .await
        .with_context(|| format!("Failed to create context '{}'", name))?;

    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    for topic in &topics {
        let tx = tx.clone();
        let subscribed = bus
            .subscribe(name, topic, move |msg| {
                let _ = tx.send(msg);
            })
            .await;
        if let Err(e) = subscribed {
            bus.shutdown().await;
            return Err(e).with_context(|| format!("Failed to subscribe to '{}'", topic.name));
        }
        tracing::info!(topic = %topic.name, "Subscribed");
    }
    drop(tx);

    let mut received = 0u64;
    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                tracing::info!("Received Ctrl+C, shutting down");
                break;
            }
            message = rx.recv() => {
                let Some(message) = message else { break };
                println!("{}", render(&message));
                received += 1;
                if args.max_messages.is_some_and(|max| received >= max) {
                    break;
                }
            }
        }
    }

    bus.shutdown().await;
    tracing::info!(received, "Subscriber stopped");
    Ok(())
}

/// Print a summary of a validated configuration.
pub fn check(config: &BusConfig, registry: &DriverRegistry) -> Result<()> {
    let endpoint = config.context.validate()?;
    let driver = registry
        .resolve(endpoint.scheme())
        .with_context(|| format!("supported schemes: {}", registry.schemes().join(", ")))?;

    println!(
        "context   {} ({})",
        config.context.name, config.context.direction
    );
    println!("endpoint  {} via {}", endpoint, driver.name());
    for topic in &config.topics {
        println!("topic     {} [{}]", topic.name, topic.data_type.as_str());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::ConfigArgs;
    use databus_common::parse_config;

    fn config(direction: &str) -> BusConfig {
        parse_config(&format!(
            r#"{{
                context: {{ direction: "{}", name: "sm", endpoint: "mem://localhost:1883/" }},
                topics: [ {{ name: "sm/topic1", type: "json" }} ],
            }}"#,
            direction
        ))
        .unwrap()
    }

    fn publish_args(message: &str, data_type: Option<DataType>) -> PublishArgs {
        PublishArgs {
            config: ConfigArgs {
                config: None,
                endpoint: None,
            },
            topic: "sm/topic1".into(),
            data_type,
            message: message.into(),
            count: 2,
            interval_ms: 1,
        }
    }

    #[test]
    fn test_payload_types() {
        assert_eq!(payload("hi", DataType::String).unwrap(), Payload::Text("hi".into()));
        assert_eq!(payload("hi", DataType::Bytes).unwrap(), Payload::Bytes(b"hi".to_vec()));
        assert!(payload("{not json", DataType::Json).is_err());
    }

    #[test]
    fn test_render() {
        let msg = Message::new("sm/raw", Payload::Bytes(vec![0x0a, 0xff]));
        assert!(render(&msg).ends_with("sm/raw 0a ff"));
    }

    #[test]
    fn test_topic_type_from_config() {
        let config = config("SUB");
        assert_eq!(topic_for(&config, "sm/topic1", DataType::String).data_type, DataType::Json);
        assert_eq!(topic_for(&config, "other", DataType::Bytes).data_type, DataType::Bytes);
    }

    #[test]
    fn test_check_resolves_driver() {
        let config = config("PUB");
        let registry = registry(&config.transport);
        assert!(check(&config, &registry).is_ok());
    }

    #[tokio::test]
    async fn test_publish_over_memory() {
        let config = config("PUB");
        let bus = DataBus::new(registry(&config.transport));

        publish(&bus, &config, &publish_args("hello", Some(DataType::String)))
            .await
            .unwrap();
        assert!(bus.contexts().is_empty());
    }

    #[tokio::test]
    async fn test_publish_uses_configured_topic_type() {
        let config = config("PUB");
        let bus = DataBus::new(registry(&config.transport));

        // sm/topic1 is declared as json, so plain text is rejected up front.
        assert!(publish(&bus, &config, &publish_args("hello", None)).await.is_err());
        assert!(bus.contexts().is_empty());

        publish(&bus, &config, &publish_args(r#"{"rpm": 1200}"#, None))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_publish_needs_publisher_context() {
        let config = config("SUB");
        let bus = DataBus::new(registry(&config.transport));

        let err = publish(&bus, &config, &publish_args("hello", None))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::DirectionMismatch { .. })
        ));
        assert!(bus.contexts().is_empty());
    }
}
