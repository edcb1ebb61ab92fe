//! MQTT transport driver.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, Outgoing, Packet, QoS, SubscribeReasonCode,
};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use databus_common::{
    ContextDescriptor, DataType, Direction, Endpoint, Error, Format, Payload, Result,
    TopicDescriptor, TransportOptions,
};
use databus_core::{
    Connection, MessageHandler, TopicRouter, TransportDriver, check_direction, check_payload,
};

use crate::options;

const ACCEPTED: &[DataType] = &[DataType::String, DataType::Bytes, DataType::Json];

/// Pause between polls after the event loop reports a connection error.
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

type SubAckWaiter = oneshot::Sender<std::result::Result<(), String>>;
type PendingSubAcks = Arc<Mutex<VecDeque<SubAckWaiter>>>;

/// Driver for `mqtt://` and `mqtts://` endpoints.
///
/// Both directions connect eagerly and wait for the broker's CONNACK, so an
/// unreachable broker fails `create_context` within the connect timeout.
/// Subscribers do their real work at `start_topic`, which waits for SUBACK.
#[derive(Debug, Clone, Default)]
pub struct MqttDriver {
    options: TransportOptions,
}

impl MqttDriver {
    pub fn new(options: TransportOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl TransportDriver for MqttDriver {
    fn name(&self) -> &'static str {
        "mqtt"
    }

    fn schemes(&self) -> &'static [&'static str] {
        options::SCHEMES
    }

    async fn create_context(
        &self,
        descriptor: &ContextDescriptor,
        endpoint: &Endpoint,
    ) -> Result<Box<dyn Connection>> {
        let qos = options::qos(self.options.mqtt.qos)?;
        let mqtt = options::build(descriptor, endpoint, &self.options)?;
        let (client, mut eventloop) = AsyncClient::new(mqtt, self.options.channel_capacity);

        debug!(
            context = %descriptor.name,
            endpoint = %endpoint,
            "Connecting to MQTT broker"
        );

        let timeout = self.options.connect_timeout();
        match tokio::time::timeout(timeout, wait_for_connack(&mut eventloop)).await {
            Ok(Ok(())) => {}
            Ok(Err(reason)) => return Err(Error::connect(endpoint.to_string(), reason)),
            Err(_) => {
                return Err(Error::connect(
                    endpoint.to_string(),
                    format!("no CONNACK within {:?}", timeout),
                ));
            }
        }

        info!(context = %descriptor.name, endpoint = %endpoint, "Connected to MQTT broker");

        let router = Arc::new(TopicRouter::new(
            self.options.channel_capacity,
            self.options.serialization,
        ));
        let pending: PendingSubAcks = Arc::new(Mutex::new(VecDeque::new()));
        let destroyed = Arc::new(AtomicBool::new(false));

        let task = tokio::spawn(run_event_loop(
            eventloop,
            router.clone(),
            pending.clone(),
            destroyed.clone(),
            descriptor.name.clone(),
        ));

        Ok(Box::new(MqttConnection {
            direction: descriptor.direction,
            client,
            qos,
            retain: self.options.mqtt.retain,
            format: self.options.serialization,
            send_timeout: self.options.send_timeout(),
            ack_timeout: timeout,
            router,
            pending,
            requests: tokio::sync::Mutex::new(()),
            event_loop: Mutex::new(Some(task)),
            destroyed,
        }))
    }
}

async fn wait_for_connack(eventloop: &mut EventLoop) -> std::result::Result<(), String> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                return if ack.code == ConnectReturnCode::Success {
                    Ok(())
                } else {
                    Err(format!("broker refused connection: {:?}", ack.code))
                };
            }
            Ok(_) => continue,
            Err(e) => return Err(e.to_string()),
        }
    }
}

async fn run_event_loop(
    mut eventloop: EventLoop,
    router: Arc<TopicRouter>,
    pending: PendingSubAcks,
    destroyed: Arc<AtomicBool>,
    context: String,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                trace!(topic = %publish.topic, bytes = publish.payload.len(), "MQTT message");
                router.dispatch(&publish.topic, &publish.payload);
            }
            Ok(Event::Incoming(Packet::SubAck(ack))) => {
                let result = if ack
                    .return_codes
                    .iter()
                    .any(|code| matches!(code, SubscribeReasonCode::Failure))
                {
                    Err("broker rejected subscription".to_string())
                } else {
                    Ok(())
                };
                if let Some(waiter) = pending.lock().pop_front() {
                    let _ = waiter.send(result);
                }
            }
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!(context = %context, "Reconnected to MQTT broker");
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                debug!(context = %context, "MQTT disconnect sent");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                for waiter in pending.lock().drain(..) {
                    let _ = waiter.send(Err(e.to_string()));
                }
                if destroyed.load(Ordering::Acquire) {
                    break;
                }
                warn!(context = %context, error = %e, "MQTT connection error");
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}

struct MqttConnection {
    direction: Direction,
    client: AsyncClient,
    qos: QoS,
    retain: bool,
    format: Format,
    send_timeout: Duration,
    ack_timeout: Duration,
    router: Arc<TopicRouter>,
    pending: PendingSubAcks,
    /// Serializes requests on the client so SUBACKs arrive in queue order.
    requests: tokio::sync::Mutex<()>,
    event_loop: Mutex<Option<JoinHandle<()>>>,
    destroyed: Arc<AtomicBool>,
}

impl MqttConnection {
    fn ensure_live(&self) -> Result<()> {
        if self.destroyed.load(Ordering::Acquire) {
            Err(Error::ContextDestroyed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Connection for MqttConnection {
    async fn start_topic(&self, topic: &TopicDescriptor) -> Result<()> {
        self.ensure_live()?;
        if self.direction == Direction::Publisher {
            return Ok(());
        }

        let (tx, rx) = oneshot::channel();
        {
            let _guard = self.requests.lock().await;
            self.pending.lock().push_back(tx);
            if let Err(e) = self.client.subscribe(topic.name.as_str(), self.qos).await {
                self.pending.lock().pop_back();
                return Err(Error::bind(&topic.name, e));
            }
        }

        match tokio::time::timeout(self.ack_timeout, rx).await {
            Ok(Ok(Ok(()))) => {
                debug!(topic = %topic.name, "MQTT subscription acknowledged");
                Ok(())
            }
            Ok(Ok(Err(reason))) => Err(Error::bind(&topic.name, reason)),
            Ok(Err(_)) => Err(Error::bind(&topic.name, "connection closed before SUBACK")),
            Err(_) => Err(Error::bind(
                &topic.name,
                format!("no SUBACK within {:?}", self.ack_timeout),
            )),
        }
    }

    async fn send(&self, topic: &TopicDescriptor, payload: &Payload) -> Result<()> {
        self.ensure_live()?;
        check_direction(self.direction, Direction::Publisher, "send")?;
        check_payload("mqtt", ACCEPTED, payload)?;

        let data = payload
            .to_wire(self.format)
            .map_err(|e| Error::send(&topic.name, e))?;

        let _guard = self.requests.lock().await;
        match tokio::time::timeout(
            self.send_timeout,
            self.client
                .publish(topic.name.as_str(), self.qos, self.retain, data),
        )
        .await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(Error::send(&topic.name, e)),
            Err(_) => Err(Error::send(
                &topic.name,
                format!("publish not accepted within {:?}", self.send_timeout),
            )),
        }
    }

    async fn receive(&self, topic: &TopicDescriptor, handler: MessageHandler) -> Result<()> {
        self.ensure_live()?;
        check_direction(self.direction, Direction::Subscriber, "receive")?;
        self.router.register(topic, handler);
        Ok(())
    }

    async fn stop_topic(&self, topic: &TopicDescriptor) -> Result<()> {
        self.ensure_live()?;
        if self.direction == Direction::Publisher {
            return Ok(());
        }

        {
            let _guard = self.requests.lock().await;
            match tokio::time::timeout(
                self.send_timeout,
                self.client.unsubscribe(topic.name.as_str()),
            )
            .await
            {
                Ok(Ok(())) => {}
                Ok(Err(e)) => return Err(Error::unbind(&topic.name, e)),
                Err(_) => return Err(Error::unbind(&topic.name, "unsubscribe timed out")),
            }
        }

        // The route stays live until the broker has been asked to stop.
        self.router.unregister(&topic.name);
        Ok(())
    }

    async fn destroy(&self) -> Result<()> {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        self.router.clear();

        if let Err(e) = self.client.try_disconnect() {
            debug!(error = %e, "MQTT disconnect request not queued");
        }

        let task = self.event_loop.lock().take();
        if let Some(mut task) = task {
            if tokio::time::timeout(self.send_timeout, &mut task).await.is_err() {
                debug!("MQTT event loop did not stop in time, aborting");
                task.abort();
            }
        }

        info!("MQTT connection closed");
        Ok(())
    }
}
