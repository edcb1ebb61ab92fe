//! In-process loopback transport (`mem://`).
//!
//! Contexts created through the same [`MemoryDriver`] with the same
//! `host:port` share a broker, so a publisher and a subscriber in one process
//! can exchange messages without any network. Each broker is a Tokio
//! broadcast channel; every subscriber connection runs its own read loop
//! feeding its [`TopicRouter`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use databus_common::{
    ContextDescriptor, DataType, Direction, Endpoint, Error, Format, Payload, Result,
    TopicDescriptor, TransportOptions, topic_matches,
};

use crate::driver::{Connection, MessageHandler, TransportDriver, check_direction, check_payload};
use crate::router::TopicRouter;

const ACCEPTED: &[DataType] = &[DataType::String, DataType::Bytes, DataType::Json];

type Frame = (String, Arc<Vec<u8>>);

/// Loopback driver. Brokers live as long as the driver.
#[derive(Debug)]
pub struct MemoryDriver {
    options: TransportOptions,
    brokers: Mutex<HashMap<String, broadcast::Sender<Frame>>>,
}

impl MemoryDriver {
    pub fn new(options: TransportOptions) -> Self {
        Self {
            options,
            brokers: Mutex::new(HashMap::new()),
        }
    }

    fn broker(&self, endpoint: &Endpoint) -> broadcast::Sender<Frame> {
        self.brokers
            .lock()
            .entry(endpoint.authority())
            .or_insert_with(|| broadcast::channel(self.options.channel_capacity.max(1)).0)
            .clone()
    }
}

impl Default for MemoryDriver {
    fn default() -> Self {
        Self::new(TransportOptions::default())
    }
}

#[async_trait]
impl TransportDriver for MemoryDriver {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn schemes(&self) -> &'static [&'static str] {
        &["mem"]
    }

    async fn create_context(
        &self,
        descriptor: &ContextDescriptor,
        endpoint: &Endpoint,
    ) -> Result<Box<dyn Connection>> {
        let broker = self.broker(endpoint);
        let router = Arc::new(TopicRouter::new(
            self.options.channel_capacity,
            self.options.serialization,
        ));
        let subscriptions = Arc::new(RwLock::new(HashSet::new()));

        let reader = match descriptor.direction {
            Direction::Publisher => None,
            Direction::Subscriber => Some(spawn_reader(
                broker.subscribe(),
                router.clone(),
                subscriptions.clone(),
                descriptor.name.clone(),
            )),
        };

        Ok(Box::new(MemoryConnection {
            direction: descriptor.direction,
            format: self.options.serialization,
            broker,
            router,
            subscriptions,
            reader: Mutex::new(reader),
            destroyed: AtomicBool::new(false),
        }))
    }
}

fn spawn_reader(
    mut rx: broadcast::Receiver<Frame>,
    router: Arc<TopicRouter>,
    subscriptions: Arc<RwLock<HashSet<String>>>,
    context: String,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok((topic, data)) => {
                    let subscribed = subscriptions
                        .read()
                        .iter()
                        .any(|filter| topic_matches(filter, &topic));
                    if subscribed {
                        router.dispatch(&topic, &data);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(context = %context, skipped = n, "Memory subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

struct MemoryConnection {
    direction: Direction,
    format: Format,
    broker: broadcast::Sender<Frame>,
    router: Arc<TopicRouter>,
    subscriptions: Arc<RwLock<HashSet<String>>>,
    reader: Mutex<Option<JoinHandle<()>>>,
    destroyed: AtomicBool,
}

impl MemoryConnection {
    fn ensure_live(&self) -> Result<()> {
        if self.destroyed.load(Ordering::Acquire) {
            Err(Error::ContextDestroyed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn start_topic(&self, topic: &TopicDescriptor) -> Result<()> {
        self.ensure_live()?;
        if self.direction == Direction::Subscriber {
            self.subscriptions.write().insert(topic.name.clone());
        }
        Ok(())
    }

    async fn send(&self, topic: &TopicDescriptor, payload: &Payload) -> Result<()> {
        self.ensure_live()?;
        check_direction(self.direction, Direction::Publisher, "send")?;
        check_payload("memory", ACCEPTED, payload)?;

        let data = payload
            .to_wire(self.format)
            .map_err(|e| Error::send(&topic.name, e))?;

        // No receivers is not a failure: the message is simply unobserved.
        let receivers = self
            .broker
            .send((topic.name.clone(), Arc::new(data)))
            .unwrap_or(0);
        tracing::trace!(topic = %topic.name, receivers, "Memory publish");
        Ok(())
    }

    async fn receive(&self, topic: &TopicDescriptor, handler: MessageHandler) -> Result<()> {
        self.ensure_live()?;
        check_direction(self.direction, Direction::Subscriber, "receive")?;
        self.router.register(topic, handler);
        Ok(())
    }

    async fn stop_topic(&self, topic: &TopicDescriptor) -> Result<()> {
        self.ensure_live()?;
        self.subscriptions.write().remove(&topic.name);
        self.router.unregister(&topic.name);
        Ok(())
    }

    async fn destroy(&self) -> Result<()> {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        if let Some(reader) = self.reader.lock().take() {
            reader.abort();
        }
        self.subscriptions.write().clear();
        self.router.clear();
        Ok(())
    }
}
