//! Zenoh transport driver.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, trace, warn};
use zenoh::Session;
use zenoh::key_expr::OwnedKeyExpr;
use zenoh::pubsub::Subscriber;
use zenoh::sample::SampleKind;

use databus_common::{
    ContextDescriptor, DataType, Direction, Endpoint, Error, Format, Payload, Result,
    TopicDescriptor, TransportOptions,
};
use databus_core::{
    Connection, MessageHandler, TopicRouter, TransportDriver, check_direction, check_payload,
};

use crate::keyexpr::to_key_expr;
use crate::session;

const ACCEPTED: &[DataType] = &[DataType::String, DataType::Bytes, DataType::Json];

/// Driver for `zenoh://host:port/` endpoints.
#[derive(Debug, Clone, Default)]
pub struct ZenohDriver {
    options: TransportOptions,
}

impl ZenohDriver {
    pub fn new(options: TransportOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl TransportDriver for ZenohDriver {
    fn name(&self) -> &'static str {
        "zenoh"
    }

    fn schemes(&self) -> &'static [&'static str] {
        &["zenoh"]
    }

    async fn create_context(
        &self,
        descriptor: &ContextDescriptor,
        endpoint: &Endpoint,
    ) -> Result<Box<dyn Connection>> {
        let session = session::connect(descriptor, endpoint, &self.options).await?;

        Ok(Box::new(ZenohConnection {
            direction: descriptor.direction,
            context: descriptor.name.clone(),
            session,
            format: self.options.serialization,
            send_timeout: self.options.send_timeout(),
            router: Arc::new(TopicRouter::new(
                self.options.channel_capacity,
                self.options.serialization,
            )),
            subscribers: Mutex::new(HashMap::new()),
            destroyed: AtomicBool::new(false),
        }))
    }
}

struct ZenohConnection {
    direction: Direction,
    context: String,
    session: Session,
    format: Format,
    send_timeout: Duration,
    router: Arc<TopicRouter>,
    subscribers: Mutex<HashMap<String, Subscriber<()>>>,
    destroyed: AtomicBool,
}

impl ZenohConnection {
    fn ensure_live(&self) -> Result<()> {
        if self.destroyed.load(Ordering::Acquire) {
            Err(Error::ContextDestroyed)
        } else {
            Ok(())
        }
    }

    async fn declare(&self, key_expr: OwnedKeyExpr) -> zenoh::Result<Subscriber<()>> {
        let router = self.router.clone();
        let subscriber = self
            .session
            .declare_subscriber(key_expr.clone())
            .callback(move |sample| {
                if sample.kind() == SampleKind::Delete {
                    trace!(key = %sample.key_expr(), "Ignoring delete sample");
                    return;
                }
                router.dispatch(sample.key_expr().as_str(), &sample.payload().to_bytes());
            })
            .await?;

        debug!(context = %self.context, key_expr = %key_expr, "Zenoh subscriber declared");
        Ok(subscriber)
    }

    /// Restore the subscriber for `topic` after a failed undeclare.
    async fn redeclare(&self, topic: &TopicDescriptor) {
        let restored = match to_key_expr(&topic.name) {
            Ok(key_expr) => self.declare(key_expr).await.map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        match restored {
            Ok(subscriber) => {
                self.subscribers
                    .lock()
                    .await
                    .insert(topic.name.clone(), subscriber);
            }
            Err(e) => {
                warn!(context = %self.context, topic = %topic.name, error = %e, "Zenoh subscriber lost");
            }
        }
    }
}

#[async_trait]
impl Connection for ZenohConnection {
    async fn start_topic(&self, topic: &TopicDescriptor) -> Result<()> {
        self.ensure_live()?;
        let key_expr = to_key_expr(&topic.name).map_err(|e| Error::bind(&topic.name, e))?;

        if self.direction == Direction::Publisher {
            return Ok(());
        }

        let mut subscribers = self.subscribers.lock().await;
        if subscribers.contains_key(&topic.name) {
            return Ok(());
        }

        let subscriber = self
            .declare(key_expr)
            .await
            .map_err(|e| Error::bind(&topic.name, e))?;
        subscribers.insert(topic.name.clone(), subscriber);
        Ok(())
    }

    async fn send(&self, topic: &TopicDescriptor, payload: &Payload) -> Result<()> {
        self.ensure_live()?;
        check_direction(self.direction, Direction::Publisher, "send")?;
        check_payload("zenoh", ACCEPTED, payload)?;

        let key_expr = to_key_expr(&topic.name)?;
        let data = payload
            .to_wire(self.format)
            .map_err(|e| Error::send(&topic.name, e))?;

        match tokio::time::timeout(self.send_timeout, async {
            self.session.put(key_expr, data).await
        })
        .await
        {
            Ok(Ok(())) => {
                trace!(topic = %topic.name, "Zenoh put");
                Ok(())
            }
            Ok(Err(e)) => Err(Error::send(&topic.name, e)),
            Err(_) => Err(Error::send(
                &topic.name,
                format!("put not completed within {:?}", self.send_timeout),
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

        let mut subscribers = self.subscribers.lock().await;
        if let Some(subscriber) = subscribers.remove(&topic.name) {
            // Undeclaring consumes the handle; keep a live subscriber on
            // failure by declaring it again before reporting the error.
            if let Err(e) = subscriber.undeclare().await {
                drop(subscribers);
                self.redeclare(topic).await;
                return Err(Error::unbind(&topic.name, e));
            }
        }
        drop(subscribers);

        self.router.unregister(&topic.name);
        Ok(())
    }

    async fn destroy(&self) -> Result<()> {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        self.router.clear();
        // Dropping a callback subscriber undeclares it.
        self.subscribers.lock().await.clear();

        match tokio::time::timeout(self.send_timeout, async { self.session.close().await }).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(context = %self.context, error = %e, "Zenoh session close failed"),
            Err(_) => warn!(context = %self.context, "Zenoh session close timed out"),
        }

        info!(context = %self.context, "Zenoh session closed");
        Ok(())
    }
}
