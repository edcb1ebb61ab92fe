//! Contexts and topic bindings.
//!
//! A [`Context`] owns one live transport [`Connection`] and the set of
//! [`TopicBinding`]s multiplexed over it:
//!
//! ```text
//! (create) -> Connected <-> TopicActive -> Destroyed
//! ```
//!
//! A failed create never yields a `Context`, so there is no runtime
//! representation of the uninitialized state. `Destroyed` is terminal.

use std::collections::HashMap;
use std::fmt;

use tokio::sync::RwLock;

use databus_common::{
    ContextDescriptor, Direction, Endpoint, Error, Payload, Result, TopicDescriptor,
};

use crate::driver::{Connection, MessageHandler, TransportDriver};

/// Observable lifecycle state of a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextState {
    /// Connection is live and no topic is bound.
    Connected,
    /// Connection is live with at least one bound topic.
    TopicActive,
    /// Connection released; every operation fails with `ContextDestroyed`.
    Destroyed,
}

/// A topic bound inside a context. Inherits the context's direction.
#[derive(Clone)]
pub struct TopicBinding {
    descriptor: TopicDescriptor,
    direction: Direction,
    handler: Option<MessageHandler>,
}

impl TopicBinding {
    pub fn descriptor(&self) -> &TopicDescriptor {
        &self.descriptor
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// `true` once a receive handler is registered.
    pub fn has_handler(&self) -> bool {
        self.handler.is_some()
    }
}

impl fmt::Debug for TopicBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TopicBinding")
            .field("descriptor", &self.descriptor)
            .field("direction", &self.direction)
            .field("has_handler", &self.handler.is_some())
            .finish()
    }
}

#[derive(Debug)]
struct Inner {
    connection: Option<Box<dyn Connection>>,
    topics: HashMap<String, TopicBinding>,
}

impl Inner {
    fn connection(&self) -> Result<&dyn Connection> {
        self.connection.as_deref().ok_or(Error::ContextDestroyed)
    }
}

/// A logical connection bound to one transport driver.
///
/// Sends run under a shared lock so publishes on different topics proceed
/// concurrently; binding changes and destroy take the lock exclusively.
#[derive(Debug)]
pub struct Context {
    descriptor: ContextDescriptor,
    endpoint: Endpoint,
    transport: &'static str,
    inner: RwLock<Inner>,
}

impl Context {
    /// Validate `descriptor` and open a connection through `driver`.
    ///
    /// Descriptor validation happens before any network attempt.
    pub async fn open(driver: &dyn TransportDriver, descriptor: ContextDescriptor) -> Result<Self> {
        let endpoint = descriptor.validate()?;

        if !driver.schemes().iter().any(|s| *s == endpoint.scheme()) {
            return Err(Error::UnknownScheme(endpoint.scheme().to_string()));
        }

        tracing::debug!(
            context = %descriptor.name,
            direction = %descriptor.direction,
            endpoint = %endpoint,
            transport = driver.name(),
            "Creating context"
        );

        let connection = driver.create_context(&descriptor, &endpoint).await?;

        tracing::info!(
            context = %descriptor.name,
            direction = %descriptor.direction,
            endpoint = %endpoint,
            "Context connected"
        );

        Ok(Self {
            descriptor,
            endpoint,
            transport: driver.name(),
            inner: RwLock::new(Inner {
                connection: Some(connection),
                topics: HashMap::new(),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn direction(&self) -> Direction {
        self.descriptor.direction
    }

    pub fn descriptor(&self) -> &ContextDescriptor {
        &self.descriptor
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Name of the transport driver backing this context.
    pub fn transport(&self) -> &'static str {
        self.transport
    }

    pub async fn state(&self) -> ContextState {
        let inner = self.inner.read().await;
        if inner.connection.is_none() {
            ContextState::Destroyed
        } else if inner.topics.is_empty() {
            ContextState::Connected
        } else {
            ContextState::TopicActive
        }
    }

    /// Descriptors of the currently bound topics.
    pub async fn topics(&self) -> Vec<TopicDescriptor> {
        let inner = self.inner.read().await;
        inner.topics.values().map(|b| b.descriptor.clone()).collect()
    }

    /// Snapshot of one binding.
    pub async fn binding(&self, topic: &str) -> Option<TopicBinding> {
        self.inner.read().await.topics.get(topic).cloned()
    }

    pub async fn is_topic_active(&self, topic: &str) -> bool {
        self.inner.read().await.topics.contains_key(topic)
    }

    /// Bind a topic. Binding an already active topic is a no-op.
    pub async fn start_topic(&self, topic: &TopicDescriptor) -> Result<()> {
        topic.validate(self.direction())?;

        let mut guard = self.inner.write().await;
        let inner = &mut *guard;
        let connection = inner.connection.as_deref().ok_or(Error::ContextDestroyed)?;

        if inner.topics.contains_key(&topic.name) {
            tracing::debug!(context = %self.name(), topic = %topic.name, "Topic already active");
            return Ok(());
        }

        connection.start_topic(topic).await?;
        inner.topics.insert(topic.name.clone(), self.binding_for(topic, None));

        tracing::debug!(context = %self.name(), topic = %topic.name, "Topic started");
        Ok(())
    }

    /// Unbind a topic. The binding is kept if the transport refuses.
    pub async fn stop_topic(&self, topic: &str) -> Result<()> {
        let mut guard = self.inner.write().await;
        let inner = &mut *guard;
        let connection = inner.connection.as_deref().ok_or(Error::ContextDestroyed)?;

        let descriptor = match inner.topics.get(topic) {
            Some(binding) => binding.descriptor.clone(),
            None => return Err(Error::unbind(topic, "topic is not active")),
        };

        connection.stop_topic(&descriptor).await?;
        inner.topics.remove(topic);

        tracing::debug!(context = %self.name(), topic = %topic, "Topic stopped");
        Ok(())
    }

    /// Publish `payload` on `topic`, binding the topic first if needed.
    pub async fn publish(&self, topic: &TopicDescriptor, payload: &Payload) -> Result<()> {
        self.require(Direction::Publisher, "publish")?;
        topic.validate(Direction::Publisher)?;

        loop {
            {
                let inner = self.inner.read().await;
                let connection = inner.connection()?;
                if inner.topics.contains_key(&topic.name) {
                    connection.send(topic, payload).await?;
                    tracing::trace!(context = %self.name(), topic = %topic.name, "Published");
                    return Ok(());
                }
            }
            self.start_topic(topic).await?;
        }
    }

    /// Bind `topic` and deliver its messages to `handler`.
    ///
    /// Subscribing again to an active topic replaces its handler. If the
    /// transport subscribe fails the handler is withdrawn and no binding is
    /// left behind.
    pub async fn subscribe(&self, topic: &TopicDescriptor, handler: MessageHandler) -> Result<()> {
        self.require(Direction::Subscriber, "subscribe")?;
        topic.validate(Direction::Subscriber)?;

        let mut guard = self.inner.write().await;
        let inner = &mut *guard;
        let connection = inner.connection.as_deref().ok_or(Error::ContextDestroyed)?;

        connection.receive(topic, handler.clone()).await?;

        if let Some(binding) = inner.topics.get_mut(&topic.name) {
            binding.handler = Some(handler);
            tracing::debug!(context = %self.name(), topic = %topic.name, "Receive handler replaced");
            return Ok(());
        }

        if let Err(e) = connection.start_topic(topic).await {
            if let Err(cleanup) = connection.stop_topic(topic).await {
                tracing::debug!(error = %cleanup, topic = %topic.name, "Rollback after failed subscribe");
            }
            return Err(e);
        }

        inner
            .topics
            .insert(topic.name.clone(), self.binding_for(topic, Some(handler)));

        tracing::debug!(context = %self.name(), topic = %topic.name, "Subscribed");
        Ok(())
    }

    /// Release the connection and invalidate every binding.
    ///
    /// Calling this on an already destroyed context is a no-op. Transport
    /// errors during teardown are logged, not returned.
    pub async fn destroy(&self) -> Result<()> {
        let mut inner = self.inner.write().await;

        let Some(connection) = inner.connection.take() else {
            tracing::debug!(context = %self.name(), "Context already destroyed");
            return Ok(());
        };

        let topics = inner.topics.len();
        inner.topics.clear();

        if let Err(e) = connection.destroy().await {
            tracing::warn!(context = %self.name(), error = %e, "Error while releasing connection");
        }

        tracing::info!(context = %self.name(), topics, "Context destroyed");
        Ok(())
    }

    fn require(&self, expected: Direction, operation: &'static str) -> Result<()> {
        if self.direction() == expected {
            Ok(())
        } else {
            Err(Error::DirectionMismatch {
                direction: self.direction(),
                operation,
            })
        }
    }

    fn binding_for(&self, topic: &TopicDescriptor, handler: Option<MessageHandler>) -> TopicBinding {
        TopicBinding {
            descriptor: topic.clone(),
            direction: self.direction(),
            handler,
        }
    }
}
