//! Transport driver contract.
//!
//! Every backend exposes the same four-phase lifecycle:
//!
//! 1. [`TransportDriver::create_context`] opens a [`Connection`] for one
//!    context descriptor. The connection is the context's exclusively owned
//!    handle to the transport.
//! 2. [`Connection::start_topic`] binds a topic (a subscribe call for
//!    subscribers, usually a no-op for publishers).
//! 3. [`Connection::send`] / [`Connection::receive`] move payloads.
//! 4. [`Connection::stop_topic`] and [`Connection::destroy`] tear down.
//!
//! How asymmetric the backend is internally (eager vs deferred connect,
//! subscribe-time work) stays inside the driver.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use databus_common::{
    ContextDescriptor, DataType, Direction, Endpoint, Error, Payload, Result, TopicDescriptor,
};

/// An inbound message delivered to a receive handler.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Concrete topic the message arrived on.
    pub topic: String,
    /// Payload rebuilt according to the bound topic's declared type.
    pub payload: Payload,
    /// When the transport handed the message over.
    pub received_at: DateTime<Utc>,
}

impl Message {
    pub fn new(topic: impl Into<String>, payload: Payload) -> Self {
        Self {
            topic: topic.into(),
            payload,
            received_at: Utc::now(),
        }
    }
}

/// Receive callback. Invoked once per inbound message, off the caller's task.
///
/// Handlers run on a per-topic delivery task; they should return quickly or
/// hand work off so their topic's queue does not fill up.
pub type MessageHandler = Arc<dyn Fn(Message) + Send + Sync>;

/// Factory side of a transport: resolves a descriptor into a live connection.
#[async_trait]
pub trait TransportDriver: Send + Sync {
    /// Human-readable transport name, used in logs and errors.
    fn name(&self) -> &'static str;

    /// Endpoint schemes served by this driver.
    fn schemes(&self) -> &'static [&'static str];

    /// Open a connection for `descriptor`.
    ///
    /// Must fail (and leave nothing behind) on an unreachable endpoint within
    /// a bounded time.
    ///
    /// # Errors
    ///
    /// - `Error::BadEndpoint` - endpoint is valid grammar but unusable for this transport
    /// - `Error::ConnectFailed` - the transport refused or timed out
    async fn create_context(
        &self,
        descriptor: &ContextDescriptor,
        endpoint: &Endpoint,
    ) -> Result<Box<dyn Connection>>;
}

/// A context's exclusively owned transport handle.
///
/// Implementations serialize concurrent sends on the underlying client
/// internally, without blocking inbound delivery.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Bind a topic. Subscribers must perform the transport subscribe here.
    async fn start_topic(&self, topic: &TopicDescriptor) -> Result<()>;

    /// Send one payload.
    ///
    /// # Errors
    ///
    /// - `Error::TypeMismatch` - the transport cannot marshal this payload type
    /// - `Error::SendFailed` - the transport rejected or dropped the publish
    async fn send(&self, topic: &TopicDescriptor, payload: &Payload) -> Result<()>;

    /// Register `handler` for messages matching `topic`. Replaces any
    /// handler previously registered for the same topic.
    async fn receive(&self, topic: &TopicDescriptor, handler: MessageHandler) -> Result<()>;

    /// Unbind a topic and drop its handler.
    ///
    /// If the transport refuses, the topic must keep delivering to its
    /// current handler.
    async fn stop_topic(&self, topic: &TopicDescriptor) -> Result<()>;

    /// Release the transport. Must succeed when no topic was ever started
    /// and must not block on in-flight messages; pending deliveries may be
    /// dropped.
    async fn destroy(&self) -> Result<()>;
}

impl fmt::Debug for dyn Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Connection")
    }
}

/// Reject payloads a transport cannot marshal instead of coercing them.
pub fn check_payload(
    transport: &'static str,
    accepted: &[DataType],
    payload: &Payload,
) -> Result<()> {
    if accepted.contains(&payload.data_type()) {
        Ok(())
    } else {
        Err(Error::TypeMismatch {
            transport,
            actual: payload.type_name(),
        })
    }
}

/// Reject an operation that does not fit the connection's direction.
pub fn check_direction(
    direction: Direction,
    expected: Direction,
    operation: &'static str,
) -> Result<()> {
    if direction == expected {
        Ok(())
    } else {
        Err(Error::DirectionMismatch {
            direction,
            operation,
        })
    }
}
