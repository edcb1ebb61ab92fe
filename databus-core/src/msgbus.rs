//! Single-context facade with two-value status codes.
//!
//! [`MsgBus`] wraps a [`DataBus`] holding at most one context and reports
//! every operation as a [`Status`]. Error details go to the log.

use tokio::sync::Mutex;

use databus_common::{ContextDescriptor, Error, Payload, TopicDescriptor};

use crate::bus::DataBus;
use crate::driver::Message;
use crate::registry::DriverRegistry;
use crate::status::Status;

#[derive(Debug)]
pub struct MsgBus {
    bus: DataBus,
    current: Mutex<Option<String>>,
}

impl MsgBus {
    pub fn new(registry: DriverRegistry) -> Self {
        Self {
            bus: DataBus::new(registry),
            current: Mutex::new(None),
        }
    }

    /// The underlying facade, for callers that want rich errors.
    pub fn bus(&self) -> &DataBus {
        &self.bus
    }

    /// Name of the live context, if any.
    pub async fn context_name(&self) -> Option<String> {
        self.current.lock().await.clone()
    }

    pub async fn context_create(&self, descriptor: ContextDescriptor) -> Status {
        let mut current = self.current.lock().await;
        if let Some(existing) = current.as_ref() {
            let err = Error::ContextExists(existing.clone());
            return Status::from_result::<()>("context_create", Err(err));
        }

        let name = descriptor.name.clone();
        let result = self.bus.context_create(descriptor).await;
        if result.is_ok() {
            *current = Some(name);
        }
        Status::from_result("context_create", result)
    }

    pub async fn publish(&self, topic: &TopicDescriptor, value: impl Into<Payload>) -> Status {
        let result = match self.context_name().await {
            Some(name) => self.bus.publish(&name, topic, value).await,
            None => Err(Error::ContextDestroyed),
        };
        Status::from_result("publish", result)
    }

    pub async fn subscribe<F>(&self, topic: &TopicDescriptor, handler: F) -> Status
    where
        F: Fn(Message) + Send + Sync + 'static,
    {
        let result = match self.context_name().await {
            Some(name) => self.bus.subscribe(&name, topic, handler).await,
            None => Err(Error::ContextDestroyed),
        };
        Status::from_result("subscribe", result)
    }

    /// Destroy the context. Calling this again, or before any create,
    /// returns `Status::Ok`.
    pub async fn context_destroy(&self) -> Status {
        let mut current = self.current.lock().await;
        let Some(name) = current.take() else {
            tracing::warn!("context_destroy called without a live context");
            return Status::Ok;
        };
        Status::from_result("context_destroy", self.bus.context_destroy(&name).await)
    }
}
