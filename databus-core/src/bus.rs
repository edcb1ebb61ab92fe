//! The dispatch facade.
//!
//! [`DataBus`] is the single entry point for callers: it resolves a context
//! descriptor's endpoint scheme to a driver, owns every live [`Context`] by
//! logical name, and routes topic operations to them.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex as SyncMutex, RwLock};
use tokio::sync::Mutex;

use databus_common::{ContextDescriptor, Error, Payload, Result, TopicDescriptor};

use crate::context::Context;
use crate::driver::Message;
use crate::registry::DriverRegistry;

/// Transport-agnostic publish/subscribe facade.
///
/// Create and destroy of the same logical name are serialized against each
/// other, so racing callers can neither double-connect nor double-close.
/// Different names never wait on each other, even while a connect is slow.
/// Topic operations take no lifecycle lock; an operation that races a
/// destroy observes `ContextDestroyed`.
#[derive(Debug)]
pub struct DataBus {
    registry: DriverRegistry,
    contexts: RwLock<HashMap<String, Arc<Context>>>,
    /// Per-name create/destroy locks, dropped once unused.
    lifecycle: SyncMutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl DataBus {
    pub fn new(registry: DriverRegistry) -> Self {
        Self {
            registry,
            contexts: RwLock::new(HashMap::new()),
            lifecycle: SyncMutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &DriverRegistry {
        &self.registry
    }

    /// Create a context and register it under `descriptor.name`.
    ///
    /// A malformed descriptor fails before the driver is consulted. On any
    /// failure nothing is registered.
    pub async fn context_create(&self, descriptor: ContextDescriptor) -> Result<Arc<Context>> {
        let lock = self.name_lock(&descriptor.name);
        let name = descriptor.name.clone();
        let result = {
            let _guard = lock.lock().await;
            self.create_locked(descriptor).await
        };
        self.release_name(&name, lock);
        result
    }

    async fn create_locked(&self, descriptor: ContextDescriptor) -> Result<Arc<Context>> {
        let endpoint = descriptor.validate()?;
        if self.contexts.read().contains_key(&descriptor.name) {
            return Err(Error::ContextExists(descriptor.name));
        }

        let driver = self.registry.resolve(endpoint.scheme())?;
        let name = descriptor.name.clone();
        let context = match Context::open(driver.as_ref(), descriptor).await {
            Ok(context) => Arc::new(context),
            Err(e) => {
                tracing::warn!(context = %name, error = %e, "Context create failed");
                return Err(e);
            }
        };

        self.contexts.write().insert(name, context.clone());
        Ok(context)
    }

    /// Look up a live context.
    pub fn context(&self, name: &str) -> Result<Arc<Context>> {
        self.contexts
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownContext(name.to_string()))
    }

    /// Names of the live contexts, sorted.
    pub fn contexts(&self) -> Vec<String> {
        let mut names: Vec<String> = self.contexts.read().keys().cloned().collect();
        names.sort_unstable();
        names
    }

    pub async fn start_topic(&self, context: &str, topic: &TopicDescriptor) -> Result<()> {
        self.context(context)?.start_topic(topic).await
    }

    pub async fn stop_topic(&self, context: &str, topic: &str) -> Result<()> {
        self.context(context)?.stop_topic(topic).await
    }

    /// Publish on a publisher context.
    pub async fn publish(
        &self,
        context: &str,
        topic: &TopicDescriptor,
        payload: impl Into<Payload>,
    ) -> Result<()> {
        let payload = payload.into();
        self.context(context)?.publish(topic, &payload).await
    }

    /// Subscribe on a subscriber context. `handler` runs on a delivery task,
    /// once per inbound message.
    pub async fn subscribe<F>(&self, context: &str, topic: &TopicDescriptor, handler: F) -> Result<()>
    where
        F: Fn(Message) + Send + Sync + 'static,
    {
        self.context(context)?.subscribe(topic, Arc::new(handler)).await
    }

    /// Destroy a context and forget it.
    ///
    /// # Errors
    ///
    /// `Error::UnknownContext` if no live context has this name, including
    /// one that was already destroyed.
    pub async fn context_destroy(&self, name: &str) -> Result<()> {
        let lock = self.name_lock(name);
        let result = {
            let _guard = lock.lock().await;
            let removed = self.contexts.write().remove(name);
            match removed {
                Some(context) => context.destroy().await,
                None => Err(Error::UnknownContext(name.to_string())),
            }
        };
        self.release_name(name, lock);
        result
    }

    /// Destroy every live context.
    pub async fn shutdown(&self) {
        let contexts: Vec<Arc<Context>> = self.contexts.write().drain().map(|(_, c)| c).collect();
        tracing::info!(contexts = contexts.len(), "Shutting down data bus");

        for context in contexts {
            if let Err(e) = context.destroy().await {
                tracing::warn!(context = %context.name(), error = %e, "Error during shutdown");
            }
        }
    }

    fn name_lock(&self, name: &str) -> Arc<Mutex<()>> {
        self.lifecycle
            .lock()
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    fn release_name(&self, name: &str, lock: Arc<Mutex<()>>) {
        drop(lock);
        let mut locks = self.lifecycle.lock();
        if locks.get(name).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryDriver;
    use databus_common::ErrorKind;

    fn bus() -> DataBus {
        DataBus::new(DriverRegistry::new().with(MemoryDriver::default()))
    }

    #[tokio::test]
    async fn test_create_and_destroy() {
        let bus = bus();
        let ctx = bus
            .context_create(ContextDescriptor::publisher("sm", "mem://local:1883/"))
            .await
            .unwrap();

        assert_eq!(ctx.transport(), "memory");
        assert_eq!(bus.contexts(), vec!["sm".to_string()]);

        bus.context_destroy("sm").await.unwrap();
        assert!(bus.contexts().is_empty());
        assert_eq!(
            bus.context_destroy("sm").await.unwrap_err().kind(),
            ErrorKind::UnknownContext
        );
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected() {
        let bus = bus();
        bus.context_create(ContextDescriptor::publisher("sm", "mem://local:1883/"))
            .await
            .unwrap();

        let err = bus
            .context_create(ContextDescriptor::subscriber("sm", "mem://local:1883/"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ContextExists);
        assert_eq!(bus.contexts().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_scheme_leaves_nothing() {
        let bus = bus();
        let err = bus
            .context_create(ContextDescriptor::publisher("sm", "amqp://localhost:5672/"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::UnknownScheme);
        assert!(bus.contexts().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_destroys_all() {
        let bus = bus();
        let a = bus
            .context_create(ContextDescriptor::publisher("a", "mem://local:1/"))
            .await
            .unwrap();
        let b = bus
            .context_create(ContextDescriptor::subscriber("b", "mem://local:1/"))
            .await
            .unwrap();

        bus.shutdown().await;

        assert!(bus.contexts().is_empty());
        assert_eq!(
            a.start_topic(&TopicDescriptor::string("t")).await.unwrap_err().kind(),
            ErrorKind::ContextDestroyed
        );
        assert_eq!(
            b.stop_topic("t").await.unwrap_err().kind(),
            ErrorKind::ContextDestroyed
        );
    }
}
