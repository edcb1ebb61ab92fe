//! Inbound message routing for a single connection.
//!
//! Each registered filter owns a bounded queue drained by its own task, so
//! delivery order per topic follows the transport, a slow handler only
//! backs up its own topic, and the transport's read loop never waits on user
//! code. When a queue is full the message is dropped and logged.

use std::collections::HashMap;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use databus_common::{DataType, Format, Payload, TopicDescriptor, topic_matches};

use crate::driver::{Message, MessageHandler};

/// Default per-topic queue length.
pub const DEFAULT_CAPACITY: usize = 256;

struct Route {
    data_type: DataType,
    tx: mpsc::Sender<Message>,
    task: JoinHandle<()>,
}

/// Routes raw inbound messages to registered per-topic handlers.
///
/// [`dispatch`](Self::dispatch) is synchronous so it can be called from
/// transport callbacks running outside the Tokio runtime.
/// [`register`](Self::register) spawns a task and must be called from
/// within a runtime.
pub struct TopicRouter {
    capacity: usize,
    /// Encoding of inbound `json` payloads on this connection.
    format: Format,
    routes: RwLock<HashMap<String, Route>>,
}

impl TopicRouter {
    pub fn new(capacity: usize, format: Format) -> Self {
        Self {
            capacity: capacity.max(1),
            format,
            routes: RwLock::new(HashMap::new()),
        }
    }

    /// Register a handler for `topic` (a concrete name or a wildcard filter).
    ///
    /// An existing route for the same filter is replaced; messages still
    /// queued for the old handler are discarded.
    pub fn register(&self, topic: &TopicDescriptor, handler: MessageHandler) {
        let (tx, mut rx) = mpsc::channel::<Message>(self.capacity);
        let filter = topic.name.clone();

        let task = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                handler(message);
            }
        });

        let route = Route {
            data_type: topic.data_type,
            tx,
            task,
        };

        if let Some(old) = self.routes.write().insert(filter.clone(), route) {
            old.task.abort();
            tracing::debug!(topic = %filter, "Replaced receive handler");
        }
    }

    /// Remove the handler for `filter`. Returns `false` if none was registered.
    pub fn unregister(&self, filter: &str) -> bool {
        match self.routes.write().remove(filter) {
            Some(route) => {
                route.task.abort();
                true
            }
            None => false,
        }
    }

    pub fn is_registered(&self, filter: &str) -> bool {
        self.routes.read().contains_key(filter)
    }

    /// Number of registered filters.
    pub fn len(&self) -> usize {
        self.routes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.read().is_empty()
    }

    /// Hand `data` received on `topic` to every matching handler.
    ///
    /// Returns the number of handlers the message was queued for.
    pub fn dispatch(&self, topic: &str, data: &[u8]) -> usize {
        let routes = self.routes.read();
        let mut delivered = 0;

        for (filter, route) in routes.iter() {
            if !topic_matches(filter, topic) {
                continue;
            }

            let message = Message::new(topic, Payload::from_wire(data, route.data_type, self.format));
            match route.tx.try_send(message) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(
                        topic = %topic,
                        filter = %filter,
                        capacity = self.capacity,
                        "Receive queue full, dropping message"
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    tracing::trace!(topic = %topic, "Receive handler gone, dropping message");
                }
            }
        }

        if delivered == 0 {
            tracing::trace!(topic = %topic, "No handler for inbound message");
        }

        delivered
    }

    /// Drop every route, aborting pending deliveries.
    pub fn clear(&self) {
        let mut routes = self.routes.write();
        for (_, route) in routes.drain() {
            route.task.abort();
        }
    }
}

impl Default for TopicRouter {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, Format::default())
    }
}

impl Drop for TopicRouter {
    fn drop(&mut self) {
        self.clear();
    }
}

impl std::fmt::Debug for TopicRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopicRouter")
            .field("capacity", &self.capacity)
            .field("format", &self.format)
            .field("routes", &self.routes.read().keys().collect::<Vec<_>>())
            .finish()
    }
}
