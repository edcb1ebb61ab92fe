//! Databus Core
//!
//! One publish/subscribe facade over pluggable transports:
//!
//! - [`driver`] - Transport driver contract (`TransportDriver`, `Connection`)
//! - [`registry`] - Scheme to driver lookup
//! - [`context`] - Context and topic binding state machine
//! - [`router`] - Per-topic inbound delivery queues
//! - [`bus`] - The `DataBus` dispatch facade
//! - [`msgbus`] - Single-context facade returning two-value `Status` codes
//! - [`memory`] - In-process `mem://` transport
//!
//! # Example
//!
//! ```ignore
//! use databus_core::{DataBus, DriverRegistry, MemoryDriver};
//! use databus_common::{ContextDescriptor, TopicDescriptor};
//!
//! let bus = DataBus::new(DriverRegistry::new().with(MemoryDriver::default()));
//! bus.context_create(ContextDescriptor::publisher("sm", "mem://localhost:1883/")).await?;
//! bus.publish("sm", &TopicDescriptor::string("sm/topic1"), "hello").await?;
//! bus.context_destroy("sm").await?;
//! ```

pub mod bus;
pub mod context;
pub mod driver;
pub mod memory;
pub mod msgbus;
pub mod registry;
pub mod router;
pub mod status;

pub use bus::DataBus;
pub use context::{Context, ContextState, TopicBinding};
pub use driver::{
    Connection, Message, MessageHandler, TransportDriver, check_direction, check_payload,
};
pub use memory::MemoryDriver;
pub use msgbus::MsgBus;
pub use registry::DriverRegistry;
pub use router::TopicRouter;
pub use status::Status;
