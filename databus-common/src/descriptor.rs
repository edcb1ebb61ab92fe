//! Declarative context and topic descriptions.
//!
//! Both descriptors are plain data, usually loaded from configuration:
//!
//! ```text
//! context: { direction: "PUB", name: "sm", endpoint: "mqtt://localhost:1883/" }
//! topic:   { name: "sm/topic1", type: "string" }
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::endpoint::Endpoint;
use crate::error::{Error, Result};
use crate::topic;

/// Direction of a context. Fixed at creation and inherited by every topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    #[serde(rename = "PUB", alias = "PUBLISHER", alias = "pub")]
    Publisher,
    #[serde(rename = "SUB", alias = "SUBSCRIBER", alias = "sub")]
    Subscriber,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Publisher => "PUB",
            Direction::Subscriber => "SUB",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Advisory payload type of a topic. Not enforced at the wire level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    #[default]
    String,
    Bytes,
    Json,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::String => "string",
            DataType::Bytes => "bytes",
            DataType::Json => "json",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Description of a logical connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextDescriptor {
    /// Publisher or subscriber.
    pub direction: Direction,

    /// Logical name, unique per bus.
    pub name: String,

    /// `<scheme>://<host>:<port>/<path>`; the scheme selects the driver.
    pub endpoint: String,
}

impl ContextDescriptor {
    pub fn new(
        direction: Direction,
        name: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            direction,
            name: name.into(),
            endpoint: endpoint.into(),
        }
    }

    /// Shorthand for a publisher descriptor.
    pub fn publisher(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self::new(Direction::Publisher, name, endpoint)
    }

    /// Shorthand for a subscriber descriptor.
    pub fn subscriber(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self::new(Direction::Subscriber, name, endpoint)
    }

    /// Validate the descriptor and return its parsed endpoint.
    ///
    /// Performs no I/O, so a malformed descriptor is rejected before any
    /// connection attempt.
    pub fn validate(&self) -> Result<Endpoint> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidDescriptor(
                "context name must not be empty".to_string(),
            ));
        }
        Endpoint::parse(&self.endpoint)
    }
}

/// Description of a named channel inside a context.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TopicDescriptor {
    /// `/`-delimited topic name.
    pub name: String,

    /// Advisory data type.
    #[serde(rename = "type", default)]
    pub data_type: DataType,
}

impl TopicDescriptor {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }

    /// A text topic.
    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, DataType::String)
    }

    /// A binary topic.
    pub fn bytes(name: impl Into<String>) -> Self {
        Self::new(name, DataType::Bytes)
    }

    /// A JSON topic.
    pub fn json(name: impl Into<String>) -> Self {
        Self::new(name, DataType::Json)
    }

    /// Validate the topic name for use under a context of `direction`.
    ///
    /// Wildcards are only meaningful for subscribers.
    pub fn validate(&self, direction: Direction) -> Result<()> {
        match direction {
            Direction::Publisher => topic::validate_name(&self.name),
            Direction::Subscriber => topic::validate_filter(&self.name),
        }
    }
}
