use thiserror::Error;

use crate::descriptor::Direction;

/// Common error type for databus components.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Malformed endpoint '{endpoint}': {reason}")]
    BadEndpoint { endpoint: String, reason: String },

    #[error("No transport driver registered for scheme '{0}'")]
    UnknownScheme(String),

    #[error("Failed to connect to {endpoint}: {message}")]
    ConnectFailed { endpoint: String, message: String },

    #[error("Failed to bind topic '{topic}': {message}")]
    TopicBindFailed { topic: String, message: String },

    #[error("Failed to unbind topic '{topic}': {message}")]
    TopicUnbindFailed { topic: String, message: String },

    #[error("Failed to send on '{topic}': {message}")]
    SendFailed { topic: String, message: String },

    #[error("Payload of type {actual} cannot be carried by the {transport} transport")]
    TypeMismatch {
        transport: &'static str,
        actual: &'static str,
    },

    #[error("Context has been destroyed")]
    ContextDestroyed,

    #[error("Operation '{operation}' is not allowed on a {direction} context")]
    DirectionMismatch {
        direction: Direction,
        operation: &'static str,
    },

    #[error("Context '{0}' already exists")]
    ContextExists(String),

    #[error("No live context named '{0}'")]
    UnknownContext(String),

    #[error("Invalid topic '{topic}': {reason}")]
    InvalidTopic { topic: String, reason: String },

    #[error("Invalid descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CBOR serialization error: {0}")]
    Cbor(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Fieldless view of [`Error`] for callers that only care about the taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    BadEndpoint,
    UnknownScheme,
    ConnectFailed,
    TopicBindFailed,
    TopicUnbindFailed,
    SendFailed,
    TypeMismatch,
    ContextDestroyed,
    DirectionMismatch,
    ContextExists,
    UnknownContext,
    InvalidTopic,
    InvalidDescriptor,
    Config,
    Serialization,
    Io,
}

impl Error {
    /// Create a malformed-endpoint error.
    pub fn bad_endpoint(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::BadEndpoint {
            endpoint: endpoint.into(),
            reason: reason.into(),
        }
    }

    /// Create a connection failure.
    pub fn connect(endpoint: impl Into<String>, message: impl ToString) -> Self {
        Self::ConnectFailed {
            endpoint: endpoint.into(),
            message: message.to_string(),
        }
    }

    /// Create a topic bind failure.
    pub fn bind(topic: impl Into<String>, message: impl ToString) -> Self {
        Self::TopicBindFailed {
            topic: topic.into(),
            message: message.to_string(),
        }
    }

    /// Create a topic unbind failure.
    pub fn unbind(topic: impl Into<String>, message: impl ToString) -> Self {
        Self::TopicUnbindFailed {
            topic: topic.into(),
            message: message.to_string(),
        }
    }

    /// Create a send failure.
    pub fn send(topic: impl Into<String>, message: impl ToString) -> Self {
        Self::SendFailed {
            topic: topic.into(),
            message: message.to_string(),
        }
    }

    /// Create an invalid-topic error.
    pub fn invalid_topic(topic: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidTopic {
            topic: topic.into(),
            reason: reason.into(),
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::BadEndpoint { .. } => ErrorKind::BadEndpoint,
            Error::UnknownScheme(_) => ErrorKind::UnknownScheme,
            Error::ConnectFailed { .. } => ErrorKind::ConnectFailed,
            Error::TopicBindFailed { .. } => ErrorKind::TopicBindFailed,
            Error::TopicUnbindFailed { .. } => ErrorKind::TopicUnbindFailed,
            Error::SendFailed { .. } => ErrorKind::SendFailed,
            Error::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            Error::ContextDestroyed => ErrorKind::ContextDestroyed,
            Error::DirectionMismatch { .. } => ErrorKind::DirectionMismatch,
            Error::ContextExists(_) => ErrorKind::ContextExists,
            Error::UnknownContext(_) => ErrorKind::UnknownContext,
            Error::InvalidTopic { .. } => ErrorKind::InvalidTopic,
            Error::InvalidDescriptor(_) => ErrorKind::InvalidDescriptor,
            Error::Config(_) => ErrorKind::Config,
            Error::Json(_) | Error::Cbor(_) => ErrorKind::Serialization,
            Error::Io(_) => ErrorKind::Io,
        }
    }
}

impl From<ciborium::ser::Error<std::io::Error>> for Error {
    fn from(e: ciborium::ser::Error<std::io::Error>) -> Self {
        Error::Cbor(e.to_string())
    }
}

impl From<ciborium::de::Error<std::io::Error>> for Error {
    fn from(e: ciborium::de::Error<std::io::Error>) -> Self {
        Error::Cbor(e.to_string())
    }
}

impl From<json5::Error> for Error {
    fn from(e: json5::Error) -> Self {
        Error::Config(e.to_string())
    }
}

/// Result type alias using the databus [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert_eq!(
            Error::bad_endpoint("mqtt://host/", "missing port").kind(),
            ErrorKind::BadEndpoint
        );
        assert_eq!(Error::ContextDestroyed.kind(), ErrorKind::ContextDestroyed);
        assert_eq!(
            Error::Cbor("truncated".into()).kind(),
            ErrorKind::Serialization
        );
    }

    #[test]
    fn test_display_carries_detail() {
        let err = Error::send("sm/topic1", "broker went away");
        assert_eq!(
            err.to_string(),
            "Failed to send on 'sm/topic1': broker went away"
        );

        let err = Error::DirectionMismatch {
            direction: Direction::Publisher,
            operation: "subscribe",
        };
        assert_eq!(
            err.to_string(),
            "Operation 'subscribe' is not allowed on a PUB context"
        );
    }
}
