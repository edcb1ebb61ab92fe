//! Databus Common Library
//!
//! Shared vocabulary for the databus transports and facade:
//!
//! - [`descriptor`] - Context and topic descriptors (`ContextDescriptor`, `TopicDescriptor`)
//! - [`endpoint`] - Strict `<scheme>://<host>:<port>/<path>` parser
//! - [`payload`] - Payload model and wire encoding
//! - [`topic`] - Topic validation and wildcard matching
//! - [`serialization`] - JSON/CBOR encoding and decoding
//! - [`config`] - Configuration loading (JSON5 format)
//! - [`error`] - Error types

pub mod config;
pub mod descriptor;
pub mod endpoint;
pub mod error;
pub mod payload;
pub mod serialization;
pub mod topic;

// Re-export commonly used types at the crate root
pub use config::{
    BusConfig, Credentials, LogFormat, LoggingConfig, MqttConfig, OpcUaConfig, OpcUaSecurity,
    TlsConfig, TransportOptions, ZenohConfig, load_config, parse_config,
};
pub use descriptor::{ContextDescriptor, DataType, Direction, TopicDescriptor};
pub use endpoint::Endpoint;
pub use error::{Error, ErrorKind, Result};
pub use payload::Payload;
pub use serialization::{Format, decode, encode};
pub use topic::topic_matches;

/// Initialize tracing with the given configuration.
///
/// Supports two output formats:
/// - `LogFormat::Text` (default): Human-readable text format
/// - `LogFormat::Json`: Structured JSON format for log aggregation systems
///
/// `RUST_LOG` takes precedence over the configured level.
///
/// # Example
///
/// ```ignore
/// use databus_common::{LoggingConfig, LogFormat, init_tracing};
///
/// let config = LoggingConfig {
///     level: "info".to_string(),
///     format: LogFormat::Json,
/// };
/// init_tracing(&config)?;
/// ```
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
    }

    Ok(())
}
