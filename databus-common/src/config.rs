use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::descriptor::{ContextDescriptor, TopicDescriptor};
use crate::error::{Error, Result};
use crate::serialization::Format;

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format (default).
    #[default]
    Text,
    /// Structured JSON format.
    Json,
}

/// Common logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format: "text" or "json".
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Credentials passed through to the transport untouched.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Certificate paths for secured transports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsConfig {
    /// PEM CA certificate used to verify the server.
    pub ca_cert: PathBuf,

    /// PEM client certificate, for mutual TLS.
    #[serde(default)]
    pub client_cert: Option<PathBuf>,

    /// PEM client private key, for mutual TLS.
    #[serde(default)]
    pub client_key: Option<PathBuf>,
}

impl TlsConfig {
    /// Read the CA certificate and the optional client pair.
    pub fn load(&self) -> Result<(Vec<u8>, Option<(Vec<u8>, Vec<u8>)>)> {
        let ca = read_pem(&self.ca_cert)?;
        let client = match (&self.client_cert, &self.client_key) {
            (Some(cert), Some(key)) => Some((read_pem(cert)?, read_pem(key)?)),
            (None, None) => None,
            _ => {
                return Err(Error::Config(
                    "tls.client_cert and tls.client_key must be set together".to_string(),
                ));
            }
        };
        Ok((ca, client))
    }
}

fn read_pem(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| {
        Error::Config(format!(
            "Failed to read certificate '{}': {}",
            path.display(),
            e
        ))
    })
}

/// MQTT transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    /// Client id prefix; the context name and a unique suffix are appended.
    #[serde(default = "default_client_id")]
    pub client_id: String,

    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,

    /// QoS used for both publish and subscribe (0, 1 or 2).
    #[serde(default)]
    pub qos: u8,

    #[serde(default = "default_true")]
    pub clean_session: bool,

    /// Publish with the retain flag.
    #[serde(default)]
    pub retain: bool,
}

fn default_client_id() -> String {
    "databus".to_string()
}

fn default_keep_alive_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            client_id: default_client_id(),
            keep_alive_secs: default_keep_alive_secs(),
            qos: 0,
            clean_session: true,
            retain: false,
        }
    }
}

/// OPC-UA message security.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpcUaSecurity {
    #[default]
    None,
    Sign,
    SignAndEncrypt,
}

/// OPC-UA transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpcUaConfig {
    #[serde(default = "default_application_name")]
    pub application_name: String,

    #[serde(default = "default_application_uri")]
    pub application_uri: String,

    /// PKI directory holding own and trusted certificates.
    #[serde(default)]
    pub pki_dir: Option<PathBuf>,

    #[serde(default)]
    pub trust_server_certs: bool,

    #[serde(default)]
    pub security: OpcUaSecurity,

    /// Subscription publishing interval for subscriber contexts.
    #[serde(default = "default_publishing_interval_ms")]
    pub publishing_interval_ms: u64,
}

fn default_application_name() -> String {
    "databus".to_string()
}

fn default_application_uri() -> String {
    "urn:databus:client".to_string()
}

fn default_publishing_interval_ms() -> u64 {
    100
}

impl Default for OpcUaConfig {
    fn default() -> Self {
        Self {
            application_name: default_application_name(),
            application_uri: default_application_uri(),
            pki_dir: None,
            trust_server_certs: false,
            security: OpcUaSecurity::default(),
            publishing_interval_ms: default_publishing_interval_ms(),
        }
    }
}

/// Zenoh transport settings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ZenohConfig {
    /// "client" connects to a router at the endpoint. "peer" makes
    /// subscribers listen on the endpoint and publishers connect to it.
    #[serde(default = "default_mode")]
    pub mode: String,
}

fn default_mode() -> String {
    "client".to_string()
}

impl Default for ZenohConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
        }
    }
}

/// Settings shared by every transport driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportOptions {
    /// Upper bound on `create_context` network connect.
    #[serde(default = "default_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Upper bound on a single send.
    #[serde(default = "default_timeout_ms")]
    pub send_timeout_ms: u64,

    /// Per-topic inbound queue length before messages are dropped.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Wire format of JSON payloads.
    #[serde(default)]
    pub serialization: Format,

    #[serde(default)]
    pub credentials: Option<Credentials>,

    #[serde(default)]
    pub tls: Option<TlsConfig>,

    #[serde(default)]
    pub mqtt: MqttConfig,

    #[serde(default)]
    pub opcua: OpcUaConfig,

    #[serde(default)]
    pub zenoh: ZenohConfig,
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_channel_capacity() -> usize {
    256
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_timeout_ms(),
            send_timeout_ms: default_timeout_ms(),
            channel_capacity: default_channel_capacity(),
            serialization: Format::default(),
            credentials: None,
            tls: None,
            mqtt: MqttConfig::default(),
            opcua: OpcUaConfig::default(),
            zenoh: ZenohConfig::default(),
        }
    }
}

impl TransportOptions {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    /// Check ranges that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.connect_timeout_ms == 0 || self.send_timeout_ms == 0 {
            return Err(Error::Config("timeouts must be greater than zero".into()));
        }
        if self.channel_capacity == 0 {
            return Err(Error::Config(
                "channel_capacity must be greater than zero".into(),
            ));
        }
        if self.mqtt.qos > 2 {
            return Err(Error::Config(format!(
                "mqtt.qos must be 0, 1 or 2 (got {})",
                self.mqtt.qos
            )));
        }
        match self.zenoh.mode.as_str() {
            "client" | "peer" => {}
            other => {
                return Err(Error::Config(format!(
                    "Invalid Zenoh mode: '{}'. Expected 'client' or 'peer'",
                    other
                )));
            }
        }
        Ok(())
    }
}

/// A complete bus configuration: one context and the topics bound to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    pub context: ContextDescriptor,

    #[serde(default)]
    pub topics: Vec<TopicDescriptor>,

    #[serde(default)]
    pub transport: TransportOptions,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl BusConfig {
    /// Load and validate a JSON5 bus configuration.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let config: Self = load_config(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate descriptors and transport options without any I/O.
    pub fn validate(&self) -> Result<()> {
        self.context.validate()?;
        for topic in &self.topics {
            topic.validate(self.context.direction)?;
        }
        self.transport.validate()
    }
}

/// Load a configuration file in JSON5 format.
pub fn load_config<T: for<'de> Deserialize<'de>>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!(
            "Failed to read config file '{}': {}",
            path.display(),
            e
        ))
    })?;

    json5::from_str(&content).map_err(|e| {
        Error::Config(format!(
            "Failed to parse config file '{}': {}",
            path.display(),
            e
        ))
    })
}

/// Load a configuration from a JSON5 string.
pub fn parse_config<T: for<'de> Deserialize<'de>>(content: &str) -> Result<T> {
    json5::from_str(content).map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
}
