//! CLI argument parsing.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use databus_common::DataType;

#[derive(Parser, Debug, Clone)]
#[command(name = "databus", version, about = "Publish and subscribe over MQTT, OPC-UA and Zenoh")]
pub struct Cli {
    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Publish a message on a topic.
    Publish(PublishArgs),

    /// Print messages received on the configured topics.
    Subscribe(SubscribeArgs),

    /// Validate a configuration without connecting.
    Check(ConfigArgs),
}

impl Command {
    pub fn config_args(&self) -> &ConfigArgs {
        match self {
            Command::Publish(args) => &args.config,
            Command::Subscribe(args) => &args.config,
            Command::Check(args) => args,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Path to configuration file. Defaults to ./databus.json5, then the
    /// user configuration directory.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Override the context endpoint from the configuration.
    #[arg(long)]
    pub endpoint: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct PublishArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Topic to publish on.
    #[arg(short, long)]
    pub topic: String,

    /// Payload type (string, bytes, json). Defaults to the type declared
    /// for the topic in the configuration, then `string`.
    #[arg(long = "type", value_parser = parse_data_type)]
    pub data_type: Option<DataType>,

    /// Message body. Parsed as JSON when the type is `json`.
    #[arg(short, long)]
    pub message: String,

    /// Number of times to publish.
    #[arg(long, default_value_t = 1)]
    pub count: u64,

    /// Delay between repeated publishes.
    #[arg(long, default_value_t = 1000)]
    pub interval_ms: u64,
}

#[derive(Args, Debug, Clone)]
pub struct SubscribeArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Topic or filter to subscribe to; repeatable. Defaults to the
    /// configured topics.
    #[arg(short, long)]
    pub topic: Vec<String>,

    /// Exit after this many messages.
    #[arg(long)]
    pub max_messages: Option<u64>,
}

fn parse_data_type(s: &str) -> Result<DataType, String> {
    match s.to_ascii_lowercase().as_str() {
        "string" => Ok(DataType::String),
        "bytes" => Ok(DataType::Bytes),
        "json" => Ok(DataType::Json),
        other => Err(format!(
            "unknown type '{}', expected string, bytes or json",
            other
        )),
    }
}
