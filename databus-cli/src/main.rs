//! Command-line client for the data bus.
//!
//! Publishes to or subscribes from any transport the bus supports,
//! driven by a JSON5 configuration file.

mod args;
mod config;
mod runner;

use anyhow::Result;
use clap::Parser;

use args::{Cli, Command};
use databus_common::{BusConfig, init_tracing};
use databus_core::DataBus;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = config::load(cli.command.config_args())?;
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }

    init_logging(&config)?;

    let registry = runner::registry(&config.transport);
    match &cli.command {
        Command::Check(_) => runner::check(&config, &registry),
        Command::Publish(args) => {
            let bus = DataBus::new(registry);
            runner::publish(&bus, &config, args).await
        }
        Command::Subscribe(args) => {
            let bus = DataBus::new(registry);
            runner::subscribe(&bus, &config, args).await
        }
    }
}

fn init_logging(config: &BusConfig) -> Result<()> {
    init_tracing(&config.logging)?;
    Ok(())
}
