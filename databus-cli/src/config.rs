//! Configuration file lookup for the CLI.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

use databus_common::{BusConfig, load_config};

use crate::args::ConfigArgs;

pub const DEFAULT_CONFIG_FILE: &str = "databus.json5";

/// Candidate locations, in lookup order, when `--config` is not given.
pub fn default_locations() -> Vec<PathBuf> {
    let mut locations = vec![PathBuf::from(DEFAULT_CONFIG_FILE)];
    if let Some(dir) = dirs::config_dir() {
        locations.push(dir.join("databus").join(DEFAULT_CONFIG_FILE));
    }
    locations
}

/// Pick the configuration file to load.
pub fn resolve_path(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }

    let locations = default_locations();
    match locations.iter().find(|p| p.is_file()) {
        Some(path) => Ok(path.clone()),
        None => bail!(
            "no configuration file given and none found at {}",
            locations
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ),
    }
}

/// Load the bus configuration, apply CLI overrides, then validate.
pub fn load(args: &ConfigArgs) -> Result<BusConfig> {
    let path = resolve_path(args.config.as_deref())?;

    let mut config: BusConfig = load_config(&path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;

    if let Some(endpoint) = &args.endpoint {
        config.context.endpoint = endpoint.clone();
    }

    config
        .validate()
        .with_context(|| format!("Invalid configuration in {}", path.display()))?;

    Ok(config)
}
