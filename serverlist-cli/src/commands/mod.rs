pub mod announce;
pub mod list;
pub mod locator;

use std::path::Path;

use anyhow::{Context, Result};
use serverlist_core::Config;

/// Load settings once, before anything touches the network.
pub(crate) fn load_config(env_file: Option<&Path>) -> Result<Config> {
    let config = Config::load(env_file).context("failed to read config")?;
    tracing::debug!(config = ?config, "loaded configuration");
    Ok(config)
}
