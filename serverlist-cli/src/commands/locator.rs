//! `serverlist locator [ENV_FILE]`

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use serverlist_core::KeyConfig;
use serverlist_sync::StoreKeys;

/// Print the list's locator without reading or writing it.
///
/// Only the entropy and tweak are read; skyd and host settings may be absent.
#[derive(Args, Debug)]
pub struct LocatorArgs {
    /// Env file with the serverlist settings.
    pub env_file: Option<PathBuf>,
}

impl LocatorArgs {
    pub fn run(self) -> Result<()> {
        let keys = KeyConfig::load(self.env_file.as_deref()).context("failed to read config")?;
        println!("{}", StoreKeys::from_key_config(&keys).locator());
        Ok(())
    }
}
