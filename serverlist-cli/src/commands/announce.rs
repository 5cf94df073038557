//! `serverlist announce`: add or refresh this host on the shared list.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;

use serverlist_core::Config;
use serverlist_sync::{
    AddressResolver, HttpAddressResolver, RetryPolicy, SkydStore, StaticAddress, StoreKeys,
    SyncEngine, SyncOptions, SystemClock, VerifyMode,
};

use super::load_config;

/// Arguments for `serverlist announce`.
#[derive(Args, Debug)]
pub struct AnnounceArgs {
    /// Env file with the serverlist settings.
    pub env_file: Option<PathBuf>,

    /// Give up after this many failed rounds (default: SERVERLIST_MAX_ROUNDS, else never).
    #[arg(long)]
    pub max_rounds: Option<u32>,

    /// Give up once this many seconds have passed since the first round.
    #[arg(long)]
    pub deadline_secs: Option<u64>,

    /// Upper bound of the random wait between failed rounds.
    #[arg(long, default_value_t = 180)]
    pub max_backoff_secs: u64,

    /// Pause between writing the list and checking the write stuck.
    #[arg(long, default_value_t = 3)]
    pub settle_secs: u64,

    /// Require the stored entry to match the written one exactly, not just be fresh.
    #[arg(long)]
    pub strict_verify: bool,

    /// Publish this address instead of looking it up.
    #[arg(long, conflicts_with = "no_address")]
    pub address: Option<String>,

    /// Skip the external address lookup; keeps any address already on the list.
    #[arg(long)]
    pub no_address: bool,
}

impl AnnounceArgs {
    pub fn run(self) -> Result<()> {
        let config = load_config(self.env_file.as_deref())?;
        let keys = StoreKeys::from_config(&config);
        let store = SkydStore::new(&config.skyd_address, &config.skyd_api_password, keys.clone());
        let resolver = self.resolver(&config);
        let options = self.options(&config);

        tracing::info!(
            name = %config.own_name,
            skyd = %config.skyd_address,
            max_rounds = ?options.retry.max_rounds,
            "announcing server",
        );

        let mut engine = SyncEngine::new(
            &store,
            resolver.as_ref(),
            SystemClock,
            *keys.data_key(),
            config.own_name.clone(),
            options,
        );
        let report = engine
            .run()
            .with_context(|| format!("failed to update server list for '{}'", config.own_name))?;

        tracing::info!(
            rounds = report.rounds,
            revision = %report.revision,
            address = report.entry.address.as_deref().unwrap_or(""),
            pruned = report.pruned.len(),
            "announcement verified",
        );
        println!("membership updated: {}", keys.locator());
        Ok(())
    }

    fn resolver(&self, config: &Config) -> Box<dyn AddressResolver> {
        if let Some(address) = &self.address {
            return Box::new(StaticAddress::resolved(address.clone()));
        }
        if self.no_address {
            return Box::new(StaticAddress::unavailable("address lookup disabled"));
        }
        Box::new(HttpAddressResolver::new(config.ip_service.clone()))
    }

    fn options(&self, config: &Config) -> SyncOptions {
        SyncOptions {
            retry: RetryPolicy {
                max_rounds: self.max_rounds.filter(|n| *n > 0).or(config.max_rounds),
                deadline: self.deadline_secs.map(Duration::from_secs),
                max_backoff: Duration::from_secs(self.max_backoff_secs),
                settle: Duration::from_secs(self.settle_secs),
            },
            verify: if self.strict_verify {
                VerifyMode::Exact
            } else {
                VerifyMode::Fresh
            },
            ..SyncOptions::default()
        }
    }
}
