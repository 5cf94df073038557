//! `serverlist list`: read-only view of the shared list.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use serverlist_core::{
    membership::{age, RETENTION_WINDOW},
    MembershipList, Revision,
};
use serverlist_sync::{fetch_list, SkydStore, StoreKeys};

use super::load_config;

/// Arguments for `serverlist list`.
#[derive(Args, Debug)]
pub struct ListArgs {
    /// Env file with the serverlist settings.
    pub env_file: Option<PathBuf>,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl ListArgs {
    pub fn run(self) -> Result<()> {
        let config = load_config(self.env_file.as_deref())?;
        let keys = StoreKeys::from_config(&config);
        let store = SkydStore::new(&config.skyd_address, &config.skyd_api_password, keys.clone());

        let (list, revision) =
            fetch_list(&store, keys.data_key()).context("failed to fetch server list")?;
        let rows = build_rows(&list, Utc::now());

        if self.json {
            print_json(revision, rows)?;
        } else {
            print_table(&keys.locator(), revision, rows);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
struct MemberRow {
    name: String,
    address: Option<String>,
    last_seen: DateTime<Utc>,
    age: String,
    /// Would be dropped by the next announcement from any host.
    expired: bool,
}

#[derive(Serialize)]
struct ListJson {
    revision: u64,
    members: Vec<MemberRow>,
}

#[derive(Tabled)]
struct MemberTableRow {
    #[tabled(rename = "name")]
    name: String,
    #[tabled(rename = "address")]
    address: String,
    #[tabled(rename = "last seen")]
    last_seen: String,
}

fn build_rows(list: &MembershipList, now: DateTime<Utc>) -> Vec<MemberRow> {
    list.iter()
        .map(|entry| {
            let entry_age = age(entry, now);
            MemberRow {
                name: entry.name.0.clone(),
                address: entry.address.clone(),
                last_seen: entry.last_seen,
                age: format_age(entry_age),
                expired: entry_age > RETENTION_WINDOW,
            }
        })
        .collect()
}

fn print_json(revision: Revision, members: Vec<MemberRow>) -> Result<()> {
    let payload = ListJson {
        revision: revision.0,
        members,
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&payload).context("failed to serialize server list JSON")?
    );
    Ok(())
}

fn print_table(locator: &str, revision: Revision, rows: Vec<MemberRow>) {
    println!(
        "serverlist v{} | {} members | revision {}",
        env!("CARGO_PKG_VERSION"),
        rows.len(),
        revision,
    );
    println!("{}", locator.bright_black());

    if rows.is_empty() {
        println!("No servers announced yet. Run `serverlist announce` on each host.");
        return;
    }

    let expired = rows.iter().filter(|r| r.expired).count();
    let table_rows: Vec<MemberTableRow> = rows
        .into_iter()
        .map(|row| {
            let last_seen = if row.expired {
                format!("{} ago", row.age).yellow().to_string()
            } else {
                format!("{} ago", row.age)
            };
            MemberTableRow {
                name: row.name,
                address: match row.address.as_deref() {
                    None | Some("") => "-".to_string(),
                    Some(addr) => addr.to_string(),
                },
                last_seen,
            }
        })
        .collect();
    let mut table = Table::new(table_rows);
    table.with(Style::rounded());
    println!("{table}");

    if expired > 0 {
        println!("{expired} server(s) past retention; the next announcement prunes them.");
    }
}

fn format_age(age: Duration) -> String {
    let seconds = age.as_secs();
    if seconds < 60 {
        return format!("{seconds}s");
    }
    if seconds < 60 * 60 {
        return format!("{}m", seconds / 60);
    }
    if seconds < 60 * 60 * 24 {
        return format!("{}h", seconds / (60 * 60));
    }
    format!("{}d", seconds / (60 * 60 * 24))
}
