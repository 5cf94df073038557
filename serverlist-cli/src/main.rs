//! serverlist: keep this host on the fleet's shared server list.
//!
//! # Usage
//!
//! ```text
//! serverlist announce [ENV_FILE] [--max-rounds N] [--deadline-secs S] [--strict-verify]
//!                                [--address IP | --no-address]
//! serverlist list [ENV_FILE] [--json]
//! serverlist locator [ENV_FILE]
//! ```
//!
//! Settings come from the environment, optionally pre-loaded from `ENV_FILE`.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{announce::AnnounceArgs, list::ListArgs, locator::LocatorArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "serverlist",
    version,
    about = "Publish this host on a shared, self-pruning server list",
    long_about = None,
)]
struct Cli {
    /// Log at debug level (RUST_LOG takes precedence when set).
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Add or refresh this host's entry and print the list's locator.
    Announce(AnnounceArgs),

    /// Show the current members of the list.
    List(ListArgs),

    /// Print the locator of the list without touching it.
    Locator(LocatorArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match cli.command {
        Commands::Announce(args) => args.run(),
        Commands::List(args) => args.run(),
        Commands::Locator(args) => args.run(),
    }
}

/// Logs go to stderr; stdout is reserved for the locator and listings.
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
