mod cache;
mod commands;
mod config;
mod http;
mod interceptor;
mod logging;
mod proxy;
mod router;
mod transport;

use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;
use tracing::debug;

use crate::cache::{CacheStore, SqliteStorage};

#[derive(Parser, Debug)]
#[command(name = "offline-proxy")]
#[command(about = "An offline caching proxy for client fetch traffic")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/offline-proxy/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Cache database file (overrides storage.path)
  #[arg(long, env = "OFFLINE_PROXY_DB", global = true)]
  db: Option<PathBuf>,

  /// Increase log verbosity (-v info, -vv debug)
  #[arg(short, long, action = clap::ArgAction::Count, global = true)]
  verbose: u8,

  #[command(subcommand)]
  command: commands::Command,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;

  // Keep the guard alive so file logs are flushed on exit
  let _log_guard = logging::init(args.verbose, config.log.directory.as_deref())?;

  let storage = match args.db.as_deref().or(config.storage.path.as_deref()) {
    Some(path) => SqliteStorage::open(path)?,
    None => SqliteStorage::open_default()?,
  };
  debug!(origin = %config.origin, "configuration loaded");

  commands::run(args.command, &config, CacheStore::new(storage)).await
}
