mod cache;
mod commands;
mod config;
mod dataset;
mod http;
mod logging;
mod worker;

use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;
use std::sync::Arc;

use cache::{MemoryStore, SqliteStore};
use config::StorageBackend;
use worker::HttpNetwork;

#[derive(Parser, Debug)]
#[command(name = "subway-worker")]
#[command(about = "Offline cache worker for the subway report client")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/subway-worker/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Keep caches in memory for this run only
  #[arg(long)]
  memory: bool,

  #[command(subcommand)]
  command: commands::Command,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let mut config = config::Config::load(args.config.as_deref())?;
  if args.memory {
    config.storage.backend = StorageBackend::Memory;
  }

  let _log_guard = logging::init(&config.logging)?;

  let network = Arc::new(HttpNetwork::new(config.worker.origin_url()?)?);

  match config.storage.backend {
    StorageBackend::Sqlite => {
      let store = SqliteStore::open(config.storage.path.as_deref())?;
      commands::execute(args.command, &config, Arc::new(store), network).await
    }
    StorageBackend::Memory => {
      commands::execute(args.command, &config, Arc::new(MemoryStore::new()), network).await
    }
  }
}
