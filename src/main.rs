mod cache;
mod commands;
mod config;
mod connectivity;
mod error;
mod features;
mod http;
mod lifecycle;
mod pipeline;
mod store;
mod sync;
mod worker;

use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cache::{CacheManager, SqliteCacheStorage};
use crate::config::Config;
use crate::connectivity::Connectivity;
use crate::features::Features;
use crate::http::HttpFetcher;
use crate::lifecycle::Controller;
use crate::pipeline::Pipeline;
use crate::store::SqliteStore;

#[derive(Parser, Debug)]
#[command(name = "verso")]
#[command(about = "Offline cache and sync layer for a poetry reader")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/verso/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Behave as if the network were unreachable
  #[arg(long, global = true)]
  offline: bool,

  #[command(subcommand)]
  command: commands::Command,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = Config::load(args.config.as_deref())?;
  let _log_guard = init_logging(&config)?;

  let online = !(args.offline || config.offline);
  let connectivity = Connectivity::new(online);
  info!(version = %config.version, online, "starting");

  let store = Arc::new(
    SqliteStore::open(&config.store_path())
      .map_err(|e| eyre!("Failed to open store {}: {}", config.store_path().display(), e))?,
  );
  let storage = SqliteCacheStorage::open(&config.cache_path())
    .map_err(|e| eyre!("Failed to open cache {}: {}", config.cache_path().display(), e))?;

  let origin = config.origin_url()?;
  let fetcher = Arc::new(HttpFetcher::new(origin.clone(), connectivity.clone())?);
  let features = Arc::new(Features::new(store.clone(), connectivity.clone()));
  let cache = CacheManager::new(storage, config.version.clone());

  let controller = Controller::new(
    store,
    features.clone(),
    cache.clone(),
    fetcher.clone(),
    config.manifest_requests()?,
  )
  .with_auto_skip_waiting(config.skip_waiting);
  let pipeline = Pipeline::new(cache.clone(), fetcher.clone(), &origin);
  let (worker, _join) = worker::spawn(controller, pipeline, fetcher, &connectivity);

  // Each run starts connected or not; queues left from an offline run are
  // replayed the way a reconnect would.
  if online && !features.registered_tags().is_empty() {
    worker.sync(None).await?;
  }

  let ctx = commands::Context {
    config,
    connectivity,
    features,
    cache,
    worker,
  };
  commands::run(&ctx, args.command).await
}

/// Log to `<data_dir>/verso.log` so stdout stays clean for command output.
fn init_logging(config: &Config) -> Result<WorkerGuard> {
  let dir = config.data_dir();
  std::fs::create_dir_all(&dir)
    .map_err(|e| eyre!("Failed to create data directory {}: {}", dir.display(), e))?;

  let appender = tracing_appender::rolling::never(&dir, crate::config::LOG_FILE);
  let (writer, guard) = tracing_appender::non_blocking(appender);

  let filter = EnvFilter::try_from_env("VERSO_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
  tracing_subscriber::registry()
    .with(filter)
    .with(
      tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false),
    )
    .init();

  Ok(guard)
}
