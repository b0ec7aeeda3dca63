//! CLI subcommands and their handlers.

use clap::Subcommand;
use color_eyre::{eyre::eyre, Result};
use reqwest::Method;
use std::sync::Arc;

use crate::cache::{CacheManager, CacheState, SqliteCacheStorage};
use crate::config::Config;
use crate::connectivity::Connectivity;
use crate::features::{Features, ItemId};
use crate::http::{Destination, Request};
use crate::lifecycle::{Effect, HostMessage, Registration, WorkerVersion};
use crate::store::SqliteStore;
use crate::sync::SyncTag;
use crate::worker::WorkerHandle;

#[derive(Subcommand, Debug)]
pub enum Command {
  /// Install the configured version and activate it
  Install,
  /// Run a request through the worker
  Fetch {
    /// Absolute URL, or a path resolved against the origin
    url: String,
    /// Treat the request as a page navigation
    #[arg(long)]
    document: bool,
    #[arg(short = 'X', long, default_value = "GET")]
    method: String,
    /// Print the response body
    #[arg(long)]
    body: bool,
  },
  /// Post a host message, e.g. '{"type":"SKIP_WAITING"}'
  Message { json: String },
  /// Manage favorites
  #[command(subcommand)]
  Favorite(FavoriteCommand),
  /// Track reading progress
  #[command(subcommand)]
  Progress(ProgressCommand),
  /// Rate items from 1 to 5
  #[command(subcommand)]
  Rate(RateCommand),
  /// Replay queued offline changes
  Sync {
    /// sync-favorites, sync-ratings or sync-progress (default: all registered)
    tag: Option<SyncTag>,
  },
  /// Show registration, cache and queue state
  Status,
}

#[derive(Subcommand, Debug)]
pub enum FavoriteCommand {
  Add { id: ItemId },
  Remove { id: ItemId },
  Toggle { id: ItemId },
  List,
  Clear,
}

#[derive(Subcommand, Debug)]
pub enum ProgressCommand {
  Set {
    id: ItemId,
    #[arg(allow_negative_numbers = true)]
    percent: i32,
  },
  Show { id: Option<ItemId> },
}

#[derive(Subcommand, Debug)]
pub enum RateCommand {
  Set {
    id: ItemId,
    #[arg(allow_negative_numbers = true)]
    value: i32,
  },
  Show { id: Option<ItemId> },
}

/// Everything a command handler may touch.
pub struct Context {
  pub config: Config,
  pub connectivity: Connectivity,
  pub features: Arc<Features<SqliteStore>>,
  pub cache: CacheManager<SqliteCacheStorage>,
  pub worker: WorkerHandle,
}

pub async fn run(ctx: &Context, command: Command) -> Result<()> {
  match command {
    Command::Install => {
      let effects = ctx.worker.install().await??;
      if effects.is_empty() {
        println!("{} already installed", ctx.config.version);
      }
      print_effects(&effects);
    }

    Command::Fetch {
      url,
      document,
      method,
      body,
    } => fetch(ctx, &url, document, &method, body).await?,

    Command::Message { json } => {
      let message: HostMessage =
        serde_json::from_str(&json).map_err(|e| eyre!("Invalid host message {}: {}", json, e))?;
      let effects = ctx.worker.message(message).await?;
      if effects.is_empty() {
        println!("nothing waiting to activate");
      }
      print_effects(&effects);
    }

    Command::Favorite(command) => favorite(ctx, command)?,
    Command::Progress(command) => progress(ctx, command)?,
    Command::Rate(command) => rate(ctx, command)?,

    Command::Sync { tag } => {
      if !ctx.connectivity.is_online() {
        return Err(eyre!("offline: queued changes stay until connectivity returns"));
      }
      let effects = ctx.worker.sync(tag).await?;
      if effects.is_empty() {
        println!("nothing to replay");
      }
      print_effects(&effects);
    }

    Command::Status => status(ctx).await?,
  }

  Ok(())
}

async fn fetch(ctx: &Context, url: &str, document: bool, method: &str, body: bool) -> Result<()> {
  let origin = ctx.config.origin_url()?;
  let mut request = Request::resolve(&origin, url)?;
  request.method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
    .map_err(|e| eyre!("Invalid method {}: {}", method, e))?;
  if document {
    request = request.with_destination(Destination::Document);
  }

  let served = ctx.worker.fetch(request).await??;
  println!(
    "{} {} ({})",
    served.response.status,
    served.response.status_text,
    served.source.as_str()
  );
  if body {
    println!("{}", served.response.text());
  }

  // Let the background cache write land before the process exits.
  if let Some(write_back) = served.write_back {
    write_back.await?;
  }
  Ok(())
}

fn favorite(ctx: &Context, command: FavoriteCommand) -> Result<()> {
  let favorites = &ctx.features.favorites;
  match command {
    FavoriteCommand::Add { id } => favorites.add(id)?,
    FavoriteCommand::Remove { id } => favorites.remove(id)?,
    FavoriteCommand::Toggle { id } => {
      let now = favorites.toggle(id)?;
      println!("{} {}", id, if now { "favorited" } else { "unfavorited" });
    }
    FavoriteCommand::Clear => favorites.clear_all()?,
    FavoriteCommand::List => {
      for id in favorites.all() {
        println!("{}", id);
      }
    }
  }
  Ok(())
}

fn progress(ctx: &Context, command: ProgressCommand) -> Result<()> {
  let progress = &ctx.features.progress;
  match command {
    ProgressCommand::Set { id, percent } => {
      let record = progress.update(id, percent)?;
      println!("{}: {}% {}", id, record.progress, record.status.as_str());
    }
    ProgressCommand::Show { id: Some(id) } => {
      let record = progress.get(id);
      println!("{}: {}% {}", id, record.progress, record.status.as_str());
    }
    ProgressCommand::Show { id: None } => {
      for (id, record) in progress.all() {
        let last_read = record
          .last_read
          .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
          .unwrap_or_else(|| "-".to_string());
        println!(
          "{:>6}  {:>3}%  {:<8} {}",
          id,
          record.progress,
          record.status.as_str(),
          last_read
        );
      }
    }
  }
  Ok(())
}

fn rate(ctx: &Context, command: RateCommand) -> Result<()> {
  let ratings = &ctx.features.ratings;
  match command {
    RateCommand::Set { id, value } => {
      let stored = ratings.set(id, value)?;
      println!("{}: {}", id, stars(stored));
    }
    RateCommand::Show { id: Some(id) } => println!("{}: {}", id, stars(ratings.get(id))),
    RateCommand::Show { id: None } => {
      for (id, value) in ratings.all() {
        println!("{:>6}  {}", id, stars(value));
      }
    }
  }
  Ok(())
}

async fn status(ctx: &Context) -> Result<()> {
  let registration = ctx.worker.registration().await?;
  let summary = ctx.features.progress.summary();

  println!("version      {}", ctx.config.version);
  println!("origin       {}", ctx.config.origin);
  println!("online       {}", if ctx.connectivity.is_online() { "yes" } else { "no" });
  println!("registration {}", describe_registration(&registration));
  println!("cache        {}", describe_state(ctx.cache.state()?));

  let generations = ctx
    .cache
    .generations()?
    .into_iter()
    .map(|(name, count)| format!("{} ({})", name, count))
    .collect::<Vec<_>>();
  println!("generations  {}", or_dash(generations.join(", ")));

  let pending = SyncTag::ALL
    .iter()
    .map(|tag| (tag, ctx.features.queue(*tag).len()))
    .filter(|(_, len)| *len > 0)
    .map(|(tag, len)| format!("{}: {}", tag, len))
    .collect::<Vec<_>>();
  println!("pending      {}", or_dash(pending.join(", ")));

  println!("favorites    {}", ctx.features.favorites.all().len());
  println!("ratings      {}", ctx.features.ratings.all().len());
  println!(
    "progress     {} new, {} reading, {} read",
    summary.new, summary.reading, summary.read
  );
  Ok(())
}

fn print_effects(effects: &[Effect]) {
  for effect in effects {
    match effect {
      Effect::Populated { version, entries } => {
        println!("cached {} resources for {}", entries, version)
      }
      Effect::PopulationFailed { version, error } => {
        println!("install of {} failed: {}", version, error)
      }
      Effect::Waiting { version } => println!("{} installed, waiting for SKIP_WAITING", version),
      Effect::Evicted(names) if names.is_empty() => {}
      Effect::Evicted(names) => println!("deleted {}", names.join(", ")),
      Effect::Claimed { version } => println!("{} active", version),
      Effect::Drained(Ok(report)) => println!("{}: replayed {}", report.tag, report.replayed),
      Effect::Drained(Err(e)) => println!("{}: {}", e.tag, e),
    }
  }
}

fn describe_registration(registration: &Registration) -> String {
  let slot = |worker: &Option<WorkerVersion>| {
    worker
      .as_ref()
      .map(|w| format!("{} ({})", w.version, w.state.as_str()))
      .unwrap_or_else(|| "-".to_string())
  };
  format!(
    "active {}, waiting {}, installing {}",
    slot(&registration.active),
    slot(&registration.waiting),
    slot(&registration.installing)
  )
}

fn describe_state(state: CacheState) -> &'static str {
  match state {
    CacheState::NoCache => "not offline-ready",
    CacheState::StaticOnly => "static only",
    CacheState::StaticAndDynamic => "static and dynamic",
  }
}

fn stars(value: u8) -> String {
  if value == 0 {
    return "unrated".to_string();
  }
  "*".repeat(usize::from(value))
}

fn or_dash(s: String) -> String {
  if s.is_empty() {
    "-".to_string()
  } else {
    s
  }
}
