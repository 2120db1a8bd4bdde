mod api;
mod board;
mod cache;
mod commands;
mod config;
mod logging;
mod profile;
mod reminders;
mod tasks;

use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;
use std::sync::Arc;

use crate::api::HttpStore;
use crate::cache::QueryCache;

#[derive(Parser, Debug)]
#[command(name = "applytrack")]
#[command(about = "Track job applications on a status board")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/applytrack/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Backend base url, overriding the config file
  #[arg(long, global = true)]
  url: Option<String>,

  /// Also log to stderr
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: commands::Command,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _log_guard = logging::init(args.verbose)?;

  let mut config = config::Config::load(args.config.as_deref())?;
  if let Some(url) = args.url {
    config.api.url = url;
  }

  let store = HttpStore::new(&config)?;
  let ctx = commands::Context {
    config,
    store: Arc::new(store),
    cache: QueryCache::new(),
  };

  commands::run(&ctx, args.command).await
}
