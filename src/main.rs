mod cache;
mod config;
mod lifetime;
mod logging;
mod net;
mod worker;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::io::Write;
use std::path::PathBuf;
use url::Url;

use cache::{CacheSource, CacheStorage, SqliteStorage};
use lifetime::Lifetime;
use net::{HttpFetcher, Request};
use worker::notify::StdoutSink;
use worker::sync::NoopQueue;
use worker::{LifecycleHandler, ServiceWorker};

#[derive(Parser, Debug)]
#[command(name = "sprinkler-gateway")]
#[command(about = "Offline cache gateway for the sprinkler controller web app")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/sprinkler-gateway/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Populate the current cache partition with the configured assets
  Install,
  /// Delete every cache partition except the current one
  Activate,
  /// Intercept a request: serve it from cache or fetch it
  Fetch {
    /// Path relative to the origin, or an absolute URL
    target: String,
    /// Treat the request as a top-level page navigation
    #[arg(long)]
    navigate: bool,
    #[arg(short = 'X', long, default_value = "GET")]
    method: String,
  },
  /// Replay pending operations for a sync tag
  Sync {
    /// Defaults to the configured sync tag
    tag: Option<String>,
  },
  /// Show a push notification
  Push {
    /// Notification body; omitted means the default message
    body: Option<String>,
  },
  /// Handle a click on the notification
  Click {
    /// "open-zones", "dismiss", or nothing for a plain click
    action: Option<String>,
  },
  /// List requests stored in the current partition
  Entries,
  /// List cache partitions
  Partitions,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  let config = config::Config::load(args.config.as_deref())?;
  let _log_guard = logging::init(&config::data_dir()?)?;

  let storage = SqliteStorage::open(&config.database_path()?)?;
  let fetcher = HttpFetcher::new(&config)?;
  let worker = ServiceWorker::new(
    &config,
    storage,
    fetcher,
    Box::new(NoopQueue),
    Box::new(StdoutSink),
  )?;

  match args.command {
    Command::Install => {
      worker.install().await?;
      println!("installed {}", config.cache.version);
    }
    Command::Activate => {
      worker.activate().await?;
      println!("active {}", config.cache.version);
    }
    Command::Fetch {
      target,
      navigate,
      method,
    } => {
      let url = resolve_target(&config.origin_url()?, &target)?;
      let request = if navigate {
        Request::navigate(url)
      } else {
        Request::get(url)
      }
      .with_method(&method);

      let mut lifetime = Lifetime::new();
      let result = worker.fetch(&request, &mut lifetime).await?;
      lifetime.settle().await;

      match result.response {
        Some(response) => {
          let source = match result.source {
            CacheSource::Cache => "cache",
            CacheSource::Network => "network",
            CacheSource::Offline => "offline fallback",
            CacheSource::Unavailable => "unavailable",
          };
          match result.cached_at {
            Some(at) => eprintln!("{} ({}, cached {})", response.status, source, at.to_rfc3339()),
            None => eprintln!("{} ({})", response.status, source),
          }
          std::io::stdout()
            .write_all(&response.body)
            .map_err(|e| eyre!("Failed to write response body: {}", e))?;
        }
        None => eprintln!("no response"),
      }
    }
    Command::Sync { tag } => {
      let tag = tag.unwrap_or_else(|| config.sync.tag.clone());
      worker.sync(&tag).await;
    }
    Command::Push { body } => {
      worker.push(body.as_deref()).await?;
    }
    Command::Click { action } => {
      worker.notification_click(action.as_deref()).await?;
    }
    Command::Entries => {
      for key in worker.gateway().storage().keys(&config.cache.version)? {
        println!("{}", key);
      }
    }
    Command::Partitions => {
      for name in worker.gateway().storage().partitions()? {
        let marker = if name == config.cache.version { "*" } else { " " };
        println!("{} {}", marker, name);
      }
    }
  }

  Ok(())
}

/// Absolute URLs are used as-is, anything else is joined onto the origin.
fn resolve_target(origin: &Url, target: &str) -> Result<Url> {
  match Url::parse(target) {
    Ok(url) => Ok(url),
    Err(url::ParseError::RelativeUrlWithoutBase) => origin
      .join(target)
      .map_err(|e| eyre!("Invalid target '{}': {}", target, e)),
    Err(e) => Err(eyre!("Invalid target '{}': {}", target, e)),
  }
}
