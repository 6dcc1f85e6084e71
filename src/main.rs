mod cache;
mod config;
mod db;
mod event;
mod host;
mod logging;
mod net;
mod notify;
mod sync;
mod worker;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use reqwest::Method;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

use crate::cache::{CacheStore, MemoryStore, SqliteStore};
use crate::config::Config;
use crate::db::Database;
use crate::event::{Event, Outcome};
use crate::host::ConsoleHost;
use crate::net::{HttpClient, Request};
use crate::notify::{Notification, PushPayload};
use crate::sync::{PendingQueue, SqliteQueue};
use crate::worker::Worker;

#[derive(Parser, Debug)]
#[command(name = "offline-worker")]
#[command(about = "An offline-first service worker for the water monitoring dashboard")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/offline-worker/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Keep caches and the sync queue in memory only
  #[arg(long)]
  memory: bool,

  /// Write logs to a file in the data directory instead of stderr
  #[arg(long)]
  log_file: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Pre-cache resources, then activate (the worker skips waiting)
  Install,
  /// Fetch a URL through the worker
  Fetch {
    url: String,
    #[arg(long, default_value = "GET")]
    method: String,
    /// Value of the Accept header
    #[arg(long)]
    accept: Option<String>,
  },
  /// Deliver a push message (JSON with title, body and data)
  Push { payload: Option<String> },
  /// Click a notification
  Click {
    /// Action button clicked; omit for the notification body
    #[arg(long)]
    action: Option<String>,
    #[arg(long, default_value = "Notification")]
    title: String,
  },
  /// Fire a sync event and drain the pending queue
  Sync {
    /// Defaults to the configured tag
    #[arg(long)]
    tag: Option<String>,
    /// Fire a periodic sync instead of a one-off sync
    #[arg(long)]
    periodic: bool,
  },
  /// Queue a JSON item for the next sync
  Enqueue { payload: String },
  /// List cache generations and the pending queue length
  Caches,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let config = Config::load(args.config.as_deref())?;

  let log_dir = if args.log_file {
    Some(config.data_dir()?)
  } else {
    None
  };
  let _guard = logging::init(log_dir.as_deref())?;

  let store: Arc<dyn CacheStore>;
  let queue: Arc<dyn PendingQueue>;
  if args.memory {
    let db = Database::open_in_memory()?;
    store = Arc::new(MemoryStore::new());
    queue = Arc::new(SqliteQueue::new(&db));
  } else {
    let db = Database::open(&config.data_dir()?.join("worker.db"))?;
    store = Arc::new(SqliteStore::new(&db));
    queue = Arc::new(SqliteQueue::new(&db));
  }

  let network = Arc::new(HttpClient::new()?);
  let worker = Worker::new(
    config.clone(),
    store.clone(),
    network,
    queue.clone(),
    Arc::new(ConsoleHost),
  )?;

  match args.command {
    Command::Install => {
      worker.dispatch(Event::Install).await?;
      worker.dispatch(Event::Activate).await?;
      println!("installed {}", worker.version());
    }
    Command::Fetch {
      url,
      method,
      accept,
    } => {
      if let Err(e) = worker.resume() {
        warn!("worker not active, request will not be intercepted: {}", e);
      }

      let method = Method::from_bytes(method.to_uppercase().as_bytes())
        .map_err(|e| eyre!("Invalid method '{}': {}", method, e))?;
      let mut request = Request::get(config.resolve(&url)?);
      request.method = method;
      if let Some(accept) = accept {
        request = request.with_header("Accept", &accept);
      }

      if let Outcome::Respond(fetched) = worker.dispatch(Event::Fetch(request)).await? {
        let via = if fetched.intercepted { "worker" } else { "passthrough" };
        eprintln!(
          "{} {} ({:?} via {})",
          fetched.response.status, fetched.response.status_text, fetched.source, via
        );
        std::io::stdout().write_all(&fetched.response.body)?;
      }
    }
    Command::Push { payload } => {
      worker
        .dispatch(Event::Push(payload.map(String::into_bytes)))
        .await?;
    }
    Command::Click { action, title } => {
      let payload = PushPayload {
        title,
        body: String::new(),
        data: serde_json::Value::Null,
      };
      let notification = Notification::from_push(payload, &config.notifications);
      worker
        .dispatch(Event::NotificationClick {
          notification,
          action,
        })
        .await?;
    }
    Command::Sync { tag, periodic } => {
      let event = if periodic {
        Event::PeriodicSync {
          tag: tag.unwrap_or_else(|| config.sync.periodic_tag.clone()),
        }
      } else {
        Event::Sync {
          tag: tag.unwrap_or_else(|| config.sync.tag.clone()),
        }
      };

      match worker.dispatch(event).await? {
        Outcome::Synced(report) => println!("synced {} item(s)", report.sent),
        _ => println!("nothing to do for this tag"),
      }
    }
    Command::Enqueue { payload } => {
      let payload: serde_json::Value =
        serde_json::from_str(&payload).map_err(|e| eyre!("Invalid JSON payload: {}", e))?;
      let id = queue.enqueue(&payload)?;
      println!("queued item {}", id);
    }
    Command::Caches => {
      for name in store.keys()? {
        let marker = if name == worker.version() { "*" } else { " " };
        println!("{} {} ({} entries)", marker, name, store.entry_count(&name)?);
      }
      println!("{} pending item(s)", queue.len()?);
    }
  }

  worker.settled().await;

  Ok(())
}
