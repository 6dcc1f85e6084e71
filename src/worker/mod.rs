//! The worker: lifecycle, fetch interception and event dispatch.
//!
//! A `Worker` owns its configuration for its whole life and reaches the
//! outside world only through injected collaborators:
//!
//! - a [`CacheStore`] holding the cache generations
//! - a [`Network`] for live requests
//! - a [`PendingQueue`] of offline writes
//! - a [`Host`] for client control and notifications
//!
//! Each trigger event goes through [`Worker::dispatch`]. Background work a
//! handler starts is tracked, and the host awaits [`Worker::settled`] before
//! letting the worker go.

mod lifecycle;
mod proxy;

pub use lifecycle::WorkerState;
pub use proxy::FetchResponse;

use color_eyre::{eyre::eyre, Result};
use std::sync::{Arc, RwLock};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::cache::CacheStore;
use crate::config::Config;
use crate::event::{Event, Outcome, WaitUntil};
use crate::host::Host;
use crate::net::Network;
use crate::notify::{opens_page, Notification, PushPayload};
use crate::sync::{self, PendingQueue};

/// URLs derived from the configuration once, at startup.
struct Urls {
  precache: Vec<Url>,
  offline: Url,
  sync_endpoint: Url,
  open_page: Url,
}

impl Urls {
  fn resolve(config: &Config) -> Result<Self> {
    Ok(Self {
      precache: config
        .precache
        .iter()
        .map(|url| config.resolve(url))
        .collect::<Result<_>>()?,
      offline: config.resolve(&config.offline_url)?,
      sync_endpoint: config.resolve(&config.sync.endpoint)?,
      open_page: config.resolve(&config.notifications.open_url)?,
    })
  }
}

pub struct Worker<N: Network> {
  config: Config,
  urls: Urls,
  state: RwLock<WorkerState>,
  store: Arc<dyn CacheStore>,
  network: Arc<N>,
  queue: Arc<dyn PendingQueue>,
  host: Arc<dyn Host>,
  background: WaitUntil,
}

impl<N: Network> Worker<N> {
  pub fn new(
    config: Config,
    store: Arc<dyn CacheStore>,
    network: Arc<N>,
    queue: Arc<dyn PendingQueue>,
    host: Arc<dyn Host>,
  ) -> Result<Self> {
    let urls = Urls::resolve(&config)?;

    Ok(Self {
      config,
      urls,
      state: RwLock::new(WorkerState::Parsed),
      store,
      network,
      queue,
      host,
      background: WaitUntil::new(),
    })
  }

  /// Name of the current cache generation.
  pub fn version(&self) -> &str {
    &self.config.version
  }

  /// Handle a single trigger event.
  pub async fn dispatch(&self, event: Event) -> Result<Outcome> {
    debug!(event = event.kind(), state = %self.state(), "dispatching");

    match event {
      Event::Install => self.install().await.map(|_| Outcome::Done),
      Event::Activate => self.activate().await.map(|_| Outcome::Done),
      Event::Fetch(request) => self.handle_fetch(request).await.map(Outcome::Respond),
      Event::Push(payload) => self.handle_push(payload.as_deref()),
      Event::NotificationClick {
        notification,
        action,
      } => self.handle_notification_click(&notification, action.as_deref()),
      Event::Sync { tag } => {
        if tag == self.config.sync.tag {
          self.resync().await
        } else {
          debug!(%tag, "ignoring sync for unknown tag");
          Ok(Outcome::Ignored)
        }
      }
      Event::PeriodicSync { tag } => {
        if tag == self.config.sync.periodic_tag {
          self.resync().await
        } else {
          debug!(%tag, "ignoring periodic sync for unknown tag");
          Ok(Outcome::Ignored)
        }
      }
    }
  }

  /// Wait for all background work started by handlers so far.
  pub async fn settled(&self) {
    self.background.settled().await;
  }

  async fn resync(&self) -> Result<Outcome> {
    let report = sync::drain(self.queue.as_ref(), self.network.as_ref(), &self.urls.sync_endpoint).await?;
    Ok(Outcome::Synced(report))
  }

  fn handle_push(&self, payload: Option<&[u8]>) -> Result<Outcome> {
    let Some(payload) = payload else {
      debug!("push without payload");
      return Ok(Outcome::Ignored);
    };

    let payload = PushPayload::parse(payload).map_err(|e| {
      warn!("{}", e);
      e
    })?;
    let notification = Notification::from_push(payload, &self.config.notifications);
    self.host.show_notification(&notification)?;

    Ok(Outcome::Done)
  }

  fn handle_notification_click(
    &self,
    notification: &Notification,
    action: Option<&str>,
  ) -> Result<Outcome> {
    self.host.close_notification(notification)?;

    if opens_page(action) {
      info!(url = %self.urls.open_page, "notification opened");
      self.host.open_window(&self.urls.open_page)?;
    } else {
      debug!(?action, "notification dismissed");
    }

    Ok(Outcome::Done)
  }

  pub fn state(&self) -> WorkerState {
    *self.state.read().unwrap_or_else(|e| e.into_inner())
  }

  fn set_state(&self, state: WorkerState) {
    let mut current = self.state.write().unwrap_or_else(|e| e.into_inner());
    let from = *current;
    if from != state {
      debug!(%from, to = %state, "state change");
      *current = state;
    }
  }

  /// Move from `from` to `to`, failing if the worker is not in `from`.
  fn transition(&self, from: WorkerState, to: WorkerState) -> Result<()> {
    let mut current = self.state.write().unwrap_or_else(|e| e.into_inner());
    if *current != from {
      let err = eyre!("Invalid worker state: expected {}, got {}", from, *current);
      error!("{}", err);
      return Err(err);
    }
    *current = to;
    Ok(())
  }
}

#[cfg(test)]
pub(crate) mod testing {
  use super::*;
  use crate::cache::MemoryStore;
  use crate::db::Database;
  use crate::host::fake::RecordingHost;
  use crate::net::fake::FakeNetwork;
  use crate::net::Response;
  use crate::sync::SqliteQueue;

  pub const ORIGIN: &str = "https://dash.example.com";

  pub struct Harness {
    pub worker: Worker<FakeNetwork>,
    pub store: Arc<MemoryStore>,
    pub network: Arc<FakeNetwork>,
    pub queue: Arc<SqliteQueue>,
    pub host: Arc<RecordingHost>,
  }

  pub fn config() -> Config {
    Config::from_yaml(
      r#"
version: dash-v2
origin: https://dash.example.com
precache:
  - /
  - /offline.html
  - https://cdn.jsdelivr.net/npm/chart.js
live_hosts:
  - firestore.googleapis.com
"#,
    )
    .unwrap()
  }

  pub fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let network = Arc::new(FakeNetwork::new());
    let queue = Arc::new(SqliteQueue::new(&Database::open_in_memory().unwrap()));
    let host = Arc::new(RecordingHost::default());

    network.route(&format!("{}/", ORIGIN), Response::new(200, "<html>dashboard</html>"));
    network.route(
      &format!("{}/offline.html", ORIGIN),
      Response::new(200, "<html>offline</html>"),
    );
    network.route(
      "https://cdn.jsdelivr.net/npm/chart.js",
      Response::new(200, "/* chart.js */"),
    );

    let worker = Worker::new(
      config(),
      store.clone(),
      network.clone(),
      queue.clone(),
      host.clone(),
    )
    .unwrap();

    Harness {
      worker,
      store,
      network,
      queue,
      host,
    }
  }

  /// A harness whose worker has been installed and activated.
  pub async fn active_harness() -> Harness {
    let h = harness();
    h.worker.dispatch(Event::Install).await.unwrap();
    h.worker.dispatch(Event::Activate).await.unwrap();
    h
  }
}

#[cfg(test)]
mod tests {
  use super::testing::*;
  use super::*;
  use serde_json::json;

  fn notification(h: &Harness) -> Notification {
    let payload = PushPayload::parse(br#"{"title":"Tank low","body":"12%"}"#).unwrap();
    Notification::from_push(payload, &h.worker.config.notifications)
  }

  #[tokio::test]
  async fn test_push_shows_notification() {
    let h = harness();
    let payload = br#"{"title":"Tank low","body":"Tank 2 at 12%","data":{"tank":2}}"#.to_vec();

    let outcome = h.worker.dispatch(Event::Push(Some(payload))).await.unwrap();
    assert!(matches!(outcome, Outcome::Done));
    assert_eq!(h.host.calls(), vec!["show:Tank low"]);
  }

  #[tokio::test]
  async fn test_push_without_payload_is_ignored() {
    let h = harness();
    let outcome = h.worker.dispatch(Event::Push(None)).await.unwrap();
    assert!(matches!(outcome, Outcome::Ignored));
    assert!(h.host.calls().is_empty());
  }

  #[tokio::test]
  async fn test_malformed_push_is_an_error() {
    let h = harness();
    let result = h.worker.dispatch(Event::Push(Some(b"{".to_vec()))).await;
    assert!(result.is_err());
    assert!(h.host.calls().is_empty());
  }

  #[tokio::test]
  async fn test_click_open_and_body_open_page() {
    for action in [Some("open".to_string()), None] {
      let h = harness();
      let event = Event::NotificationClick {
        notification: notification(&h),
        action,
      };
      h.worker.dispatch(event).await.unwrap();
      assert_eq!(
        h.host.calls(),
        vec!["close:Tank low".to_string(), format!("open:{}/", ORIGIN)]
      );
    }
  }

  #[tokio::test]
  async fn test_click_close_only_dismisses() {
    let h = harness();
    let event = Event::NotificationClick {
      notification: notification(&h),
      action: Some("close".to_string()),
    };
    h.worker.dispatch(event).await.unwrap();
    assert_eq!(h.host.calls(), vec!["close:Tank low"]);
  }

  #[tokio::test]
  async fn test_sync_drains_queue() {
    let h = harness();
    h.network
      .route(&format!("{}/api/sync-data", ORIGIN), crate::net::Response::new(200, ""));
    h.queue.enqueue(&json!({"level": 0.4})).unwrap();

    let outcome = h
      .worker
      .dispatch(Event::Sync {
        tag: "background-sync-data".to_string(),
      })
      .await
      .unwrap();

    assert!(matches!(outcome, Outcome::Synced(report) if report.sent == 1));
    assert!(h.queue.is_empty().unwrap());
  }

  #[tokio::test]
  async fn test_periodic_sync_uses_its_own_tag() {
    let h = harness();
    h.queue.enqueue(&json!({"level": 0.4})).unwrap();
    h.network
      .route(&format!("{}/api/sync-data", ORIGIN), crate::net::Response::new(200, ""));

    let ignored = h
      .worker
      .dispatch(Event::PeriodicSync {
        tag: "background-sync-data".to_string(),
      })
      .await
      .unwrap();
    assert!(matches!(ignored, Outcome::Ignored));
    assert_eq!(h.queue.len().unwrap(), 1);

    let synced = h
      .worker
      .dispatch(Event::PeriodicSync {
        tag: "data-sync".to_string(),
      })
      .await
      .unwrap();
    assert!(matches!(synced, Outcome::Synced(_)));
  }

  #[tokio::test]
  async fn test_failed_sync_is_reported_and_keeps_queue() {
    let h = harness();
    h.network.set_offline(true);
    h.queue.enqueue(&json!({"level": 0.4})).unwrap();

    let result = h
      .worker
      .dispatch(Event::Sync {
        tag: "background-sync-data".to_string(),
      })
      .await;
    assert!(result.is_err());
    assert_eq!(h.queue.len().unwrap(), 1);
  }
}
