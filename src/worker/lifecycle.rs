//! Install and activate: populating the current cache generation and
//! retiring the old ones.

use color_eyre::{eyre::eyre, Result};
use futures::future::try_join_all;
use tracing::{error, info};

use super::Worker;
use crate::cache::RequestKey;
use crate::net::{Network, Request, Response};

/// Worker lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
  /// Started, not yet installed
  Parsed,
  Installing,
  /// Cache populated, waiting to activate
  Installed,
  Activating,
  /// Controlling pages and intercepting fetches
  Activated,
  /// Install or activation failed; the worker will not be used
  Redundant,
}

impl WorkerState {
  pub fn can_intercept_fetch(&self) -> bool {
    matches!(self, WorkerState::Activated)
  }
}

impl std::fmt::Display for WorkerState {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      WorkerState::Parsed => write!(f, "parsed"),
      WorkerState::Installing => write!(f, "installing"),
      WorkerState::Installed => write!(f, "installed"),
      WorkerState::Activating => write!(f, "activating"),
      WorkerState::Activated => write!(f, "activated"),
      WorkerState::Redundant => write!(f, "redundant"),
    }
  }
}

impl<N: Network> Worker<N> {
  /// Fetch every pre-cache resource and store them all in the current
  /// generation. One failed resource fails the whole install and nothing is
  /// written.
  pub async fn install(&self) -> Result<()> {
    self.transition(WorkerState::Parsed, WorkerState::Installing)?;
    info!(version = %self.version(), "installing");

    match self.precache().await {
      Ok(count) => {
        info!(count, "cached resources");
        self.set_state(WorkerState::Installed);
        self.host.skip_waiting()?;
        Ok(())
      }
      Err(e) => {
        error!("failed to cache resources: {}", e);
        self.set_state(WorkerState::Redundant);
        Err(e)
      }
    }
  }

  async fn precache(&self) -> Result<usize> {
    let fetches = self.urls.precache.iter().map(|url| async move {
      let request = Request::get(url.clone());
      let response = self.network.fetch(&request).await?;
      if !response.ok() {
        return Err(eyre!(
          "Failed to cache {}: {} {}",
          url,
          response.status,
          response.status_text
        ));
      }
      Ok::<(RequestKey, Response), color_eyre::Report>((RequestKey::from_request(&request), response))
    });

    let entries = try_join_all(fetches).await?;
    self.store.put_all(self.version(), &entries)?;

    Ok(entries.len())
  }

  /// Delete every cache generation other than the current one, then take
  /// control of all clients.
  pub async fn activate(&self) -> Result<()> {
    self.transition(WorkerState::Installed, WorkerState::Activating)?;
    info!(version = %self.version(), "activating");

    match self.retire_old_generations() {
      Ok(()) => {
        self.set_state(WorkerState::Activated);
        Ok(())
      }
      Err(e) => {
        error!("failed to activate: {}", e);
        self.set_state(WorkerState::Redundant);
        Err(e)
      }
    }
  }

  fn retire_old_generations(&self) -> Result<()> {
    for name in self.store.keys()? {
      if name != self.version() {
        info!(cache = %name, "deleting old cache");
        self.store.delete(&name)?;
      }
    }
    self.store.open(self.version())?;
    self.host.claim_clients()
  }

  /// Bring up a worker that was already activated in an earlier run.
  pub fn resume(&self) -> Result<()> {
    if !self.store.keys()?.iter().any(|name| name == self.version()) {
      return Err(eyre!(
        "Cache {} not found; run install first",
        self.version()
      ));
    }
    self.transition(WorkerState::Parsed, WorkerState::Activated)
  }
}
