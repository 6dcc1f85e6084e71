use futures::future::join_all;
use std::future::Future;
use std::sync::Mutex;
use tokio::task::JoinHandle;

use crate::net::Request;
use crate::notify::Notification;
use crate::sync::DrainReport;
use crate::worker::FetchResponse;

/// Trigger events delivered by the host
#[derive(Debug)]
pub enum Event {
  Install,
  Activate,
  /// A request issued by a controlled page
  Fetch(Request),
  /// A push message, with its payload if it carried one
  Push(Option<Vec<u8>>),
  /// The user clicked a notification; `action` is `None` for the body
  NotificationClick {
    notification: Notification,
    action: Option<String>,
  },
  Sync {
    tag: String,
  },
  PeriodicSync {
    tag: String,
  },
}

impl Event {
  pub fn kind(&self) -> &'static str {
    match self {
      Event::Install => "install",
      Event::Activate => "activate",
      Event::Fetch(_) => "fetch",
      Event::Push(_) => "push",
      Event::NotificationClick { .. } => "notificationclick",
      Event::Sync { .. } => "sync",
      Event::PeriodicSync { .. } => "periodicsync",
    }
  }
}

/// What handling an event produced
#[derive(Debug)]
pub enum Outcome {
  /// The event was handled and has nothing to hand back
  Done,
  /// A fetch was answered
  Respond(FetchResponse),
  /// The pending queue was drained
  Synced(DrainReport),
  /// The event does not concern this worker
  Ignored,
}

/// Work that must finish before the host may tear the worker down.
#[derive(Default)]
pub struct WaitUntil {
  tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl WaitUntil {
  pub fn new() -> Self {
    Self::default()
  }

  /// Run `task` in the background and hold the worker alive until it ends.
  pub fn spawn<F>(&self, task: F)
  where
    F: Future<Output = ()> + Send + 'static,
  {
    let handle = tokio::spawn(task);
    self
      .tasks
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .push(handle);
  }

  /// Wait for every task spawned so far, including ones spawned meanwhile.
  pub async fn settled(&self) {
    loop {
      let tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(|e| e.into_inner()));
      if tasks.is_empty() {
        return;
      }
      join_all(tasks).await;
    }
  }
}
