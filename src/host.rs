//! The host the worker runs inside: client control, notifications, windows.

use color_eyre::Result;
use tracing::info;
use url::Url;

use crate::notify::Notification;

/// Services the surrounding platform provides to the worker.
pub trait Host: Send + Sync + 'static {
  /// Activate as soon as installation finishes instead of waiting for old
  /// clients to go away.
  fn skip_waiting(&self) -> Result<()>;

  /// Become the controller of every open client right away.
  fn claim_clients(&self) -> Result<()>;

  fn show_notification(&self, notification: &Notification) -> Result<()>;

  fn close_notification(&self, notification: &Notification) -> Result<()>;

  /// Focus a client showing `url`, or open a new one.
  fn open_window(&self, url: &Url) -> Result<()>;
}

/// Host for running the worker from a terminal: every side effect is
/// reported on stdout and in the log.
pub struct ConsoleHost;

impl Host for ConsoleHost {
  fn skip_waiting(&self) -> Result<()> {
    info!("skip waiting");
    Ok(())
  }

  fn claim_clients(&self) -> Result<()> {
    info!("claiming clients");
    Ok(())
  }

  fn show_notification(&self, notification: &Notification) -> Result<()> {
    info!(title = %notification.title, "showing notification");
    println!("{}", serde_json::to_string_pretty(notification)?);
    Ok(())
  }

  fn close_notification(&self, notification: &Notification) -> Result<()> {
    info!(title = %notification.title, "closing notification");
    Ok(())
  }

  fn open_window(&self, url: &Url) -> Result<()> {
    info!(url = %url, "opening window");
    println!("open {}", url);
    Ok(())
  }
}
