//! Background resync: drains the pending queue to the sync endpoint.

mod queue;

pub use queue::{PendingItem, PendingQueue, SqliteQueue};

use color_eyre::{eyre::eyre, Result};
use tracing::{debug, error, info};
use url::Url;

use crate::net::{Network, Request};

/// Outcome of a drain that ran to completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
  /// Items transmitted and removed from the queue
  pub sent: usize,
}

/// Transmit every queued item, in order, as a JSON POST to `endpoint`.
///
/// An item leaves the queue only once its own transmission succeeded. The
/// first failure aborts the drain; that item and everything after it stay
/// queued for the next trigger.
pub async fn drain<Q, N>(queue: &Q, network: &N, endpoint: &Url) -> Result<DrainReport>
where
  Q: PendingQueue + ?Sized,
  N: Network,
{
  let items = queue.pending()?;
  if items.is_empty() {
    debug!("sync queue empty");
    return Ok(DrainReport { sent: 0 });
  }

  info!(count = items.len(), endpoint = %endpoint, "draining sync queue");

  let total = items.len();
  for (sent, item) in items.into_iter().enumerate() {
    debug!(item = item.id, queued_at = %item.queued_at, "transmitting");
    if let Err(e) = transmit(network, endpoint, &item).await {
      error!(item = item.id, remaining = total - sent, "failed to sync pending data: {}", e);
      return Err(eyre!(
        "Failed to sync item {} ({} of {} sent): {}",
        item.id,
        sent,
        total,
        e
      ));
    }
    queue.remove(item.id)?;
  }

  info!(sent = total, "sync queue drained");
  Ok(DrainReport { sent: total })
}

async fn transmit<N: Network>(network: &N, endpoint: &Url, item: &PendingItem) -> Result<()> {
  let request = Request::post_json(endpoint.clone(), &item.payload)?;
  let response = network.fetch(&request).await?;

  if !response.ok() {
    return Err(eyre!(
      "sync endpoint answered {} {}",
      response.status,
      response.status_text
    ));
  }

  Ok(())
}
