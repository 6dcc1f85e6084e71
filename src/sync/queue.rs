//! Durable queue of offline writes awaiting transmission.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};

use crate::db::{parse_datetime, Database};

/// A single queued write.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingItem {
  pub id: i64,
  pub payload: serde_json::Value,
  pub queued_at: DateTime<Utc>,
}

/// Trait for pending-item queue backends. Items come back in the order they
/// were queued.
pub trait PendingQueue: Send + Sync + 'static {
  fn enqueue(&self, payload: &serde_json::Value) -> Result<i64>;

  fn pending(&self) -> Result<Vec<PendingItem>>;

  fn remove(&self, id: i64) -> Result<()>;

  fn len(&self) -> Result<usize>;

  fn is_empty(&self) -> Result<bool> {
    Ok(self.len()? == 0)
  }
}

/// SQLite-backed pending queue.
pub struct SqliteQueue {
  conn: Arc<Mutex<Connection>>,
}

impl SqliteQueue {
  pub fn new(db: &Database) -> Self {
    Self { conn: db.conn() }
  }
}

impl PendingQueue for SqliteQueue {
  fn enqueue(&self, payload: &serde_json::Value) -> Result<i64> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    let data =
      serde_json::to_string(payload).map_err(|e| eyre!("Failed to serialize item: {}", e))?;

    conn
      .execute(
        "INSERT INTO pending_items (payload, queued_at) VALUES (?, datetime('now'))",
        params![data],
      )
      .map_err(|e| eyre!("Failed to queue item: {}", e))?;

    Ok(conn.last_insert_rowid())
  }

  fn pending(&self) -> Result<Vec<PendingItem>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT id, payload, queued_at FROM pending_items ORDER BY id")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let rows = stmt
      .query_map([], |row| {
        Ok((
          row.get::<_, i64>(0)?,
          row.get::<_, String>(1)?,
          row.get::<_, String>(2)?,
        ))
      })
      .map_err(|e| eyre!("Failed to query pending items: {}", e))?
      .collect::<rusqlite::Result<Vec<_>>>()
      .map_err(|e| eyre!("Failed to read pending item: {}", e))?;

    rows
      .into_iter()
      .map(|(id, payload, queued_at)| {
        Ok(PendingItem {
          id,
          payload: serde_json::from_str(&payload)
            .map_err(|e| eyre!("Failed to deserialize pending item {}: {}", id, e))?,
          queued_at: parse_datetime(&queued_at)?,
        })
      })
      .collect()
  }

  fn remove(&self, id: i64) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute("DELETE FROM pending_items WHERE id = ?", params![id])
      .map_err(|e| eyre!("Failed to remove pending item {}: {}", id, e))?;

    Ok(())
  }

  fn len(&self) -> Result<usize> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .query_row("SELECT COUNT(*) FROM pending_items", [], |row| row.get(0))
      .map_err(|e| eyre!("Failed to count pending items: {}", e))
  }
}
