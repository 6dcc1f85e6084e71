//! SQLite cache store.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::sync::{Arc, Mutex};

use super::traits::{CacheStore, CachedResponse, RequestKey};
use crate::db::{parse_datetime, Database};
use crate::net::Response;

/// SQLite-based cache store implementation.
pub struct SqliteStore {
  conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
  pub fn new(db: &Database) -> Self {
    Self { conn: db.conn() }
  }
}

fn ensure_generation(conn: &Connection, name: &str) -> Result<()> {
  conn
    .execute(
      "INSERT OR IGNORE INTO cache_generations (name) VALUES (?)",
      params![name],
    )
    .map_err(|e| eyre!("Failed to open cache {}: {}", name, e))?;
  Ok(())
}

fn insert_entry(tx: &Transaction<'_>, name: &str, key: &RequestKey, response: &Response) -> Result<()> {
  let headers = serde_json::to_string(&response.headers)
    .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

  tx.execute(
    "INSERT OR REPLACE INTO cache_entries
       (cache_name, entry_key, method, url, status, status_text, headers, body, cached_at)
     VALUES (?, ?, ?, ?, ?, ?, ?, ?, datetime('now'))",
    params![
      name,
      key.cache_hash(),
      key.method(),
      key.url(),
      response.status,
      response.status_text,
      headers,
      response.body,
    ],
  )
  .map_err(|e| eyre!("Failed to store {} in cache {}: {}", key.url(), name, e))?;

  Ok(())
}

impl CacheStore for SqliteStore {
  fn open(&self, name: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    ensure_generation(&conn, name)
  }

  fn keys(&self) -> Result<Vec<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT name FROM cache_generations ORDER BY rowid")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list caches: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read cache name: {}", e))?;

    Ok(names)
  }

  fn delete(&self, name: &str) -> Result<bool> {
    let mut conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute(
      "DELETE FROM cache_entries WHERE cache_name = ?",
      params![name],
    )
    .map_err(|e| eyre!("Failed to delete entries of cache {}: {}", name, e))?;

    let removed = tx
      .execute("DELETE FROM cache_generations WHERE name = ?", params![name])
      .map_err(|e| eyre!("Failed to delete cache {}: {}", name, e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(removed > 0)
  }

  fn get(&self, name: &str, key: &RequestKey) -> Result<Option<CachedResponse>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let row: Option<(String, u16, String, String, Vec<u8>, String)> = conn
      .query_row(
        "SELECT url, status, status_text, headers, body, cached_at FROM cache_entries
         WHERE cache_name = ? AND entry_key = ?",
        params![name, key.cache_hash()],
        |row| {
          Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
          ))
        },
      )
      .optional()
      .map_err(|e| eyre!("Failed to read cache {}: {}", name, e))?;

    match row {
      Some((url, status, status_text, headers, body, cached_at)) => {
        let headers = serde_json::from_str(&headers)
          .map_err(|e| eyre!("Failed to deserialize headers of {}: {}", url, e))?;

        Ok(Some(CachedResponse {
          response: Response {
            status,
            status_text,
            headers,
            body,
          },
          url,
          cached_at: parse_datetime(&cached_at)?,
        }))
      }
      None => Ok(None),
    }
  }

  fn put(&self, name: &str, key: &RequestKey, response: &Response) -> Result<()> {
    self.put_all(name, &[(key.clone(), response.clone())])
  }

  fn put_all(&self, name: &str, entries: &[(RequestKey, Response)]) -> Result<()> {
    let mut conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    ensure_generation(&tx, name)?;
    for (key, response) in entries {
      insert_entry(&tx, name, key, response)?;
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }

  fn entry_count(&self, name: &str) -> Result<usize> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let count: usize = conn
      .query_row(
        "SELECT COUNT(*) FROM cache_entries WHERE cache_name = ?",
        params![name],
        |row| row.get(0),
      )
      .map_err(|e| eyre!("Failed to count entries of cache {}: {}", name, e))?;

    Ok(count)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use reqwest::Method;
  use url::Url;

  fn store() -> SqliteStore {
    SqliteStore::new(&Database::open_in_memory().unwrap())
  }

  fn key(url: &str) -> RequestKey {
    RequestKey::new(&Method::GET, &Url::parse(url).unwrap())
  }

  #[test]
  fn test_put_then_get() {
    let store = store();
    let response = Response::new(200, "<html>dashboard</html>").with_header("content-type", "text/html");

    store
      .put("v1", &key("https://dash.example.com/"), &response)
      .unwrap();

    let cached = store
      .get("v1", &key("https://dash.example.com/"))
      .unwrap()
      .unwrap();
    assert_eq!(cached.response, response);
    assert_eq!(cached.url, "https://dash.example.com/");
  }

  #[test]
  fn test_get_is_scoped_to_generation() {
    let store = store();
    store
      .put("v1", &key("https://dash.example.com/"), &Response::new(200, "old"))
      .unwrap();

    assert!(store
      .get("v2", &key("https://dash.example.com/"))
      .unwrap()
      .is_none());
  }

  #[test]
  fn test_put_overwrites() {
    let store = store();
    let k = key("https://dash.example.com/data.json");
    store.put("v1", &k, &Response::new(200, "first")).unwrap();
    store.put("v1", &k, &Response::new(200, "second")).unwrap();

    assert_eq!(store.get("v1", &k).unwrap().unwrap().response.body, b"second");
    assert_eq!(store.entry_count("v1").unwrap(), 1);
  }

  #[test]
  fn test_keys_in_creation_order() {
    let store = store();
    store.open("v1").unwrap();
    store.open("v2").unwrap();
    store.open("v1").unwrap();

    assert_eq!(store.keys().unwrap(), vec!["v1", "v2"]);
  }

  #[test]
  fn test_delete_removes_entries() {
    let store = store();
    let k = key("https://dash.example.com/");
    store.put("v1", &k, &Response::new(200, "x")).unwrap();

    assert!(store.delete("v1").unwrap());
    assert!(!store.delete("v1").unwrap());
    assert!(store.keys().unwrap().is_empty());
    assert_eq!(store.entry_count("v1").unwrap(), 0);
  }

  #[test]
  fn test_put_all_stores_every_entry() {
    let store = store();
    let entries = vec![
      (key("https://dash.example.com/"), Response::new(200, "index")),
      (key("https://dash.example.com/manifest.json"), Response::new(200, "{}")),
    ];

    store.put_all("v1", &entries).unwrap();
    assert_eq!(store.entry_count("v1").unwrap(), 2);
  }
}
