//! In-memory cache store, used when nothing should outlive the process.

use chrono::Utc;
use color_eyre::{eyre::eyre, Result};
use std::collections::HashMap;
use std::sync::Mutex;

use super::traits::{CacheStore, CachedResponse, RequestKey};
use crate::net::Response;

type Generation = HashMap<String, CachedResponse>;

#[derive(Default)]
pub struct MemoryStore {
  // Vec keeps generations in creation order
  generations: Mutex<Vec<(String, Generation)>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

fn generation<'a>(generations: &'a mut Vec<(String, Generation)>, name: &str) -> &'a mut Generation {
  let index = match generations.iter().position(|(n, _)| n == name) {
    Some(index) => index,
    None => {
      generations.push((name.to_string(), HashMap::new()));
      generations.len() - 1
    }
  };
  &mut generations[index].1
}

impl CacheStore for MemoryStore {
  fn open(&self, name: &str) -> Result<()> {
    let mut generations = self
      .generations
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    generation(&mut generations, name);
    Ok(())
  }

  fn keys(&self) -> Result<Vec<String>> {
    let generations = self
      .generations
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(generations.iter().map(|(name, _)| name.clone()).collect())
  }

  fn delete(&self, name: &str) -> Result<bool> {
    let mut generations = self
      .generations
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    let before = generations.len();
    generations.retain(|(n, _)| n != name);
    Ok(generations.len() != before)
  }

  fn get(&self, name: &str, key: &RequestKey) -> Result<Option<CachedResponse>> {
    let generations = self
      .generations
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    Ok(
      generations
        .iter()
        .find(|(n, _)| n == name)
        .and_then(|(_, entries)| entries.get(&key.cache_hash()))
        .cloned(),
    )
  }

  fn put(&self, name: &str, key: &RequestKey, response: &Response) -> Result<()> {
    self.put_all(name, &[(key.clone(), response.clone())])
  }

  fn put_all(&self, name: &str, entries: &[(RequestKey, Response)]) -> Result<()> {
    let mut generations = self
      .generations
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    let generation = generation(&mut generations, name);

    let cached_at = Utc::now();
    for (key, response) in entries {
      generation.insert(
        key.cache_hash(),
        CachedResponse {
          response: response.clone(),
          url: key.url().to_string(),
          cached_at,
        },
      );
    }

    Ok(())
  }

  fn entry_count(&self, name: &str) -> Result<usize> {
    let generations = self
      .generations
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    Ok(
      generations
        .iter()
        .find(|(n, _)| n == name)
        .map_or(0, |(_, entries)| entries.len()),
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use reqwest::Method;
  use url::Url;

  #[test]
  fn test_roundtrip_and_delete() {
    let store = MemoryStore::new();
    let key = RequestKey::new(&Method::GET, &Url::parse("https://dash.example.com/").unwrap());

    store.put("v1", &key, &Response::new(200, "index")).unwrap();
    store.open("v2").unwrap();
    assert_eq!(store.keys().unwrap(), vec!["v1", "v2"]);
    assert_eq!(store.get("v1", &key).unwrap().unwrap().response.body, b"index");

    assert!(store.delete("v1").unwrap());
    assert!(store.get("v1", &key).unwrap().is_none());
    assert_eq!(store.keys().unwrap(), vec!["v2"]);
  }
}
