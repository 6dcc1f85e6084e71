//! Core traits and types for the cache store.

use chrono::{DateTime, Utc};
use color_eyre::Result;
use sha2::{Digest, Sha256};

use crate::net::{Request, Response};

/// Normalized identity of a cached request: method plus URL without fragment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
  method: String,
  url: String,
}

impl RequestKey {
  pub fn new(method: &reqwest::Method, url: &url::Url) -> Self {
    let mut url = url.clone();
    url.set_fragment(None);

    Self {
      method: method.as_str().to_ascii_uppercase(),
      url: url.to_string(),
    }
  }

  pub fn from_request(request: &Request) -> Self {
    Self::new(&request.method, &request.url)
  }

  pub fn method(&self) -> &str {
    &self.method
  }

  pub fn url(&self) -> &str {
    &self.url
  }

  /// Stable, fixed-length storage key.
  pub fn cache_hash(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.method.as_bytes());
    hasher.update(b" ");
    hasher.update(self.url.as_bytes());
    hex::encode(hasher.finalize())
  }
}

/// A response restored from a cache generation.
#[derive(Debug, Clone)]
pub struct CachedResponse {
  pub response: Response,
  /// URL the response was stored under
  pub url: String,
  /// When the response was stored
  pub cached_at: DateTime<Utc>,
}

/// Trait for cache store backends.
///
/// A store holds any number of named cache generations. Writing to a
/// generation that does not exist yet creates it.
pub trait CacheStore: Send + Sync + 'static {
  /// Create the named generation if it does not exist.
  fn open(&self, name: &str) -> Result<()>;

  /// Names of all generations, oldest first.
  fn keys(&self) -> Result<Vec<String>>;

  /// Delete a generation and all its entries. Returns whether it existed.
  fn delete(&self, name: &str) -> Result<bool>;

  /// Look up a single entry.
  fn get(&self, name: &str, key: &RequestKey) -> Result<Option<CachedResponse>>;

  /// Store (or overwrite) a single entry.
  fn put(&self, name: &str, key: &RequestKey, response: &Response) -> Result<()>;

  /// Store all entries or none of them.
  fn put_all(&self, name: &str, entries: &[(RequestKey, Response)]) -> Result<()>;

  /// Number of entries in a generation.
  fn entry_count(&self, name: &str) -> Result<usize>;
}
