//! Request and response types plus the network seam the worker fetches through.

mod client;

pub use client::HttpClient;

use color_eyre::Result;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::future::Future;
use url::Url;

/// An outgoing request as seen by the worker.
#[derive(Debug, Clone)]
pub struct Request {
  pub method: Method,
  pub url: Url,
  pub headers: Vec<(String, String)>,
  pub body: Option<Vec<u8>>,
}

impl Request {
  pub fn get(url: Url) -> Self {
    Self {
      method: Method::GET,
      url,
      headers: Vec::new(),
      body: None,
    }
  }

  /// Build a JSON POST request.
  pub fn post_json(url: Url, payload: &serde_json::Value) -> Result<Self> {
    Ok(Self {
      method: Method::POST,
      url,
      headers: vec![("Content-Type".to_string(), "application/json".to_string())],
      body: Some(serde_json::to_vec(payload)?),
    })
  }

  pub fn with_header(mut self, name: &str, value: &str) -> Self {
    self.headers.push((name.to_string(), value.to_string()));
    self
  }

  /// Get the first header value with the given name (case-insensitive).
  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(n, _)| n.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }

  /// Whether the request declares it accepts HTML.
  pub fn accepts_html(&self) -> bool {
    self
      .header("accept")
      .is_some_and(|accept| accept.contains("text/html"))
  }
}

/// Where a response handed back to the page came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
  /// Live response from the network
  Network,
  /// Stored copy from the current cache generation
  Cache,
  /// The offline document, served in place of a failed navigation
  OfflineFallback,
  /// Built by the worker itself
  Synthetic,
}

/// A response, either fresh from the network or restored from the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
  pub status: u16,
  pub status_text: String,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
}

impl Response {
  pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
    let status_text = reqwest::StatusCode::from_u16(status)
      .ok()
      .and_then(|s| s.canonical_reason())
      .unwrap_or_default()
      .to_string();

    Self {
      status,
      status_text,
      headers: Vec::new(),
      body: body.into(),
    }
  }

  /// Empty response returned when nothing else can answer the request.
  pub fn timeout() -> Self {
    Self::new(408, Vec::new())
  }

  #[allow(dead_code)]
  pub fn with_header(mut self, name: &str, value: &str) -> Self {
    self.headers.push((name.to_string(), value.to_string()));
    self
  }

  /// Status in the 200-299 range.
  pub fn ok(&self) -> bool {
    (200..300).contains(&self.status)
  }
}

/// Network seam. An `Err` means the network could not be reached at all;
/// HTTP error statuses come back as `Ok` responses.
pub trait Network: Send + Sync + 'static {
  fn fetch(&self, request: &Request) -> impl Future<Output = Result<Response>> + Send;
}

#[cfg(test)]
pub mod fake {
  use super::*;
  use color_eyre::eyre::eyre;
  use std::collections::HashMap;
  use std::sync::atomic::{AtomicBool, Ordering};
  use std::sync::Mutex;

  /// Scriptable network for tests.
  #[derive(Default)]
  pub struct FakeNetwork {
    routes: Mutex<HashMap<String, Response>>,
    failing: Mutex<Vec<String>>,
    offline: AtomicBool,
    fail_from_call: Mutex<Option<usize>>,
    calls: Mutex<Vec<(Method, String)>>,
  }

  impl FakeNetwork {
    pub fn new() -> Self {
      Self::default()
    }

    pub fn route(&self, url: &str, response: Response) {
      self
        .routes
        .lock()
        .unwrap()
        .insert(url.to_string(), response);
    }

    /// Make a single URL unreachable.
    pub fn fail(&self, url: &str) {
      self.failing.lock().unwrap().push(url.to_string());
    }

    /// Make every call from the `n`th (zero-based) onwards unreachable.
    pub fn fail_from_call(&self, n: usize) {
      *self.fail_from_call.lock().unwrap() = Some(n);
    }

    pub fn set_offline(&self, offline: bool) {
      self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<(Method, String)> {
      self.calls.lock().unwrap().clone()
    }
  }

  impl Network for FakeNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response> {
      let url = request.url.to_string();
      let call = {
        let mut calls = self.calls.lock().unwrap();
        calls.push((request.method.clone(), url.clone()));
        calls.len() - 1
      };

      let cut_off = self
        .fail_from_call
        .lock()
        .unwrap()
        .is_some_and(|n| call >= n);

      if cut_off
        || self.offline.load(Ordering::SeqCst)
        || self.failing.lock().unwrap().contains(&url)
      {
        return Err(eyre!("Failed to fetch {}: network unreachable", url));
      }

      Ok(
        self
          .routes
          .lock()
          .unwrap()
          .get(&url)
          .cloned()
          .unwrap_or_else(|| Response::new(404, Vec::new())),
      )
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
  }

  #[test]
  fn test_accepts_html() {
    let nav = Request::get(url("https://dash.example.com/"))
      .with_header("Accept", "text/html,application/xhtml+xml");
    assert!(nav.accepts_html());

    let json = Request::get(url("https://dash.example.com/data")).with_header("accept", "application/json");
    assert!(!json.accepts_html());
  }

  #[test]
  fn test_missing_accept_is_not_html() {
    assert!(!Request::get(url("https://dash.example.com/")).accepts_html());
  }

  #[test]
  fn test_timeout_response() {
    let response = Response::timeout();
    assert_eq!(response.status, 408);
    assert_eq!(response.status_text, "Request Timeout");
    assert!(response.body.is_empty());
    assert!(!response.ok());
  }

  #[test]
  fn test_post_json_sets_content_type() {
    let request =
      Request::post_json(url("https://dash.example.com/api/sync-data"), &serde_json::json!({"ph": 7.1}))
        .unwrap();
    assert_eq!(request.method, Method::POST);
    assert_eq!(request.header("content-type"), Some("application/json"));
    assert_eq!(request.body.as_deref(), Some(br#"{"ph":7.1}"#.as_slice()));
  }
}
