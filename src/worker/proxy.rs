//! Fetch interception: network first, falling back to the cache.

use color_eyre::Result;
use reqwest::Method;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

use super::Worker;
use crate::cache::RequestKey;
use crate::net::{Network, Request, Response, ResponseSource};

/// The answer to an intercepted (or passed-through) request.
#[derive(Debug, Clone)]
pub struct FetchResponse {
  pub response: Response,
  pub source: ResponseSource,
  /// False when the request went straight to the network
  pub intercepted: bool,
}

impl FetchResponse {
  fn new(response: Response, source: ResponseSource) -> Self {
    Self {
      response,
      source,
      intercepted: true,
    }
  }
}

impl<N: Network> Worker<N> {
  /// Answer a request from a controlled page.
  ///
  /// 1. Try the network; a 200 is stored in the background and returned as is
  /// 2. On network failure, serve the cached copy
  /// 3. With no cached copy, serve the offline document to HTML requests
  /// 4. Otherwise answer with an empty 408
  ///
  /// Requests the worker does not intercept go to the network untouched and
  /// their failures are returned as errors.
  pub async fn handle_fetch(&self, request: Request) -> Result<FetchResponse> {
    if !self.intercepts(&request) {
      debug!(method = %request.method, url = %request.url, "passing through");
      let response = self.network.fetch(&request).await?;
      return Ok(FetchResponse {
        response,
        source: ResponseSource::Network,
        intercepted: false,
      });
    }

    match self.network.fetch(&request).await {
      Ok(response) => {
        if response.status == 200 {
          self.store_in_background(&request, &response);
        }
        Ok(FetchResponse::new(response, ResponseSource::Network))
      }
      Err(e) => {
        debug!(url = %request.url, "network failed, falling back to cache: {}", e);
        Ok(self.fallback(&request))
      }
    }
  }

  fn intercepts(&self, request: &Request) -> bool {
    self.state().can_intercept_fetch() && request.method == Method::GET && !self.is_live(&request.url)
  }

  /// Whether the URL belongs to a backend that must always be live.
  fn is_live(&self, url: &Url) -> bool {
    url.host_str().is_some_and(|host| {
      self
        .config
        .live_hosts
        .iter()
        .any(|pattern| host.contains(pattern.as_str()))
    })
  }

  fn store_in_background(&self, request: &Request, response: &Response) {
    let store = Arc::clone(&self.store);
    let name = self.version().to_string();
    let key = RequestKey::from_request(request);
    let response = response.clone();

    self.background.spawn(async move {
      if let Err(e) = store.put(&name, &key, &response) {
        debug!(url = %key.url(), "failed to store response: {}", e);
      }
    });
  }

  fn fallback(&self, request: &Request) -> FetchResponse {
    if let Some(response) = self.lookup(&RequestKey::from_request(request)) {
      return FetchResponse::new(response, ResponseSource::Cache);
    }

    if request.accepts_html() {
      let offline = RequestKey::new(&Method::GET, &self.urls.offline);
      if let Some(response) = self.lookup(&offline) {
        return FetchResponse::new(response, ResponseSource::OfflineFallback);
      }
      warn!(url = %self.urls.offline, "offline document is not cached");
    }

    FetchResponse::new(Response::timeout(), ResponseSource::Synthetic)
  }

  /// Cache lookup in the current generation; read errors count as a miss.
  fn lookup(&self, key: &RequestKey) -> Option<Response> {
    match self.store.get(self.version(), key) {
      Ok(cached) => cached.map(|c| {
        debug!(url = %c.url, cached_at = %c.cached_at, "serving from cache");
        c.response
      }),
      Err(e) => {
        warn!(url = %key.url(), "cache lookup failed: {}", e);
        None
      }
    }
  }
}
