//! The offline caching proxy.
//!
//! [`OfflineProxy::handle`] is the whole policy: classify the request, run
//! its lane, return exactly one response. It never fails; every transport
//! or cache problem is turned into a synthesized response and logged.

mod api;
mod assets;
mod cors;
mod lifecycle;
mod offline;
mod realtime;

pub use cors::CorsPolicy;
pub use offline::OfflineFallback;

use bytes::Bytes;
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::StatusCode;
use std::future::Future;
use std::sync::{Mutex, PoisonError};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::cache::{CacheStorage, CacheStore};
use crate::config::{CachesConfig, Config};
use crate::http::{Request, Response};
use crate::router::{Lane, Router};
use crate::transport::Transport;

/// Body of the 503 returned when the realtime transport is unreachable.
pub const CONNECT_FAILED: &str = "Failed to connect to server";
/// Body of the 503 returned when the network fails and nothing is cached.
pub const NETWORK_ERROR: &str = "Network error occurred";

pub struct OfflineProxy<T: Transport, S: CacheStorage> {
  transport: T,
  store: CacheStore<S>,
  router: Router,
  cors: CorsPolicy,
  caches: CachesConfig,
  offline: OfflineFallback,
  /// Cache writes still running after their response was returned
  pending: Mutex<JoinSet<()>>,
}

impl<T: Transport, S: CacheStorage> OfflineProxy<T, S> {
  pub fn new(config: &Config, transport: T, store: CacheStore<S>, offline: OfflineFallback) -> Self {
    Self {
      transport,
      store,
      router: Router::new(&config.routes),
      cors: CorsPolicy::new(config.allowed_origins.clone()),
      caches: config.caches.clone(),
      offline,
      pending: Mutex::new(JoinSet::new()),
    }
  }

  #[cfg(test)]
  pub fn store(&self) -> &CacheStore<S> {
    &self.store
  }

  /// Resolve one intercepted request.
  pub async fn handle(&self, request: Request) -> Response {
    let lane = self.router.classify(&request);
    debug!(%lane, method = %request.method(), url = %request.url(), "intercepted");

    match lane {
      Lane::Realtime => self.realtime(request).await,
      Lane::Api => self.api(request).await,
      Lane::Asset => self.asset(request).await,
    }
  }

  /// Wait for every background cache write started so far.
  pub async fn flush(&self) {
    let mut pending = {
      let mut guard = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
      std::mem::take(&mut *guard)
    };

    while let Some(result) = pending.join_next().await {
      if let Err(e) = result {
        warn!(error = %e, "background cache write panicked");
      }
    }
  }

  /// Run a cache write without holding up the response.
  fn spawn_background<F>(&self, task: F)
  where
    F: Future<Output = ()> + Send + 'static,
  {
    let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
    // Reap finished writes so the set does not grow with every request
    while pending.try_join_next().is_some() {}
    pending.spawn(task);
  }
}

/// `{"error": message}` with status 503.
pub(crate) fn json_error(message: &str) -> Response {
  let body = serde_json::json!({ "error": message }).to_string();
  Response::new(StatusCode::SERVICE_UNAVAILABLE, body)
    .with_header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
}

/// Plain-text 503.
pub(crate) fn text_error(message: &'static str) -> Response {
  Response::new(StatusCode::SERVICE_UNAVAILABLE, Bytes::from_static(message.as_bytes()))
    .with_header(CONTENT_TYPE, HeaderValue::from_static("text/plain"))
}


#[cfg(test)]
mod tests {
  use super::testing::*;
  use super::*;
  use crate::transport::mock::MockTransport;

  #[test]
  fn test_json_error_shape() {
    let mut response = json_error(NETWORK_ERROR);
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
    assert_eq!(response.text().unwrap(), r#"{"error":"Network error occurred"}"#);
  }

  #[tokio::test]
  async fn test_every_lane_resolves_while_offline() {
    let proxy = proxy(MockTransport::new());

    for path in ["/socket.io/?EIO=4", "/api/movies", "/logo.png"] {
      let response = proxy.handle(Request::get(url(path))).await;
      assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE, "{}", path);
    }
    assert_eq!(proxy.transport.calls(), 3);
  }

  #[tokio::test]
  async fn test_flush_with_nothing_pending() {
    let proxy = proxy(MockTransport::new());
    proxy.flush().await;
    assert_eq!(entry_count(&proxy).await, 0);
  }
}
