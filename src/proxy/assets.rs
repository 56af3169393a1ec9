//! Cache-first lane for static assets and page loads.

use tracing::{debug, error, warn};

use super::{text_error, OfflineProxy, NETWORK_ERROR};
use crate::cache::{CacheKey, CacheStorage};
use crate::http::{Request, Response};
use crate::transport::Transport;

impl<T: Transport, S: CacheStorage> OfflineProxy<T, S> {
  pub(super) async fn asset(&self, request: Request) -> Response {
    match self.store.match_any(&request).await {
      Ok(Some(cached)) => {
        debug!(url = %request.url(), "serving asset from cache");
        return cached;
      }
      Ok(None) => {}
      Err(e) => warn!(url = %request.url(), error = %e, "cache lookup failed"),
    }

    match self.transport.fetch(request.clone()).await {
      Ok(response) => {
        if response.is_cacheable_status() {
          self.cache_asset(&request, &response).await;
        }
        response
      }
      Err(e) => {
        error!(url = %request.url(), error = %e, "asset fetch failed");
        if request.is_navigation() {
          self.offline_page().await
        } else {
          text_error(NETWORK_ERROR)
        }
      }
    }
  }

  /// Store a copy in the dynamic partition before the original is returned,
  /// so the next request for the same asset is a hit.
  async fn cache_asset(&self, request: &Request, response: &Response) {
    let Some(key) = CacheKey::for_request(request) else {
      return;
    };
    let copy = match response.try_clone() {
      Ok(copy) => copy,
      Err(e) => {
        warn!(%key, error = %e, "cannot duplicate asset response");
        return;
      }
    };

    let partition = self.store.open(&self.caches.dynamic);
    match partition.put(&key, copy).await {
      Ok(()) => debug!(%key, partition = partition.name(), "cached asset"),
      Err(e) => warn!(%key, error = %e, "failed to cache asset"),
    }
  }

  /// The seeded copy if install ran, otherwise the one held in memory.
  async fn offline_page(&self) -> Response {
    let lookup = Request::get(self.offline.url().clone());
    match self.store.match_any(&lookup).await {
      Ok(Some(seeded)) => seeded,
      Ok(None) => self.offline.response(),
      Err(e) => {
        warn!(error = %e, "offline page lookup failed");
        self.offline.response()
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::super::testing::*;
  use super::super::{OfflineFallback, OfflineProxy};
  use crate::cache::{CacheKey, CacheStore, SqliteStorage};
  use crate::config::Config;
  use crate::http::{Request, RequestMode, Response};
  use crate::transport::mock::{upstream, MockTransport};
  use crate::transport::HttpTransport;
  use reqwest::header::{CONTENT_TYPE, LOCATION};
  use reqwest::{Method, StatusCode};

  #[tokio::test]
  async fn test_miss_fetches_and_fills_dynamic_cache() {
    let proxy = proxy(MockTransport::new().respond_with_headers(
      &full("/logo.png"),
      200,
      &[("content-type", "image/png")],
      "PNG",
    ));
    let request = Request::get(url("/logo.png"));

    let mut response = proxy.handle(request.clone()).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CONTENT_TYPE], "image/png");
    assert_eq!(response.text().unwrap(), "PNG");

    let key = CacheKey::for_request(&request).unwrap();
    let mut cached = proxy.store.open("dynamic-cache").get(&key).await.unwrap().unwrap();
    assert_eq!(cached.headers()[CONTENT_TYPE], "image/png");
    assert_eq!(cached.text().unwrap(), "PNG");
  }

  #[tokio::test]
  async fn test_second_request_is_served_from_cache() {
    let proxy = proxy(MockTransport::new().respond(&full("/app.js"), 200, "console.log(1)"));

    proxy.handle(Request::get(url("/app.js"))).await;
    assert_eq!(proxy.transport.calls(), 1);

    let mut again = proxy.handle(Request::get(url("/app.js"))).await;
    assert_eq!(proxy.transport.calls(), 1);
    assert_eq!(again.text().unwrap(), "console.log(1)");
  }

  #[tokio::test]
  async fn test_hit_never_touches_network() {
    let proxy = proxy(MockTransport::new().respond(&full("/style.css"), 200, "fresh"));
    let request = Request::get(url("/style.css"));
    let key = CacheKey::for_request(&request).unwrap();
    proxy
      .store
      .open("dynamic-cache")
      .put(&key, Response::new(StatusCode::OK, "cached"))
      .await
      .unwrap();

    let mut response = proxy.handle(request).await;

    assert_eq!(proxy.transport.calls(), 0);
    assert_eq!(response.text().unwrap(), "cached");
  }

  #[tokio::test]
  async fn test_non_200_passes_through_uncached() {
    let proxy = proxy(
      MockTransport::new()
        .respond(&full("/missing.png"), 404, "not found")
        .respond(&full("/old"), 301, ""),
    );

    let mut missing = proxy.handle(Request::get(url("/missing.png"))).await;
    let moved = proxy.handle(Request::get(url("/old"))).await;

    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    assert_eq!(missing.text().unwrap(), "not found");
    assert_eq!(moved.status(), StatusCode::MOVED_PERMANENTLY);
    assert_eq!(entry_count(&proxy).await, 0);

    proxy.handle(Request::get(url("/missing.png"))).await;
    assert_eq!(proxy.transport.calls(), 3);
  }

  #[tokio::test]
  async fn test_non_get_success_is_not_cached() {
    let proxy = proxy(MockTransport::new().respond(&full("/upload"), 200, "ok"));

    let post = Request::new(Method::POST, url("/upload")).with_body("data");
    let response = proxy.handle(post).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(entry_count(&proxy).await, 0);
  }

  #[tokio::test]
  async fn test_failed_navigation_gets_offline_page() {
    let proxy = proxy(MockTransport::new());
    let request = Request::get(url("/movies/42")).with_mode(RequestMode::Navigate);

    let mut response = proxy.handle(request).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CONTENT_TYPE], "text/html; charset=utf-8");
    assert_eq!(response.text().unwrap(), OFFLINE_PAGE);
  }

  #[tokio::test]
  async fn test_failed_navigation_prefers_seeded_offline_page() {
    let proxy = proxy(MockTransport::new());
    let key = CacheKey::for_request(&Request::get(url("/offline.html"))).unwrap();
    proxy
      .store
      .open("static-cache")
      .put(&key, Response::new(StatusCode::OK, "<h1>seeded</h1>"))
      .await
      .unwrap();

    let request = Request::get(url("/")).with_mode(RequestMode::Navigate);
    let mut response = proxy.handle(request).await;

    assert_eq!(response.text().unwrap(), "<h1>seeded</h1>");
  }

  #[tokio::test]
  async fn test_failed_subresource_is_plain_503() {
    let proxy = proxy(MockTransport::new());

    let mut response = proxy.handle(Request::get(url("/logo.png"))).await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.headers()[CONTENT_TYPE], "text/plain");
    assert_eq!(response.text().unwrap(), "Network error occurred");
  }

  #[tokio::test]
  async fn test_cached_navigation_beats_offline_page() {
    let proxy = proxy(MockTransport::new().respond(&full("/"), 200, "<h1>home</h1>"));

    let navigate = || Request::get(url("/")).with_mode(RequestMode::Navigate);
    proxy.handle(navigate()).await;

    let mut response = proxy.handle(navigate()).await;
    assert_eq!(proxy.transport.calls(), 1);
    assert_eq!(response.text().unwrap(), "<h1>home</h1>");
  }

  #[tokio::test]
  async fn test_redirected_navigation_is_passed_through_uncached() {
    let (base, _requests) = upstream(&[
      (
        "/",
        "HTTP/1.1 302 Found\r\nLocation: /login\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
      ),
      (
        "/login",
        "HTTP/1.1 200 OK\r\nContent-Length: 10\r\nConnection: close\r\n\r\nLOGIN PAGE",
      ),
    ])
    .await;

    let mut config = Config::default();
    config.origin = base.clone();
    let proxy = OfflineProxy::new(
      &config,
      HttpTransport::new(&config.transport).unwrap(),
      CacheStore::new(SqliteStorage::open_in_memory().unwrap()),
      OfflineFallback::new(base.join("/offline.html").unwrap(), OFFLINE_PAGE),
    );

    let request = Request::get(base.clone()).with_mode(RequestMode::Navigate);
    let mut response = proxy.handle(request).await;

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(response.headers()[LOCATION], "/login");
    assert_eq!(response.text().unwrap(), "");
    assert!(proxy.store().partitions().await.unwrap().is_empty());
  }
}
