//! Network-first lane for API calls, with the cache as offline fallback.

use tracing::{debug, error, warn};

use super::{json_error, OfflineProxy, NETWORK_ERROR};
use crate::cache::{CacheKey, CacheStorage};
use crate::http::{Credentials, Request, RequestMode, Response};
use crate::transport::Transport;

impl<T: Transport, S: CacheStorage> OfflineProxy<T, S> {
  pub(super) async fn api(&self, request: Request) -> Response {
    match self.transport.fetch(request.clone()).await {
      Ok(response) => {
        // Non-200 is handed back as-is and does not consult the cache
        if request.is_get() && response.is_cacheable_status() {
          self.cache_api_response(&request, &response);
        }
        response
      }
      Err(e) => {
        error!(url = %request.url(), error = %e, "API request failed");
        self.api_fallback(&request).await
      }
    }
  }

  async fn api_fallback(&self, request: &Request) -> Response {
    if request.is_get() {
      match self.store.match_any(request).await {
        Ok(Some(cached)) => {
          debug!(url = %request.url(), "serving cached API response");
          return cached;
        }
        Ok(None) => {}
        Err(e) => warn!(url = %request.url(), error = %e, "cache lookup failed"),
      }
    }

    let mut response = json_error(NETWORK_ERROR);
    self.cors.apply(request, &mut response);
    response
  }

  /// Store a copy in the API partition without delaying the caller.
  fn cache_api_response(&self, request: &Request, response: &Response) {
    let Some(key) = CacheKey::for_request_as(request, RequestMode::Cors, Credentials::Include)
    else {
      return;
    };
    let copy = match response.try_clone() {
      Ok(copy) => copy,
      Err(e) => {
        warn!(%key, error = %e, "cannot duplicate API response");
        return;
      }
    };

    let partition = self.store.open(&self.caches.api);
    self.spawn_background(async move {
      match partition.put(&key, copy).await {
        Ok(()) => debug!(%key, partition = partition.name(), "cached API response"),
        Err(e) => warn!(%key, error = %e, "failed to cache API response"),
      }
    });
  }
}
