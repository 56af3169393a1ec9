//! Pass-through lane for streaming transport traffic.

use tracing::error;

use super::{json_error, OfflineProxy, CONNECT_FAILED};
use crate::cache::CacheStorage;
use crate::http::{Request, Response};
use crate::transport::Transport;

impl<T: Transport, S: CacheStorage> OfflineProxy<T, S> {
  /// Forward untouched, adapt CORS, never touch the cache.
  pub(super) async fn realtime(&self, request: Request) -> Response {
    let mut response = match self.transport.fetch(request.clone()).await {
      Ok(response) => response,
      Err(e) => {
        error!(url = %request.url(), error = %e, "realtime transport unreachable");
        json_error(CONNECT_FAILED)
      }
    };

    self.cors.apply(&request, &mut response);
    response
  }
}
