use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::cache::CacheStorage;
use crate::http::{Request, Response};
use crate::proxy::OfflineProxy;
use crate::transport::Transport;

/// An intercepted request together with the obligation to answer it once.
#[derive(Debug)]
pub struct FetchEvent {
  request: Request,
  responder: oneshot::Sender<Response>,
}

impl FetchEvent {
  pub fn new(request: Request) -> (Self, oneshot::Receiver<Response>) {
    let (responder, rx) = oneshot::channel();
    (Self { request, responder }, rx)
  }

  pub fn request(&self) -> &Request {
    &self.request
  }

  /// Resolve the event. Consumes it, so it can only happen once.
  pub fn respond_with(self, response: Response) {
    if self.responder.send(response).is_err() {
      debug!(url = %self.request.url(), "caller went away before the response was ready");
    }
  }
}

/// Adapter that feeds intercepted requests into the proxy.
///
/// Each event is handled on its own task, so a slow upstream only holds up
/// the request waiting on it.
pub struct Interceptor {
  tx: mpsc::UnboundedSender<FetchEvent>,
}

impl Interceptor {
  /// Start the dispatch loop. It stops once every handle is dropped.
  pub fn spawn<T, S>(proxy: Arc<OfflineProxy<T, S>>) -> Self
  where
    T: Transport,
    S: CacheStorage,
  {
    let (tx, mut rx) = mpsc::unbounded_channel::<FetchEvent>();

    tokio::spawn(async move {
      while let Some(event) = rx.recv().await {
        let proxy = Arc::clone(&proxy);
        tokio::spawn(async move {
          let response = proxy.handle(event.request().clone()).await;
          event.respond_with(response);
        });
      }
    });

    Self { tx }
  }

  /// Queue an event whose response the caller will await itself.
  pub fn dispatch(&self, event: FetchEvent) -> Result<()> {
    self
      .tx
      .send(event)
      .map_err(|_| eyre!("Interceptor has shut down"))
  }

  /// Intercept a request and wait for its response.
  pub async fn fetch(&self, request: Request) -> Result<Response> {
    let (event, rx) = FetchEvent::new(request);
    self.dispatch(event)?;
    rx.await
      .map_err(|_| eyre!("Request was dropped without a response"))
  }
}
