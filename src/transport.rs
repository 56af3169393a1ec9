//! Network transport the proxy forwards requests to.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::config::TransportConfig;
use crate::http::{Request, Response};

/// The network call failed before a complete response arrived.
#[derive(Debug, Error)]
pub enum TransportError {
  #[error("connection to {url} failed: {reason}")]
  Connect { url: Url, reason: String },

  #[error("request to {url} timed out")]
  Timeout { url: Url },

  #[error("failed to read response body from {url}: {reason}")]
  Body { url: Url, reason: String },

  #[error("request to {url} failed: {reason}")]
  Request { url: Url, reason: String },
}

/// Something that can perform a fetch.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
  /// Perform the request. Any HTTP status counts as success; only
  /// transport-level problems are errors.
  async fn fetch(&self, request: Request) -> Result<Response, TransportError>;
}

/// Transport backed by a shared reqwest client.
#[derive(Clone)]
pub struct HttpTransport {
  client: reqwest::Client,
}

impl HttpTransport {
  /// Redirects are not followed: a 3xx reaches the proxy as-is, so the
  /// target page is never stored under the redirecting URL.
  pub fn new(config: &TransportConfig) -> Result<Self> {
    let mut builder = reqwest::Client::builder().redirect(reqwest::redirect::Policy::none());
    if let Some(secs) = config.timeout_secs {
      builder = builder.timeout(Duration::from_secs(secs));
    }

    let client = builder
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client })
  }
}

#[async_trait]
impl Transport for HttpTransport {
  async fn fetch(&self, request: Request) -> Result<Response, TransportError> {
    let url = request.url().clone();

    let mut builder = self
      .client
      .request(request.method().clone(), url.clone())
      .headers(request.headers().clone());
    if let Some(body) = request.body() {
      builder = builder.body(body.clone());
    }

    let response = builder.send().await.map_err(|e| classify(&url, e))?;

    let status = response.status();
    let headers = response.headers().clone();
    let body = response.bytes().await.map_err(|e| TransportError::Body {
      url: url.clone(),
      reason: e.to_string(),
    })?;

    Ok(Response::new(status, body).with_headers(headers))
  }
}

fn classify(url: &Url, err: reqwest::Error) -> TransportError {
  let url = url.clone();
  if err.is_timeout() {
    TransportError::Timeout { url }
  } else if err.is_connect() {
    TransportError::Connect {
      url,
      reason: err.to_string(),
    }
  } else {
    TransportError::Request {
      url,
      reason: err.to_string(),
    }
  }
}

#[cfg(test)]
pub(crate) mod mock {
  //! Scripted transport for tests.

  use super::*;
  use reqwest::header::{HeaderName, HeaderValue};
  use reqwest::StatusCode;
  use std::collections::HashMap;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Mutex;
  use tokio::io::{AsyncReadExt, AsyncWriteExt};
  use tokio::net::{TcpListener, TcpStream};
  use tokio::sync::mpsc;

  const NOT_FOUND: &str = "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";

  /// Local HTTP/1.1 server answering each path with a canned raw response.
  ///
  /// Returns its base URL and the raw requests it receives, in order.
  pub(crate) async fn upstream(
    routes: &[(&'static str, &'static str)],
  ) -> (Url, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = Url::parse(&format!("http://{}/", listener.local_addr().unwrap())).unwrap();
    let routes: HashMap<&'static str, &'static str> = routes.iter().copied().collect();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
      while let Ok((mut socket, _)) = listener.accept().await {
        let raw = read_request(&mut socket).await;
        let path = raw.split_whitespace().nth(1).unwrap_or("/").to_string();
        let _ = tx.send(raw);

        let reply = routes.get(path.as_str()).copied().unwrap_or(NOT_FOUND);
        let _ = socket.write_all(reply.as_bytes()).await;
        let _ = socket.shutdown().await;
      }
    });

    (base, rx)
  }

  async fn read_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
      let n = socket.read(&mut chunk).await.unwrap_or(0);
      if n == 0 {
        break;
      }
      buf.extend_from_slice(&chunk[..n]);

      if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
        let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
        let length = head
          .lines()
          .find_map(|line| line.strip_prefix("content-length:"))
          .and_then(|v| v.trim().parse::<usize>().ok())
          .unwrap_or(0);
        if buf.len() >= end + 4 + length {
          break;
        }
      }
    }
    String::from_utf8_lossy(&buf).into_owned()
  }

  #[derive(Clone)]
  struct Reply {
    status: StatusCode,
    headers: Vec<(&'static str, &'static str)>,
    body: Vec<u8>,
  }

  /// Answers scripted URLs; every other URL behaves as if offline.
  #[derive(Default)]
  pub(crate) struct MockTransport {
    replies: Mutex<HashMap<String, Reply>>,
    calls: AtomicUsize,
  }

  impl MockTransport {
    pub(crate) fn new() -> Self {
      Self::default()
    }

    pub(crate) fn respond(self, url: &str, status: u16, body: &str) -> Self {
      self.respond_with_headers(url, status, &[], body)
    }

    pub(crate) fn respond_with_headers(
      self,
      url: &str,
      status: u16,
      headers: &[(&'static str, &'static str)],
      body: &str,
    ) -> Self {
      let reply = Reply {
        status: StatusCode::from_u16(status).unwrap(),
        headers: headers.to_vec(),
        body: body.as_bytes().to_vec(),
      };
      self.replies.lock().unwrap().insert(url.to_string(), reply);
      self
    }

    /// Number of fetches attempted so far.
    pub(crate) fn calls(&self) -> usize {
      self.calls.load(Ordering::SeqCst)
    }
  }

  #[async_trait]
  impl Transport for MockTransport {
    async fn fetch(&self, request: Request) -> Result<Response, TransportError> {
      self.calls.fetch_add(1, Ordering::SeqCst);

      let reply = self
        .replies
        .lock()
        .unwrap()
        .get(request.url().as_str())
        .cloned();

      match reply {
        Some(reply) => {
          let mut response = Response::new(reply.status, reply.body);
          for (name, value) in reply.headers {
            response = response.with_header(
              HeaderName::from_static(name),
              HeaderValue::from_static(value),
            );
          }
          Ok(response)
        }
        None => Err(TransportError::Connect {
          url: request.url().clone(),
          reason: "network unreachable".to_string(),
        }),
      }
    }
  }
}
