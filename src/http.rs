//! Request and response types that flow through the proxy.
//!
//! These mirror what a browser fetch hands to an interceptor: an immutable
//! request and a response whose body can be consumed exactly once.

use bytes::Bytes;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use url::Url;

/// How the client issued the request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RequestMode {
  /// Top-level page load
  Navigate,
  SameOrigin,
  #[default]
  NoCors,
  Cors,
}

impl RequestMode {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Navigate => "navigate",
      Self::SameOrigin => "same-origin",
      Self::NoCors => "no-cors",
      Self::Cors => "cors",
    }
  }
}

impl FromStr for RequestMode {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "navigate" => Ok(Self::Navigate),
      "same-origin" => Ok(Self::SameOrigin),
      "no-cors" => Ok(Self::NoCors),
      "cors" => Ok(Self::Cors),
      other => Err(format!("unknown request mode: {}", other)),
    }
  }
}

/// Whether cookies and auth headers travel with the request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Credentials {
  Omit,
  #[default]
  SameOrigin,
  Include,
}

impl Credentials {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Omit => "omit",
      Self::SameOrigin => "same-origin",
      Self::Include => "include",
    }
  }
}

impl FromStr for Credentials {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "omit" => Ok(Self::Omit),
      "same-origin" => Ok(Self::SameOrigin),
      "include" => Ok(Self::Include),
      other => Err(format!("unknown credentials mode: {}", other)),
    }
  }
}

/// An intercepted outbound request. Immutable once built.
#[derive(Debug, Clone)]
pub struct Request {
  method: Method,
  url: Url,
  headers: HeaderMap,
  body: Option<Bytes>,
  mode: RequestMode,
  credentials: Credentials,
}

impl Request {
  pub fn new(method: Method, url: Url) -> Self {
    Self {
      method,
      url,
      headers: HeaderMap::new(),
      body: None,
      mode: RequestMode::default(),
      credentials: Credentials::default(),
    }
  }

  pub fn get(url: Url) -> Self {
    Self::new(Method::GET, url)
  }

  pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
    self.headers.append(name, value);
    self
  }

  pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
    self.body = Some(body.into());
    self
  }

  pub fn with_mode(mut self, mode: RequestMode) -> Self {
    self.mode = mode;
    self
  }

  pub fn with_credentials(mut self, credentials: Credentials) -> Self {
    self.credentials = credentials;
    self
  }

  pub fn method(&self) -> &Method {
    &self.method
  }

  pub fn url(&self) -> &Url {
    &self.url
  }

  pub fn headers(&self) -> &HeaderMap {
    &self.headers
  }

  pub fn body(&self) -> Option<&Bytes> {
    self.body.as_ref()
  }

  pub fn mode(&self) -> RequestMode {
    self.mode
  }

  pub fn credentials(&self) -> Credentials {
    self.credentials
  }

  pub fn is_get(&self) -> bool {
    self.method == Method::GET
  }

  /// True for top-level page loads.
  pub fn is_navigation(&self) -> bool {
    self.mode == RequestMode::Navigate
  }

  /// Value of the `Origin` header, if present and valid UTF-8.
  pub fn origin(&self) -> Option<&str> {
    self
      .headers
      .get(header::ORIGIN)
      .and_then(|v| v.to_str().ok())
  }
}

impl fmt::Display for Request {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} {}", self.method, self.url)
  }
}

/// Errors from consuming a response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BodyError {
  #[error("response body has already been read")]
  AlreadyRead,
}

/// A response body that may be read at most once.
///
/// Anything that needs a second copy has to call [`Response::try_clone`]
/// before the first read.
#[derive(Debug)]
pub struct Body {
  bytes: Option<Bytes>,
}

impl Body {
  pub fn new(bytes: impl Into<Bytes>) -> Self {
    Self {
      bytes: Some(bytes.into()),
    }
  }

  /// Consume the body.
  pub fn read(&mut self) -> Result<Bytes, BodyError> {
    self.bytes.take().ok_or(BodyError::AlreadyRead)
  }
}

/// A response delivered to the caller or stored in a cache partition.
#[derive(Debug)]
pub struct Response {
  status: StatusCode,
  status_text: String,
  headers: HeaderMap,
  body: Body,
}

impl Response {
  pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
    Self {
      status,
      status_text: status.canonical_reason().unwrap_or_default().to_string(),
      headers: HeaderMap::new(),
      body: Body::new(body),
    }
  }

  pub fn with_status_text(mut self, status_text: impl Into<String>) -> Self {
    self.status_text = status_text.into();
    self
  }

  pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
    self.headers.append(name, value);
    self
  }

  pub fn with_headers(mut self, headers: HeaderMap) -> Self {
    self.headers = headers;
    self
  }

  pub fn status(&self) -> StatusCode {
    self.status
  }

  pub fn status_text(&self) -> &str {
    &self.status_text
  }

  pub fn headers(&self) -> &HeaderMap {
    &self.headers
  }

  pub fn headers_mut(&mut self) -> &mut HeaderMap {
    &mut self.headers
  }

  /// Only plain 200 responses are eligible for caching.
  pub fn is_cacheable_status(&self) -> bool {
    self.status == StatusCode::OK
  }

  /// Duplicate the response so both copies can be read independently.
  ///
  /// Fails once the body has been consumed.
  pub fn try_clone(&self) -> Result<Self, BodyError> {
    let bytes = self.body.bytes.clone().ok_or(BodyError::AlreadyRead)?;
    Ok(Self {
      status: self.status,
      status_text: self.status_text.clone(),
      headers: self.headers.clone(),
      body: Body::new(bytes),
    })
  }

  /// Consume the body.
  pub fn read_body(&mut self) -> Result<Bytes, BodyError> {
    self.body.read()
  }

  /// Consume the body and decode it as UTF-8, replacing invalid sequences.
  pub fn text(&mut self) -> Result<String, BodyError> {
    let bytes = self.read_body()?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
  }
}
