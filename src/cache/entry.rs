//! Stored form of a cached response.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::StatusCode;

use super::key::CacheKey;
use crate::http::{BodyError, Response};

/// A response as it lives in a partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
  pub status: u16,
  pub status_text: String,
  /// Header pairs in their original order, values as raw bytes
  pub headers: Vec<(String, Vec<u8>)>,
  pub body: Bytes,
}

impl CachedResponse {
  /// Consume a response into its stored form.
  ///
  /// Reads the body, so callers that still need to return the response
  /// must hand over a clone.
  pub fn from_response(mut response: Response) -> Result<Self, BodyError> {
    let body = response.read_body()?;
    let headers = response
      .headers()
      .iter()
      .map(|(name, value)| {
        (
          name.as_str().to_string(),
          value.as_bytes().to_vec(),
        )
      })
      .collect();

    Ok(Self {
      status: response.status().as_u16(),
      status_text: response.status_text().to_string(),
      headers,
      body,
    })
  }

  /// Rebuild a fresh, unread response.
  ///
  /// Header pairs that no longer parse are dropped.
  pub fn into_response(self) -> Response {
    let mut headers = HeaderMap::with_capacity(self.headers.len());
    for (name, value) in &self.headers {
      if let (Ok(name), Ok(value)) = (
        HeaderName::from_bytes(name.as_bytes()),
        HeaderValue::from_bytes(value),
      ) {
        headers.append(name, value);
      }
    }

    let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::OK);
    Response::new(status, self.body)
      .with_status_text(self.status_text)
      .with_headers(headers)
  }
}

/// A cached response together with its key and write time.
#[derive(Debug, Clone)]
pub struct CachedEntry {
  pub partition: String,
  pub key: CacheKey,
  pub response: CachedResponse,
  pub cached_at: DateTime<Utc>,
}
