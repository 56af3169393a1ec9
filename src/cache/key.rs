//! Cache keys derived from intercepted requests.

use sha2::{Digest, Sha256};
use std::fmt;
use url::Url;

use crate::http::{Credentials, Request, RequestMode};

/// Normalized mode/credentials descriptor stored alongside the URL.
///
/// The default variant is empty, so two requests for the same URL that
/// differ only in mode share a key unless a lane asks for an explicit one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Variant(String);

impl Variant {
  pub fn new(mode: RequestMode, credentials: Credentials) -> Self {
    Self(format!("{}+{}", mode.as_str(), credentials.as_str()))
  }

  /// Restore a variant read back from storage.
  pub fn from_stored(s: impl Into<String>) -> Self {
    Self(s.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }

  pub fn is_default(&self) -> bool {
    self.0.is_empty()
  }
}

/// Lookup identity of a cached response.
///
/// Only GET requests produce keys, so a key in hand always refers to
/// something that may be cached.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
  url: String,
  variant: Variant,
}

impl CacheKey {
  /// Key for a request under the default variant.
  pub fn for_request(request: &Request) -> Option<Self> {
    if !request.is_get() {
      return None;
    }
    Some(Self::new(request.url(), Variant::default()))
  }

  /// Key for a request under an explicit mode/credentials descriptor.
  pub fn for_request_as(
    request: &Request,
    mode: RequestMode,
    credentials: Credentials,
  ) -> Option<Self> {
    if !request.is_get() {
      return None;
    }
    Some(Self::new(request.url(), Variant::new(mode, credentials)))
  }

  pub(crate) fn new(url: &Url, variant: Variant) -> Self {
    Self {
      url: normalize_url(url),
      variant,
    }
  }

  pub(crate) fn from_parts(url: String, variant: Variant) -> Self {
    Self { url, variant }
  }

  pub fn url(&self) -> &str {
    &self.url
  }

  pub fn variant(&self) -> &Variant {
    &self.variant
  }

  /// Stable fixed-length hash used as the storage primary key.
  pub fn storage_hash(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.url.as_bytes());
    hasher.update(b"\n");
    hasher.update(self.variant.as_str().as_bytes());
    hex::encode(hasher.finalize())
  }
}

impl fmt::Display for CacheKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.variant.is_default() {
      write!(f, "{}", self.url)
    } else {
      write!(f, "{} [{}]", self.url, self.variant.as_str())
    }
  }
}

/// Fragments never reach the network, so they never distinguish entries.
pub(crate) fn normalize_url(url: &Url) -> String {
  let mut url = url.clone();
  url.set_fragment(None);
  url.to_string()
}
