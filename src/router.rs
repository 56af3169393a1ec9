//! Request classification into caching lanes.

use std::fmt;

use crate::config::RoutesConfig;
use crate::http::Request;

/// The strategy a request is handled with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lane {
  /// Streaming transport traffic; never cached
  Realtime,
  /// Network first, cache as fallback
  Api,
  /// Cache first, network fills the cache
  Asset,
}

impl fmt::Display for Lane {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Self::Realtime => "realtime",
      Self::Api => "api",
      Self::Asset => "asset",
    };
    f.write_str(name)
  }
}

/// Picks exactly one lane per request from its URL path.
#[derive(Debug, Clone)]
pub struct Router {
  api_prefix: String,
  realtime_marker: String,
}

impl Router {
  pub fn new(routes: &RoutesConfig) -> Self {
    Self {
      api_prefix: routes.api_prefix.clone(),
      realtime_marker: routes.realtime_marker.clone(),
    }
  }

  /// Classify a request. Realtime wins over API, API over assets.
  pub fn classify(&self, request: &Request) -> Lane {
    let path = request.url().path();

    if !self.realtime_marker.is_empty() && path.contains(&self.realtime_marker) {
      Lane::Realtime
    } else if !self.api_prefix.is_empty() && path.starts_with(&self.api_prefix) {
      Lane::Api
    } else {
      Lane::Asset
    }
  }
}
