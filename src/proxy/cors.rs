use reqwest::header::{
  HeaderValue, ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_ORIGIN,
};
use std::collections::BTreeSet;

use crate::config::normalize_origin;
use crate::http::{Request, Response};

/// Injects credentialed CORS headers for allow-listed origins.
#[derive(Debug, Clone, Default)]
pub struct CorsPolicy {
  allowed: BTreeSet<String>,
}

impl CorsPolicy {
  /// `allowed` must already be normalized, as `Config` stores it.
  pub fn new(allowed: BTreeSet<String>) -> Self {
    Self { allowed }
  }

  pub fn allows(&self, origin: &str) -> bool {
    normalize_origin(origin).is_some_and(|o| self.allowed.contains(&o))
  }

  /// Echo the request's origin back if it is allowed. Status and body are
  /// left alone; other origins get no CORS headers at all.
  pub fn apply(&self, request: &Request, response: &mut Response) {
    let Some(origin) = request.origin() else {
      return;
    };
    if !self.allows(origin) {
      return;
    }
    let Ok(value) = HeaderValue::from_str(origin) else {
      return;
    };

    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, value);
    headers.insert(
      ACCESS_CONTROL_ALLOW_CREDENTIALS,
      HeaderValue::from_static("true"),
    );
  }
}
