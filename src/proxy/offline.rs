use bytes::Bytes;
use color_eyre::{eyre::eyre, Result};
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::StatusCode;
use url::Url;

use crate::config::Config;
use crate::http::Response;

const BUILTIN_PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>Offline</title>
</head>
<body>
  <h1>You are offline</h1>
  <p>Check your connection and try again. Pages you have already visited are still available.</p>
</body>
</html>
"#;

/// The document served when a page load fails and nothing is cached.
#[derive(Debug, Clone)]
pub struct OfflineFallback {
  url: Url,
  body: Bytes,
}

impl OfflineFallback {
  pub fn new(url: Url, body: impl Into<Bytes>) -> Self {
    Self {
      url,
      body: body.into(),
    }
  }

  /// Read the configured document, or fall back to the built-in page.
  pub fn load(config: &Config) -> Result<Self> {
    let url = config.resolve_url(&config.offline.url)?;

    let body: Bytes = match &config.offline.path {
      Some(path) => std::fs::read(path)
        .map_err(|e| eyre!("Failed to read offline page {}: {}", path.display(), e))?
        .into(),
      None => Bytes::from_static(BUILTIN_PAGE.as_bytes()),
    };

    Ok(Self::new(url, body))
  }

  pub fn url(&self) -> &Url {
    &self.url
  }

  pub fn response(&self) -> Response {
    Response::new(StatusCode::OK, self.body.clone()).with_header(
      CONTENT_TYPE,
      HeaderValue::from_static("text/html; charset=utf-8"),
    )
  }
}
