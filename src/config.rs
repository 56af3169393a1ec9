use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use url::Url;

/// Environment variable holding extra allowed origins, comma-separated.
pub const ALLOWED_ORIGINS_ENV: &str = "OFFLINE_PROXY_ALLOWED_ORIGINS";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Origin the client app is served from; relative URLs resolve against it
  pub origin: Url,
  /// Origins that get CORS headers injected on realtime and error responses
  #[serde(deserialize_with = "deserialize_origin_set")]
  pub allowed_origins: BTreeSet<String>,
  pub routes: RoutesConfig,
  pub caches: CachesConfig,
  pub offline: OfflineConfig,
  /// URLs fetched and stored in the static shell partition on install
  pub precache: Vec<String>,
  pub storage: StorageConfig,
  pub transport: TransportConfig,
  pub log: LogConfig,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      origin: default_origin(),
      allowed_origins: BTreeSet::new(),
      routes: RoutesConfig::default(),
      caches: CachesConfig::default(),
      offline: OfflineConfig::default(),
      precache: Vec::new(),
      storage: StorageConfig::default(),
      transport: TransportConfig::default(),
      log: LogConfig::default(),
    }
  }
}

fn default_origin() -> Url {
  Url::parse("http://localhost:3000").expect("static URL is valid")
}

fn deserialize_origin_set<'de, D>(deserializer: D) -> Result<BTreeSet<String>, D::Error>
where
  D: serde::Deserializer<'de>,
{
  let v: Vec<String> = Vec::deserialize(deserializer)?;
  Ok(v.iter().filter_map(|s| normalize_origin(s)).collect())
}

/// Origins compare without trailing slashes and case-insensitively on scheme/host.
pub(crate) fn normalize_origin(origin: &str) -> Option<String> {
  let trimmed = origin.trim().trim_end_matches('/');
  if trimmed.is_empty() {
    return None;
  }
  Some(trimmed.to_ascii_lowercase())
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RoutesConfig {
  /// Paths starting with this go to the API lane
  pub api_prefix: String,
  /// Paths containing this go to the realtime lane
  pub realtime_marker: String,
}

impl Default for RoutesConfig {
  fn default() -> Self {
    Self {
      api_prefix: "/api/".to_string(),
      realtime_marker: "/socket.io/".to_string(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CachesConfig {
  pub api: String,
  pub dynamic: String,
  /// Holds the offline document and precached URLs
  pub static_shell: String,
}

impl Default for CachesConfig {
  fn default() -> Self {
    Self {
      api: "api-cache".to_string(),
      dynamic: "dynamic-cache".to_string(),
      static_shell: "static-cache".to_string(),
    }
  }
}

impl CachesConfig {
  /// Every partition name this configuration owns.
  pub fn names(&self) -> BTreeSet<&str> {
    [
      self.api.as_str(),
      self.dynamic.as_str(),
      self.static_shell.as_str(),
    ]
    .into_iter()
    .collect()
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OfflineConfig {
  /// HTML file served for failed navigations; a built-in page is used if unset
  pub path: Option<PathBuf>,
  /// URL the document is stored under, relative to `origin`
  pub url: String,
}

impl Default for OfflineConfig {
  fn default() -> Self {
    Self {
      path: None,
      url: "/offline.html".to_string(),
    }
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
  /// SQLite file (default: $XDG_DATA_HOME/offline-proxy/cache.db)
  pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
  /// Per-request timeout; none by default so the network decides when to fail
  pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LogConfig {
  /// Write daily-rotated log files here in addition to stderr
  pub directory: Option<PathBuf>,
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./offline-proxy.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/offline-proxy/config.yaml
  ///
  /// With no file found the defaults are used. Extra origins from
  /// `OFFLINE_PROXY_ALLOWED_ORIGINS` are merged in either way.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Self::default(),
    };

    let extra = std::env::var(ALLOWED_ORIGINS_ENV).unwrap_or_default();
    Ok(config.with_extra_origins(&extra))
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("offline-proxy.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("offline-proxy").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let mut config = Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    // Relative offline document paths are relative to the config file
    if let (Some(doc), Some(dir)) = (config.offline.path.as_mut(), path.parent()) {
      if doc.is_relative() {
        let joined = dir.join(&*doc);
        *doc = joined;
      }
    }

    Ok(config)
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    Ok(config)
  }

  /// Merge a comma-separated list of origins into the allow-list.
  pub fn with_extra_origins(mut self, list: &str) -> Self {
    self
      .allowed_origins
      .extend(list.split(',').filter_map(normalize_origin));
    self
  }

  /// Resolve a possibly relative URL against the app origin.
  pub fn resolve_url(&self, input: &str) -> Result<Url> {
    self
      .origin
      .join(input)
      .map_err(|e| eyre!("Invalid URL '{}': {}", input, e))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_empty_yaml_gives_defaults() {
    let config = Config::from_yaml("{}").unwrap();
    assert_eq!(config.origin.as_str(), "http://localhost:3000/");
    assert_eq!(config.routes.api_prefix, "/api/");
    assert_eq!(config.routes.realtime_marker, "/socket.io/");
    assert_eq!(config.caches.api, "api-cache");
    assert_eq!(config.caches.dynamic, "dynamic-cache");
    assert_eq!(config.offline.url, "/offline.html");
    assert!(config.transport.timeout_secs.is_none());
  }

  #[test]
  fn test_full_yaml() {
    let yaml = r#"
origin: https://app.example.com
allowed_origins:
  - https://app.example.com/
  - HTTPS://Admin.Example.com
routes:
  api_prefix: /v2/
caches:
  api: api-cache-v2
precache:
  - /
  - /index.html
transport:
  timeout_secs: 10
"#;
    let config = Config::from_yaml(yaml).unwrap();
    assert!(config.allowed_origins.contains("https://app.example.com"));
    assert!(config.allowed_origins.contains("https://admin.example.com"));
    assert!(!config.allowed_origins.contains("https://evil.example.com"));
    assert_eq!(config.routes.api_prefix, "/v2/");
    assert_eq!(config.routes.realtime_marker, "/socket.io/");
    assert_eq!(config.caches.api, "api-cache-v2");
    assert_eq!(config.caches.dynamic, "dynamic-cache");
    assert_eq!(config.precache.len(), 2);
    assert_eq!(config.transport.timeout_secs, Some(10));
  }

  #[test]
  fn test_extra_origins_from_list() {
    let config = Config::default().with_extra_origins(" https://a.test, ,https://b.test/");
    assert!(config.allowed_origins.contains("https://a.test"));
    assert!(config.allowed_origins.contains("https://b.test"));
    assert_eq!(config.allowed_origins.len(), 2);
  }

  #[test]
  fn test_resolve_url() {
    let config = Config::default();
    assert_eq!(
      config.resolve_url("/api/movies/42").unwrap().as_str(),
      "http://localhost:3000/api/movies/42"
    );
    assert_eq!(
      config.resolve_url("https://cdn.test/x.js").unwrap().as_str(),
      "https://cdn.test/x.js"
    );
  }

  #[test]
  fn test_offline_path_relative_to_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("offline-proxy.yaml");
    std::fs::write(&path, "offline:\n  path: pages/offline.html\n").unwrap();

    let config = Config::load_from_path(&path).unwrap();
    assert_eq!(
      config.offline.path.unwrap(),
      dir.path().join("pages/offline.html")
    );
  }

  #[test]
  fn test_missing_explicit_config_is_an_error() {
    let result = Config::load(Some(Path::new("/nonexistent/offline-proxy.yaml")));
    assert!(result.is_err());
  }

  #[test]
  fn test_partition_names() {
    let caches = CachesConfig::default();
    let names = caches.names();
    assert!(names.contains("api-cache"));
    assert!(names.contains("dynamic-cache"));
    assert!(names.contains("static-cache"));
  }
}
