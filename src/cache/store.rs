//! Async handle over a storage backend, shared by all request handlers.

use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tracing::debug;

use super::entry::{CachedEntry, CachedResponse};
use super::key::{CacheKey, Variant};
use super::storage::CacheStorage;
use crate::http::{Request, Response};

/// Process-wide cache store.
///
/// Constructed once at startup and injected wherever caching is needed.
/// Storage calls run on the blocking pool so a slow disk never stalls
/// other in-flight requests.
pub struct CacheStore<S: CacheStorage> {
  storage: Arc<S>,
}

impl<S: CacheStorage> CacheStore<S> {
  pub fn new(storage: S) -> Self {
    Self {
      storage: Arc::new(storage),
    }
  }

  /// Handle to a named partition. The partition itself is created on first write.
  pub fn open(&self, name: &str) -> Partition<S> {
    Partition {
      name: name.to_string(),
      storage: Arc::clone(&self.storage),
    }
  }

  /// Find a cached response for `request` in any partition.
  ///
  /// Non-GET requests never match.
  pub async fn match_any(&self, request: &Request) -> Result<Option<Response>> {
    let Some(key) = CacheKey::for_request(request) else {
      return Ok(None);
    };
    let preferred = Variant::new(request.mode(), request.credentials());

    let url = key.url().to_string();
    let entry = run_blocking(&self.storage, move |s| s.match_url(&url, &preferred)).await?;

    Ok(entry.map(|e| {
      debug!(partition = %e.partition, key = %e.key, "cache match");
      e.response.into_response()
    }))
  }

  /// Partition names in creation order.
  pub async fn partitions(&self) -> Result<Vec<String>> {
    run_blocking(&self.storage, |s| s.partitions()).await
  }

  /// Delete a partition. Returns false if it did not exist.
  pub async fn delete(&self, name: &str) -> Result<bool> {
    let name = name.to_string();
    run_blocking(&self.storage, move |s| s.delete_partition(&name)).await
  }
}

impl<S: CacheStorage> Clone for CacheStore<S> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
    }
  }
}

/// A named partition within the store.
pub struct Partition<S: CacheStorage> {
  name: String,
  storage: Arc<S>,
}

impl<S: CacheStorage> Partition<S> {
  pub fn name(&self) -> &str {
    &self.name
  }

  pub async fn get(&self, key: &CacheKey) -> Result<Option<Response>> {
    let name = self.name.clone();
    let key = key.clone();
    let entry = run_blocking(&self.storage, move |s| s.get(&name, &key)).await?;
    Ok(entry.map(|e| e.response.into_response()))
  }

  /// Store a response under `key`, consuming it.
  ///
  /// Only 200 responses are accepted; anything else is an error and
  /// nothing is written.
  pub async fn put(&self, key: &CacheKey, response: Response) -> Result<()> {
    if !response.is_cacheable_status() {
      return Err(eyre!(
        "Refusing to cache {} response for {}",
        response.status(),
        key
      ));
    }

    let stored = CachedResponse::from_response(response)
      .map_err(|e| eyre!("Cannot cache {}: {}", key, e))?;

    let name = self.name.clone();
    let key = key.clone();
    run_blocking(&self.storage, move |s| s.put(&name, &key, &stored)).await
  }

  /// Entries, most recently written first.
  pub async fn entries(&self) -> Result<Vec<CachedEntry>> {
    let name = self.name.clone();
    run_blocking(&self.storage, move |s| s.entries(&name)).await
  }
}

async fn run_blocking<S, T, F>(storage: &Arc<S>, f: F) -> Result<T>
where
  S: CacheStorage,
  T: Send + 'static,
  F: FnOnce(&S) -> Result<T> + Send + 'static,
{
  let storage = Arc::clone(storage);
  tokio::task::spawn_blocking(move || f(&storage))
    .await
    .map_err(|e| eyre!("Cache task failed: {}", e))?
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::SqliteStorage;
  use reqwest::{Method, StatusCode};
  use url::Url;

  fn store() -> CacheStore<SqliteStorage> {
    CacheStore::new(SqliteStorage::open_in_memory().unwrap())
  }

  fn get(url: &str) -> Request {
    Request::get(Url::parse(url).unwrap())
  }

  #[tokio::test]
  async fn test_partition_put_and_get() {
    let store = store();
    let partition = store.open("dynamic-cache");
    let request = get("https://x.test/logo.png");
    let key = CacheKey::for_request(&request).unwrap();

    partition
      .put(&key, Response::new(StatusCode::OK, "png"))
      .await
      .unwrap();

    let mut cached = partition.get(&key).await.unwrap().unwrap();
    assert_eq!(cached.read_body().unwrap().as_ref(), b"png");
    assert_eq!(store.partitions().await.unwrap(), vec!["dynamic-cache"]);
  }

  #[tokio::test]
  async fn test_partition_refuses_non_200() {
    let store = store();
    let partition = store.open("dynamic-cache");
    let key = CacheKey::for_request(&get("https://x.test/missing.png")).unwrap();

    let result = partition
      .put(&key, Response::new(StatusCode::NOT_FOUND, "nope"))
      .await;

    assert!(result.is_err());
    assert!(store.partitions().await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_open_does_not_create_partition() {
    let store = store();
    let _ = store.open("api-cache");
    assert!(store.partitions().await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_match_any_ignores_non_get() {
    let store = store();
    let request = get("https://x.test/api/movies");
    let key = CacheKey::for_request(&request).unwrap();
    store
      .open("api-cache")
      .put(&key, Response::new(StatusCode::OK, "[]"))
      .await
      .unwrap();

    let post = Request::new(Method::POST, Url::parse("https://x.test/api/movies").unwrap());
    assert!(store.match_any(&post).await.unwrap().is_none());
    assert!(store.match_any(&request).await.unwrap().is_some());
  }

  #[tokio::test]
  async fn test_delete_partition() {
    let store = store();
    let key = CacheKey::for_request(&get("https://x.test/a.css")).unwrap();
    store
      .open("old-cache")
      .put(&key, Response::new(StatusCode::OK, "a"))
      .await
      .unwrap();

    assert!(store.delete("old-cache").await.unwrap());
    assert!(store.open("old-cache").entries().await.unwrap().is_empty());
  }
}
