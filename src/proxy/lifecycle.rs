//! Install and activate steps run before the proxy starts serving.

use color_eyre::{eyre::eyre, Result};
use futures::future::join_all;
use tracing::{info, warn};
use url::Url;

use super::OfflineProxy;
use crate::cache::{CacheKey, CacheStorage};
use crate::http::Request;
use crate::transport::Transport;

/// What install managed to seed.
#[derive(Debug, Default)]
pub struct InstallReport {
  pub cached: Vec<Url>,
  pub failed: Vec<(Url, String)>,
}

impl<T: Transport, S: CacheStorage> OfflineProxy<T, S> {
  /// Seed the static shell partition with the offline page and the
  /// precache list.
  ///
  /// Failing to store the offline page fails install; a precache URL that
  /// cannot be fetched is reported and skipped.
  pub async fn install(&self, precache: &[Url]) -> Result<InstallReport> {
    let partition = self.store.open(&self.caches.static_shell);
    let mut report = InstallReport::default();

    let offline_url = self.offline.url().clone();
    let offline_key = CacheKey::for_request(&Request::get(offline_url.clone()))
      .ok_or_else(|| eyre!("Offline page URL is not cacheable: {}", offline_url))?;
    partition
      .put(&offline_key, self.offline.response())
      .await
      .map_err(|e| eyre!("Failed to seed offline page: {}", e))?;
    report.cached.push(offline_url);

    let fetches = precache.iter().map(|url| async move {
      let request = Request::get(url.clone());
      (url, self.transport.fetch(request).await)
    });

    for (url, result) in join_all(fetches).await {
      let outcome = match result {
        Ok(response) if response.is_cacheable_status() => {
          match CacheKey::for_request(&Request::get(url.clone())) {
            Some(key) => partition.put(&key, response).await.map_err(|e| e.to_string()),
            None => Err("not cacheable".to_string()),
          }
        }
        Ok(response) => Err(format!("upstream answered {}", response.status())),
        Err(e) => Err(e.to_string()),
      };

      match outcome {
        Ok(()) => report.cached.push(url.clone()),
        Err(reason) => {
          warn!(%url, %reason, "precache failed");
          report.failed.push((url.clone(), reason));
        }
      }
    }

    info!(
      cached = report.cached.len(),
      failed = report.failed.len(),
      partition = partition.name(),
      "install finished"
    );
    Ok(report)
  }

  /// Drop every partition this configuration does not own.
  pub async fn activate(&self) -> Result<Vec<String>> {
    let keep = self.caches.names();
    let mut removed = Vec::new();

    for name in self.store.partitions().await? {
      if keep.contains(name.as_str()) {
        continue;
      }
      self.store.delete(&name).await?;
      info!(partition = %name, "deleted stale partition");
      removed.push(name);
    }

    Ok(removed)
  }
}
