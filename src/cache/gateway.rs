//! Cache gateway that arbitrates between the partition store and the network.

use color_eyre::{eyre::eyre, Result};
use futures::future::{join_all, try_join_all};
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

use super::storage::CacheStorage;
use super::traits::{CachedResponse, Intercepted, RequestKey};
use crate::lifetime::Lifetime;
use crate::net::{Fetcher, Request};

/// Cache-first gateway over a partition store and a network fetcher.
///
/// Entries never expire on their own; a partition is only invalidated as a
/// whole, when [`CacheGateway::activate`] prunes every version but the current one.
pub struct CacheGateway<S: CacheStorage, F: Fetcher> {
  storage: Arc<S>,
  fetcher: Arc<F>,
  origin: Url,
  /// Name of the current partition
  version: String,
  vary_headers: Arc<[String]>,
}

impl<S: CacheStorage + 'static, F: Fetcher> CacheGateway<S, F> {
  pub fn new(storage: S, fetcher: Arc<F>, origin: Url, version: impl Into<String>) -> Self {
    Self {
      storage: Arc::new(storage),
      fetcher,
      origin,
      version: version.into(),
      vary_headers: Arc::from(Vec::new()),
    }
  }

  /// Headers whose values take part in the request identity.
  pub fn with_vary_headers(mut self, headers: Vec<String>) -> Self {
    self.vary_headers = Arc::from(headers);
    self
  }

  pub fn version(&self) -> &str {
    &self.version
  }

  pub fn storage(&self) -> &S {
    &self.storage
  }

  /// Resolve an asset path against the origin.
  pub fn resolve(&self, path: &str) -> Result<Url> {
    self
      .origin
      .join(path)
      .map_err(|e| eyre!("Invalid asset path '{}': {}", path, e))
  }

  pub fn key_for(&self, request: &Request) -> RequestKey {
    RequestKey::for_request(request, &self.vary_headers)
  }

  /// Lookup in the current partition. A partition that was never opened is a miss.
  fn lookup(&self, key: &RequestKey) -> Result<Option<CachedResponse>> {
    if !self.storage.has_partition(&self.version)? {
      return Ok(None);
    }
    self.storage.get(&self.version, key)
  }

  /// Populate the current partition with every asset that is not stored yet.
  ///
  /// All-or-nothing: if any asset fails to fetch or answers with a non-2xx
  /// status, nothing is written and the error is returned.
  pub async fn install(&self, assets: &[String]) -> Result<()> {
    self.storage.open_partition(&self.version)?;

    let mut missing = Vec::new();
    for asset in assets {
      let request = Request::get(self.resolve(asset)?);
      let key = self.key_for(&request);
      if self.storage.get(&self.version, &key)?.is_none() {
        missing.push((key, request));
      }
    }

    let fetcher = &self.fetcher;
    let fetches = missing.into_iter().map(move |(key, request)| async move {
      let response = fetcher
        .fetch(&request)
        .await
        .map_err(|e| eyre!("Failed to fetch asset {}: {}", request.url, e))?;

      if !response.is_ok() {
        return Err(eyre!(
          "Asset {} returned status {}",
          request.url,
          response.status
        ));
      }

      Ok::<_, color_eyre::Report>((key, response))
    });

    let entries = try_join_all(fetches).await?;
    self.storage.put_all(&self.version, &entries)?;

    info!(
      version = %self.version,
      fetched = entries.len(),
      total = assets.len(),
      "Installed assets"
    );

    Ok(())
  }

  /// Serve a request from the current partition, falling back to the network.
  ///
  /// 1. Stored snapshot - return it, the network is not touched
  /// 2. Miss - fetch a copy of the request
  /// 3. Network failure - navigations get the cached root document, others nothing
  /// 4. 200 basic responses are written back in the background via `lifetime`
  ///
  /// Only GET requests are looked up and stored. Every other method always
  /// goes to the network.
  pub async fn intercept(&self, request: &Request, lifetime: &mut Lifetime) -> Result<Intercepted> {
    let key = self.key_for(request);
    let cacheable_request = request.is_get();

    if cacheable_request {
      if let Some(cached) = self.lookup(&key)? {
        debug!(request = key.description(), "Serving from cache");
        return Ok(Intercepted::from_cache(cached));
      }
    }

    let fetch_request = request.clone();
    match self.fetcher.fetch(&fetch_request).await {
      Ok(response) => {
        if !cacheable_request || !response.is_cacheable() {
          debug!(
            request = key.description(),
            status = response.status,
            kind = ?response.kind,
            "Not caching response"
          );
          return Ok(Intercepted::from_network(response));
        }

        let to_cache = response.clone();
        let storage = Arc::clone(&self.storage);
        let version = self.version.clone();
        lifetime.wait_until(async move {
          let description = key.description().to_string();
          let write = tokio::task::spawn_blocking(move || storage.put(&version, &key, &to_cache));
          match write.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(request = %description, error = %e, "Failed to cache response"),
            Err(e) => warn!(request = %description, error = %e, "Cache write task failed"),
          }
        });

        Ok(Intercepted::from_network(response))
      }
      Err(e) => {
        warn!(url = %request.url, error = %e, "Network fetch failed");

        if request.is_navigation() {
          let root = Request::get(self.resolve("/")?);
          if let Some(cached) = self.lookup(&self.key_for(&root))? {
            info!(url = %request.url, "Offline, serving cached root document");
            return Ok(Intercepted::offline(cached));
          }
        }

        Ok(Intercepted::unavailable())
      }
    }
  }

  /// Delete every partition except the current one, concurrently.
  ///
  /// Returns the names that were deleted.
  pub async fn activate(&self) -> Result<Vec<String>> {
    let stale: Vec<String> = self
      .storage
      .partitions()?
      .into_iter()
      .filter(|name| *name != self.version)
      .collect();

    let deletions = stale.iter().map(|name| {
      let storage = Arc::clone(&self.storage);
      let name = name.clone();
      async move {
        tokio::task::spawn_blocking(move || storage.delete_partition(&name))
          .await
          .map_err(|e| eyre!("Partition deletion task failed: {}", e))?
      }
    });

    for result in join_all(deletions).await {
      result?;
    }

    if !stale.is_empty() {
      info!(version = %self.version, deleted = ?stale, "Pruned stale cache partitions");
    }

    Ok(stale)
  }
}
