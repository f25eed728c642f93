//! Per-category caching strategies.
//!
//! All three strategies share the same ground rules: only success-range
//! responses are ever written to a cache, write-through failures are logged
//! and never fail the request, and network unreachability resolves to a
//! fallback instead of an error.

use color_eyre::Result;
use std::sync::Arc;
use tracing::{debug, warn};

use super::Router;
use crate::cache::{CacheStore, CachedResponse, EntryKey};
use crate::http::{Method, RequestDescriptor, ResponseSnapshot};
use crate::net::Network;
use crate::sync::SyncStore;

impl<S, Q, N> Router<S, Q, N>
where
  S: CacheStore + 'static,
  Q: SyncStore,
  N: Network + 'static,
{
  /// Cache-first, for static assets.
  ///
  /// Cached copy wins outright; misses go to the network and successful
  /// responses are stored into the static generation. Total failure serves
  /// the offline page.
  pub(super) async fn cache_first(&self, request: &RequestDescriptor) -> Result<ResponseSnapshot> {
    let key = EntryKey::for_request(request);

    if let Some(hit) = self.lookup_any(&key)? {
      return Ok(hit.response);
    }

    match self.network.fetch(request).await {
      Ok(response) => {
        if response.is_success() {
          self.store_best_effort(&self.config.cache.static_generation, &key, &response);
        }
        Ok(response)
      }
      Err(error) => {
        debug!(%error, path = %request.path, "static fetch failed, serving offline page");
        self.offline_page()
      }
    }
  }

  /// Network-first, for API calls and (by default) unclassified requests.
  ///
  /// Fresh responses win and update the dynamic generation; when the
  /// network is unreachable the most recent cached copy is served, and with
  /// no cached copy the caller gets a structured 503 rather than an error.
  /// The offline page is never substituted for an API response.
  pub(super) async fn network_first(&self, request: &RequestDescriptor) -> Result<ResponseSnapshot> {
    let key = EntryKey::for_request(request);

    match self.network.fetch(request).await {
      Ok(response) => {
        if response.is_success() {
          self.store_best_effort(&self.config.cache.dynamic_generation, &key, &response);
        }
        Ok(response)
      }
      Err(error) => {
        debug!(%error, path = %request.path, "network-first fetch failed, falling back to cache");

        if let Some(hit) = self.lookup_any(&key)? {
          return Ok(hit.response);
        }

        Ok(ResponseSnapshot::service_unavailable("network unreachable"))
      }
    }
  }

  /// Stale-while-revalidate, for navigable pages.
  ///
  /// A cached copy is returned without waiting on the network; the entry is
  /// refreshed by a background task for next time. On a miss this behaves
  /// like a fetch-and-store, with the offline page as the last resort.
  pub(super) async fn stale_while_revalidate(
    &self,
    request: &RequestDescriptor,
  ) -> Result<ResponseSnapshot> {
    let key = EntryKey::for_request(request);
    let dynamic = &self.config.cache.dynamic_generation;

    if let Some(hit) = self.cache.get(dynamic, &key)? {
      self.spawn_revalidation(request.clone());
      return Ok(hit.response);
    }

    match self.network.fetch(request).await {
      Ok(response) => {
        if response.is_success() {
          self.store_best_effort(dynamic, &key, &response);
        }
        Ok(response)
      }
      Err(error) => {
        debug!(%error, path = %request.path, "page fetch failed, serving offline page");
        self.offline_page()
      }
    }
  }

  /// Refresh a dynamic-generation entry in the background. The caller is
  /// never blocked on this; failures only mean the entry stays stale.
  fn spawn_revalidation(&self, request: RequestDescriptor) {
    let network = Arc::clone(&self.network);
    let cache = Arc::clone(&self.cache);
    let generation = self.config.cache.dynamic_generation.clone();

    tokio::spawn(async move {
      let key = EntryKey::for_request(&request);
      match network.fetch(&request).await {
        Ok(response) if response.is_success() => {
          if let Err(error) = cache.put(&generation, &key, &response) {
            warn!(%error, path = %request.path, "revalidation cache write failed");
          }
        }
        Ok(response) => {
          debug!(status = response.status, path = %request.path, "revalidation returned non-success");
        }
        Err(error) => {
          debug!(%error, path = %request.path, "revalidation fetch failed");
        }
      }
    });
  }

  /// Look a key up in the static generation, then the dynamic one.
  fn lookup_any(&self, key: &EntryKey) -> Result<Option<CachedResponse>> {
    if let Some(hit) = self.cache.get(&self.config.cache.static_generation, key)? {
      return Ok(Some(hit));
    }
    self.cache.get(&self.config.cache.dynamic_generation, key)
  }

  /// Write-through that never fails the request.
  fn store_best_effort(&self, generation: &str, key: &EntryKey, response: &ResponseSnapshot) {
    if let Err(error) = self.cache.put(generation, key, response) {
      warn!(%error, generation, "cache write failed, serving response uncached");
    }
  }

  /// The precached offline page, or the built-in fallback if it was never
  /// cached.
  fn offline_page(&self) -> Result<ResponseSnapshot> {
    let key = EntryKey::new(Method::Get, &self.config.cache.offline_path);
    match self.lookup_any(&key)? {
      Some(hit) => Ok(hit.response),
      None => Ok(ResponseSnapshot::offline_page()),
    }
  }
}
