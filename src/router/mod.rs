//! The offline cache router: lifecycle, request dispatch, control channel,
//! background sync, and push notifications.
//!
//! A [`Router`] owns nothing ambient: version names and routing rules come
//! from its [`Config`], and the cache store, sync queue, and network
//! backend are injected. Host integration is one method per event; an
//! adapter binds these to whatever event system is available.

pub mod message;
pub mod push;
mod strategy;

use color_eyre::{eyre::eyre, Result};
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

use crate::cache::{CacheStore, EntryKey};
use crate::classify::{classify, Category};
use crate::config::{Config, FallbackStrategy};
use crate::http::{RequestDescriptor, ResponseSnapshot};
use crate::net::Network;
use crate::sync::{drain, DrainReport, SyncStore};

use message::{ControlMessage, ControlReply};
use push::{notification_for, Notification, PushPayload};

/// Lifecycle states of a router instance.
///
/// A new version entering `Installing` never preempts an active instance:
/// the old one keeps serving until it is told to skip waiting, after which
/// the replaced instance is superseded and its stale generations are swept
/// by the next activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
  Installing,
  Waiting,
  Active,
  Superseded,
}

/// The cache router.
pub struct Router<S, Q, N> {
  config: Config,
  cache: Arc<S>,
  queue: Arc<Q>,
  network: Arc<N>,
  state: Mutex<Lifecycle>,
}

impl<S, Q, N> Router<S, Q, N>
where
  S: CacheStore + 'static,
  Q: SyncStore,
  N: Network + 'static,
{
  pub fn new(config: Config, cache: S, queue: Q, network: N) -> Self {
    Self {
      config,
      cache: Arc::new(cache),
      queue: Arc::new(queue),
      network: Arc::new(network),
      state: Mutex::new(Lifecycle::Installing),
    }
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  pub fn cache(&self) -> &S {
    &self.cache
  }

  pub fn queue(&self) -> &Q {
    &self.queue
  }

  pub fn network(&self) -> &N {
    &self.network
  }

  pub fn lifecycle(&self) -> Result<Lifecycle> {
    Ok(*self.lock_state()?)
  }

  fn lock_state(&self) -> Result<MutexGuard<'_, Lifecycle>> {
    self.state.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
  }

  /// Pre-populate the static generation from the precache manifest.
  ///
  /// Install is atomic: every manifest entry must fetch with a success
  /// status, and the whole batch is stored in one transaction. On success
  /// the instance moves to `Waiting`.
  pub async fn install(&self) -> Result<()> {
    let manifest = &self.config.cache.precache;
    info!(count = manifest.len(), "installing: precaching static manifest");

    let mut entries = Vec::with_capacity(manifest.len());
    for path in manifest {
      let request = RequestDescriptor::get(path);
      let response = self
        .network
        .fetch(&request)
        .await
        .map_err(|e| eyre!("Install failed: precache fetch for {} failed: {}", path, e))?;

      if !response.is_success() {
        return Err(eyre!(
          "Install failed: precache fetch for {} returned status {}",
          path,
          response.status
        ));
      }

      entries.push((EntryKey::for_request(&request), response));
    }

    self
      .cache
      .put_many(&self.config.cache.static_generation, &entries)?;

    *self.lock_state()? = Lifecycle::Waiting;
    info!(generation = %self.config.cache.static_generation, "install complete, waiting");
    Ok(())
  }

  /// Sweep cache generations left over from previous versions and move to
  /// `Active`. Returns the names of the deleted generations.
  pub fn activate(&self) -> Result<Vec<String>> {
    let cache_config = &self.config.cache;
    let mut swept = Vec::new();

    for name in self.cache.generations()? {
      if name != cache_config.static_generation && name != cache_config.dynamic_generation {
        info!(generation = %name, "sweeping stale cache generation");
        self.cache.delete_generation(&name)?;
        swept.push(name);
      }
    }

    *self.lock_state()? = Lifecycle::Active;
    info!("router active");
    Ok(swept)
  }

  /// Promote a waiting instance to active immediately. A no-op in any
  /// other state.
  pub fn skip_waiting(&self) -> Result<()> {
    let mut state = self.lock_state()?;
    if *state == Lifecycle::Waiting {
      info!("skip-waiting: promoting to active");
      *state = Lifecycle::Active;
    }
    Ok(())
  }

  /// Mark this instance as replaced by a newer active one.
  pub fn supersede(&self) -> Result<()> {
    *self.lock_state()? = Lifecycle::Superseded;
    Ok(())
  }

  /// Route one request through its category's strategy.
  pub async fn handle_fetch(&self, request: &RequestDescriptor) -> Result<ResponseSnapshot> {
    let category = classify(request, &self.config.routes.rules);
    debug!(method = %request.method, path = %request.path, ?category, "routing request");

    match category {
      Category::Static => self.cache_first(request).await,
      Category::Api => self.network_first(request).await,
      Category::Page => self.stale_while_revalidate(request).await,
      Category::Other => match self.config.routes.other {
        FallbackStrategy::NetworkFirst => self.network_first(request).await,
        FallbackStrategy::CacheFirst => self.cache_first(request).await,
      },
    }
  }

  /// Handle one control message. Unknown or malformed messages are ignored.
  pub async fn handle_message(&self, message: &Value) -> Result<Option<ControlReply>> {
    let Some(parsed) = ControlMessage::parse(message) else {
      debug!("ignoring unrecognized control message");
      return Ok(None);
    };

    match parsed {
      ControlMessage::SkipWaiting => {
        self.skip_waiting()?;
        Ok(None)
      }
      ControlMessage::GetCacheSize => {
        let payload = self.cache.total_body_bytes()?;
        Ok(Some(ControlReply::CacheSize { payload }))
      }
      ControlMessage::ClearCache => {
        self.clear_cache()?;
        Ok(Some(ControlReply::CacheCleared))
      }
      ControlMessage::SyncData { payload } => {
        self.queue.append(&payload)?;
        let report = self.drain_pending().await?;
        debug!(
          delivered = report.delivered,
          remaining = report.remaining,
          "sync-data drain finished"
        );
        Ok(None)
      }
    }
  }

  /// Delete every generation except the current static one, so assets stay
  /// available offline after a clear.
  pub fn clear_cache(&self) -> Result<()> {
    let keep = &self.config.cache.static_generation;

    for name in self.cache.generations()? {
      if &name != keep {
        self.cache.delete_generation(&name)?;
      }
    }

    info!("cache cleared, static generation kept");
    Ok(())
  }

  /// Deliver queued sync payloads to the remote API.
  pub async fn drain_pending(&self) -> Result<DrainReport> {
    drain(
      self.queue.as_ref(),
      self.network.as_ref(),
      &self.config.sync.endpoint,
    )
    .await
  }

  /// Connectivity-restoration signal: drain the queue when the tag matches
  /// the configured sync tag, ignore any other tag.
  pub async fn handle_sync(&self, tag: &str) -> Result<Option<DrainReport>> {
    if tag != self.config.sync.tag {
      debug!(tag, "ignoring sync event with unknown tag");
      return Ok(None);
    }

    Ok(Some(self.drain_pending().await?))
  }

  /// Map a push payload to the notification the host should display.
  pub fn handle_push(&self, payload: &Value) -> Result<Notification> {
    let payload: PushPayload = serde_json::from_value(payload.clone())
      .map_err(|e| eyre!("Malformed push payload: {}", e))?;
    Ok(notification_for(payload))
  }
}
