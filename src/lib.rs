//! burrow - an offline-first HTTP cache router.
//!
//! burrow classifies outgoing requests into static assets, API calls, and
//! navigable pages, applies a per-category caching strategy (cache-first,
//! network-first, stale-while-revalidate) against versioned cache
//! generations, serves an offline fallback page when the network is
//! unreachable, and drains a pending-sync queue with at-least-once
//! delivery once connectivity returns.
//!
//! # Example
//!
//! ```no_run
//! use burrow::{Config, HttpNetwork, Router, SqliteQueue, SqliteStore};
//! use burrow::RequestDescriptor;
//!
//! # async fn example() -> color_eyre::Result<()> {
//! let config = Config::load(None)?;
//! let network = HttpNetwork::new(&config.network.base_url)?;
//! let router = Router::new(config, SqliteStore::open_default()?, SqliteQueue::open_default()?, network);
//!
//! // Precache the static manifest, then sweep generations from old versions
//! router.install().await?;
//! router.activate()?;
//!
//! // Route requests
//! let response = router
//!   .handle_fetch(&RequestDescriptor::get("/dashboard").with_accept("text/html"))
//!   .await?;
//! println!("{} ({} bytes)", response.status, response.body.len());
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod classify;
pub mod config;
pub mod http;
pub mod net;
pub mod router;
pub mod sync;

pub use cache::{CacheStore, CachedResponse, EntryKey, MemoryStore, SqliteStore};
pub use classify::{classify, Category, RouteRules};
pub use config::{Config, FallbackStrategy};
pub use http::{Method, RequestDescriptor, ResponseSnapshot};
pub use net::{HttpNetwork, Network};
pub use router::message::{ControlMessage, ControlReply};
pub use router::push::{click_target, ClickAction, Notification, PushData, PushPayload};
pub use router::{Lifecycle, Router};
pub use sync::{drain, DrainReport, MemoryQueue, PendingItem, SqliteQueue, SyncStore};
