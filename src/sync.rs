//! Pending-sync queue: a persistent store of payloads written while
//! offline, and the drain loop that delivers them once connectivity
//! returns.
//!
//! Delivery is at-least-once: an item is removed only after the remote API
//! acknowledged it with a success status. This layer does not dedup, so
//! payloads must be idempotent if exactly-once matters to the caller.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;
use tracing::{debug, warn};

use crate::http::RequestDescriptor;
use crate::net::Network;

/// One queued payload awaiting delivery.
#[derive(Debug, Clone)]
pub struct PendingItem {
  pub id: i64,
  pub payload: serde_json::Value,
  pub queued_at: DateTime<Utc>,
}

/// Trait for pending-sync queue backends.
pub trait SyncStore: Send + Sync {
  /// Append a payload; returns its queue id.
  fn append(&self, payload: &serde_json::Value) -> Result<i64>;

  /// All queued items in insertion order.
  fn all(&self) -> Result<Vec<PendingItem>>;

  /// Remove a delivered item.
  fn remove(&self, id: i64) -> Result<()>;
}

/// SQLite-backed sync queue.
pub struct SqliteQueue {
  conn: Mutex<Connection>,
}

const QUEUE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS sync_queue (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    payload TEXT NOT NULL,
    queued_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

impl SqliteQueue {
  pub fn open_default() -> Result<Self> {
    Self::open(&Self::default_path()?)
  }

  pub fn open(path: &Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create queue directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open sync queue at {}: {}", path.display(), e))?;
    Self::from_connection(conn)
  }

  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory sync queue: {}", e))?;
    Self::from_connection(conn)
  }

  fn from_connection(conn: Connection) -> Result<Self> {
    conn
      .execute_batch(QUEUE_SCHEMA)
      .map_err(|e| eyre!("Failed to run queue migrations: {}", e))?;

    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("burrow").join("sync.db"))
  }
}

impl SyncStore for SqliteQueue {
  fn append(&self, payload: &serde_json::Value) -> Result<i64> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let encoded = serde_json::to_string(payload)
      .map_err(|e| eyre!("Failed to serialize sync payload: {}", e))?;

    conn
      .execute("INSERT INTO sync_queue (payload) VALUES (?)", params![encoded])
      .map_err(|e| eyre!("Failed to queue sync payload: {}", e))?;

    Ok(conn.last_insert_rowid())
  }

  fn all(&self) -> Result<Vec<PendingItem>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT id, payload, queued_at FROM sync_queue ORDER BY id")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let rows: Vec<(i64, String, String)> = stmt
      .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
      .map_err(|e| eyre!("Failed to query sync queue: {}", e))?
      .filter_map(|r| r.ok())
      .collect();

    let mut items = Vec::with_capacity(rows.len());
    for (id, payload_json, queued_at_str) in rows {
      let payload = serde_json::from_str(&payload_json)
        .map_err(|e| eyre!("Failed to deserialize sync payload {}: {}", id, e))?;
      items.push(PendingItem {
        id,
        payload,
        queued_at: parse_datetime(&queued_at_str)?,
      });
    }

    Ok(items)
  }

  fn remove(&self, id: i64) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute("DELETE FROM sync_queue WHERE id = ?", params![id])
      .map_err(|e| eyre!("Failed to remove sync item {}: {}", id, e))?;

    Ok(())
  }
}

/// In-memory sync queue.
#[derive(Default)]
pub struct MemoryQueue {
  items: Mutex<Vec<PendingItem>>,
  next_id: AtomicI64,
}

impl MemoryQueue {
  pub fn new() -> Self {
    Self::default()
  }
}

impl SyncStore for MemoryQueue {
  fn append(&self, payload: &serde_json::Value) -> Result<i64> {
    let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
    let mut items = self
      .items
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    items.push(PendingItem {
      id,
      payload: payload.clone(),
      queued_at: Utc::now(),
    });

    Ok(id)
  }

  fn all(&self) -> Result<Vec<PendingItem>> {
    let items = self
      .items
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(items.clone())
  }

  fn remove(&self, id: i64) -> Result<()> {
    let mut items = self
      .items
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    items.retain(|item| item.id != id);
    Ok(())
  }
}

/// Outcome of one drain pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
  pub delivered: usize,
  pub remaining: usize,
}

/// Deliver every queued item to the sync endpoint.
///
/// Items are attempted in insertion order and removed only after the remote
/// API responds with a success status. A failed delivery (transport error
/// or non-success status) leaves the item queued for the next trigger; the
/// drain continues with later items either way.
pub async fn drain<Q, N>(queue: &Q, network: &N, endpoint: &str) -> Result<DrainReport>
where
  Q: SyncStore + ?Sized,
  N: Network + ?Sized,
{
  let items = queue.all()?;
  let mut delivered = 0;

  for item in &items {
    let request = RequestDescriptor::post_json(endpoint, &item.payload)?;

    match network.fetch(&request).await {
      Ok(response) if response.is_success() => {
        queue.remove(item.id)?;
        delivered += 1;
        debug!(id = item.id, "sync item delivered");
      }
      Ok(response) => {
        warn!(id = item.id, status = response.status, "sync delivery rejected, item kept");
      }
      Err(error) => {
        warn!(id = item.id, %error, "sync delivery failed, item kept");
      }
    }
  }

  Ok(DrainReport {
    delivered,
    remaining: items.len() - delivered,
  })
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::http::ResponseSnapshot;
  use crate::net::ScriptedNetwork;
  use serde_json::json;

  fn ok_response() -> ResponseSnapshot {
    ResponseSnapshot::new(200, vec![], b"{\"ok\":true}".to_vec())
  }

  fn queue_round_trip(queue: &dyn SyncStore) {
    assert!(queue.all().unwrap().is_empty());

    let first = queue.append(&json!({"reading": 42})).unwrap();
    let second = queue.append(&json!({"reading": 43})).unwrap();
    assert_ne!(first, second);

    let items = queue.all().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].payload["reading"], 42);
    assert_eq!(items[1].payload["reading"], 43);

    queue.remove(first).unwrap();
    let items = queue.all().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].id, second);
  }

  #[test]
  fn sqlite_queue_round_trip() {
    queue_round_trip(&SqliteQueue::open_in_memory().unwrap());
  }

  #[test]
  fn memory_queue_round_trip() {
    queue_round_trip(&MemoryQueue::new());
  }

  #[tokio::test]
  async fn drain_removes_delivered_items() {
    let queue = MemoryQueue::new();
    queue.append(&json!({"reading": 1})).unwrap();
    queue.append(&json!({"reading": 2})).unwrap();

    let network = ScriptedNetwork::new();
    network.respond("/api/sync", ok_response());

    let report = drain(&queue, &network, "/api/sync").await.unwrap();
    assert_eq!(report, DrainReport { delivered: 2, remaining: 0 });
    assert!(queue.all().unwrap().is_empty());
    assert_eq!(network.calls("/api/sync"), 2);
  }

  #[tokio::test]
  async fn failed_delivery_keeps_item_queued() {
    let queue = MemoryQueue::new();
    queue.append(&json!({"reading": 1})).unwrap();

    let network = ScriptedNetwork::new();
    // No route for the endpoint: unreachable.
    let report = drain(&queue, &network, "/api/sync").await.unwrap();
    assert_eq!(report, DrainReport { delivered: 0, remaining: 1 });
    assert_eq!(queue.all().unwrap().len(), 1);
  }

  #[tokio::test]
  async fn rejected_delivery_keeps_item_queued() {
    let queue = MemoryQueue::new();
    queue.append(&json!({"reading": 1})).unwrap();

    let network = ScriptedNetwork::new();
    network.respond("/api/sync", ResponseSnapshot::new(500, vec![], vec![]));

    let report = drain(&queue, &network, "/api/sync").await.unwrap();
    assert_eq!(report, DrainReport { delivered: 0, remaining: 1 });
    assert_eq!(queue.all().unwrap().len(), 1);
  }

  #[tokio::test]
  async fn at_least_once_retry_until_acknowledged() {
    let queue = MemoryQueue::new();
    queue.append(&json!({"reading": 7})).unwrap();

    // Two forced failures, then success: three attempts total.
    let network = ScriptedNetwork::new();
    network.unreachable("/api/sync");
    network.unreachable("/api/sync");
    network.respond("/api/sync", ok_response());

    for expected_remaining in [1, 1, 0] {
      let report = drain(&queue, &network, "/api/sync").await.unwrap();
      assert_eq!(report.remaining, expected_remaining);
    }

    assert_eq!(network.calls("/api/sync"), 3);
    assert!(queue.all().unwrap().is_empty());
  }

  #[tokio::test]
  async fn drain_continues_past_a_failing_item() {
    let queue = MemoryQueue::new();
    let first = queue.append(&json!({"reading": 1})).unwrap();
    queue.append(&json!({"reading": 2})).unwrap();

    // First attempt fails, but the sticky success answers the second item.
    let network = ScriptedNetwork::new();
    network.unreachable("/api/sync");
    network.respond("/api/sync", ok_response());

    let report = drain(&queue, &network, "/api/sync").await.unwrap();
    assert_eq!(report, DrainReport { delivered: 1, remaining: 1 });

    let items = queue.all().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].id, first);
  }
}
