//! Cache store trait and the SQLite/in-memory implementations.
//!
//! A store holds named generations of request/response entries. The router
//! only ever addresses generations by name; which generations exist and
//! which are current is the router's concern, not the store's.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::key::EntryKey;
use crate::http::ResponseSnapshot;

/// A cached response plus the time it was stored.
#[derive(Debug, Clone)]
pub struct CachedResponse {
  pub response: ResponseSnapshot,
  pub stored_at: DateTime<Utc>,
}

/// Trait for cache storage backends.
pub trait CacheStore: Send + Sync {
  /// Get an entry from a generation. Returns an owned snapshot.
  fn get(&self, generation: &str, key: &EntryKey) -> Result<Option<CachedResponse>>;

  /// Store an entry, overwriting any previous entry for the same key.
  fn put(&self, generation: &str, key: &EntryKey, response: &ResponseSnapshot) -> Result<()>;

  /// Store a batch of entries atomically: either every entry lands or none do.
  fn put_many(&self, generation: &str, entries: &[(EntryKey, ResponseSnapshot)]) -> Result<()>;

  /// Names of all generations currently holding entries.
  fn generations(&self) -> Result<Vec<String>>;

  /// Delete a generation and everything in it.
  fn delete_generation(&self, name: &str) -> Result<()>;

  /// Sum of stored response body sizes across every generation, in bytes.
  fn total_body_bytes(&self) -> Result<u64>;
}

/// SQLite-backed cache store.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

/// Schema for the cache table.
const CACHE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS cache_entries (
    generation TEXT NOT NULL,
    entry_key TEXT NOT NULL,
    request TEXT NOT NULL,
    status INTEGER NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    stored_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (generation, entry_key)
);

CREATE INDEX IF NOT EXISTS idx_cache_entries_generation
    ON cache_entries(generation);
"#;

impl SqliteStore {
  /// Open or create the store at the default location.
  pub fn open_default() -> Result<Self> {
    Self::open(&Self::default_path()?)
  }

  /// Open or create the store at the given path.
  pub fn open(path: &Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::from_connection(conn)
  }

  /// Open a transient in-memory store.
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory cache database: {}", e))?;
    Self::from_connection(conn)
  }

  fn from_connection(conn: Connection) -> Result<Self> {
    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  /// Default database path.
  fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("burrow").join("cache.db"))
  }

  fn encode_headers(response: &ResponseSnapshot) -> Result<String> {
    serde_json::to_string(&response.headers)
      .map_err(|e| eyre!("Failed to serialize response headers: {}", e))
  }
}

impl CacheStore for SqliteStore {
  fn get(&self, generation: &str, key: &EntryKey) -> Result<Option<CachedResponse>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare(
        "SELECT status, headers, body, stored_at FROM cache_entries
         WHERE generation = ? AND entry_key = ?",
      )
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let row: Option<(u16, String, Vec<u8>, String)> = stmt
      .query_row(params![generation, key.digest()], |row| {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
      })
      .ok();

    match row {
      Some((status, headers_json, body, stored_at_str)) => {
        let headers: Vec<(String, String)> = serde_json::from_str(&headers_json)
          .map_err(|e| eyre!("Failed to deserialize response headers: {}", e))?;
        let stored_at = parse_datetime(&stored_at_str)?;

        Ok(Some(CachedResponse {
          response: ResponseSnapshot::new(status, headers, body),
          stored_at,
        }))
      }
      None => Ok(None),
    }
  }

  fn put(&self, generation: &str, key: &EntryKey, response: &ResponseSnapshot) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    let headers = Self::encode_headers(response)?;

    conn
      .execute(
        "INSERT OR REPLACE INTO cache_entries (generation, entry_key, request, status, headers, body, stored_at)
         VALUES (?, ?, ?, ?, ?, ?, datetime('now'))",
        params![
          generation,
          key.digest(),
          key.description(),
          response.status,
          headers,
          response.body
        ],
      )
      .map_err(|e| eyre!("Failed to store cache entry: {}", e))?;

    Ok(())
  }

  fn put_many(&self, generation: &str, entries: &[(EntryKey, ResponseSnapshot)]) -> Result<()> {
    let mut conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    // Dropping an uncommitted transaction rolls it back, keeping the batch
    // all-or-nothing.
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    for (key, response) in entries {
      let headers = Self::encode_headers(response)?;
      tx.execute(
        "INSERT OR REPLACE INTO cache_entries (generation, entry_key, request, status, headers, body, stored_at)
         VALUES (?, ?, ?, ?, ?, ?, datetime('now'))",
        params![
          generation,
          key.digest(),
          key.description(),
          response.status,
          headers,
          response.body
        ],
      )
      .map_err(|e| eyre!("Failed to store cache entry: {}", e))?;
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }

  fn generations(&self) -> Result<Vec<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT DISTINCT generation FROM cache_entries ORDER BY generation")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names: Vec<String> = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to query generations: {}", e))?
      .filter_map(|r| r.ok())
      .collect();

    Ok(names)
  }

  fn delete_generation(&self, name: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute("DELETE FROM cache_entries WHERE generation = ?", params![name])
      .map_err(|e| eyre!("Failed to delete generation: {}", e))?;

    Ok(())
  }

  fn total_body_bytes(&self) -> Result<u64> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let total: i64 = conn
      .query_row(
        "SELECT COALESCE(SUM(LENGTH(body)), 0) FROM cache_entries",
        [],
        |row| row.get(0),
      )
      .map_err(|e| eyre!("Failed to sum cache sizes: {}", e))?;

    Ok(total as u64)
  }
}

/// In-memory cache store backed by a hash map.
///
/// Useful for ephemeral setups and as a lightweight double in tests.
#[derive(Default)]
pub struct MemoryStore {
  generations: Mutex<HashMap<String, HashMap<String, CachedResponse>>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

impl CacheStore for MemoryStore {
  fn get(&self, generation: &str, key: &EntryKey) -> Result<Option<CachedResponse>> {
    let generations = self
      .generations
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    Ok(
      generations
        .get(generation)
        .and_then(|entries| entries.get(key.digest()))
        .cloned(),
    )
  }

  fn put(&self, generation: &str, key: &EntryKey, response: &ResponseSnapshot) -> Result<()> {
    let mut generations = self
      .generations
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    generations.entry(generation.to_string()).or_default().insert(
      key.digest().to_string(),
      CachedResponse {
        response: response.clone(),
        stored_at: Utc::now(),
      },
    );

    Ok(())
  }

  fn put_many(&self, generation: &str, entries: &[(EntryKey, ResponseSnapshot)]) -> Result<()> {
    for (key, response) in entries {
      self.put(generation, key, response)?;
    }
    Ok(())
  }

  fn generations(&self) -> Result<Vec<String>> {
    let generations = self
      .generations
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut names: Vec<String> = generations
      .iter()
      .filter(|(_, entries)| !entries.is_empty())
      .map(|(name, _)| name.clone())
      .collect();
    names.sort();

    Ok(names)
  }

  fn delete_generation(&self, name: &str) -> Result<()> {
    let mut generations = self
      .generations
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    generations.remove(name);
    Ok(())
  }

  fn total_body_bytes(&self) -> Result<u64> {
    let generations = self
      .generations
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    Ok(
      generations
        .values()
        .flat_map(|entries| entries.values())
        .map(|entry| entry.response.body_len())
        .sum(),
    )
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::http::Method;

  fn snapshot(status: u16, body: &str) -> ResponseSnapshot {
    ResponseSnapshot::new(
      status,
      vec![("Content-Type".to_string(), "text/plain".to_string())],
      body.as_bytes().to_vec(),
    )
  }

  fn round_trip(store: &dyn CacheStore) {
    let key = EntryKey::new(Method::Get, "/static/app.css");

    assert!(store.get("static-v1", &key).unwrap().is_none());

    store.put("static-v1", &key, &snapshot(200, "body {}")).unwrap();

    let cached = store.get("static-v1", &key).unwrap().unwrap();
    assert_eq!(cached.response.status, 200);
    assert_eq!(cached.response.body, b"body {}");
    assert_eq!(cached.response.header("content-type"), Some("text/plain"));

    // Same key in a different generation is a miss
    assert!(store.get("static-v2", &key).unwrap().is_none());

    // Overwrite replaces the entry wholesale
    store.put("static-v1", &key, &snapshot(200, "body { margin: 0 }")).unwrap();
    let cached = store.get("static-v1", &key).unwrap().unwrap();
    assert_eq!(cached.response.body, b"body { margin: 0 }");
  }

  fn generation_bookkeeping(store: &dyn CacheStore) {
    let key_a = EntryKey::new(Method::Get, "/a");
    let key_b = EntryKey::new(Method::Get, "/b");

    store.put("static-v1", &key_a, &snapshot(200, "aaaa")).unwrap();
    store.put("dynamic-v1", &key_b, &snapshot(200, "bbbbbb")).unwrap();

    assert_eq!(store.generations().unwrap(), vec!["dynamic-v1", "static-v1"]);
    assert_eq!(store.total_body_bytes().unwrap(), 10);

    store.delete_generation("dynamic-v1").unwrap();
    assert_eq!(store.generations().unwrap(), vec!["static-v1"]);
    assert_eq!(store.total_body_bytes().unwrap(), 4);
  }

  #[test]
  fn sqlite_round_trip() {
    round_trip(&SqliteStore::open_in_memory().unwrap());
  }

  #[test]
  fn sqlite_generations() {
    generation_bookkeeping(&SqliteStore::open_in_memory().unwrap());
  }

  #[test]
  fn memory_round_trip() {
    round_trip(&MemoryStore::new());
  }

  #[test]
  fn memory_generations() {
    generation_bookkeeping(&MemoryStore::new());
  }

  #[test]
  fn put_many_stores_whole_batch() {
    let store = SqliteStore::open_in_memory().unwrap();
    let entries = vec![
      (EntryKey::new(Method::Get, "/"), snapshot(200, "<html>")),
      (EntryKey::new(Method::Get, "/offline.html"), snapshot(200, "<offline>")),
    ];

    store.put_many("static-v1", &entries).unwrap();

    for (key, _) in &entries {
      assert!(store.get("static-v1", key).unwrap().is_some());
    }
    assert_eq!(store.generations().unwrap(), vec!["static-v1"]);
  }
}
