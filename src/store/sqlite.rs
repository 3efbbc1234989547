//! SQLite-backed generation store.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::traits::{CachedRequest, GenerationStore, ResponseSnapshot, StoredEntry};

/// Persistent store: one database holding every generation and its entries.
/// Survives worker restarts; shared across concurrently intercepted requests.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

impl SqliteStore {
  /// Open or create the store at the given path.
  pub fn open(path: &Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;

    Ok(store)
  }

  /// Open an in-memory store, for tests.
  #[cfg(test)]
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory cache database: {}", e))?;

    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;

    Ok(store)
  }

  /// Default database location under the platform data directory.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("helmsw").join("cache.db"))
  }

  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(STORE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }
}

/// Schema for the generation store.
const STORE_SCHEMA: &str = r#"
-- Named cache generations
CREATE TABLE IF NOT EXISTS generations (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Response snapshots, keyed by request identity within a generation
CREATE TABLE IF NOT EXISTS entries (
    generation TEXT NOT NULL,
    request_key TEXT NOT NULL,
    method TEXT NOT NULL,
    url TEXT NOT NULL,
    snapshot BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (generation, request_key)
);

CREATE INDEX IF NOT EXISTS idx_entries_generation ON entries(generation);
"#;

impl GenerationStore for SqliteStore {
  fn open_generation(&self, name: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "INSERT OR IGNORE INTO generations (name) VALUES (?)",
        params![name],
      )
      .map_err(|e| eyre!("Failed to open generation {}: {}", name, e))?;

    Ok(())
  }

  fn list_generations(&self) -> Result<Vec<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT name FROM generations ORDER BY created_at")
      .map_err(|e| eyre!("Failed to prepare generation query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list generations: {}", e))?
      .filter_map(|r| r.ok())
      .collect();

    Ok(names)
  }

  fn delete_generation(&self, name: &str) -> Result<bool> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    // Entries first: foreign keys are off by default in SQLite, so no cascade.
    conn
      .execute("DELETE FROM entries WHERE generation = ?", params![name])
      .map_err(|e| eyre!("Failed to delete entries of {}: {}", name, e))?;

    let deleted = conn
      .execute("DELETE FROM generations WHERE name = ?", params![name])
      .map_err(|e| eyre!("Failed to delete generation {}: {}", name, e))?;

    Ok(deleted > 0)
  }

  fn get(&self, generation: &str, request: &CachedRequest) -> Result<Option<StoredEntry>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare(
        "SELECT snapshot, cached_at FROM entries
         WHERE generation = ? AND request_key = ?",
      )
      .map_err(|e| eyre!("Failed to prepare entry query: {}", e))?;

    let result: Option<(Vec<u8>, String)> = stmt
      .query_row(params![generation, request.cache_key()], |row| {
        Ok((row.get(0)?, row.get(1)?))
      })
      .ok();

    match result {
      Some((blob, cached_at_str)) => {
        let snapshot: ResponseSnapshot = serde_json::from_slice(&blob)
          .map_err(|e| eyre!("Failed to deserialize snapshot: {}", e))?;
        let cached_at = parse_datetime(&cached_at_str)?;
        Ok(Some(StoredEntry {
          snapshot,
          cached_at,
        }))
      }
      None => Ok(None),
    }
  }

  fn put(
    &self,
    generation: &str,
    request: &CachedRequest,
    snapshot: &ResponseSnapshot,
  ) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let blob =
      serde_json::to_vec(snapshot).map_err(|e| eyre!("Failed to serialize snapshot: {}", e))?;

    // Writing into a swept or never-opened generation recreates it.
    conn
      .execute(
        "INSERT OR IGNORE INTO generations (name) VALUES (?)",
        params![generation],
      )
      .map_err(|e| eyre!("Failed to open generation {}: {}", generation, e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO entries (generation, request_key, method, url, snapshot, cached_at)
         VALUES (?, ?, ?, ?, ?, datetime('now'))",
        params![
          generation,
          request.cache_key(),
          request.method.to_uppercase(),
          request.url,
          blob
        ],
      )
      .map_err(|e| eyre!("Failed to store entry for {}: {}", request.url, e))?;

    Ok(())
  }

  fn entry_count(&self, generation: &str) -> Result<usize> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let count: i64 = conn
      .query_row(
        "SELECT COUNT(*) FROM entries WHERE generation = ?",
        params![generation],
        |row| row.get(0),
      )
      .map_err(|e| eyre!("Failed to count entries of {}: {}", generation, e))?;

    Ok(count as usize)
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

  fn snapshot(body: &str) -> ResponseSnapshot {
    ResponseSnapshot {
      status: 200,
      headers: vec![("content-type".to_string(), "text/html".to_string())],
      body: body.as_bytes().to_vec(),
    }
  }

  #[test]
  fn test_put_then_get_round_trips() {
    let store = SqliteStore::open_in_memory().unwrap();
    store.open_generation("helmet-v1.0.0").unwrap();

    let request = CachedRequest::get("/index.html");
    store
      .put("helmet-v1.0.0", &request, &snapshot("<html>"))
      .unwrap();

    let entry = store.get("helmet-v1.0.0", &request).unwrap().unwrap();
    assert_eq!(entry.snapshot, snapshot("<html>"));
  }

  #[test]
  fn test_get_missing_is_none() {
    let store = SqliteStore::open_in_memory().unwrap();
    store.open_generation("helmet-v1.0.0").unwrap();

    let miss = store
      .get("helmet-v1.0.0", &CachedRequest::get("/missing"))
      .unwrap();
    assert!(miss.is_none());
  }

  #[test]
  fn test_put_same_key_is_last_write_wins() {
    let store = SqliteStore::open_in_memory().unwrap();
    store.open_generation("helmet-v1.0.0").unwrap();

    let request = CachedRequest::get("/style.css");
    store
      .put("helmet-v1.0.0", &request, &snapshot("first"))
      .unwrap();
    store
      .put("helmet-v1.0.0", &request, &snapshot("second"))
      .unwrap();

    let entry = store.get("helmet-v1.0.0", &request).unwrap().unwrap();
    assert_eq!(entry.snapshot.body, b"second");
    assert_eq!(store.entry_count("helmet-v1.0.0").unwrap(), 1);
  }

  #[test]
  fn test_delete_generation_removes_entries() {
    let store = SqliteStore::open_in_memory().unwrap();
    store.open_generation("helmet-v1.0.0").unwrap();
    store.open_generation("helmet-v2.0.0").unwrap();

    let request = CachedRequest::get("/index.html");
    store
      .put("helmet-v1.0.0", &request, &snapshot("old"))
      .unwrap();
    store
      .put("helmet-v2.0.0", &request, &snapshot("new"))
      .unwrap();

    assert!(store.delete_generation("helmet-v1.0.0").unwrap());
    assert!(!store.delete_generation("helmet-v1.0.0").unwrap());

    assert_eq!(
      store.list_generations().unwrap(),
      vec!["helmet-v2.0.0".to_string()]
    );
    assert!(store.get("helmet-v1.0.0", &request).unwrap().is_none());
    assert!(store.get("helmet-v2.0.0", &request).unwrap().is_some());
  }

  #[test]
  fn test_open_generation_is_idempotent() {
    let store = SqliteStore::open_in_memory().unwrap();
    store.open_generation("helmet-v1.0.0").unwrap();
    store.open_generation("helmet-v1.0.0").unwrap();
    assert_eq!(store.list_generations().unwrap().len(), 1);
  }
}
