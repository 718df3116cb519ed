//! Cache storage trait and SQLite implementation.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

use super::traits::{CachedResponse, RequestKey};
use crate::net::Response;

/// Trait for cache storage backends.
///
/// Entries live in named partitions. Reading from a partition that does not
/// exist is an error; writing to one creates it.
pub trait CacheStorage: Send + Sync {
  /// Create the partition if it does not exist yet.
  fn open_partition(&self, partition: &str) -> Result<()>;

  /// Names of all existing partitions.
  fn partitions(&self) -> Result<Vec<String>>;

  fn has_partition(&self, partition: &str) -> Result<bool>;

  /// Delete a partition and every entry in it. Returns whether it existed.
  fn delete_partition(&self, partition: &str) -> Result<bool>;

  /// Look up the snapshot stored for a request.
  fn get(&self, partition: &str, key: &RequestKey) -> Result<Option<CachedResponse>>;

  /// Store a snapshot, replacing any previous one for the same key.
  fn put(&self, partition: &str, key: &RequestKey, response: &Response) -> Result<()>;

  /// Store several snapshots atomically: either all are written or none.
  fn put_all(&self, partition: &str, entries: &[(RequestKey, Response)]) -> Result<()>;

  /// Descriptions of the requests stored in a partition.
  fn keys(&self, partition: &str) -> Result<Vec<String>>;
}

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open or create the cache database at the given path.
  pub fn open(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::with_connection(conn)
  }

  /// Database that lives only as long as this value.
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory cache database: {}", e))?;

    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;

    Ok(storage)
  }

  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }
}

const CACHE_SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS cache_partitions (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Response snapshots (serialized JSON), one per request identity
CREATE TABLE IF NOT EXISTS cache_entries (
    partition TEXT NOT NULL,
    request_hash TEXT NOT NULL,
    request_description TEXT NOT NULL,
    data BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (partition, request_hash),
    FOREIGN KEY (partition) REFERENCES cache_partitions(name) ON DELETE CASCADE
);
"#;

fn partition_exists(conn: &Connection, partition: &str) -> Result<bool> {
  let found: Option<i64> = conn
    .query_row(
      "SELECT 1 FROM cache_partitions WHERE name = ?",
      params![partition],
      |row| row.get(0),
    )
    .optional()
    .map_err(|e| eyre!("Failed to look up cache partition {}: {}", partition, e))?;

  Ok(found.is_some())
}

fn insert_partition(conn: &Connection, partition: &str) -> Result<()> {
  conn
    .execute(
      "INSERT OR IGNORE INTO cache_partitions (name) VALUES (?)",
      params![partition],
    )
    .map_err(|e| eyre!("Failed to create cache partition {}: {}", partition, e))?;

  Ok(())
}

fn insert_entry(
  conn: &Connection,
  partition: &str,
  key: &RequestKey,
  response: &Response,
) -> Result<()> {
  let data =
    serde_json::to_vec(response).map_err(|e| eyre!("Failed to serialize response: {}", e))?;

  conn
    .execute(
      "INSERT OR REPLACE INTO cache_entries (partition, request_hash, request_description, data, cached_at)
       VALUES (?, ?, ?, ?, datetime('now'))",
      params![partition, key.hash(), key.description(), data],
    )
    .map_err(|e| eyre!("Failed to store {}: {}", key.description(), e))?;

  Ok(())
}

impl CacheStorage for SqliteStorage {
  fn open_partition(&self, partition: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    insert_partition(&conn, partition)
  }

  fn partitions(&self) -> Result<Vec<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT name FROM cache_partitions ORDER BY name")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list cache partitions: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read cache partition name: {}", e))?;

    Ok(names)
  }

  fn has_partition(&self, partition: &str) -> Result<bool> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    partition_exists(&conn, partition)
  }

  fn delete_partition(&self, partition: &str) -> Result<bool> {
    let mut conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute(
      "DELETE FROM cache_entries WHERE partition = ?",
      params![partition],
    )
    .map_err(|e| eyre!("Failed to delete entries of {}: {}", partition, e))?;

    let deleted = tx
      .execute(
        "DELETE FROM cache_partitions WHERE name = ?",
        params![partition],
      )
      .map_err(|e| eyre!("Failed to delete cache partition {}: {}", partition, e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(deleted > 0)
  }

  fn get(&self, partition: &str, key: &RequestKey) -> Result<Option<CachedResponse>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    if !partition_exists(&conn, partition)? {
      return Err(eyre!("Cache partition not found: {}", partition));
    }

    let result: Option<(Vec<u8>, String)> = conn
      .query_row(
        "SELECT data, cached_at FROM cache_entries
         WHERE partition = ? AND request_hash = ?",
        params![partition, key.hash()],
        |row| Ok((row.get(0)?, row.get(1)?)),
      )
      .optional()
      .map_err(|e| eyre!("Failed to look up {}: {}", key.description(), e))?;

    match result {
      Some((data, cached_at_str)) => {
        let response: Response = serde_json::from_slice(&data)
          .map_err(|e| eyre!("Failed to deserialize response: {}", e))?;
        let cached_at = parse_datetime(&cached_at_str)?;
        Ok(Some(CachedResponse {
          response,
          cached_at,
        }))
      }
      None => Ok(None),
    }
  }

  fn put(&self, partition: &str, key: &RequestKey, response: &Response) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    insert_partition(&conn, partition)?;
    insert_entry(&conn, partition, key, response)
  }

  fn put_all(&self, partition: &str, entries: &[(RequestKey, Response)]) -> Result<()> {
    let mut conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    // Dropping the transaction without commit rolls it back
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    insert_partition(&tx, partition)?;
    for (key, response) in entries {
      insert_entry(&tx, partition, key, response)?;
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }

  fn keys(&self, partition: &str) -> Result<Vec<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    if !partition_exists(&conn, partition)? {
      return Err(eyre!("Cache partition not found: {}", partition));
    }

    let mut stmt = conn
      .prepare(
        "SELECT request_description FROM cache_entries
         WHERE partition = ?
         ORDER BY request_description",
      )
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let keys = stmt
      .query_map(params![partition], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list entries of {}: {}", partition, e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read entry of {}: {}", partition, e))?;

    Ok(keys)
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
  use crate::net::{Request, ResponseType};
  use url::Url;

  fn key(path: &str) -> RequestKey {
    let url = Url::parse("http://sprinkler.local").unwrap().join(path).unwrap();
    RequestKey::for_request(&Request::get(url), &[])
  }

  fn page(body: &str) -> Response {
    Response::new(200, ResponseType::Basic)
      .with_header("content-type", "text/html")
      .with_body(body)
  }

  #[test]
  fn test_put_then_get_returns_snapshot() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage.put("v1", &key("/"), &page("<html>")).unwrap();

    let cached = storage.get("v1", &key("/")).unwrap().unwrap();
    assert_eq!(cached.response, page("<html>"));
    assert!(storage.get("v1", &key("/app.js")).unwrap().is_none());
  }

  #[test]
  fn test_get_from_missing_partition_fails() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    let err = storage.get("v0", &key("/")).unwrap_err();
    assert!(err.to_string().contains("not found"));
  }

  #[test]
  fn test_open_partition_is_idempotent() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage.open_partition("v1").unwrap();
    storage.open_partition("v1").unwrap();
    assert_eq!(storage.partitions().unwrap(), vec!["v1"]);
    assert!(storage.get("v1", &key("/")).unwrap().is_none());
  }

  #[test]
  fn test_put_replaces_existing_entry() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage.put("v1", &key("/"), &page("old")).unwrap();
    storage.put("v1", &key("/"), &page("new")).unwrap();

    let cached = storage.get("v1", &key("/")).unwrap().unwrap();
    assert_eq!(cached.response.text(), "new");
    assert_eq!(storage.keys("v1").unwrap().len(), 1);
  }

  #[test]
  fn test_partitions_are_isolated() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage.put("v0", &key("/"), &page("old")).unwrap();
    storage.open_partition("v1").unwrap();

    assert!(storage.get("v1", &key("/")).unwrap().is_none());
    assert_eq!(storage.partitions().unwrap(), vec!["v0", "v1"]);
  }

  #[test]
  fn test_delete_partition_removes_entries() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    storage.put("v0", &key("/"), &page("old")).unwrap();

    assert!(storage.delete_partition("v0").unwrap());
    assert!(!storage.delete_partition("v0").unwrap());
    assert!(!storage.has_partition("v0").unwrap());
    assert!(storage.get("v0", &key("/")).is_err());

    // Recreating the name starts empty
    storage.open_partition("v0").unwrap();
    assert!(storage.get("v0", &key("/")).unwrap().is_none());
  }

  #[test]
  fn test_put_all_and_keys() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    let entries = vec![(key("/"), page("root")), (key("/app.js"), page("js"))];
    storage.put_all("v1", &entries).unwrap();

    assert_eq!(
      storage.keys("v1").unwrap(),
      vec![
        "GET http://sprinkler.local/",
        "GET http://sprinkler.local/app.js"
      ]
    );
  }

  #[test]
  fn test_file_database_persists() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("cache.db");

    {
      let storage = SqliteStorage::open(&path).unwrap();
      storage.put("v1", &key("/"), &page("root")).unwrap();
    }

    let storage = SqliteStorage::open(&path).unwrap();
    assert_eq!(
      storage.get("v1", &key("/")).unwrap().unwrap().response.text(),
      "root"
    );
  }

  #[test]
  fn test_parse_datetime() {
    let dt = parse_datetime("2024-01-02 03:04:05").unwrap();
    assert_eq!(dt.to_rfc3339(), "2024-01-02T03:04:05+00:00");
    assert!(parse_datetime("yesterday").is_err());
  }
}
