//! Core traits and types for the generation store.

use chrono::{DateTime, Utc};
use color_eyre::Result;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Request identity as the cache sees it: method plus URL.
///
/// Headers ride along so the interceptor can inspect `Accept`, but they are
/// not part of the cache key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedRequest {
  pub method: String,
  pub url: String,
  #[serde(default)]
  pub headers: Vec<(String, String)>,
}

impl CachedRequest {
  /// A plain GET request with no headers.
  pub fn get(url: impl Into<String>) -> Self {
    Self {
      method: "GET".to_string(),
      url: url.into(),
      headers: Vec::new(),
    }
  }

  /// Add a header, builder-style.
  pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.headers.push((name.into(), value.into()));
    self
  }

  pub fn is_get(&self) -> bool {
    self.method.eq_ignore_ascii_case("GET")
  }

  /// First header value with the given name (case-insensitive).
  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(n, _)| n.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }

  /// Whether the client asked for an HTML document.
  pub fn accepts_html(&self) -> bool {
    self
      .header("accept")
      .map(|v| v.contains("text/html"))
      .unwrap_or(false)
  }

  /// Stable fixed-length key for this request identity.
  pub fn cache_key(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.method.to_uppercase().as_bytes());
    hasher.update(b" ");
    hasher.update(self.url.as_bytes());
    hex::encode(hasher.finalize())
  }
}

/// A stored response: status, headers, body. Returned verbatim on a hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseSnapshot {
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
}

impl ResponseSnapshot {
  /// Body interpreted as UTF-8, for logs and the CLI.
  pub fn body_text(&self) -> String {
    String::from_utf8_lossy(&self.body).into_owned()
  }
}

/// A snapshot together with when it entered the store.
#[derive(Debug, Clone)]
pub struct StoredEntry {
  pub snapshot: ResponseSnapshot,
  pub cached_at: DateTime<Utc>,
}

/// Storage backend for named cache generations.
///
/// A generation maps request identities to response snapshots. Writes to the
/// same key are last-write-wins; responses for the same idempotent GET are
/// interchangeable, so no locking beyond the backend's own is required.
pub trait GenerationStore: Send + Sync {
  /// Open a generation, creating it if absent.
  fn open_generation(&self, name: &str) -> Result<()>;

  /// Names of every generation currently in the store.
  fn list_generations(&self) -> Result<Vec<String>>;

  /// Delete a generation and all its entries. Returns false if it was absent.
  fn delete_generation(&self, name: &str) -> Result<bool>;

  /// Look up a request in a generation.
  fn get(&self, generation: &str, request: &CachedRequest) -> Result<Option<StoredEntry>>;

  /// Store a snapshot under the request's identity.
  fn put(
    &self,
    generation: &str,
    request: &CachedRequest,
    snapshot: &ResponseSnapshot,
  ) -> Result<()>;

  /// Number of entries in a generation.
  fn entry_count(&self, generation: &str) -> Result<usize>;
}
