//! In-memory generation store, for tests and ephemeral runs.

use chrono::Utc;
use color_eyre::{eyre::eyre, Result};
use std::collections::HashMap;
use std::sync::Mutex;

use super::traits::{CachedRequest, GenerationStore, ResponseSnapshot, StoredEntry};

/// Store backend with no persistence. Same semantics as [`super::SqliteStore`],
/// minus the disk.
#[derive(Default)]
pub struct MemoryStore {
  generations: Mutex<HashMap<String, HashMap<String, StoredEntry>>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

impl GenerationStore for MemoryStore {
  fn open_generation(&self, name: &str) -> Result<()> {
    let mut generations = self
      .generations
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    generations.entry(name.to_string()).or_default();
    Ok(())
  }

  fn list_generations(&self) -> Result<Vec<String>> {
    let generations = self
      .generations
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    let mut names: Vec<String> = generations.keys().cloned().collect();
    names.sort();
    Ok(names)
  }

  fn delete_generation(&self, name: &str) -> Result<bool> {
    let mut generations = self
      .generations
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(generations.remove(name).is_some())
  }

  fn get(&self, generation: &str, request: &CachedRequest) -> Result<Option<StoredEntry>> {
    let generations = self
      .generations
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(
      generations
        .get(generation)
        .and_then(|entries| entries.get(&request.cache_key()))
        .cloned(),
    )
  }

  fn put(
    &self,
    generation: &str,
    request: &CachedRequest,
    snapshot: &ResponseSnapshot,
  ) -> Result<()> {
    let mut generations = self
      .generations
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    let entries = generations.entry(generation.to_string()).or_default();
    entries.insert(
      request.cache_key(),
      StoredEntry {
        snapshot: snapshot.clone(),
        cached_at: Utc::now(),
      },
    );
    Ok(())
  }

  fn entry_count(&self, generation: &str) -> Result<usize> {
    let generations = self
      .generations
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(generations.get(generation).map(|e| e.len()).unwrap_or(0))
  }
}
