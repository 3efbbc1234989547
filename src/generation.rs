//! Cache generation lifecycle: create-and-seed at install, promote-and-sweep
//! at activation.

use color_eyre::{eyre::eyre, Result};
use futures::future;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::net::Network;
use crate::store::{CachedRequest, GenerationStore};

/// Owns the identity of the current cache generation.
///
/// The generation name is passed in explicitly (from config), so multiple
/// generations and policies can coexist in tests.
pub struct GenerationManager<S, N> {
  store: Arc<S>,
  network: Arc<N>,
  generation: String,
  manifest: Vec<String>,
}

impl<S: GenerationStore, N: Network> GenerationManager<S, N> {
  pub fn new(
    store: Arc<S>,
    network: Arc<N>,
    generation: impl Into<String>,
    manifest: Vec<String>,
  ) -> Self {
    Self {
      store,
      network,
      generation: generation.into(),
      manifest,
    }
  }

  /// Create the generation and seed every manifest resource into it.
  ///
  /// All-or-nothing: if any manifest URL cannot be fetched and stored, the
  /// install fails and the partially seeded generation is dropped, leaving
  /// the previous generation authoritative.
  pub async fn create_and_seed(&self) -> Result<()> {
    info!(generation = %self.generation, "Installing cache generation");
    self.store.open_generation(&self.generation)?;

    let seeds = self.manifest.iter().map(|url| self.seed_one(url));
    if let Err(e) = future::try_join_all(seeds).await {
      if let Err(del) = self.store.delete_generation(&self.generation) {
        warn!(generation = %self.generation, error = %del, "Failed to drop partial generation");
      }
      return Err(e);
    }

    let seeded = self.store.entry_count(&self.generation)?;
    info!(generation = %self.generation, resources = seeded, "Generation seeded");
    Ok(())
  }

  async fn seed_one(&self, url: &str) -> Result<()> {
    let request = CachedRequest::get(url);
    let response = self
      .network
      .fetch(&request)
      .await
      .map_err(|e| eyre!("Failed to seed {}: {}", url, e))?;

    if !response.cacheable() {
      return Err(eyre!(
        "Failed to seed {}: ineligible response (status {})",
        url,
        response.status()
      ));
    }

    self
      .store
      .put(&self.generation, &request, &response.into_snapshot())?;
    debug!(url, "Seeded");
    Ok(())
  }

  /// Delete every generation whose name differs from the current one.
  ///
  /// Runs at activation, after which the current generation is the only one
  /// the store knows about.
  pub fn promote_and_sweep(&self) -> Result<()> {
    for name in self.store.list_generations()? {
      if name != self.generation {
        info!(stale = %name, "Deleting stale cache generation");
        self.store.delete_generation(&name)?;
      }
    }
    Ok(())
  }
}
