//! Request interception: cache-first with network fallback and offline
//! recovery.
//!
//! No failure here is ever fatal. Anything that would break the
//! request/response contract is recovered locally (cache, offline page);
//! secondary bookkeeping failures (cache writes, cache reads) are logged and
//! dropped.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::net::{Network, NetworkResponse};
use crate::store::{CachedRequest, GenerationStore, ResponseSnapshot};

/// Where an intercepted response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
  /// Served from the active generation; no network call was made.
  Cache,
  /// Fetched from the network (and, if eligible, written back to the cache).
  Network,
  /// Network failed; the pre-seeded offline document was served instead.
  OfflineFallback,
}

impl ResponseSource {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Cache => "cache",
      Self::Network => "network",
      Self::OfflineFallback => "offline-fallback",
    }
  }
}

/// Outcome of a single interception.
#[derive(Debug)]
pub enum InterceptOutcome {
  /// A response was produced for the caller.
  Response {
    snapshot: ResponseSnapshot,
    source: ResponseSource,
  },
  /// Network failed, nothing cached matched, and no fallback applies.
  /// A defined failure signal rather than an empty response.
  Unavailable { url: String, reason: String },
}

/// Answers every outgoing request from the active generation when possible,
/// keeps the generation warm with fresh successful responses, and recovers
/// network failures for HTML requests with the offline fallback document.
pub struct Interceptor<S, N> {
  store: Arc<S>,
  network: Arc<N>,
  generation: String,
  offline_fallback: String,
}

impl<S: GenerationStore, N: Network> Interceptor<S, N> {
  pub fn new(
    store: Arc<S>,
    network: Arc<N>,
    generation: impl Into<String>,
    offline_fallback: impl Into<String>,
  ) -> Self {
    Self {
      store,
      network,
      generation: generation.into(),
      offline_fallback: offline_fallback.into(),
    }
  }

  /// Decide cache, network, or offline fallback for one request.
  pub async fn intercept(&self, request: &CachedRequest) -> InterceptOutcome {
    // Non-GET requests pass through untouched: the cache is never read
    // or written for them.
    if !request.is_get() {
      return self.passthrough(request).await;
    }

    match self.store.get(&self.generation, request) {
      Ok(Some(entry)) => {
        debug!(url = %request.url, cached_at = %entry.cached_at, "Serving from cache");
        return InterceptOutcome::Response {
          snapshot: entry.snapshot,
          source: ResponseSource::Cache,
        };
      }
      Ok(None) => {}
      Err(e) => {
        warn!(url = %request.url, error = %e, "Cache lookup failed, treating as miss");
      }
    }

    match self.network.fetch(request).await {
      Ok(response) => self.store_if_eligible(request, response),
      Err(e) => self.recover_offline(request, e),
    }
  }

  /// Cache-miss-then-network-success arm: store eligible responses, return
  /// the caller copy either way.
  fn store_if_eligible(
    &self,
    request: &CachedRequest,
    response: NetworkResponse,
  ) -> InterceptOutcome {
    if !response.cacheable() {
      return InterceptOutcome::Response {
        snapshot: response.into_snapshot(),
        source: ResponseSource::Network,
      };
    }

    let (cache_copy, snapshot) = response.split();
    if let Err(e) = self.store.put(&self.generation, request, &cache_copy) {
      // Not a request failure: the caller still gets the response.
      warn!(url = %request.url, error = %e, "Failed to cache response");
    } else {
      debug!(url = %request.url, "Cached network response");
    }

    InterceptOutcome::Response {
      snapshot,
      source: ResponseSource::Network,
    }
  }

  /// Network-failure arm: HTML requests get the offline fallback document,
  /// everything else surfaces as unavailable.
  fn recover_offline(
    &self,
    request: &CachedRequest,
    error: color_eyre::Report,
  ) -> InterceptOutcome {
    if request.accepts_html() {
      let fallback = CachedRequest::get(&self.offline_fallback);
      match self.store.get(&self.generation, &fallback) {
        Ok(Some(entry)) => {
          info!(url = %request.url, "Offline, serving fallback document");
          return InterceptOutcome::Response {
            snapshot: entry.snapshot,
            source: ResponseSource::OfflineFallback,
          };
        }
        Ok(None) => {
          warn!(fallback = %self.offline_fallback, "Offline fallback not in cache");
        }
        Err(e) => {
          warn!(fallback = %self.offline_fallback, error = %e, "Offline fallback lookup failed");
        }
      }
    }

    InterceptOutcome::Unavailable {
      url: request.url.clone(),
      reason: error.to_string(),
    }
  }

  async fn passthrough(&self, request: &CachedRequest) -> InterceptOutcome {
    match self.network.fetch(request).await {
      Ok(response) => InterceptOutcome::Response {
        snapshot: response.into_snapshot(),
        source: ResponseSource::Network,
      },
      Err(e) => InterceptOutcome::Unavailable {
        url: request.url.clone(),
        reason: e.to_string(),
      },
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::net::fake::FakeNetwork;
  use crate::net::ResponseKind;
  use crate::store::MemoryStore;

  const GENERATION: &str = "helmet-v1.0.0";

  fn setup() -> (
    Arc<MemoryStore>,
    Arc<FakeNetwork>,
    Interceptor<MemoryStore, FakeNetwork>,
  ) {
    let store = Arc::new(MemoryStore::new());
    let network = Arc::new(FakeNetwork::new());
    store.open_generation(GENERATION).unwrap();
    let interceptor = Interceptor::new(
      store.clone(),
      network.clone(),
      GENERATION,
      "/index.html",
    );
    (store, network, interceptor)
  }

  fn seed(store: &MemoryStore, url: &str, body: &str) {
    store
      .put(
        GENERATION,
        &CachedRequest::get(url),
        &ResponseSnapshot {
          status: 200,
          headers: Vec::new(),
          body: body.as_bytes().to_vec(),
        },
      )
      .unwrap();
  }

  #[tokio::test]
  async fn test_hit_returns_snapshot_without_network() {
    let (store, network, interceptor) = setup();
    seed(&store, "/index.html", "<html>home</html>");

    let outcome = interceptor
      .intercept(&CachedRequest::get("/index.html"))
      .await;

    match outcome {
      InterceptOutcome::Response { snapshot, source } => {
        assert_eq!(source, ResponseSource::Cache);
        assert_eq!(snapshot.body, b"<html>home</html>");
      }
      other => panic!("expected cache hit, got {:?}", other),
    }
    assert_eq!(network.total_fetches(), 0);
  }

  #[tokio::test]
  async fn test_miss_fetches_and_caches_eligible_response() {
    let (_store, network, interceptor) = setup();
    network.serve("/style.css", 200, ResponseKind::Basic, "body{}");

    let outcome = interceptor.intercept(&CachedRequest::get("/style.css")).await;
    match outcome {
      InterceptOutcome::Response { snapshot, source } => {
        assert_eq!(source, ResponseSource::Network);
        assert_eq!(snapshot.body, b"body{}");
      }
      other => panic!("expected network response, got {:?}", other),
    }

    // Now cached: second fetch is served with zero network calls.
    let outcome = interceptor.intercept(&CachedRequest::get("/style.css")).await;
    match outcome {
      InterceptOutcome::Response { source, .. } => assert_eq!(source, ResponseSource::Cache),
      other => panic!("expected cache hit, got {:?}", other),
    }
    assert_eq!(network.fetch_count("/style.css"), 1);
  }

  #[tokio::test]
  async fn test_non_200_is_returned_but_not_cached() {
    let (store, network, interceptor) = setup();
    network.serve("/missing", 404, ResponseKind::Basic, "not found");

    let outcome = interceptor.intercept(&CachedRequest::get("/missing")).await;
    match outcome {
      InterceptOutcome::Response { snapshot, source } => {
        assert_eq!(source, ResponseSource::Network);
        assert_eq!(snapshot.status, 404);
      }
      other => panic!("expected network response, got {:?}", other),
    }
    assert_eq!(store.entry_count(GENERATION).unwrap(), 0);
  }

  #[tokio::test]
  async fn test_opaque_response_is_returned_but_not_cached() {
    let (store, network, interceptor) = setup();
    network.serve(
      "https://cdn.example.com/lib.js",
      200,
      ResponseKind::Opaque,
      "lib",
    );

    let outcome = interceptor
      .intercept(&CachedRequest::get("https://cdn.example.com/lib.js"))
      .await;
    match outcome {
      InterceptOutcome::Response { source, .. } => assert_eq!(source, ResponseSource::Network),
      other => panic!("expected network response, got {:?}", other),
    }
    assert_eq!(store.entry_count(GENERATION).unwrap(), 0);
  }

  #[tokio::test]
  async fn test_non_get_never_touches_cache() {
    let (store, network, interceptor) = setup();
    seed(&store, "/api/helmet/state", "stale");
    network.serve("/api/helmet/state", 200, ResponseKind::Basic, "fresh");

    let mut request = CachedRequest::get("/api/helmet/state");
    request.method = "POST".to_string();

    let outcome = interceptor.intercept(&request).await;
    match outcome {
      InterceptOutcome::Response { snapshot, source } => {
        assert_eq!(source, ResponseSource::Network);
        assert_eq!(snapshot.body, b"fresh");
      }
      other => panic!("expected pass-through, got {:?}", other),
    }
    // The POST was not cached over the seeded GET entry.
    assert_eq!(store.entry_count(GENERATION).unwrap(), 1);
    let seeded = store
      .get(GENERATION, &CachedRequest::get("/api/helmet/state"))
      .unwrap()
      .unwrap();
    assert_eq!(seeded.snapshot.body, b"stale");
  }

  #[tokio::test]
  async fn test_offline_html_request_gets_fallback_document() {
    let (store, _network, interceptor) = setup();
    seed(&store, "/index.html", "<html>offline shell</html>");

    let request = CachedRequest::get("/page.html").with_header("Accept", "text/html");
    let outcome = interceptor.intercept(&request).await;

    match outcome {
      InterceptOutcome::Response { snapshot, source } => {
        assert_eq!(source, ResponseSource::OfflineFallback);
        assert_eq!(snapshot.body, b"<html>offline shell</html>");
      }
      other => panic!("expected offline fallback, got {:?}", other),
    }
  }

  #[tokio::test]
  async fn test_offline_non_html_request_is_unavailable() {
    let (store, _network, interceptor) = setup();
    seed(&store, "/index.html", "<html>offline shell</html>");

    let request = CachedRequest::get("/data.json").with_header("Accept", "application/json");
    let outcome = interceptor.intercept(&request).await;

    match outcome {
      InterceptOutcome::Unavailable { url, .. } => assert_eq!(url, "/data.json"),
      other => panic!("expected unavailable, got {:?}", other),
    }
  }

  #[tokio::test]
  async fn test_offline_html_without_seeded_fallback_is_unavailable() {
    let (_store, _network, interceptor) = setup();

    let request = CachedRequest::get("/page.html").with_header("Accept", "text/html");
    let outcome = interceptor.intercept(&request).await;

    assert!(matches!(outcome, InterceptOutcome::Unavailable { .. }));
  }
}
