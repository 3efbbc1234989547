//! Network access: a thin client trait plus the reqwest implementation.
//!
//! The interceptor and the generation manager only ever talk to the network
//! through [`Network`], so tests can script responses and outages with the
//! in-memory fake.

use color_eyre::{eyre::eyre, Result};
use serde_json::Value;
use url::Url;

use crate::store::{CachedRequest, ResponseSnapshot};

/// How a response's origin relates to the application origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
  /// Same-origin response; eligible for the cache.
  Basic,
  /// Cross-origin response; returned to the caller but never cached.
  Opaque,
}

/// A response fresh off the network, not yet split for caching.
///
/// The underlying body can only be consumed once, so any copy destined for
/// the cache must be taken through [`NetworkResponse::split`] — never as a
/// side effect of storing.
#[derive(Debug)]
pub struct NetworkResponse {
  kind: ResponseKind,
  snapshot: ResponseSnapshot,
}

impl NetworkResponse {
  pub fn new(kind: ResponseKind, snapshot: ResponseSnapshot) -> Self {
    Self { kind, snapshot }
  }

  /// Whether this response may be written into a generation:
  /// status 200 and same-origin.
  pub fn cacheable(&self) -> bool {
    self.snapshot.status == 200 && self.kind == ResponseKind::Basic
  }

  pub fn status(&self) -> u16 {
    self.snapshot.status
  }

  /// Split into two independently consumable snapshots: the cache copy and
  /// the caller copy. The body is duplicated exactly once, here.
  pub fn split(self) -> (ResponseSnapshot, ResponseSnapshot) {
    (self.snapshot.clone(), self.snapshot)
  }

  /// Give up the snapshot without taking a cache copy.
  pub fn into_snapshot(self) -> ResponseSnapshot {
    self.snapshot
  }
}

/// Client used by the worker for all remote traffic.
#[allow(async_fn_in_trait)]
pub trait Network: Send + Sync {
  /// Perform the request against the real network.
  async fn fetch(&self, request: &CachedRequest) -> Result<NetworkResponse>;

  /// POST a JSON body, returning the response status.
  async fn post_json(&self, url: &str, body: &Value) -> Result<u16>;
}

/// Production client: reqwest against the configured application origin.
pub struct ReqwestNetwork {
  client: reqwest::Client,
  origin: Url,
}

impl ReqwestNetwork {
  pub fn new(origin: &str) -> Result<Self> {
    let origin =
      Url::parse(origin).map_err(|e| eyre!("Invalid application origin {}: {}", origin, e))?;
    let client = reqwest::Client::builder()
      .build()
      .map_err(|e| eyre!("Failed to build HTTP client: {}", e))?;

    Ok(Self { client, origin })
  }

  /// Resolve a possibly relative URL against the application origin.
  fn resolve(&self, url: &str) -> Result<Url> {
    match Url::parse(url) {
      Ok(absolute) => Ok(absolute),
      Err(url::ParseError::RelativeUrlWithoutBase) => self
        .origin
        .join(url)
        .map_err(|e| eyre!("Failed to resolve {} against origin: {}", url, e)),
      Err(e) => Err(eyre!("Invalid URL {}: {}", url, e)),
    }
  }

  /// Classify a response URL against the application origin.
  /// Redirects may land cross-origin, so this runs on the final URL.
  fn classify(&self, url: &Url) -> ResponseKind {
    let same_origin = url.scheme() == self.origin.scheme()
      && url.host_str() == self.origin.host_str()
      && url.port_or_known_default() == self.origin.port_or_known_default();
    if same_origin {
      ResponseKind::Basic
    } else {
      ResponseKind::Opaque
    }
  }
}

impl Network for ReqwestNetwork {
  async fn fetch(&self, request: &CachedRequest) -> Result<NetworkResponse> {
    let url = self.resolve(&request.url)?;
    let method = reqwest::Method::from_bytes(request.method.as_bytes())
      .map_err(|e| eyre!("Invalid method {}: {}", request.method, e))?;

    let mut builder = self.client.request(method, url);
    for (name, value) in &request.headers {
      builder = builder.header(name, value);
    }

    let response = builder
      .send()
      .await
      .map_err(|e| eyre!("Fetch failed for {}: {}", request.url, e))?;

    let kind = self.classify(response.url());
    let status = response.status().as_u16();
    let headers: Vec<(String, String)> = response
      .headers()
      .iter()
      .map(|(name, value)| {
        (
          name.as_str().to_string(),
          String::from_utf8_lossy(value.as_bytes()).into_owned(),
        )
      })
      .collect();

    let body = response
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read body of {}: {}", request.url, e))?
      .to_vec();

    Ok(NetworkResponse::new(
      kind,
      ResponseSnapshot {
        status,
        headers,
        body,
      },
    ))
  }

  async fn post_json(&self, url: &str, body: &Value) -> Result<u16> {
    let url = self.resolve(url)?;
    let response = self
      .client
      .post(url)
      .json(body)
      .send()
      .await
      .map_err(|e| eyre!("POST failed: {}", e))?;

    Ok(response.status().as_u16())
  }
}


#[cfg(test)]
mod tests {
  use super::*;

  fn snapshot(status: u16) -> ResponseSnapshot {
    ResponseSnapshot {
      status,
      headers: Vec::new(),
      body: b"body".to_vec(),
    }
  }

  #[test]
  fn test_cacheable_requires_200_and_basic() {
    assert!(NetworkResponse::new(ResponseKind::Basic, snapshot(200)).cacheable());
    assert!(!NetworkResponse::new(ResponseKind::Basic, snapshot(404)).cacheable());
    assert!(!NetworkResponse::new(ResponseKind::Opaque, snapshot(200)).cacheable());
  }

  #[test]
  fn test_split_yields_identical_snapshots() {
    let response = NetworkResponse::new(ResponseKind::Basic, snapshot(200));
    let (cache_copy, caller_copy) = response.split();
    assert_eq!(cache_copy, caller_copy);
  }

  #[test]
  fn test_classify_origin() {
    let network = ReqwestNetwork::new("http://localhost:8080").unwrap();
    let same = Url::parse("http://localhost:8080/index.html").unwrap();
    let other_port = Url::parse("http://localhost:9090/index.html").unwrap();
    let other_host = Url::parse("http://example.com/index.html").unwrap();

    assert_eq!(network.classify(&same), ResponseKind::Basic);
    assert_eq!(network.classify(&other_port), ResponseKind::Opaque);
    assert_eq!(network.classify(&other_host), ResponseKind::Opaque);
  }

  #[test]
  fn test_resolve_relative_url() {
    let network = ReqwestNetwork::new("http://localhost:8080").unwrap();
    let resolved = network.resolve("/manifest.json").unwrap();
    assert_eq!(resolved.as_str(), "http://localhost:8080/manifest.json");

    let absolute = network.resolve("https://cdn.example.com/lib.js").unwrap();
    assert_eq!(absolute.as_str(), "https://cdn.example.com/lib.js");
  }
}
