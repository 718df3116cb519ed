//! Core types for the response cache.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::net::{Request, Response};

/// Identity of a request inside a cache partition.
///
/// Derived from method, URL (without fragment) and the values of the configured
/// vary headers, then hashed for stable, fixed-length keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
  hash: String,
  description: String,
}

impl RequestKey {
  pub fn for_request(request: &Request, vary_headers: &[String]) -> Self {
    let mut url = request.url.clone();
    url.set_fragment(None);

    let description = format!("{} {}", request.method.to_uppercase(), url);

    let mut input = description.clone();
    for name in vary_headers {
      let name = name.to_lowercase();
      let value = request.header(&name).unwrap_or_default();
      input.push('\n');
      input.push_str(&name);
      input.push(':');
      input.push_str(value);
    }

    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let hash = hex::encode(hasher.finalize());

    Self { hash, description }
  }

  pub fn hash(&self) -> &str {
    &self.hash
  }

  /// Human-readable form, e.g. "GET http://host/app.js"
  pub fn description(&self) -> &str {
    &self.description
  }
}

/// A stored response snapshot.
#[derive(Debug, Clone)]
pub struct CachedResponse {
  pub response: Response,
  /// When the snapshot was written
  pub cached_at: DateTime<Utc>,
}

/// Outcome of intercepting one request, including where the response came from.
#[derive(Debug, Clone)]
pub struct Intercepted {
  /// The response handed back to the caller, if any
  pub response: Option<Response>,
  pub source: CacheSource,
  /// When the served snapshot was cached (if from cache)
  pub cached_at: Option<DateTime<Utc>>,
}

impl Intercepted {
  pub fn from_network(response: Response) -> Self {
    Self {
      response: Some(response),
      source: CacheSource::Network,
      cached_at: None,
    }
  }

  pub fn from_cache(cached: CachedResponse) -> Self {
    Self {
      response: Some(cached.response),
      source: CacheSource::Cache,
      cached_at: Some(cached.cached_at),
    }
  }

  /// Network failed during a navigation and the root document was served instead.
  pub fn offline(cached: CachedResponse) -> Self {
    Self {
      response: Some(cached.response),
      source: CacheSource::Offline,
      cached_at: Some(cached.cached_at),
    }
  }

  pub fn unavailable() -> Self {
    Self {
      response: None,
      source: CacheSource::Unavailable,
      cached_at: None,
    }
  }
}

/// Indicates where an intercepted response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Stored snapshot for this request
  Cache,
  /// Fresh data from network
  Network,
  /// Network unavailable, serving the cached root document
  Offline,
  /// Network unavailable and nothing to fall back to
  Unavailable,
}
