//! Core types for the response cache.

use chrono::{DateTime, Utc};

use super::key::{RequestKey, VaryValue};
use crate::http::Response;

/// A response found in a named cache.
#[derive(Debug, Clone)]
pub struct CachedResponse {
  /// The stored response snapshot
  pub response: Response,
  /// When the response was stored
  pub cached_at: DateTime<Utc>,
}

/// One stored request/response pair.
#[derive(Debug, Clone)]
pub struct StoredEntry {
  pub key: RequestKey,
  /// Request header values the response varies on
  pub vary: Vec<VaryValue>,
  pub response: Response,
  pub cached_at: DateTime<Utc>,
}

impl StoredEntry {
  pub fn to_cached(&self) -> CachedResponse {
    CachedResponse {
      response: self.response.clone(),
      cached_at: self.cached_at,
    }
  }
}
