//! Network access for the agent.

mod client;

pub use client::HttpFetcher;

use std::future::Future;
use thiserror::Error;

use crate::http::{Request, Response};

/// Errors that prevent a response from being obtained at all.
///
/// An HTTP error status is not a `NetworkError`; it is a response.
#[derive(Debug, Error)]
pub enum NetworkError {
  /// The request could not be sent or the body could not be read.
  #[error("request to {url} failed: {source}")]
  Request {
    url: String,
    #[source]
    source: reqwest::Error,
  },

  /// The request could not be expressed as an HTTP request.
  #[error("invalid request: {0}")]
  InvalidRequest(String),

  /// The network is switched off.
  #[error("network unavailable")]
  Unavailable,
}

/// A live network fetch primitive.
pub trait Fetcher: Send + Sync {
  fn fetch(&self, request: &Request)
    -> impl Future<Output = Result<Response, NetworkError>> + Send;
}
