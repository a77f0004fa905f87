use std::time::Duration;
use url::Url;

use super::{Fetcher, NetworkError};
use crate::http::{Headers, Request, Response, ResponseType};

/// HTTP fetcher backed by reqwest.
///
/// Responses whose final URL shares the site origin are typed `basic`;
/// anything that ends up on another origin is typed `cors`.
#[derive(Clone)]
pub struct HttpFetcher {
  client: reqwest::Client,
  origin: Url,
  online: bool,
}

impl HttpFetcher {
  pub fn new(origin: Url, timeout: Option<Duration>) -> Result<Self, NetworkError> {
    let mut builder = reqwest::Client::builder();
    if let Some(timeout) = timeout {
      builder = builder.timeout(timeout);
    }
    let client = builder.build().map_err(|e| NetworkError::Request {
      url: origin.to_string(),
      source: e,
    })?;

    Ok(Self {
      client,
      origin,
      online: true,
    })
  }

  /// Simulate a disconnected network: every fetch fails.
  pub fn with_offline(mut self, offline: bool) -> Self {
    self.online = !offline;
    self
  }

  fn response_type(&self, final_url: &Url) -> ResponseType {
    if final_url.origin() == self.origin.origin() {
      ResponseType::Basic
    } else {
      ResponseType::Cors
    }
  }
}

impl Fetcher for HttpFetcher {
  async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
    if !self.online {
      return Err(NetworkError::Unavailable);
    }

    let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
      .map_err(|e| NetworkError::InvalidRequest(e.to_string()))?;

    let mut builder = self.client.request(method, request.url.clone());
    for (name, value) in request.headers.iter() {
      builder = builder.header(name, value);
    }
    if let Some(body) = &request.body {
      builder = builder.body(body.clone());
    }

    let url = request.url.to_string();
    let resp = builder.send().await.map_err(|e| NetworkError::Request {
      url: url.clone(),
      source: e,
    })?;

    let status = resp.status();
    let final_url = resp.url().clone();
    let mut headers = Headers::new();
    for (name, value) in resp.headers() {
      // Non-UTF-8 bytes become U+FFFD rather than dropping the header
      headers.append(name.as_str(), &String::from_utf8_lossy(value.as_bytes()));
    }

    let body = resp
      .bytes()
      .await
      .map_err(|e| NetworkError::Request { url, source: e })?;

    Ok(Response {
      status: status.as_u16(),
      status_text: status.canonical_reason().unwrap_or_default().to_string(),
      headers,
      body: body.to_vec(),
      response_type: self.response_type(&final_url),
      redirected: final_url != request.url,
      url: Some(final_url.to_string()),
    })
  }
}
