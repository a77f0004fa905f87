//! Request and response snapshots passed between the agent, the cache and the network.

use serde::{Deserialize, Serialize};
use url::Url;

/// Body of the synthetic response returned when the network is unreachable.
pub const NETWORK_ERROR_BODY: &str = "Network error occurred";

/// HTTP request method.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
  Get,
  Head,
  Post,
  Put,
  Patch,
  Delete,
  Options,
  Other(String),
}

impl Method {
  pub fn as_str(&self) -> &str {
    match self {
      Method::Get => "GET",
      Method::Head => "HEAD",
      Method::Post => "POST",
      Method::Put => "PUT",
      Method::Patch => "PATCH",
      Method::Delete => "DELETE",
      Method::Options => "OPTIONS",
      Method::Other(m) => m,
    }
  }

  /// Parse a method name. Unknown names are kept verbatim (uppercased).
  pub fn parse(s: &str) -> Self {
    match s.trim().to_ascii_uppercase().as_str() {
      "GET" => Method::Get,
      "HEAD" => Method::Head,
      "POST" => Method::Post,
      "PUT" => Method::Put,
      "PATCH" => Method::Patch,
      "DELETE" => Method::Delete,
      "OPTIONS" => Method::Options,
      other => Method::Other(other.to_string()),
    }
  }
}

impl std::fmt::Display for Method {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Ordered header list. Names compare case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with(mut self, name: &str, value: &str) -> Self {
    self.append(name, value);
    self
  }

  pub fn append(&mut self, name: &str, value: &str) {
    self.0.push((name.to_string(), value.to_string()));
  }

  /// First value for `name`.
  pub fn get(&self, name: &str) -> Option<&str> {
    self
      .0
      .iter()
      .find(|(n, _)| n.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
    self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }
}

/// An outgoing request issued by a controlled page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
  pub method: Method,
  pub url: Url,
  pub headers: Headers,
  pub body: Option<Vec<u8>>,
}

impl Request {
  pub fn new(method: Method, url: Url) -> Self {
    Self {
      method,
      url,
      headers: Headers::new(),
      body: None,
    }
  }

  pub fn get(url: Url) -> Self {
    Self::new(Method::Get, url)
  }

  pub fn with_header(mut self, name: &str, value: &str) -> Self {
    self.headers.append(name, value);
    self
  }

  pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
    self.body = Some(body.into());
    self
  }

  /// Whether the request targets the same origin as `origin`.
  pub fn is_same_origin(&self, origin: &Url) -> bool {
    self.url.origin() == origin.origin()
  }
}

/// How a response relates to the page that requested it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
  /// Same-origin response; headers and body are fully readable.
  Basic,
  /// Cross-origin response allowed by CORS.
  Cors,
  /// Cross-origin response whose content cannot be inspected.
  Opaque,
}

impl ResponseType {
  pub fn as_str(&self) -> &'static str {
    match self {
      ResponseType::Basic => "basic",
      ResponseType::Cors => "cors",
      ResponseType::Opaque => "opaque",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "basic" => Some(ResponseType::Basic),
      "cors" => Some(ResponseType::Cors),
      "opaque" => Some(ResponseType::Opaque),
      _ => None,
    }
  }
}

/// A complete response snapshot: status line, headers and the whole body.
///
/// Cloning a snapshot yields an independent copy of the body, which is how the
/// fetch handler hands one copy to the page and stores the other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
  pub status: u16,
  pub status_text: String,
  pub headers: Headers,
  pub body: Vec<u8>,
  pub response_type: ResponseType,
  /// Final URL after redirects, if known.
  pub url: Option<String>,
  pub redirected: bool,
}

impl Response {
  pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
    Self {
      status,
      status_text: canonical_reason(status).to_string(),
      headers: Headers::new(),
      body: body.into(),
      response_type: ResponseType::Basic,
      url: None,
      redirected: false,
    }
  }

  pub fn with_header(mut self, name: &str, value: &str) -> Self {
    self.headers.append(name, value);
    self
  }

  pub fn with_type(mut self, response_type: ResponseType) -> Self {
    self.response_type = response_type;
    self
  }

  /// Substitute handed to the page when the network cannot be reached.
  pub fn network_error() -> Self {
    Response::new(408, NETWORK_ERROR_BODY)
      .with_header("Content-Type", "text/plain")
      .with_type(ResponseType::Basic)
  }

  /// Status in the 200-299 range.
  pub fn ok(&self) -> bool {
    (200..300).contains(&self.status)
  }

  /// Only complete, same-origin responses may be reused from the cache.
  pub fn is_cacheable(&self) -> bool {
    self.status == 200 && self.response_type == ResponseType::Basic
  }

  pub fn content_type(&self) -> Option<&str> {
    self.headers.get("content-type")
  }

  pub fn text(&self) -> String {
    String::from_utf8_lossy(&self.body).into_owned()
  }
}

fn canonical_reason(status: u16) -> &'static str {
  reqwest::StatusCode::from_u16(status)
    .ok()
    .and_then(|s| s.canonical_reason())
    .unwrap_or_default()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_method_parse_is_case_insensitive() {
    assert_eq!(Method::parse("get"), Method::Get);
    assert_eq!(Method::parse(" Post "), Method::Post);
    assert_eq!(Method::parse("purge"), Method::Other("PURGE".to_string()));
    assert_eq!(Method::parse("purge").as_str(), "PURGE");
  }

  #[test]
  fn test_headers_lookup_ignores_case() {
    let headers = Headers::new().with("Content-Type", "text/css");
    assert_eq!(headers.get("content-type"), Some("text/css"));
    assert_eq!(headers.get("accept"), None);
  }

  #[test]
  fn test_network_error_response() {
    let response = Response::network_error();
    assert_eq!(response.status, 408);
    assert_eq!(response.status_text, "Request Timeout");
    assert_eq!(response.content_type(), Some("text/plain"));
    assert_eq!(response.text(), "Network error occurred");
  }

  #[test]
  fn test_status_text_covers_uncommon_codes() {
    assert_eq!(Response::new(405, "").status_text, "Method Not Allowed");
    assert_eq!(Response::new(410, "").status_text, "Gone");
    assert_eq!(Response::new(429, "").status_text, "Too Many Requests");
    assert_eq!(Response::new(599, "").status_text, "");
  }

  #[test]
  fn test_only_basic_200_is_cacheable() {
    assert!(Response::new(200, "x").is_cacheable());
    assert!(!Response::new(404, "x").is_cacheable());
    assert!(!Response::new(302, "").is_cacheable());
    assert!(!Response::new(206, "x").is_cacheable());
    assert!(!Response::new(200, "x")
      .with_type(ResponseType::Opaque)
      .is_cacheable());
    assert!(!Response::new(200, "x")
      .with_type(ResponseType::Cors)
      .is_cacheable());
  }

  #[test]
  fn test_same_origin() {
    let origin = Url::parse("https://club.example").unwrap();
    let local = Request::get(Url::parse("https://club.example/style.css").unwrap());
    let remote = Request::get(Url::parse("https://cdn.example/font.woff").unwrap());
    assert!(local.is_same_origin(&origin));
    assert!(!remote.is_same_origin(&origin));
  }
}
