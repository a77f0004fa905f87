//! Request identity: how requests map to cache entries.

use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::http::{Method, Request, Response};

/// Identity of a cached request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestKey {
  /// SHA256 of method and URL, used as the storage key
  pub hash: String,
  pub method: Method,
  /// URL without fragment
  pub url: String,
}

impl RequestKey {
  pub fn for_request(request: &Request) -> Self {
    let url = normalize_url(request);
    let input = format!("{} {}", request.method, url);

    // SHA256 hash for stable, fixed-length keys
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let hash = hex::encode(hasher.finalize());

    Self {
      hash,
      method: request.method.clone(),
      url,
    }
  }
}

/// A request header named by the stored response's `Vary` header, with the
/// value the original request carried (`None` if it was absent).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaryValue {
  pub name: String,
  pub value: Option<String>,
}

/// Fragments never reach the server and are not part of request identity.
fn normalize_url(request: &Request) -> String {
  let mut url = request.url.clone();
  url.set_fragment(None);
  url.to_string()
}

/// Check that a request/response pair may be stored and capture the request
/// header values the response varies on.
pub fn prepare_put(request: &Request, response: &Response) -> Result<Vec<VaryValue>> {
  if request.method != Method::Get {
    return Err(eyre!(
      "Cannot cache {} request for {}: only GET requests are cacheable",
      request.method,
      request.url
    ));
  }

  if response.status == 206 {
    return Err(eyre!(
      "Cannot cache partial response for {}",
      request.url
    ));
  }

  let names = vary_names(response);
  if names.iter().any(|n| n == "*") {
    return Err(eyre!(
      "Cannot cache response for {} with Vary: *",
      request.url
    ));
  }

  Ok(
    names
      .into_iter()
      .map(|name| VaryValue {
        value: request.headers.get(&name).map(String::from),
        name,
      })
      .collect(),
  )
}

/// Whether `request` carries the same values for every header the stored
/// response varies on.
pub fn vary_matches(stored: &[VaryValue], request: &Request) -> bool {
  stored
    .iter()
    .all(|v| request.headers.get(&v.name) == v.value.as_deref())
}

fn vary_names(response: &Response) -> Vec<String> {
  response
    .headers
    .iter()
    .filter(|(name, _)| name.eq_ignore_ascii_case("vary"))
    .flat_map(|(_, value)| value.split(','))
    .map(|n| n.trim().to_ascii_lowercase())
    .filter(|n| !n.is_empty())
    .collect()
}
