//! In-memory cache storage, used for ephemeral runs and tests.

use chrono::Utc;
use color_eyre::{eyre::eyre, Result};
use std::sync::RwLock;

use super::key::{prepare_put, vary_matches, RequestKey};
use super::storage::CacheStorage;
use super::traits::{CachedResponse, StoredEntry};
use crate::http::{Method, Request, Response};

struct NamedCache {
  name: String,
  entries: Vec<StoredEntry>,
}

impl NamedCache {
  fn upsert(&mut self, entry: StoredEntry) {
    match self.entries.iter_mut().find(|e| e.key.hash == entry.key.hash) {
      Some(existing) => *existing = entry,
      None => self.entries.push(entry),
    }
  }
}

/// Storage that keeps every cache in process memory.
#[derive(Default)]
pub struct MemoryStorage {
  caches: RwLock<Vec<NamedCache>>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }
}

fn build_entry(request: &Request, response: &Response) -> Result<StoredEntry> {
  let vary = prepare_put(request, response)?;
  Ok(StoredEntry {
    key: RequestKey::for_request(request),
    vary,
    response: response.clone(),
    cached_at: Utc::now(),
  })
}

fn cache_mut<'a>(caches: &'a mut Vec<NamedCache>, cache_name: &str) -> &'a mut NamedCache {
  let index = match caches.iter().position(|c| c.name == cache_name) {
    Some(index) => index,
    None => {
      caches.push(NamedCache {
        name: cache_name.to_string(),
        entries: Vec::new(),
      });
      caches.len() - 1
    }
  };
  &mut caches[index]
}

impl CacheStorage for MemoryStorage {
  fn open(&self, cache_name: &str) -> Result<()> {
    let mut caches = self
      .caches
      .write()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    cache_mut(&mut caches, cache_name);
    Ok(())
  }

  fn match_request(&self, cache_name: &str, request: &Request) -> Result<Option<CachedResponse>> {
    if request.method != Method::Get {
      return Ok(None);
    }

    let caches = self
      .caches
      .read()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    let key = RequestKey::for_request(request);

    Ok(
      caches
        .iter()
        .find(|c| c.name == cache_name)
        .and_then(|c| c.entries.iter().find(|e| e.key.hash == key.hash))
        .filter(|e| vary_matches(&e.vary, request))
        .map(StoredEntry::to_cached),
    )
  }

  fn put(&self, cache_name: &str, request: &Request, response: &Response) -> Result<()> {
    let entry = build_entry(request, response)?;
    let mut caches = self
      .caches
      .write()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    cache_mut(&mut caches, cache_name).upsert(entry);
    Ok(())
  }

  fn put_all(&self, cache_name: &str, entries: &[(Request, Response)]) -> Result<()> {
    // Validate everything before touching the cache
    let built = entries
      .iter()
      .map(|(request, response)| build_entry(request, response))
      .collect::<Result<Vec<_>>>()?;

    let mut caches = self
      .caches
      .write()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    let cache = cache_mut(&mut caches, cache_name);
    for entry in built {
      cache.upsert(entry);
    }
    Ok(())
  }

  fn keys(&self) -> Result<Vec<String>> {
    let caches = self
      .caches
      .read()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(caches.iter().map(|c| c.name.clone()).collect())
  }

  fn delete(&self, cache_name: &str) -> Result<bool> {
    let mut caches = self
      .caches
      .write()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    let before = caches.len();
    caches.retain(|c| c.name != cache_name);
    Ok(caches.len() != before)
  }

  fn entries(&self, cache_name: &str) -> Result<Vec<RequestKey>> {
    let caches = self
      .caches
      .read()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(
      caches
        .iter()
        .find(|c| c.name == cache_name)
        .map(|c| c.entries.iter().map(|e| e.key.clone()).collect())
        .unwrap_or_default(),
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use url::Url;

  fn get(path: &str) -> Request {
    Request::get(Url::parse("https://club.example").unwrap().join(path).unwrap())
  }

  #[test]
  fn test_put_creates_cache() {
    let storage = MemoryStorage::new();
    storage.put("v1", &get("/"), &Response::new(200, "home")).unwrap();

    assert_eq!(storage.keys().unwrap(), vec!["v1"]);
    let cached = storage.match_request("v1", &get("/")).unwrap().unwrap();
    assert_eq!(cached.response.text(), "home");
  }

  #[test]
  fn test_non_get_never_matches() {
    let storage = MemoryStorage::new();
    storage.put("v1", &get("/books"), &Response::new(200, "list")).unwrap();

    let post = Request::new(Method::Post, get("/books").url);
    assert!(storage.match_request("v1", &post).unwrap().is_none());
  }

  #[test]
  fn test_put_all_rejects_whole_batch() {
    let storage = MemoryStorage::new();
    let batch = vec![
      (get("/"), Response::new(200, "home")),
      (get("/range"), Response::new(206, "partial")),
    ];

    assert!(storage.put_all("v1", &batch).is_err());
    assert!(storage.keys().unwrap().is_empty());
  }

  #[test]
  fn test_delete_reports_existence() {
    let storage = MemoryStorage::new();
    storage.open("v0").unwrap();
    storage.open("v1").unwrap();

    assert!(storage.delete("v0").unwrap());
    assert!(!storage.delete("v0").unwrap());
    assert_eq!(storage.keys().unwrap(), vec!["v1"]);
  }
}
