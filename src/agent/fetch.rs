use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use super::OfflineAgent;
use crate::cache::CacheStorage;
use crate::host::Host;
use crate::http::{Method, Request, Response};
use crate::network::Fetcher;

/// Where an intercepted response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
  Cache,
  Network,
  /// Synthetic response standing in for a failed network fetch
  Fallback,
}

impl std::fmt::Display for ResponseSource {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      ResponseSource::Cache => write!(f, "cache"),
      ResponseSource::Network => write!(f, "network"),
      ResponseSource::Fallback => write!(f, "fallback"),
    }
  }
}

/// A response produced by the fetch handler.
#[derive(Debug)]
pub struct Interception {
  pub response: Response,
  pub source: ResponseSource,
  /// Background write of the response into the cache, if one was started.
  /// Dropping the handle detaches the task; it keeps running.
  pub cache_write: Option<JoinHandle<()>>,
}

/// Result of offering a request to the fetch handler.
#[derive(Debug)]
pub enum FetchOutcome {
  /// Not intercepted; the host performs its default network handling
  PassThrough(Request),
  /// Intercepted and answered
  Respond(Interception),
}

impl<S, F, H> OfflineAgent<S, F, H>
where
  S: CacheStorage + 'static,
  F: Fetcher + 'static,
  H: Host + 'static,
{
  /// Fetch handler.
  ///
  /// Only GET requests are intercepted. The current cache is consulted first;
  /// on a miss the request goes to the network, and a 200 same-origin response
  /// is copied into the cache by a background task the caller never waits on.
  /// If the network fails, the page gets a 408 plain-text response instead.
  pub async fn handle_fetch(&self, request: Request) -> FetchOutcome {
    if request.method != Method::Get {
      debug!(method = %request.method, url = %request.url, "not intercepted");
      return FetchOutcome::PassThrough(request);
    }

    if self.config.same_origin_only && !request.is_same_origin(&self.config.origin) {
      debug!(url = %request.url, "cross-origin request not intercepted");
      return FetchOutcome::PassThrough(request);
    }

    FetchOutcome::Respond(self.respond(request).await)
  }

  async fn respond(&self, request: Request) -> Interception {
    match self.storage.match_request(&self.config.version, &request) {
      Ok(Some(cached)) => {
        debug!(url = %request.url, cached_at = %cached.cached_at, "served from cache");
        return Interception {
          response: cached.response,
          source: ResponseSource::Cache,
          cache_write: None,
        };
      }
      Ok(None) => {}
      Err(e) => warn!(url = %request.url, error = %e, "cache lookup failed"),
    }

    match self.fetcher.fetch(&request).await {
      Ok(response) => {
        let cache_write = if response.is_cacheable() {
          Some(self.store_in_background(request, response.clone()))
        } else {
          debug!(
            url = %request.url,
            status = response.status,
            response_type = response.response_type.as_str(),
            "response not cached"
          );
          None
        };

        Interception {
          response,
          source: ResponseSource::Network,
          cache_write,
        }
      }
      Err(e) => {
        error!(url = %request.url, error = %e, "fetch error");
        Interception {
          response: Response::network_error(),
          source: ResponseSource::Fallback,
          cache_write: None,
        }
      }
    }
  }

  fn store_in_background(&self, request: Request, response: Response) -> JoinHandle<()> {
    let storage = Arc::clone(&self.storage);
    let cache_name = self.config.version.clone();

    tokio::spawn(async move {
      match storage.put(&cache_name, &request, &response) {
        Ok(()) => debug!(url = %request.url, cache = %cache_name, "stored response"),
        Err(e) => warn!(url = %request.url, error = %e, "failed to store response"),
      }
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::agent::test_support::{agent, agent_with, url, ORIGIN};
  use crate::agent::AgentConfig;
  use crate::http::ResponseType;
  use crate::network::testing::ScriptedFetcher;
  use url::Url;

  const CACHE: &str = "book-club-cache-v1";

  fn respond(outcome: FetchOutcome) -> Interception {
    match outcome {
      FetchOutcome::Respond(interception) => interception,
      FetchOutcome::PassThrough(request) => panic!("{} was not intercepted", request.url),
    }
  }

  #[tokio::test]
  async fn test_post_passes_through_untouched() {
    let fetcher = ScriptedFetcher::new().route(url("/books").as_str(), Response::new(200, "ok"));
    let agent = agent(fetcher);
    agent
      .storage()
      .put(CACHE, &Request::get(url("/books")), &Response::new(200, "cached"))
      .unwrap();

    let request = Request::new(Method::Post, url("/books")).with_body("title=Dune");
    let outcome = agent.handle_fetch(request.clone()).await;

    match outcome {
      FetchOutcome::PassThrough(passed) => assert_eq!(passed, request),
      FetchOutcome::Respond(_) => panic!("POST must not be intercepted"),
    }
    assert_eq!(agent.fetcher().calls(), 0);
    assert_eq!(agent.storage().entries(CACHE).unwrap().len(), 1);
  }

  #[tokio::test]
  async fn test_cache_hit_skips_network() {
    let agent = agent(ScriptedFetcher::new());
    let stored = Response::new(200, "<html>index</html>").with_header("Content-Type", "text/html");
    agent
      .storage()
      .put(CACHE, &Request::get(url("/index.html")), &stored)
      .unwrap();

    let interception = respond(agent.handle_fetch(Request::get(url("/index.html"))).await);

    assert_eq!(interception.source, ResponseSource::Cache);
    assert_eq!(interception.response, stored);
    assert!(interception.cache_write.is_none());
    assert_eq!(agent.fetcher().calls(), 0);
  }

  #[tokio::test]
  async fn test_only_current_cache_is_consulted() {
    let fetcher = ScriptedFetcher::new().route(url("/").as_str(), Response::new(200, "fresh"));
    let agent = agent(fetcher);
    agent
      .storage()
      .put("book-club-cache-v0", &Request::get(url("/")), &Response::new(200, "old"))
      .unwrap();

    let interception = respond(agent.handle_fetch(Request::get(url("/"))).await);
    assert_eq!(interception.source, ResponseSource::Network);
    assert_eq!(interception.response.text(), "fresh");
  }

  #[tokio::test]
  async fn test_miss_returns_network_response_and_stores_copy() {
    let network = Response::new(200, "[\"Dune\"]").with_header("Content-Type", "application/json");
    let fetcher = ScriptedFetcher::new().route(url("/books.json").as_str(), network.clone());
    let agent = agent(fetcher);

    let interception = respond(agent.handle_fetch(Request::get(url("/books.json"))).await);
    assert_eq!(interception.source, ResponseSource::Network);
    assert_eq!(interception.response, network);

    interception
      .cache_write
      .expect("cacheable response should be stored")
      .await
      .unwrap();

    let cached = agent
      .storage()
      .match_request(CACHE, &Request::get(url("/books.json")))
      .unwrap()
      .unwrap();
    assert_eq!(cached.response, network);

    // Second request is answered from the cache
    let again = respond(agent.handle_fetch(Request::get(url("/books.json"))).await);
    assert_eq!(again.source, ResponseSource::Cache);
    assert_eq!(agent.fetcher().calls(), 1);
  }

  #[tokio::test]
  async fn test_uncacheable_responses_are_not_stored() {
    let fetcher = ScriptedFetcher::new()
      .route(url("/missing").as_str(), Response::new(404, "not found"))
      .route(
        url("/old").as_str(),
        Response::new(301, "").with_header("Location", "/new"),
      )
      .route(
        "https://cdn.example/font.woff",
        Response::new(200, "font").with_type(ResponseType::Opaque),
      )
      .route(
        "https://api.example/books",
        Response::new(200, "[]").with_type(ResponseType::Cors),
      );
    let agent = agent(fetcher);

    for target in [
      url("/missing"),
      url("/old"),
      Url::parse("https://cdn.example/font.woff").unwrap(),
      Url::parse("https://api.example/books").unwrap(),
    ] {
      let interception = respond(agent.handle_fetch(Request::get(target.clone())).await);
      assert_eq!(interception.source, ResponseSource::Network, "{}", target);
      assert!(interception.cache_write.is_none(), "{}", target);
    }

    assert!(agent.storage().entries(CACHE).unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_network_failure_returns_timeout_response() {
    let agent = agent(ScriptedFetcher::new());

    let interception = respond(agent.handle_fetch(Request::get(url("/reviews"))).await);

    assert_eq!(interception.source, ResponseSource::Fallback);
    assert_eq!(interception.response.status, 408);
    assert_eq!(interception.response.content_type(), Some("text/plain"));
    assert_eq!(interception.response.text(), "Network error occurred");
    assert!(interception.cache_write.is_none());
    assert!(agent.storage().entries(CACHE).unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_cross_origin_intercepted_by_default() {
    let fetcher = ScriptedFetcher::new().route(
      "https://cdn.example/lib.js",
      Response::new(200, "lib").with_type(ResponseType::Cors),
    );
    let agent = agent(fetcher);

    let outcome = agent
      .handle_fetch(Request::get(Url::parse("https://cdn.example/lib.js").unwrap()))
      .await;
    assert!(matches!(outcome, FetchOutcome::Respond(_)));
    assert_eq!(agent.fetcher().calls(), 1);
  }

  #[tokio::test]
  async fn test_same_origin_only_passes_cross_origin_through() {
    let config = AgentConfig::new(Url::parse(ORIGIN).unwrap()).with_same_origin_only(true);
    let agent = agent_with(config, ScriptedFetcher::new());

    let outcome = agent
      .handle_fetch(Request::get(Url::parse("https://cdn.example/lib.js").unwrap()))
      .await;
    assert!(matches!(outcome, FetchOutcome::PassThrough(_)));
    assert_eq!(agent.fetcher().calls(), 0);
  }

  #[tokio::test]
  async fn test_concurrent_fetches_share_one_cache() {
    let fetcher = ScriptedFetcher::new()
      .route(url("/a.css").as_str(), Response::new(200, "a"))
      .route(url("/b.css").as_str(), Response::new(200, "b"));
    let agent = agent(fetcher);

    let first = agent.clone();
    let second = agent.clone();
    let (a, b) = tokio::join!(
      first.handle_fetch(Request::get(url("/a.css"))),
      second.handle_fetch(Request::get(url("/b.css")))
    );

    for interception in [respond(a), respond(b)] {
      interception.cache_write.unwrap().await.unwrap();
    }
    assert_eq!(agent.storage().entries(CACHE).unwrap().len(), 2);
  }
}
