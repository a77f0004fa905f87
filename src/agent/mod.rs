//! The offline cache agent.
//!
//! Three handlers cover the worker lifecycle:
//! - `install` pre-populates the current cache with the core assets
//! - `activate` removes caches left by older versions and claims open pages
//! - `handle_fetch` serves GET requests cache-first with a network fallback

mod activate;
mod fetch;
mod install;

pub use activate::ActivationReport;
pub use fetch::{FetchOutcome, Interception, ResponseSource};
pub use install::InstallReport;

use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use url::Url;

use crate::cache::CacheStorage;
use crate::host::Host;
use crate::http::Request;
use crate::network::Fetcher;

/// Name of the current cache version.
pub const DEFAULT_CACHE_VERSION: &str = "book-club-cache-v1";

/// Paths stored on install.
pub const DEFAULT_CORE_ASSETS: [&str; 4] = ["/", "/index.html", "/style.css", "/manifest.json"];

/// What the agent is built with: the cache version it owns and the assets
/// that must be available offline.
#[derive(Debug, Clone)]
pub struct AgentConfig {
  /// Name of the current cache; every other cache is stale
  pub version: String,
  /// Paths resolved against `origin`
  pub core_assets: Vec<String>,
  /// Origin of the site the agent serves
  pub origin: Url,
  /// Pass cross-origin requests through instead of intercepting them
  pub same_origin_only: bool,
}

impl AgentConfig {
  pub fn new(origin: Url) -> Self {
    Self {
      version: DEFAULT_CACHE_VERSION.to_string(),
      core_assets: DEFAULT_CORE_ASSETS.iter().map(|s| s.to_string()).collect(),
      origin,
      same_origin_only: false,
    }
  }

  pub fn with_version(mut self, version: &str) -> Self {
    self.version = version.to_string();
    self
  }

  pub fn with_core_assets<I, T>(mut self, assets: I) -> Self
  where
    I: IntoIterator<Item = T>,
    T: Into<String>,
  {
    self.core_assets = assets.into_iter().map(Into::into).collect();
    self
  }

  pub fn with_same_origin_only(mut self, same_origin_only: bool) -> Self {
    self.same_origin_only = same_origin_only;
    self
  }

  /// GET requests for every core asset, in list order.
  pub fn asset_requests(&self) -> Result<Vec<Request>> {
    self
      .core_assets
      .iter()
      .map(|path| {
        self
          .origin
          .join(path)
          .map(Request::get)
          .map_err(|e| eyre!("Invalid core asset path '{}': {}", path, e))
      })
      .collect()
  }
}

/// Offline cache agent over a cache storage, a network fetcher and a host.
///
/// The agent is cheap to clone; clones share the same storage, so concurrent
/// fetch handlers read and write one set of caches.
pub struct OfflineAgent<S, F, H> {
  config: Arc<AgentConfig>,
  storage: Arc<S>,
  fetcher: Arc<F>,
  host: Arc<H>,
}

impl<S, F, H> OfflineAgent<S, F, H>
where
  S: CacheStorage + 'static,
  F: Fetcher + 'static,
  H: Host + 'static,
{
  pub fn new(config: AgentConfig, storage: S, fetcher: F, host: H) -> Self {
    Self {
      config: Arc::new(config),
      storage: Arc::new(storage),
      fetcher: Arc::new(fetcher),
      host: Arc::new(host),
    }
  }

  pub fn config(&self) -> &AgentConfig {
    &self.config
  }

  pub fn storage(&self) -> &S {
    &self.storage
  }

  pub fn fetcher(&self) -> &F {
    &self.fetcher
  }

  pub fn host(&self) -> &H {
    &self.host
  }
}

impl<S, F, H> Clone for OfflineAgent<S, F, H> {
  fn clone(&self) -> Self {
    Self {
      config: Arc::clone(&self.config),
      storage: Arc::clone(&self.storage),
      fetcher: Arc::clone(&self.fetcher),
      host: Arc::clone(&self.host),
    }
  }
}

#[cfg(test)]
pub(crate) mod test_support {
  use super::*;
  use crate::cache::MemoryStorage;
  use crate::host::LocalHost;
  use crate::network::testing::ScriptedFetcher;

  pub const ORIGIN: &str = "https://club.example";

  pub type TestAgent = OfflineAgent<MemoryStorage, ScriptedFetcher, LocalHost>;

  pub fn url(path: &str) -> Url {
    Url::parse(ORIGIN).unwrap().join(path).unwrap()
  }

  pub fn agent(fetcher: ScriptedFetcher) -> TestAgent {
    agent_with(AgentConfig::new(Url::parse(ORIGIN).unwrap()), fetcher)
  }

  pub fn agent_with(config: AgentConfig, fetcher: ScriptedFetcher) -> TestAgent {
    OfflineAgent::new(config, MemoryStorage::new(), fetcher, LocalHost::new())
  }
}
