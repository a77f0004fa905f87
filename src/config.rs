use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::agent::{AgentConfig, DEFAULT_CACHE_VERSION, DEFAULT_CORE_ASSETS};

/// Environment variable overriding `origin`.
pub const ORIGIN_ENV: &str = "BOOK_CLUB_OFFLINE_ORIGIN";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Origin of the site being served (e.g. "https://club.example")
  pub origin: String,
  pub cache: CacheConfig,
  pub scope: ScopeConfig,
  pub network: NetworkConfig,
  pub storage: StorageConfig,
  pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// Name of the current cache; caches with any other name are removed on activate
  pub version: String,
  /// Paths that must be available offline after install
  pub core_assets: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ScopeConfig {
  /// Leave cross-origin requests to the network instead of intercepting them
  pub same_origin_only: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
  /// Per-request timeout; none by default
  pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
  /// Cache database path (default: $XDG_DATA_HOME/book-club-offline/caches.db)
  pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LogConfig {
  /// Also write logs to a daily rolling file in this directory
  pub directory: Option<PathBuf>,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      origin: "http://localhost:8080".to_string(),
      cache: CacheConfig::default(),
      scope: ScopeConfig::default(),
      network: NetworkConfig::default(),
      storage: StorageConfig::default(),
      log: LogConfig::default(),
    }
  }
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      version: DEFAULT_CACHE_VERSION.to_string(),
      core_assets: DEFAULT_CORE_ASSETS.iter().map(|s| s.to_string()).collect(),
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./book-club-offline.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/book-club-offline/config.yaml
  ///
  /// Without a file the built-in defaults apply. `BOOK_CLUB_OFFLINE_ORIGIN`
  /// overrides the origin either way.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Self::default(),
    };

    if let Ok(origin) = std::env::var(ORIGIN_ENV) {
      config.origin = origin;
    }

    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("book-club-offline.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("book-club-offline").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    config.validate()?;
    Ok(config)
  }

  fn validate(&self) -> Result<()> {
    if self.cache.version.trim().is_empty() {
      return Err(eyre!("cache.version must not be empty"));
    }
    self.origin_url()?;
    Ok(())
  }

  pub fn origin_url(&self) -> Result<Url> {
    Url::parse(&self.origin).map_err(|e| eyre!("Invalid origin '{}': {}", self.origin, e))
  }

  pub fn timeout(&self) -> Option<Duration> {
    self.network.timeout_secs.map(Duration::from_secs)
  }

  /// Settings the agent is constructed with.
  pub fn agent_config(&self) -> Result<AgentConfig> {
    Ok(
      AgentConfig::new(self.origin_url()?)
        .with_version(&self.cache.version)
        .with_core_assets(self.cache.core_assets.iter().cloned())
        .with_same_origin_only(self.scope.same_origin_only),
    )
  }
}
