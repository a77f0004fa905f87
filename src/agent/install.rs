use color_eyre::{eyre::eyre, Result};
use futures::future::try_join_all;
use tracing::{info, instrument, warn};

use super::OfflineAgent;
use crate::cache::CacheStorage;
use crate::host::{Host, WorkerState};
use crate::network::Fetcher;

/// Outcome of a successful install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
  pub cache: String,
  pub assets: usize,
}

impl<S, F, H> OfflineAgent<S, F, H>
where
  S: CacheStorage + 'static,
  F: Fetcher + 'static,
  H: Host + 'static,
{
  /// Install handler.
  ///
  /// Fills the current cache with every core asset and then asks the host to
  /// skip waiting. If any asset cannot be fetched or stored, nothing is written
  /// and the error is returned; retrying is up to the host.
  #[instrument(skip(self), fields(cache = %self.config.version))]
  pub async fn install(&self) -> Result<InstallReport> {
    self.host.set_state(WorkerState::Installing)?;

    let assets = match self.precache_core_assets().await {
      Ok(assets) => assets,
      Err(e) => {
        warn!(error = %e, "install failed");
        if let Err(state_err) = self.host.set_state(WorkerState::Redundant) {
          warn!(error = %state_err, "failed to mark worker redundant");
        }
        return Err(e);
      }
    };

    self.host.skip_waiting()?;
    self.host.set_state(WorkerState::Installed)?;
    info!(assets, "core assets cached");

    Ok(InstallReport {
      cache: self.config.version.clone(),
      assets,
    })
  }

  async fn precache_core_assets(&self) -> Result<usize> {
    let cache_name = &self.config.version;
    self.storage.open(cache_name)?;
    info!("cache opened");

    let requests = self.config.asset_requests()?;
    let fetcher = &self.fetcher;
    let fetches = requests.into_iter().map(|request| async move {
      let response = fetcher
        .fetch(&request)
        .await
        .map_err(|e| eyre!("Failed to fetch core asset {}: {}", request.url, e))?;

      if !response.ok() {
        return Err(eyre!(
          "Core asset {} returned status {}",
          request.url,
          response.status
        ));
      }

      Ok((request, response))
    });

    // First failure aborts the whole batch
    let entries = try_join_all(fetches).await?;
    self.storage.put_all(cache_name, &entries)?;

    Ok(entries.len())
  }
}
