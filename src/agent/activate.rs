use color_eyre::Result;
use tracing::{debug, info, instrument, warn};

use super::OfflineAgent;
use crate::cache::CacheStorage;
use crate::host::{Host, WorkerState};
use crate::network::Fetcher;

/// Outcome of activation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivationReport {
  /// Stale caches that were removed
  pub deleted: Vec<String>,
  /// Stale caches whose deletion failed; they are left in place
  pub failed: Vec<String>,
  /// Pages that switched to this version
  pub clients_claimed: usize,
}

impl<S, F, H> OfflineAgent<S, F, H>
where
  S: CacheStorage + 'static,
  F: Fetcher + 'static,
  H: Host + 'static,
{
  /// Activate handler.
  ///
  /// Deletes every cache not named after the current version, then claims all
  /// open pages. Claiming only starts once every deletion has settled. A
  /// deletion that fails is logged and skipped.
  #[instrument(skip(self), fields(cache = %self.config.version))]
  pub async fn activate(&self) -> Result<ActivationReport> {
    self.host.set_state(WorkerState::Activating)?;

    let stale: Vec<String> = self
      .storage
      .keys()?
      .into_iter()
      .filter(|name| *name != self.config.version)
      .collect();

    let mut report = ActivationReport::default();
    for name in stale {
      match self.storage.delete(&name) {
        Ok(true) => {
          info!(stale = %name, "deleted old cache");
          report.deleted.push(name);
        }
        Ok(false) => debug!(stale = %name, "old cache already gone"),
        Err(e) => {
          warn!(stale = %name, error = %e, "failed to delete old cache");
          report.failed.push(name);
        }
      }
    }

    report.clients_claimed = self.host.claim_clients(&self.config.version)?;
    self.host.set_state(WorkerState::Activated)?;
    info!(
      deleted = report.deleted.len(),
      claimed = report.clients_claimed,
      "activated"
    );

    Ok(report)
  }
}
