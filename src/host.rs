//! Host runtime capabilities used by the lifecycle handlers.

use color_eyre::{eyre::eyre, Result};
use std::sync::Mutex;
use tracing::debug;

/// Worker lifecycle states, as tracked by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
  /// Registered, install not started
  Parsed,
  /// Install handler running
  Installing,
  /// Installed, waiting for older versions to release their pages
  Installed,
  /// Activate handler running
  Activating,
  /// Active and intercepting requests
  Activated,
  /// Failed install or replaced
  Redundant,
}

impl std::fmt::Display for WorkerState {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let s = match self {
      WorkerState::Parsed => "parsed",
      WorkerState::Installing => "installing",
      WorkerState::Installed => "installed",
      WorkerState::Activating => "activating",
      WorkerState::Activated => "activated",
      WorkerState::Redundant => "redundant",
    };
    f.write_str(s)
  }
}

/// Capabilities the host runtime grants a worker.
pub trait Host: Send + Sync {
  /// Record a lifecycle transition.
  fn set_state(&self, state: WorkerState) -> Result<()>;

  /// Activate without waiting for older versions to release control.
  fn skip_waiting(&self) -> Result<()>;

  /// Take control of every open page. Returns how many pages changed controller.
  fn claim_clients(&self, controller: &str) -> Result<usize>;
}

/// An open page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Client {
  pub id: String,
  pub url: String,
  /// Version of the worker controlling this page, if any
  pub controller: Option<String>,
}

#[derive(Debug)]
struct HostState {
  worker: WorkerState,
  skip_waiting: bool,
  clients: Vec<Client>,
}

/// In-process host that tracks lifecycle state and open pages.
#[derive(Debug)]
pub struct LocalHost {
  state: Mutex<HostState>,
}

impl Default for LocalHost {
  fn default() -> Self {
    Self {
      state: Mutex::new(HostState {
        worker: WorkerState::Parsed,
        skip_waiting: false,
        clients: Vec::new(),
      }),
    }
  }
}

impl LocalHost {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register an open page, optionally already controlled by some version.
  pub fn open_client(&self, id: &str, url: &str, controller: Option<&str>) -> Result<()> {
    let mut state = self
      .state
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    state.clients.push(Client {
      id: id.to_string(),
      url: url.to_string(),
      controller: controller.map(String::from),
    });
    Ok(())
  }

  pub fn clients(&self) -> Result<Vec<Client>> {
    let state = self
      .state
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(state.clients.clone())
  }

  pub fn state(&self) -> Result<WorkerState> {
    let state = self
      .state
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(state.worker)
  }

  pub fn skipped_waiting(&self) -> Result<bool> {
    let state = self
      .state
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(state.skip_waiting)
  }
}

impl Host for LocalHost {
  fn set_state(&self, next: WorkerState) -> Result<()> {
    let mut state = self
      .state
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    debug!(from = %state.worker, to = %next, "worker state change");
    state.worker = next;
    Ok(())
  }

  fn skip_waiting(&self) -> Result<()> {
    let mut state = self
      .state
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    state.skip_waiting = true;
    Ok(())
  }

  fn claim_clients(&self, controller: &str) -> Result<usize> {
    let mut state = self
      .state
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    if state.worker != WorkerState::Activating && state.worker != WorkerState::Activated {
      return Err(eyre!(
        "Cannot claim clients while worker is {}",
        state.worker
      ));
    }

    let mut claimed = 0;
    for client in state.clients.iter_mut() {
      if client.controller.as_deref() != Some(controller) {
        client.controller = Some(controller.to_string());
        claimed += 1;
      }
    }
    Ok(claimed)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_claim_requires_activation() {
    let host = LocalHost::new();
    host.open_client("a", "/", None).unwrap();
    assert!(host.claim_clients("v1").is_err());

    host.set_state(WorkerState::Activating).unwrap();
    assert_eq!(host.claim_clients("v1").unwrap(), 1);
  }

  #[test]
  fn test_claim_counts_only_changed_clients() {
    let host = LocalHost::new();
    host.open_client("a", "/", Some("v0")).unwrap();
    host.open_client("b", "/index.html", Some("v1")).unwrap();
    host.open_client("c", "/about", None).unwrap();
    host.set_state(WorkerState::Activating).unwrap();

    assert_eq!(host.claim_clients("v1").unwrap(), 2);
    assert!(host
      .clients()
      .unwrap()
      .iter()
      .all(|c| c.controller.as_deref() == Some("v1")));
  }
}
