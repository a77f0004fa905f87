use color_eyre::Result;

use crate::agent::{ActivationReport, FetchOutcome, InstallReport, OfflineAgent};
use crate::cache::CacheStorage;
use crate::host::Host;
use crate::http::Request;
use crate::network::Fetcher;

/// Lifecycle events delivered by the host
#[derive(Debug)]
pub enum Event {
  Install,
  Activate,
  Fetch(Request),
}

impl Event {
  pub fn name(&self) -> &'static str {
    match self {
      Event::Install => "install",
      Event::Activate => "activate",
      Event::Fetch(_) => "fetch",
    }
  }
}

/// What a handler produced for an event
#[derive(Debug)]
pub enum EventOutcome {
  Installed(InstallReport),
  Activated(ActivationReport),
  Fetched(FetchOutcome),
}

/// Route an event to its single handler and wait for it to settle.
///
/// Install and activate failures are returned to the host. Fetch never fails:
/// network errors have already been turned into a substitute response.
pub async fn dispatch<S, F, H>(agent: &OfflineAgent<S, F, H>, event: Event) -> Result<EventOutcome>
where
  S: CacheStorage + 'static,
  F: Fetcher + 'static,
  H: Host + 'static,
{
  tracing::debug!(event = event.name(), "dispatching");
  match event {
    Event::Install => Ok(EventOutcome::Installed(agent.install().await?)),
    Event::Activate => Ok(EventOutcome::Activated(agent.activate().await?)),
    Event::Fetch(request) => Ok(EventOutcome::Fetched(agent.handle_fetch(request).await)),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::agent::test_support::{agent, url};
  use crate::http::Response;
  use crate::network::testing::ScriptedFetcher;

  #[tokio::test]
  async fn test_full_rollout() {
    let fetcher = ScriptedFetcher::new()
      .route(url("/").as_str(), Response::new(200, "home"))
      .route(url("/index.html").as_str(), Response::new(200, "index"))
      .route(url("/style.css").as_str(), Response::new(200, "css"))
      .route(url("/manifest.json").as_str(), Response::new(200, "{}"));
    let agent = agent(fetcher);
    agent.storage().open("book-club-cache-v0").unwrap();

    let installed = dispatch(&agent, Event::Install).await.unwrap();
    assert!(matches!(installed, EventOutcome::Installed(ref r) if r.assets == 4));

    let activated = dispatch(&agent, Event::Activate).await.unwrap();
    assert!(matches!(activated, EventOutcome::Activated(ref r) if r.deleted.len() == 1));

    let fetched = dispatch(&agent, Event::Fetch(Request::get(url("/style.css"))))
      .await
      .unwrap();
    match fetched {
      EventOutcome::Fetched(FetchOutcome::Respond(i)) => assert_eq!(i.response.text(), "css"),
      other => panic!("unexpected outcome: {:?}", other),
    }
    // Served from the precache, so only the four install fetches hit the network
    assert_eq!(agent.fetcher().calls(), 4);
  }
}
