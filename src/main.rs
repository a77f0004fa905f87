use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::io::Write;
use std::path::PathBuf;
use tracing::info;

use book_club_offline::agent::{FetchOutcome, OfflineAgent};
use book_club_offline::cache::{CacheStorage, MemoryStorage, SqliteStorage};
use book_club_offline::event::{dispatch, Event, EventOutcome};
use book_club_offline::host::LocalHost;
use book_club_offline::http::{Method, Request, Response};
use book_club_offline::network::{Fetcher, HttpFetcher};
use book_club_offline::{config, logging};

#[derive(Parser, Debug)]
#[command(name = "book-club-offline")]
#[command(about = "Offline cache agent for the book club site")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/book-club-offline/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Site origin, overriding the config file
  #[arg(long, global = true)]
  origin: Option<String>,

  /// Keep caches in memory instead of the cache database
  #[arg(long, global = true)]
  ephemeral: bool,

  /// Behave as if the network were unreachable
  #[arg(long, global = true)]
  offline: bool,

  /// Log at debug level
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Run the install handler: precache the core assets
  Install,
  /// Run the activate handler: drop old caches and claim open pages
  Activate,
  /// Install, then activate
  Update,
  /// Send one request through the fetch handler
  Fetch {
    /// Path (resolved against the origin) or absolute URL
    target: String,

    /// Request method
    #[arg(short = 'X', long, default_value = "GET")]
    method: String,

    /// Extra request header, as NAME:VALUE
    #[arg(short = 'H', long = "header")]
    headers: Vec<String>,
  },
  /// List caches and their entries
  Caches,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let mut config = config::Config::load(args.config.as_deref())?;

  // Override origin if specified on command line
  if let Some(origin) = args.origin.clone() {
    config.origin = origin;
  }

  let _log_guard = logging::init(&config.log, args.verbose)?;

  let fetcher =
    HttpFetcher::new(config.origin_url()?, config.timeout())?.with_offline(args.offline);
  let agent_config = config.agent_config()?;

  if args.ephemeral {
    let agent = OfflineAgent::new(agent_config, MemoryStorage::new(), fetcher, LocalHost::new());
    run(&agent, args.command).await
  } else {
    let storage = match &config.storage.path {
      Some(path) => SqliteStorage::open_at(path)?,
      None => SqliteStorage::open_default()?,
    };
    let agent = OfflineAgent::new(agent_config, storage, fetcher, LocalHost::new());
    run(&agent, args.command).await
  }
}

async fn run<S>(agent: &OfflineAgent<S, HttpFetcher, LocalHost>, command: Command) -> Result<()>
where
  S: CacheStorage + 'static,
{
  match command {
    Command::Install => {
      dispatch(agent, Event::Install).await?;
    }
    Command::Activate => {
      dispatch(agent, Event::Activate).await?;
    }
    Command::Update => {
      dispatch(agent, Event::Install).await?;
      dispatch(agent, Event::Activate).await?;
    }
    Command::Fetch {
      target,
      method,
      headers,
    } => {
      let request = build_request(agent, &target, &method, &headers)?;
      fetch(agent, request).await?;
    }
    Command::Caches => list_caches(agent.storage(), &agent.config().version)?,
  }
  Ok(())
}

fn build_request<S>(
  agent: &OfflineAgent<S, HttpFetcher, LocalHost>,
  target: &str,
  method: &str,
  headers: &[String],
) -> Result<Request>
where
  S: CacheStorage + 'static,
{
  let url = agent
    .config()
    .origin
    .join(target)
    .map_err(|e| eyre!("Invalid target '{}': {}", target, e))?;

  let mut request = Request::new(Method::parse(method), url);
  for header in headers {
    let (name, value) = header
      .split_once(':')
      .ok_or_else(|| eyre!("Invalid header '{}': expected NAME:VALUE", header))?;
    request = request.with_header(name.trim(), value.trim());
  }
  Ok(request)
}

async fn fetch<S>(agent: &OfflineAgent<S, HttpFetcher, LocalHost>, request: Request) -> Result<()>
where
  S: CacheStorage + 'static,
{
  let outcome = match dispatch(agent, Event::Fetch(request)).await? {
    EventOutcome::Fetched(outcome) => outcome,
    other => return Err(eyre!("Unexpected outcome for fetch: {:?}", other)),
  };

  match outcome {
    FetchOutcome::Respond(interception) => {
      print_response(&interception.response, &interception.source.to_string())?;
      // Keep the process alive until the background store settles
      if let Some(write) = interception.cache_write {
        write
          .await
          .map_err(|e| eyre!("Cache write task failed: {}", e))?;
      }
    }
    FetchOutcome::PassThrough(request) => {
      info!(method = %request.method, url = %request.url, "passing through to network");
      let response = agent
        .fetcher()
        .fetch(&request)
        .await
        .map_err(|e| eyre!("{} {} failed: {}", request.method, request.url, e))?;
      print_response(&response, "passthrough")?;
    }
  }
  Ok(())
}

fn print_response(response: &Response, source: &str) -> Result<()> {
  eprintln!(
    "{} {} ({}, {} bytes)",
    response.status,
    response.status_text,
    source,
    response.body.len()
  );
  let mut stdout = std::io::stdout().lock();
  stdout.write_all(&response.body)?;
  stdout.flush()?;
  Ok(())
}

fn list_caches<S: CacheStorage>(storage: &S, current: &str) -> Result<()> {
  let names = storage.keys()?;
  if names.is_empty() {
    println!("(no caches)");
    return Ok(());
  }

  for name in names {
    let marker = if name == current { "*" } else { " " };
    let entries = storage.entries(&name)?;
    println!("{} {} ({} entries)", marker, name, entries.len());
    for entry in entries {
      println!("    {} {}", entry.method, entry.url);
    }
  }
  Ok(())
}
