mod config;
mod event;
mod generation;
mod intercept;
mod message;
mod net;
mod push;
mod replay;
mod store;
mod worker;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use serde_json::Value;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use event::WorkerHandle;
use intercept::InterceptOutcome;
use net::ReqwestNetwork;
use replay::{CommandQueue, MemoryQueue, NoopQueue, QueuedCommand};
use store::{CachedRequest, GenerationStore, MemoryStore, SqliteStore};
use worker::Worker;

#[derive(Parser, Debug)]
#[command(name = "helmsw")]
#[command(about = "Offline-first request cache worker")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/helmsw/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Keep the cache in memory instead of the on-disk store
  #[arg(long)]
  ephemeral: bool,

  /// JSON file of queued commands for `sync` to replay
  #[arg(long)]
  queue_file: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Create the current cache generation and seed the manifest
  Install,
  /// Promote the current generation and sweep stale ones
  Activate,
  /// Install, activate, then serve host events over stdio
  Up,
  /// Intercept a single request and print the response body
  Fetch {
    url: String,
    /// Value for the Accept header
    #[arg(long)]
    accept: Option<String>,
  },
  /// Print the active generation name
  Version,
  /// Delete the active generation
  ClearCache,
  /// Replay queued commands against the remote endpoint
  Sync,
  /// Simulate a push event and print the resulting notification
  Push {
    /// JSON payload; omit for the default notification
    payload: Option<String>,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // In `up` mode stdout is the reply channel, so logs go to a file.
  let _guard = init_tracing(matches!(&args.command, Command::Up))?;

  let config = config::Config::load(args.config.as_deref())?;
  let network = ReqwestNetwork::new(&config.origin)?;

  // The worker itself never enqueues; an external producer's queue comes in
  // as a file, otherwise the queue is a no-op.
  let queue: Box<dyn CommandQueue> = match &args.queue_file {
    Some(path) => Box::new(load_queue(path)?),
    None => Box::new(NoopQueue),
  };

  if args.ephemeral {
    run(config, MemoryStore::new(), network, queue, args.command).await
  } else {
    let path = match &config.cache_path {
      Some(path) => path.clone(),
      None => SqliteStore::default_path()?,
    };
    run(config, SqliteStore::open(&path)?, network, queue, args.command).await
  }
}

fn load_queue(path: &std::path::Path) -> Result<MemoryQueue> {
  let contents = std::fs::read_to_string(path)
    .map_err(|e| eyre!("Failed to read queue file {}: {}", path.display(), e))?;
  let commands: Vec<QueuedCommand> = serde_json::from_str(&contents)
    .map_err(|e| eyre!("Failed to parse queue file {}: {}", path.display(), e))?;

  let queue = MemoryQueue::new();
  for command in commands {
    queue.enqueue(command);
  }
  Ok(queue)
}

async fn run<S: GenerationStore>(
  config: config::Config,
  store: S,
  network: ReqwestNetwork,
  queue: Box<dyn CommandQueue>,
  command: Command,
) -> Result<()> {
  let mut worker = Worker::new(config, store, network, queue);

  match command {
    Command::Install => worker.install().await,
    Command::Activate => worker.activate().await,
    Command::Up => {
      worker.install().await?;
      worker.activate().await?;
      serve_stdio(worker).await
    }
    Command::Fetch { url, accept } => {
      let mut request = CachedRequest::get(url);
      if let Some(accept) = accept {
        request = request.with_header("Accept", accept);
      }
      match worker.handle_fetch(&request).await {
        InterceptOutcome::Response { snapshot, source } => {
          info!(status = snapshot.status, source = source.as_str(), "Response");
          use std::io::Write;
          std::io::stdout().write_all(&snapshot.body)?;
          Ok(())
        }
        InterceptOutcome::Unavailable { url, reason } => {
          Err(eyre!("{} is unavailable: {}", url, reason))
        }
      }
    }
    Command::Version => {
      println!("{}", worker.version());
      Ok(())
    }
    Command::ClearCache => {
      if let Some(reply) = worker
        .handle_message(&serde_json::json!({"type": "CLEAR_CACHE"}))
        .await
      {
        println!("{}", serde_json::to_string(&reply)?);
      }
      Ok(())
    }
    Command::Sync => {
      let replayed = worker.handle_sync().await?;
      println!("replayed {} command(s)", replayed);
      Ok(())
    }
    Command::Push { payload } => {
      let bytes = payload.map(String::into_bytes);
      let notification = worker.handle_push(bytes.as_deref());
      println!("{}", serde_json::to_string(&notification)?);
      Ok(())
    }
  }
}

/// Serve host events from stdin, one JSON object per line, writing replies
/// to stdout. EOF shuts the worker down.
async fn serve_stdio<S: GenerationStore>(
  mut worker: Worker<S, ReqwestNetwork, Box<dyn CommandQueue>>,
) -> Result<()> {
  let (handle, events) = WorkerHandle::channel();
  info!(phase = ?worker.phase(), "Serving host events on stdio");

  let reader = tokio::spawn(async move {
    if let Err(e) = read_host_events(handle).await {
      warn!(error = %e, "Host event loop ended with error");
    }
  });

  worker.run(events).await;
  reader
    .await
    .map_err(|e| eyre!("Host reader task failed: {}", e))?;
  Ok(())
}

async fn read_host_events(handle: WorkerHandle) -> Result<()> {
  use tokio::io::{AsyncBufReadExt, BufReader};

  let mut lines = BufReader::new(tokio::io::stdin()).lines();
  while let Some(line) = lines
    .next_line()
    .await
    .map_err(|e| eyre!("Failed to read stdin: {}", e))?
  {
    let line = line.trim();
    if line.is_empty() {
      continue;
    }

    let envelope: Value = match serde_json::from_str(line) {
      Ok(value) => value,
      Err(e) => {
        warn!(error = %e, "Ignoring unparsable host event");
        continue;
      }
    };

    match envelope.get("event").and_then(Value::as_str) {
      Some("fetch") => {
        let Some(url) = envelope.get("url").and_then(Value::as_str) else {
          warn!("Fetch event without url");
          continue;
        };
        let mut request = CachedRequest::get(url);
        if let Some(accept) = envelope.get("accept").and_then(Value::as_str) {
          request = request.with_header("Accept", accept);
        }
        match handle.fetch(request).await? {
          InterceptOutcome::Response { snapshot, source } => {
            println!(
              "{}",
              serde_json::json!({
                "event": "fetch",
                "url": url,
                "status": snapshot.status,
                "source": source.as_str(),
                "body": snapshot.body_text(),
              })
            );
          }
          InterceptOutcome::Unavailable { url, reason } => {
            println!(
              "{}",
              serde_json::json!({
                "event": "fetch",
                "url": url,
                "source": "unavailable",
                "reason": reason,
              })
            );
          }
        }
      }
      Some("message") => {
        let payload = envelope.get("payload").cloned().unwrap_or(Value::Null);
        if let Some(reply) = handle.message(payload).await {
          println!("{}", serde_json::to_string(&reply)?);
        }
      }
      Some("sync") => handle.sync()?,
      Some("push") => {
        let payload = envelope.get("payload").map(|v| v.to_string().into_bytes());
        let notification = handle.push(payload).await?;
        println!("{}", serde_json::to_string(&notification)?);
      }
      other => {
        warn!(event = other.unwrap_or("<none>"), "Ignoring unknown host event");
      }
    }
  }

  Ok(())
}

fn init_tracing(log_to_file: bool) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("helmsw=info"));

  if log_to_file {
    let dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?
      .join("helmsw");
    std::fs::create_dir_all(&dir).map_err(|e| eyre!("Failed to create log directory: {}", e))?;

    let appender = tracing_appender::rolling::never(dir, "helmsw.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt()
      .with_env_filter(filter)
      .with_writer(writer)
      .with_ansi(false)
      .init();
    Ok(Some(guard))
  } else {
    tracing_subscriber::fmt()
      .with_env_filter(filter)
      .with_writer(std::io::stderr)
      .init();
    Ok(None)
  }
}
