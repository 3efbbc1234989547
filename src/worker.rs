//! Worker lifecycle and event dispatch.
//!
//! The worker moves through `installing → installed → activating → active`.
//! Install seeds the current generation; activation sweeps every other
//! generation. Afterwards the worker answers host events (fetch, message,
//! sync, push) until the event channel closes. A failed install or
//! activation aborts that phase and leaves the previous generation
//! authoritative; no failure is fatal to the worker process.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use color_eyre::Result;
use serde_json::Value;

use crate::config::Config;
use crate::event::WorkerEvent;
use crate::generation::GenerationManager;
use crate::intercept::{InterceptOutcome, Interceptor};
use crate::message::{ClientMessage, Reply};
use crate::net::Network;
use crate::push::{notification_for, Notification};
use crate::replay::{replay_queued, CommandQueue};
use crate::store::{CachedRequest, GenerationStore};

/// Lifecycle phase of the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
  Installing,
  Installed,
  Activating,
  Active,
}

/// The worker: generation manager and interceptor behind one event surface.
pub struct Worker<S, N, Q> {
  store: Arc<S>,
  network: Arc<N>,
  queue: Q,
  config: Config,
  phase: LifecyclePhase,
  manager: GenerationManager<S, N>,
  interceptor: Interceptor<S, N>,
}

impl<S: GenerationStore, N: Network, Q: CommandQueue> Worker<S, N, Q> {
  pub fn new(config: Config, store: S, network: N, queue: Q) -> Self {
    let store = Arc::new(store);
    let network = Arc::new(network);
    let generation = config.generation_name();

    let manager = GenerationManager::new(
      store.clone(),
      network.clone(),
      generation.clone(),
      config.manifest.clone(),
    );
    let interceptor = Interceptor::new(
      store.clone(),
      network.clone(),
      generation,
      config.offline_fallback.clone(),
    );

    Self {
      store,
      network,
      queue,
      config,
      phase: LifecyclePhase::Installing,
      manager,
      interceptor,
    }
  }

  pub fn phase(&self) -> LifecyclePhase {
    self.phase
  }

  /// The active generation name.
  pub fn version(&self) -> String {
    self.config.generation_name()
  }

  /// Install phase: create and seed the generation. Completing is the signal
  /// that this worker should activate immediately rather than wait.
  pub async fn install(&mut self) -> Result<()> {
    self.phase = LifecyclePhase::Installing;
    self.manager.create_and_seed().await?;
    self.phase = LifecyclePhase::Installed;
    info!(generation = %self.version(), "Install complete, ready to activate");
    Ok(())
  }

  /// Activation phase: sweep stale generations, then take control.
  pub async fn activate(&mut self) -> Result<()> {
    self.phase = LifecyclePhase::Activating;
    self.manager.promote_and_sweep()?;
    self.phase = LifecyclePhase::Active;
    info!(generation = %self.version(), "Worker active");
    Ok(())
  }

  /// Intercept one outgoing request.
  pub async fn handle_fetch(&self, request: &CachedRequest) -> InterceptOutcome {
    self.interceptor.intercept(request).await
  }

  /// Handle one client message. Returns the reply to send back, if the
  /// message kind carries one.
  pub async fn handle_message(&mut self, raw: &Value) -> Option<Reply> {
    match ClientMessage::parse(raw) {
      ClientMessage::SkipWaiting => {
        if self.phase == LifecyclePhase::Installed {
          if let Err(e) = self.activate().await {
            warn!(error = %e, "Activation on SKIP_WAITING failed");
          }
        } else {
          debug!(phase = ?self.phase, "SKIP_WAITING received, nothing to skip");
        }
        None
      }
      ClientMessage::GetVersion => Some(Reply::Version {
        version: self.version(),
      }),
      ClientMessage::ClearCache => {
        let success = match self.store.delete_generation(&self.version()) {
          Ok(existed) => {
            info!(generation = %self.version(), existed, "Cache cleared");
            true
          }
          Err(e) => {
            warn!(error = %e, "Failed to clear cache");
            false
          }
        };
        Some(Reply::CacheCleared { success })
      }
      ClientMessage::Unknown { kind } => {
        info!(kind = kind.as_deref().unwrap_or("<none>"), "Ignoring unknown message kind");
        None
      }
    }
  }

  /// Connectivity restored: replay queued commands.
  pub async fn handle_sync(&self) -> Result<usize> {
    replay_queued(
      &self.queue,
      self.network.as_ref(),
      &self.config.command_endpoint,
    )
    .await
  }

  /// Push event: build the notification to display.
  pub fn handle_push(&self, payload: Option<&[u8]>) -> Notification {
    notification_for(payload)
  }

  /// Dispatch host events until the channel closes.
  pub async fn run(&mut self, mut events: mpsc::UnboundedReceiver<WorkerEvent>) {
    while let Some(event) = events.recv().await {
      match event {
        WorkerEvent::Fetch { request, reply } => {
          let outcome = self.handle_fetch(&request).await;
          let _ = reply.send(outcome);
        }
        WorkerEvent::Message { payload, reply } => {
          if let Some(response) = self.handle_message(&payload).await {
            let _ = reply.send(response);
          }
          // Dropping `reply` unanswered is the no-reply case.
        }
        WorkerEvent::Sync => match self.handle_sync().await {
          Ok(count) if count > 0 => info!(count, "Sync replayed queued commands"),
          Ok(_) => {}
          Err(e) => warn!(error = %e, "Sync failed"),
        },
        WorkerEvent::Push { payload, reply } => {
          let _ = reply.send(self.handle_push(payload.as_deref()));
        }
      }
    }
    debug!("Event channel closed, worker stopping");
  }
}
