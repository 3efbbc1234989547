//! Host event channel.
//!
//! The host runtime delivers lifecycle events to the worker over an mpsc
//! channel; events that produce a result carry a oneshot reply sender.
//! [`WorkerHandle`] is the producer side.

use color_eyre::{eyre::eyre, Result};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::intercept::InterceptOutcome;
use crate::message::Reply;
use crate::push::Notification;
use crate::store::CachedRequest;

/// Events delivered by the host runtime.
#[derive(Debug)]
pub enum WorkerEvent {
  /// An outgoing request to intercept.
  Fetch {
    request: CachedRequest,
    reply: oneshot::Sender<InterceptOutcome>,
  },
  /// A client message; the reply sender is the client's reply channel.
  /// Dropped without sending for message kinds that carry no reply.
  Message {
    payload: Value,
    reply: oneshot::Sender<Reply>,
  },
  /// Connectivity restored; replay queued commands.
  Sync,
  /// A push event with an optional payload.
  Push {
    payload: Option<Vec<u8>>,
    reply: oneshot::Sender<Notification>,
  },
}

/// Producer handle for feeding events to a running worker.
#[derive(Clone)]
pub struct WorkerHandle {
  tx: mpsc::UnboundedSender<WorkerEvent>,
}

impl WorkerHandle {
  /// Create a handle and the receiver the worker's run loop consumes.
  pub fn channel() -> (Self, mpsc::UnboundedReceiver<WorkerEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Self { tx }, rx)
  }

  /// Intercept one request and wait for the outcome.
  pub async fn fetch(&self, request: CachedRequest) -> Result<InterceptOutcome> {
    let (reply, rx) = oneshot::channel();
    self
      .tx
      .send(WorkerEvent::Fetch { request, reply })
      .map_err(|_| eyre!("Worker is gone"))?;
    rx.await.map_err(|_| eyre!("Worker dropped the request"))
  }

  /// Deliver a client message. Returns None when the message kind carries
  /// no reply (or the worker ignored it).
  pub async fn message(&self, payload: Value) -> Option<Reply> {
    let (reply, rx) = oneshot::channel();
    self.tx.send(WorkerEvent::Message { payload, reply }).ok()?;
    rx.await.ok()
  }

  /// Signal that connectivity is restored.
  pub fn sync(&self) -> Result<()> {
    self
      .tx
      .send(WorkerEvent::Sync)
      .map_err(|_| eyre!("Worker is gone"))
  }

  /// Deliver a push event and wait for the notification to display.
  pub async fn push(&self, payload: Option<Vec<u8>>) -> Result<Notification> {
    let (reply, rx) = oneshot::channel();
    self
      .tx
      .send(WorkerEvent::Push { payload, reply })
      .map_err(|_| eyre!("Worker is gone"))?;
    rx.await.map_err(|_| eyre!("Worker dropped the push event"))
  }
}
