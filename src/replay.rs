//! Deferred command replay: drain queued commands once connectivity returns.
//!
//! The queue itself is an external collaborator. The worker only drains:
//! each command is POSTed to the remote endpoint and removed from the queue
//! only after a 2xx acknowledgment, so delivery is at-least-once.

use color_eyre::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::net::Network;

/// A deferred command waiting to be replayed against the remote API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedCommand {
  pub id: String,
  pub payload: Value,
}

/// Queue of commands produced while offline. Enqueueing is the producer's
/// concern; the worker only reads and removes.
pub trait CommandQueue: Send + Sync {
  /// All commands currently pending, oldest first.
  fn fetch_queued(&self) -> Result<Vec<QueuedCommand>>;

  /// Remove a command after its replay was acknowledged.
  /// Returns false if the command was already gone.
  fn remove_queued(&self, id: &str) -> Result<bool>;
}

impl CommandQueue for Box<dyn CommandQueue> {
  fn fetch_queued(&self) -> Result<Vec<QueuedCommand>> {
    self.as_ref().fetch_queued()
  }

  fn remove_queued(&self, id: &str) -> Result<bool> {
    self.as_ref().remove_queued(id)
  }
}

/// Queue backend that never holds anything.
pub struct NoopQueue;

impl CommandQueue for NoopQueue {
  fn fetch_queued(&self) -> Result<Vec<QueuedCommand>> {
    Ok(Vec::new())
  }

  fn remove_queued(&self, _id: &str) -> Result<bool> {
    Ok(false)
  }
}

/// In-memory queue, for in-process producers and tests.
#[derive(Default)]
pub struct MemoryQueue {
  commands: std::sync::Mutex<Vec<QueuedCommand>>,
}

impl MemoryQueue {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn enqueue(&self, command: QueuedCommand) {
    self.commands.lock().unwrap().push(command);
  }
}

impl CommandQueue for MemoryQueue {
  fn fetch_queued(&self) -> Result<Vec<QueuedCommand>> {
    Ok(self.commands.lock().unwrap().clone())
  }

  fn remove_queued(&self, id: &str) -> Result<bool> {
    let mut commands = self.commands.lock().unwrap();
    let before = commands.len();
    commands.retain(|c| c.id != id);
    Ok(commands.len() < before)
  }
}

/// Replay every queued command against the remote endpoint.
///
/// Per-command failures (network errors, non-2xx acknowledgments, removal
/// failures) are logged and leave the command queued for the next
/// connectivity signal. Returns how many commands were acknowledged.
pub async fn replay_queued<Q: CommandQueue, N: Network>(
  queue: &Q,
  network: &N,
  endpoint: &str,
) -> Result<usize> {
  let commands = queue.fetch_queued()?;
  if commands.is_empty() {
    debug!("No queued commands to replay");
    return Ok(0);
  }

  let mut acknowledged = 0;
  for command in commands {
    let body = serde_json::to_value(&command)?;
    match network.post_json(endpoint, &body).await {
      Ok(status) if (200..300).contains(&status) => {
        acknowledged += 1;
        info!(id = %command.id, "Command replayed");
        if let Err(e) = queue.remove_queued(&command.id) {
          warn!(id = %command.id, error = %e, "Failed to remove replayed command");
        }
      }
      Ok(status) => {
        warn!(id = %command.id, status, "Command replay rejected, keeping queued");
      }
      Err(e) => {
        warn!(id = %command.id, error = %e, "Command replay failed, keeping queued");
      }
    }
  }

  Ok(acknowledged)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::net::fake::FakeNetwork;
  use serde_json::json;

  const ENDPOINT: &str = "/api/helmet/command";

  fn command(id: &str) -> QueuedCommand {
    QueuedCommand {
      id: id.to_string(),
      payload: json!({"action": "visor", "state": "open"}),
    }
  }

  #[tokio::test]
  async fn test_replay_posts_and_removes_on_success() {
    let queue = MemoryQueue::new();
    queue.enqueue(command("cmd-1"));
    queue.enqueue(command("cmd-2"));
    let network = FakeNetwork::new();

    let acknowledged = replay_queued(&queue, &network, ENDPOINT).await.unwrap();

    assert_eq!(acknowledged, 2);
    assert!(queue.fetch_queued().unwrap().is_empty());

    let posts = network.posts();
    assert_eq!(posts.len(), 2);
    assert_eq!(posts[0].0, ENDPOINT);
    assert_eq!(posts[0].1.get("id").unwrap(), "cmd-1");
  }

  #[tokio::test]
  async fn test_replay_keeps_command_on_network_failure() {
    let queue = MemoryQueue::new();
    queue.enqueue(command("cmd-1"));
    let network = FakeNetwork::offline();

    let acknowledged = replay_queued(&queue, &network, ENDPOINT).await.unwrap();

    assert_eq!(acknowledged, 0);
    assert_eq!(queue.fetch_queued().unwrap().len(), 1);
  }

  #[tokio::test]
  async fn test_replay_keeps_command_on_rejection() {
    let queue = MemoryQueue::new();
    queue.enqueue(command("cmd-1"));
    let network = FakeNetwork::new();
    network.set_post_status(500);

    let acknowledged = replay_queued(&queue, &network, ENDPOINT).await.unwrap();

    assert_eq!(acknowledged, 0);
    assert_eq!(queue.fetch_queued().unwrap().len(), 1);
  }

  #[tokio::test]
  async fn test_replay_empty_queue_is_noop() {
    let queue = NoopQueue;
    let network = FakeNetwork::new();

    let acknowledged = replay_queued(&queue, &network, ENDPOINT).await.unwrap();

    assert_eq!(acknowledged, 0);
    assert!(network.posts().is_empty());
  }
}
