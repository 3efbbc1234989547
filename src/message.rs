//! Client messaging protocol.
//!
//! Clients talk to the worker with small JSON messages carrying a `type`
//! tag. The protocol is deliberately permissive: unrecognized kinds become
//! [`ClientMessage::Unknown`] at the single parse boundary and are logged,
//! never rejected.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A message sent by a client to the worker.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
  /// Stop waiting and activate immediately. No reply.
  SkipWaiting,
  /// Ask for the active generation name. Replied with [`Reply::Version`].
  GetVersion,
  /// Delete the active generation. Replied with [`Reply::CacheCleared`].
  ClearCache,
  /// Any other kind. Logged and ignored.
  Unknown { kind: Option<String> },
}

impl ClientMessage {
  /// Parse a raw JSON message. Malformed or unrecognized input maps to
  /// `Unknown` rather than an error.
  pub fn parse(raw: &Value) -> Self {
    match raw.get("type").and_then(Value::as_str) {
      Some("SKIP_WAITING") => Self::SkipWaiting,
      Some("GET_VERSION") => Self::GetVersion,
      Some("CLEAR_CACHE") => Self::ClearCache,
      Some(other) => Self::Unknown {
        kind: Some(other.to_string()),
      },
      None => Self::Unknown { kind: None },
    }
  }
}

/// A reply sent back over the client's reply channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Reply {
  #[serde(rename = "VERSION")]
  Version { version: String },
  #[serde(rename = "CACHE_CLEARED")]
  CacheCleared { success: bool },
}
