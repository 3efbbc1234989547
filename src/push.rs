//! Push payload handling.
//!
//! A push event may carry an optional JSON payload. Each missing field falls
//! back to its default; an absent or unparsable payload falls back entirely.
//! Rendering is the host's concern.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

const DEFAULT_TITLE: &str = "Jarvis Helmet";
const DEFAULT_BODY: &str = "Notification from the helmet";
const DEFAULT_ICON: &str = "/icon-192.png";
const DEFAULT_BADGE: &str = "/badge-72.png";

/// The notification the host should display for a push event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
  pub title: String,
  pub body: String,
  pub icon: String,
  pub badge: String,
  pub data: Value,
}

impl Default for Notification {
  fn default() -> Self {
    Self {
      title: DEFAULT_TITLE.to_string(),
      body: DEFAULT_BODY.to_string(),
      icon: DEFAULT_ICON.to_string(),
      badge: DEFAULT_BADGE.to_string(),
      data: Value::Object(serde_json::Map::new()),
    }
  }
}

/// Fields a push payload may carry; everything is optional.
#[derive(Debug, Deserialize)]
struct PushPayload {
  title: Option<String>,
  body: Option<String>,
  icon: Option<String>,
  badge: Option<String>,
  data: Option<Value>,
}

/// Build the notification for a push event.
pub fn notification_for(payload: Option<&[u8]>) -> Notification {
  let Some(bytes) = payload else {
    return Notification::default();
  };

  match serde_json::from_slice::<PushPayload>(bytes) {
    Ok(payload) => {
      let defaults = Notification::default();
      Notification {
        title: payload.title.unwrap_or(defaults.title),
        body: payload.body.unwrap_or(defaults.body),
        icon: payload.icon.unwrap_or(defaults.icon),
        badge: payload.badge.unwrap_or(defaults.badge),
        data: payload.data.unwrap_or(defaults.data),
      }
    }
    Err(e) => {
      debug!(error = %e, "Malformed push payload, using default notification");
      Notification::default()
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_absent_payload_uses_defaults() {
    let notification = notification_for(None);
    assert_eq!(notification, Notification::default());
  }

  #[test]
  fn test_malformed_payload_uses_defaults() {
    let notification = notification_for(Some(b"not json"));
    assert_eq!(notification, Notification::default());
  }

  #[test]
  fn test_partial_payload_fills_missing_fields() {
    let payload = json!({"title": "Battery low", "data": {"level": 11}});
    let bytes = serde_json::to_vec(&payload).unwrap();

    let notification = notification_for(Some(&bytes));

    assert_eq!(notification.title, "Battery low");
    assert_eq!(notification.body, DEFAULT_BODY);
    assert_eq!(notification.icon, DEFAULT_ICON);
    assert_eq!(notification.data, json!({"level": 11}));
  }

  #[test]
  fn test_full_payload_overrides_everything() {
    let payload = json!({
      "title": "t", "body": "b", "icon": "/i.png", "badge": "/b.png", "data": [1, 2]
    });
    let bytes = serde_json::to_vec(&payload).unwrap();

    let notification = notification_for(Some(&bytes));

    assert_eq!(notification.title, "t");
    assert_eq!(notification.body, "b");
    assert_eq!(notification.icon, "/i.png");
    assert_eq!(notification.badge, "/b.png");
    assert_eq!(notification.data, json!([1, 2]));
  }
}
