//! Control messages from the page to the worker.
//!
//! Wire shape is `{ "type": ..., "payload": ... }`. Replies, when a type has
//! one, go back over the channel the sender attached to the message.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
  /// Activate without waiting for old clients to go away
  SkipWaiting,
  /// Report the version tag
  GetVersion,
  /// Drop the whole dynamic generation
  ClearCache,
  /// Fetch one URL into the dynamic generation. `None` when the payload had no url.
  CacheUrl { url: Option<String> },
}

#[derive(Deserialize)]
struct Envelope {
  #[serde(rename = "type")]
  kind: String,
  #[serde(default)]
  payload: Option<Value>,
}

impl ControlMessage {
  /// Decode a message. Unknown or malformed messages yield `None` and are
  /// meant to be ignored.
  pub fn from_value(value: &Value) -> Option<Self> {
    let envelope = Envelope::deserialize(value).ok()?;

    match envelope.kind.as_str() {
      "SKIP_WAITING" => Some(ControlMessage::SkipWaiting),
      "GET_VERSION" => Some(ControlMessage::GetVersion),
      "CLEAR_CACHE" => Some(ControlMessage::ClearCache),
      "CACHE_URL" => {
        let url = envelope
          .payload
          .as_ref()
          .and_then(|p| p.get("url"))
          .and_then(Value::as_str)
          .filter(|u| !u.is_empty())
          .map(String::from);
        Some(ControlMessage::CacheUrl { url })
      }
      _ => None,
    }
  }
}

/// Reply posted back to the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reply {
  Version {
    version: String,
  },
  Outcome {
    success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
  },
}

impl Reply {
  pub fn success() -> Self {
    Reply::Outcome {
      success: true,
      error: None,
    }
  }

  pub fn failure(error: impl Into<String>) -> Self {
    Reply::Outcome {
      success: false,
      error: Some(error.into()),
    }
  }
}
