//! Control channel wire shapes.
//!
//! Messages are JSON objects tagged by `type`. Parsing is total: anything
//! that is not a known message comes back as `None` and the router treats
//! it as a no-op.

use serde::{Deserialize, Serialize};

/// A typed control message. Each message is independent and idempotent.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ControlMessage {
  /// Promote the waiting router version to active immediately.
  SkipWaiting,
  /// Ask for the total byte size of all cached response bodies.
  GetCacheSize,
  /// Delete every generation except the current static one.
  ClearCache,
  /// Queue a payload for delivery and attempt an immediate drain.
  SyncData { payload: serde_json::Value },
}

impl ControlMessage {
  /// Parse a raw JSON value; unknown or malformed messages yield `None`.
  pub fn parse(value: &serde_json::Value) -> Option<Self> {
    serde_json::from_value(value.clone()).ok()
  }
}

/// Reply to a control message, handed back to the adapter that owns the
/// actual reply channel.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ControlReply {
  CacheSize { payload: u64 },
  CacheCleared,
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn parses_known_messages() {
    assert_eq!(
      ControlMessage::parse(&json!({"type": "skip-waiting"})),
      Some(ControlMessage::SkipWaiting)
    );
    assert_eq!(
      ControlMessage::parse(&json!({"type": "get-cache-size"})),
      Some(ControlMessage::GetCacheSize)
    );
    assert_eq!(
      ControlMessage::parse(&json!({"type": "clear-cache"})),
      Some(ControlMessage::ClearCache)
    );
    assert_eq!(
      ControlMessage::parse(&json!({"type": "sync-data", "payload": {"reading": 9}})),
      Some(ControlMessage::SyncData {
        payload: json!({"reading": 9})
      })
    );
  }

  #[test]
  fn unknown_and_malformed_messages_parse_to_none() {
    assert_eq!(ControlMessage::parse(&json!({"type": "self-destruct"})), None);
    assert_eq!(ControlMessage::parse(&json!({"no_type": true})), None);
    assert_eq!(ControlMessage::parse(&json!("not an object")), None);
    assert_eq!(ControlMessage::parse(&json!(42)), None);
  }

  #[test]
  fn replies_serialize_with_type_tags() {
    let size = serde_json::to_value(ControlReply::CacheSize { payload: 2048 }).unwrap();
    assert_eq!(size, json!({"type": "cache-size", "payload": 2048}));

    let cleared = serde_json::to_value(ControlReply::CacheCleared).unwrap();
    assert_eq!(cleared, json!({"type": "cache-cleared"}));
  }
}
