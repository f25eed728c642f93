//! Push payloads and the notifications they map to.
//!
//! The router does not display anything itself; it turns a push payload
//! into a notification description and resolves clicks into an URL to
//! open, leaving presentation to the host adapter.

use serde::{Deserialize, Serialize};

const ICON: &str = "/static/icons/icon-192x192.png";
const BADGE: &str = "/static/icons/badge-72x72.png";

/// Opaque data carried by a push payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PushData {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub url: Option<String>,
}

/// Payload of an incoming push event.
#[derive(Debug, Clone, Deserialize)]
pub struct PushPayload {
  pub title: String,
  pub body: String,
  #[serde(default)]
  pub data: PushData,
}

/// One action button on a notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationAction {
  pub action: String,
  pub title: String,
  pub icon: String,
}

/// A notification description for the host to display.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
  pub title: String,
  pub body: String,
  pub icon: String,
  pub badge: String,
  pub vibrate: Vec<u32>,
  pub data: PushData,
  pub actions: Vec<NotificationAction>,
}

/// Build the notification for a push payload: view/dismiss actions, fixed
/// icon and vibration pattern.
pub fn notification_for(payload: PushPayload) -> Notification {
  Notification {
    title: payload.title,
    body: payload.body,
    icon: ICON.to_string(),
    badge: BADGE.to_string(),
    vibrate: vec![200, 100, 200],
    data: payload.data,
    actions: vec![
      NotificationAction {
        action: "view".to_string(),
        title: "View".to_string(),
        icon: "/static/icons/view-24x24.png".to_string(),
      },
      NotificationAction {
        action: "dismiss".to_string(),
        title: "Dismiss".to_string(),
        icon: "/static/icons/dismiss-24x24.png".to_string(),
      },
    ],
  }
}

/// What was clicked on a displayed notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickAction {
  /// The `view` action button.
  View,
  /// The `dismiss` action button.
  Dismiss,
  /// The notification body itself.
  Body,
}

/// URL a click should open, if any. `view` and body clicks open the
/// payload's URL (root when absent); `dismiss` opens nothing.
pub fn click_target(action: ClickAction, data: &PushData) -> Option<String> {
  match action {
    ClickAction::Dismiss => None,
    ClickAction::View | ClickAction::Body => {
      Some(data.url.clone().unwrap_or_else(|| "/".to_string()))
    }
  }
}
