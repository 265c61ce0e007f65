//! Push notifications and notification clicks.

use chrono::Utc;
use serde::Serialize;

pub const NOTIFICATION_TITLE: &str = "지하철 신고";
const ICON: &str = "/assets/icons/icon-192x192.png";
const BADGE: &str = "/assets/icons/badge-72x72.png";
const VIBRATE: [u32; 3] = [200, 100, 200];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationAction {
  pub action: String,
  pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationData {
  /// Milliseconds since the Unix epoch
  pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
  pub title: String,
  pub body: String,
  pub icon: String,
  pub badge: String,
  pub vibrate: Vec<u32>,
  pub data: NotificationData,
  pub actions: Vec<NotificationAction>,
}

/// What the worker asks the platform to do with its clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "url", rename_all = "snake_case")]
pub enum ClientAction {
  OpenWindow(String),
}

/// Notification to show for a push message. Pushes without data show nothing.
pub fn notification_for_push(text: Option<&str>) -> Option<Notification> {
  let body = text?;

  Some(Notification {
    title: NOTIFICATION_TITLE.to_string(),
    body: body.to_string(),
    icon: ICON.to_string(),
    badge: BADGE.to_string(),
    vibrate: VIBRATE.to_vec(),
    data: NotificationData {
      timestamp: Utc::now().timestamp_millis(),
    },
    actions: vec![
      NotificationAction {
        action: "open".to_string(),
        title: "열기".to_string(),
      },
      NotificationAction {
        action: "close".to_string(),
        title: "닫기".to_string(),
      },
    ],
  })
}

/// The notification is always closed; only `open` does anything further.
pub fn action_for_click(action: &str) -> Option<ClientAction> {
  match action {
    "open" => Some(ClientAction::OpenWindow("/".to_string())),
    _ => None,
  }
}
