//! Push payloads and the notifications built from them.

use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};

use crate::config::NotificationConfig;

pub const ACTION_OPEN: &str = "open";
pub const ACTION_CLOSE: &str = "close";

/// Payload delivered by the push service.
#[derive(Debug, Clone, Deserialize)]
pub struct PushPayload {
  pub title: String,
  pub body: String,
  #[serde(default)]
  pub data: serde_json::Value,
}

impl PushPayload {
  pub fn parse(bytes: &[u8]) -> Result<Self> {
    serde_json::from_slice(bytes).map_err(|e| eyre!("Failed to parse push payload: {}", e))
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationAction {
  pub action: String,
  pub title: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub icon: Option<String>,
}

/// A system notification as handed to the host.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
  pub title: String,
  pub body: String,
  pub icon: String,
  pub badge: String,
  pub vibrate: Vec<u32>,
  pub data: serde_json::Value,
  pub actions: Vec<NotificationAction>,
}

impl Notification {
  pub fn from_push(payload: PushPayload, config: &NotificationConfig) -> Self {
    Self {
      title: payload.title,
      body: payload.body,
      icon: config.icon.clone(),
      badge: config.badge.clone(),
      vibrate: config.vibrate.clone(),
      data: payload.data,
      actions: vec![
        NotificationAction {
          action: ACTION_OPEN.to_string(),
          title: config.open_title.clone(),
          icon: Some(config.icon.clone()),
        },
        NotificationAction {
          action: ACTION_CLOSE.to_string(),
          title: config.close_title.clone(),
          icon: None,
        },
      ],
    }
  }
}

/// Whether a click with the given action should bring up the dashboard.
/// A click on the notification body carries no action.
pub fn opens_page(action: Option<&str>) -> bool {
  match action {
    None | Some("") => true,
    Some(action) => action == ACTION_OPEN,
  }
}
