//! Push payloads and how notifications get shown.

use serde::Deserialize;
use serde::Serialize;

pub const DEFAULT_TITLE: &str = "Ledger";
pub const DEFAULT_BODY: &str = "New notification";
pub const DEFAULT_TAG: &str = "notification";
pub const DEFAULT_URL: &str = "/";
pub const DEFAULT_ICON: &str = "/icon-192.png";
pub const DEFAULT_VIBRATE: [u32; 3] = [200, 100, 200];

/// Fields a push payload or a control message may set. Everything is
/// optional; missing fields fall back to the defaults above.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct NotificationRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

impl NotificationRequest {
    /// Decode a push payload. Absent or non-JSON payloads yield defaults.
    pub fn from_push_payload(payload: Option<&[u8]>) -> Self {
        let Some(bytes) = payload.filter(|b| !b.is_empty()) else {
            return Self::default();
        };
        serde_json::from_slice(bytes).unwrap_or_else(|e| {
            tracing::debug!("push payload is not JSON ({e}), using defaults");
            Self::default()
        })
    }

    pub fn into_notification(self) -> Notification {
        Notification {
            title: self.title.unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            body: self.body.unwrap_or_else(|| DEFAULT_BODY.to_string()),
            tag: self.tag.unwrap_or_else(|| DEFAULT_TAG.to_string()),
            url: self.url.unwrap_or_else(|| DEFAULT_URL.to_string()),
            icon: DEFAULT_ICON.to_string(),
            badge: DEFAULT_ICON.to_string(),
            vibrate: DEFAULT_VIBRATE.to_vec(),
            require_interaction: false,
        }
    }
}

/// A fully resolved notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub tag: String,
    /// Opened when the notification is clicked.
    pub url: String,
    pub icon: String,
    pub badge: String,
    pub vibrate: Vec<u32>,
    pub require_interaction: bool,
}

/// Displays and dismisses notifications.
pub trait Notifier: Send + Sync {
    fn show(&self, notification: &Notification);
    fn close(&self, tag: &str);
}

/// Notifier that only writes to the log.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn show(&self, notification: &Notification) {
        tracing::info!(
            tag = %notification.tag,
            url = %notification.url,
            "notification: {} - {}",
            notification.title,
            notification.body
        );
    }

    fn close(&self, tag: &str) {
        tracing::debug!(tag, "notification closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_payload_uses_defaults() {
        let notification = NotificationRequest::from_push_payload(None).into_notification();
        assert_eq!(
            notification,
            Notification {
                title: "Ledger".to_string(),
                body: "New notification".to_string(),
                tag: "notification".to_string(),
                url: "/".to_string(),
                icon: "/icon-192.png".to_string(),
                badge: "/icon-192.png".to_string(),
                vibrate: vec![200, 100, 200],
                require_interaction: false,
            }
        );
    }

    #[test]
    fn payload_fields_override_defaults() {
        let payload = br#"{"title":"Salary","body":"Paid out","url":"/2025-01"}"#;
        let notification =
            NotificationRequest::from_push_payload(Some(payload)).into_notification();
        assert_eq!(notification.title, "Salary");
        assert_eq!(notification.body, "Paid out");
        assert_eq!(notification.tag, "notification");
        assert_eq!(notification.url, "/2025-01");
    }

    #[test]
    fn text_payload_falls_back_to_defaults() {
        let notification =
            NotificationRequest::from_push_payload(Some(b"hello")).into_notification();
        assert_eq!(notification.body, "New notification");
    }
}
