//! Admin notifications through the `send-notification` edge function.

use crate::client::BackendClient;
use crate::error::Result;
use serde::Serialize;

pub const NOTIFICATION_FUNCTION: &str = "send-notification";

/// A message for the administrative contact
#[derive(Debug, Clone, Serialize)]
pub struct AdminNotice {
    pub subject: String,
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
}

impl AdminNotice {
    pub fn new(subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            message: message.into(),
            reply_to: None,
        }
    }

    pub fn with_reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }
}

#[derive(Serialize)]
struct NotificationPayload<'a> {
    to: &'a str,
    #[serde(flatten)]
    notice: &'a AdminNotice,
}

impl BackendClient {
    /// Send `notice` to the resolved admin contact
    pub async fn notify_admin(&self, notice: &AdminNotice) -> Result<serde_json::Value> {
        let payload = NotificationPayload {
            to: self.admin_contact(),
            notice,
        };
        tracing::info!(to = payload.to, subject = %notice.subject, "Sending admin notification");
        self.invoke(NOTIFICATION_FUNCTION, &payload).await
    }
}
