use serde::{Deserialize, Serialize};

use crate::util::now_ms;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    EndorsementReceived,
    EndorsementVerified,
    ContactEndorsementVerified,
    RatingUpdated,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EndorsementReceived => "endorsement_received",
            Self::EndorsementVerified => "endorsement_verified",
            Self::ContactEndorsementVerified => "contact_endorsement_verified",
            Self::RatingUpdated => "rating_updated",
        }
    }
}

/// A fire-and-forget notification handed to the [`NotificationPort`]. The core
/// builds these after commit; delivery transport, retries, and preferences
/// live behind the port.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct NotificationEvent {
    pub kind: NotificationKind,
    pub recipient_id: String,
    pub source_id: Option<String>,
    pub context: serde_json::Value,
    pub created_at_ms: i64,
}

impl NotificationEvent {
    pub fn new(
        kind: NotificationKind,
        recipient_id: impl Into<String>,
        source_id: Option<String>,
        context: serde_json::Value,
    ) -> Self {
        Self {
            kind,
            recipient_id: recipient_id.into(),
            source_id,
            context,
            created_at_ms: now_ms(),
        }
    }
}
