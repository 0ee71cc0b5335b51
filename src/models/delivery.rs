use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tags the opaque `content` payload of a `DeliveryJob` so the consumer can
/// dispatch to the right processor. An unrecognized value on read is the
/// caller's problem to dead-letter, not this type's.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QueueMessageType {
    Text,
    IcsActionableItem,
}

impl QueueMessageType {
    pub fn as_str(self) -> &'static str {
        match self {
            QueueMessageType::Text => "text",
            QueueMessageType::IcsActionableItem => "ics_actionable_item",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "text" => Some(QueueMessageType::Text),
            "ics_actionable_item" => Some(QueueMessageType::IcsActionableItem),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryDestination {
    pub user_id: String,
    pub provider_name: String,
}

/// One unit of outbound work in the async message delivery queue. Lives in
/// exactly one of the `active`, `holding`, or `failed` collections at a
/// time; moving between them is a delete-then-insert, never an update of a
/// shared collection, matching the three-collection layout of the source
/// system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryJob {
    pub message_id: String,
    pub destination: DeliveryDestination,
    #[serde(default)]
    pub send_attempts: u32,
    pub created_at: DateTime<Utc>,
    /// Stored as the raw wire string rather than `QueueMessageType` so a
    /// document written by a future, newer message type still deserializes
    /// here and can be dead-lettered instead of failing the whole read.
    pub message_type: String,
    pub content: serde_json::Value,
}

impl DeliveryJob {
    pub const MAX_ATTEMPTS: u32 = 3;

    pub fn attempts_exhausted(&self) -> bool {
        self.send_attempts >= Self::MAX_ATTEMPTS
    }

    pub fn known_type(&self) -> Option<QueueMessageType> {
        QueueMessageType::parse(&self.message_type)
    }
}
