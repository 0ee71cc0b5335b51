use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Message;

/// A WhatsApp group being watched for a given bot. Identity is
/// `(bot_id, group_identifier)`; `display_name` is cosmetic and may drift.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedGroup {
    pub bot_id: String,
    pub group_identifier: String,
    pub display_name: String,
    pub cron_schedule: String,
    #[serde(default)]
    pub alternate_identifiers: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// One completed fetch window for a tracked group: the messages seen and
/// the action items extracted from them. Periods are append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedPeriod {
    pub bot_id: String,
    pub group_identifier: String,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub action_items: Vec<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Cron scheduling cursor for a tracked group, persisted so a restart
/// resumes from the last fired window rather than re-running history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingState {
    pub bot_id: String,
    pub group_identifier: String,
    pub last_fired_at: DateTime<Utc>,
}
