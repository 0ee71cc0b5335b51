use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::user::Role;

/// A gateway authentication session. Absolute lifetime is enforced against
/// `expires_at`; `last_accessed` only drives idle bookkeeping/metrics, it
/// never extends the absolute expiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub user_id: String,
    pub role: Role,
    #[serde(default)]
    pub owned_bots: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn add_owned_bot(&mut self, bot_id: &str) {
        if !self.owned_bots.iter().any(|b| b == bot_id) {
            self.owned_bots.push(bot_id.to_string());
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StaleSessionReason {
    LoggedOut,
    Expired,
    Superseded,
}

/// A `Session` moved out of the live collection on invalidation, kept around
/// for audit purposes rather than deleted outright.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaleSession {
    #[serde(flatten)]
    pub session: Session,
    pub invalidated_at: DateTime<Utc>,
    pub reason: StaleSessionReason,
}
