use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One LLM invocation's token usage, persisted for cost accounting and
/// quota enforcement. `cached_input_tokens` is a subset of `input_tokens`,
/// billed at the provider's cached rate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenEvent {
    pub timestamp: DateTime<Utc>,
    pub user_id: String,
    pub bot_id: String,
    pub feature_name: String,
    pub provider_name: String,
    pub model: String,
    pub input_tokens: u64,
    #[serde(default)]
    pub cached_input_tokens: u64,
    pub output_tokens: u64,
    /// "high" or "low", echoing which of the bot's two configured LLMs fired.
    pub config_tier: String,
    pub cost_dollars: f64,
}

/// Append-only record of a gateway-mediated action, TTL-indexed to expire
/// after 30 days at the storage layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLog {
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub user_id: Option<String>,
    pub action: String,
    pub path: String,
    pub method: String,
    pub status_code: u16,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
}

/// Sliding-window failed-login tracking for a single identifier (user_id or
/// IP). `failure_timestamps` older than the window are pruned on read, not
/// stored forever.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AccountLockout {
    pub identifier: String,
    #[serde(default)]
    pub failure_timestamps: Vec<DateTime<Utc>>,
    #[serde(default)]
    pub locked_until: Option<DateTime<Utc>>,
}

impl AccountLockout {
    pub const MAX_FAILURES: usize = 10;
    pub const WINDOW_SECS: i64 = 600;
    pub const LOCK_SECS: i64 = 300;

    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.map(|until| now < until).unwrap_or(false)
    }
}
