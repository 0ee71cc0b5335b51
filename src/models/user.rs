use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    User,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmQuota {
    pub dollars_per_period: f64,
    #[serde(default)]
    pub dollars_used: f64,
    pub last_reset: DateTime<Utc>,
    #[serde(default = "default_reset_days")]
    pub reset_days: u32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_reset_days() -> u32 {
    7
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UserProfile {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    /// E.164 formatted phone number.
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub gov_id: Option<String>,
    /// ISO 3166-1 alpha-2.
    #[serde(default)]
    pub country: Option<String>,
    /// ISO 639-1.
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub user_id: String,
    pub password_hash: String,
    pub role: Role,
    #[serde(default)]
    pub owned_bots: Vec<String>,
    pub max_bots: u32,
    pub max_enabled_features: u32,
    pub llm_quota: LlmQuota,
    #[serde(default)]
    pub profile: UserProfile,
}

impl User {
    pub fn owns(&self, bot_id: &str) -> bool {
        self.owned_bots.iter().any(|b| b == bot_id)
    }
}
