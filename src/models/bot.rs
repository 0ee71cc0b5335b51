use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// `1-30 chars, [A-Za-z0-9_-]` per the data model. Enforced at construction,
/// not re-validated on every read.
pub fn is_valid_identifier(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 30
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatProviderConfig {
    pub provider_name: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub allow_group_messages: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ApiKeySource {
    Environment,
    Explicit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmProviderConfig {
    pub provider_name: String,
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub reasoning_effort: Option<String>,
    pub api_key_source: ApiKeySource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default)]
    pub record_llm_interactions: bool,
}

fn default_temperature() -> f32 {
    0.2
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    pub max_messages: usize,
    pub max_characters: usize,
    pub max_days: u32,
    pub max_characters_single_message: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        QueueConfig {
            max_messages: 200,
            max_characters: 20_000,
            max_days: 7,
            max_characters_single_message: 4_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// If true, `automatic_bot_reply` shares one history buffer across all
    /// correspondents of the bot; otherwise each correspondent gets its own.
    #[serde(default = "default_shared_context")]
    pub shared_context: bool,
    #[serde(default = "default_context_max_messages")]
    pub max_messages: usize,
    #[serde(default = "default_context_max_characters")]
    pub max_characters: usize,
    #[serde(default = "default_context_max_days")]
    pub max_days: u32,
    #[serde(default = "default_context_max_characters_single_message")]
    pub max_characters_single_message: usize,
}

fn default_shared_context() -> bool {
    true
}

fn default_context_max_messages() -> usize {
    100
}

fn default_context_max_characters() -> usize {
    10_000
}

fn default_context_max_days() -> u32 {
    1
}

fn default_context_max_characters_single_message() -> usize {
    350
}

impl Default for ContextConfig {
    fn default() -> Self {
        ContextConfig {
            shared_context: default_shared_context(),
            max_messages: default_context_max_messages(),
            max_characters: default_context_max_characters(),
            max_days: default_context_max_days(),
            max_characters_single_message: default_context_max_characters_single_message(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UserProfileMeta {
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureConfig {
    pub enabled: bool,
    #[serde(default)]
    pub options: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomaticBotReplyOptions {
    #[serde(default)]
    pub group_whitelist: Vec<String>,
    #[serde(default)]
    pub direct_whitelist: Vec<String>,
    #[serde(default = "default_chat_system_prompt")]
    pub chat_system_prompt: String,
}

fn default_chat_system_prompt() -> String {
    "You are a helpful assistant responding on behalf of {user_id}.".to_string()
}

impl Default for AutomaticBotReplyOptions {
    fn default() -> Self {
        AutomaticBotReplyOptions {
            group_whitelist: Vec::new(),
            direct_whitelist: Vec::new(),
            chat_system_prompt: default_chat_system_prompt(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedGroupJobConfig {
    pub group_identifier: String,
    pub display_name: String,
    pub cron_schedule: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PeriodicGroupTrackingOptions {
    #[serde(default)]
    pub groups: Vec<TrackedGroupJobConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    pub bot_id: String,
    pub owner_user_id: String,
    pub chat_provider: ChatProviderConfig,
    pub llm_high: LlmProviderConfig,
    pub llm_low: LlmProviderConfig,
    #[serde(default)]
    pub queue_config: QueueConfig,
    #[serde(default)]
    pub context_config: ContextConfig,
    #[serde(default)]
    pub features: HashMap<String, FeatureConfig>,
    #[serde(default)]
    pub profile: UserProfileMeta,
    /// Whether the owner has asked this bot to auto-start (startup / quota reset).
    #[serde(default = "default_true")]
    pub activated: bool,
    /// Set once the bridge has reported a successful WhatsApp pairing for
    /// this bot. Auto-start skips bots that have never authenticated, since
    /// there is nothing to reconnect to.
    #[serde(default)]
    pub has_whatsapp_credentials: bool,
}

fn default_true() -> bool {
    true
}

impl BotConfig {
    pub fn feature(&self, name: &str) -> Option<&FeatureConfig> {
        self.features.get(name)
    }

    pub fn feature_enabled(&self, name: &str) -> bool {
        self.features.get(name).map(|f| f.enabled).unwrap_or(false)
    }
}

/// Runtime connection/listening status, fired on every transition per
/// `initializing -> qr_pending -> connected <-> disconnected -> terminated`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BotStatus {
    Initializing,
    QrPending,
    Connected,
    Disconnected,
    Terminated,
    Error,
}

impl BotStatus {
    pub fn is_dead(self) -> bool {
        matches!(self, BotStatus::Disconnected | BotStatus::Error | BotStatus::Terminated)
    }
}
