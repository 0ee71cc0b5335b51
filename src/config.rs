//! Environment-driven configuration, read once at process startup.
//!
//! Mirrors the teacher's `RateLimitConfig::from_env()` pattern: defaults
//! baked in, overridden by environment variables, parsed eagerly so a
//! misconfigured deployment fails at boot rather than mid-request.

use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub mongodb_url: String,
    pub database_name: String,
    pub backend_url: String,
    pub gateway_port: u16,
    pub whatsapp_server_url: String,
    pub default_llm: DefaultLlmConfig,
}

#[derive(Debug, Clone)]
pub struct DefaultLlmConfig {
    pub provider: String,
    pub high_model: String,
    pub low_model: String,
    pub temperature: f32,
    pub reasoning_effort: String,
    pub api_key_source: ApiKeySource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiKeySource {
    Environment,
    Explicit,
}

impl Config {
    pub fn from_env() -> Self {
        Config {
            mongodb_url: env::var("MONGODB_URL")
                .unwrap_or_else(|_| "mongodb://localhost:27017".to_string()),
            database_name: env::var("MONGODB_DATABASE")
                .unwrap_or_else(|_| "chatimposter".to_string()),
            backend_url: env::var("BACKEND_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:8100".to_string()),
            gateway_port: env::var("GATEWAY_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8000),
            whatsapp_server_url: env::var("WHATSAPP_SERVER_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:3000".to_string()),
            default_llm: DefaultLlmConfig {
                provider: env::var("DEFAULT_LLM_PROVIDER").unwrap_or_else(|_| "openai".to_string()),
                high_model: env::var("DEFAULT_LLM_HIGH_MODEL")
                    .unwrap_or_else(|_| "gpt-4.1".to_string()),
                low_model: env::var("DEFAULT_LLM_LOW_MODEL")
                    .unwrap_or_else(|_| "gpt-4.1-mini".to_string()),
                temperature: env::var("DEFAULT_LLM_TEMPERATURE")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(0.2),
                reasoning_effort: env::var("DEFAULT_LLM_REASONING_EFFORT")
                    .unwrap_or_else(|_| "medium".to_string()),
                api_key_source: match env::var("DEFAULT_LLM_API_KEY_SOURCE").as_deref() {
                    Ok("explicit") => ApiKeySource::Explicit,
                    _ => ApiKeySource::Environment,
                },
            },
        }
    }
}

/// JSON-schema-shaped metadata for an LLM provider configuration, mirroring
/// the `oneOf` patch the original UI derives from the pydantic model:
/// `environment` drops `api_key`, `explicit` requires it.
pub fn llm_provider_config_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "provider_name": { "type": "string" },
            "model": { "type": "string" },
            "temperature": { "type": "number" },
            "reasoning_effort": { "type": "string" },
            "api_key_source": { "type": "string", "enum": ["environment", "explicit"] },
        },
        "required": ["provider_name", "model", "api_key_source"],
        "oneOf": [
            {
                "properties": { "api_key_source": { "const": "environment" } },
                "not": { "required": ["api_key"] }
            },
            {
                "properties": { "api_key_source": { "const": "explicit" } },
                "required": ["api_key"]
            }
        ]
    })
}
