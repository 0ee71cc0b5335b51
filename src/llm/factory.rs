use std::sync::Arc;

use crate::models::LlmProviderConfig;

use super::error::LlmError;
use super::openai_provider::OpenAiProvider;
use super::provider::LlmProvider;
use super::token_consumption::TokenConsumptionService;
use super::tracked::TrackedLlmProvider;

/// Builds the concrete provider named by `config.provider_name` and wraps it
/// for token tracking. `"openai"` is the only backend currently wired; add a
/// match arm here when another provider is adapted.
#[allow(clippy::too_many_arguments)]
pub fn create_tracked_llm(
    config: &LlmProviderConfig,
    token_service: Arc<TokenConsumptionService>,
    user_id: impl Into<String>,
    bot_id: impl Into<String>,
    feature_name: impl Into<String>,
    config_tier: impl Into<String>,
) -> Result<Arc<dyn LlmProvider>, LlmError> {
    let inner: Arc<dyn LlmProvider> = match config.provider_name.as_str() {
        "openai" => Arc::new(OpenAiProvider::new(config)?),
        other => return Err(LlmError::UnknownProvider(other.to_string())),
    };

    Ok(Arc::new(TrackedLlmProvider::new(
        inner,
        token_service,
        user_id,
        bot_id,
        feature_name,
        config.provider_name.clone(),
        config.model.clone(),
        config_tier,
    )))
}
