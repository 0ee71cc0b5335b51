use std::sync::Arc;

use async_trait::async_trait;

use super::error::LlmError;
use super::provider::{ChatTurn, LlmCompletion, LlmProvider};
use super::token_consumption::TokenConsumptionService;

/// Wraps any `LlmProvider` so every completion is metered, regardless of
/// which concrete backend answered the request.
pub struct TrackedLlmProvider {
    inner: Arc<dyn LlmProvider>,
    token_service: Arc<TokenConsumptionService>,
    user_id: String,
    bot_id: String,
    feature_name: String,
    provider_name: String,
    model: String,
    config_tier: String,
}

impl TrackedLlmProvider {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        inner: Arc<dyn LlmProvider>,
        token_service: Arc<TokenConsumptionService>,
        user_id: impl Into<String>,
        bot_id: impl Into<String>,
        feature_name: impl Into<String>,
        provider_name: impl Into<String>,
        model: impl Into<String>,
        config_tier: impl Into<String>,
    ) -> Self {
        TrackedLlmProvider {
            inner,
            token_service,
            user_id: user_id.into(),
            bot_id: bot_id.into(),
            feature_name: feature_name.into(),
            provider_name: provider_name.into(),
            model: model.into(),
            config_tier: config_tier.into(),
        }
    }
}

#[async_trait]
impl LlmProvider for TrackedLlmProvider {
    async fn complete(&self, system_prompt: &str, history: &[ChatTurn], question: &str) -> Result<LlmCompletion, LlmError> {
        let completion = self.inner.complete(system_prompt, history, question).await?;

        self.token_service
            .record_event(
                &self.user_id,
                &self.bot_id,
                &self.feature_name,
                &self.provider_name,
                &self.model,
                completion.usage.clone(),
                &self.config_tier,
            )
            .await;

        Ok(completion)
    }
}
