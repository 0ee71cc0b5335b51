use std::sync::Arc;

use chrono::Utc;
use tracing::{error, warn};

use crate::models::TokenEvent;

use super::provider::TokenUsage;
use super::quota::QuotaService;
use crate::db::Db;

/// Persists every LLM invocation's usage and, if a quota service is wired
/// in, routes the computed cost into quota enforcement — mirroring the
/// import-time coupling the source system does lazily inside
/// `record_event` to avoid a hard dependency cycle.
pub struct TokenConsumptionService {
    db: Db,
    quota_service: Option<Arc<QuotaService>>,
}

impl TokenConsumptionService {
    pub fn new(db: Db, quota_service: Option<Arc<QuotaService>>) -> Self {
        TokenConsumptionService { db, quota_service }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn record_event(
        &self,
        user_id: &str,
        bot_id: &str,
        feature_name: &str,
        provider_name: &str,
        model: &str,
        usage: TokenUsage,
        config_tier: &str,
    ) {
        let cost = self
            .quota_service
            .as_ref()
            .map(|q| q.calculate_cost(usage.input_tokens, usage.output_tokens, config_tier, usage.cached_input_tokens))
            .unwrap_or(0.0);

        let event = TokenEvent {
            timestamp: Utc::now(),
            user_id: user_id.to_string(),
            bot_id: bot_id.to_string(),
            feature_name: feature_name.to_string(),
            provider_name: provider_name.to_string(),
            model: model.to_string(),
            input_tokens: usage.input_tokens,
            cached_input_tokens: usage.cached_input_tokens,
            output_tokens: usage.output_tokens,
            config_tier: config_tier.to_string(),
            cost_dollars: cost,
        };

        if let Err(e) = self.db.token_consumption.insert_one(&event).await {
            error!(user_id, bot_id, "failed to record token consumption event: {e}");
            return;
        }

        if let Some(quota_service) = &self.quota_service {
            if let Err(e) = quota_service.update_user_usage(user_id, cost).await {
                error!(user_id, "failed to update quota usage: {e}");
            }
        } else {
            warn!(user_id, "quota service not wired in, cost not tracked");
        }
    }
}
