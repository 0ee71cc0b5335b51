use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use mongodb::bson::doc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::db::Db;

#[derive(Debug, Clone, Default)]
pub struct TierRates {
    pub input_tokens_per_million: f64,
    pub cached_input_tokens_per_million: f64,
    pub output_tokens_per_million: f64,
}

/// Per-tier dollar rates, loaded once from the `token_menu` document in
/// `global_configurations` and cached in memory.
#[derive(Debug, Clone, Default)]
pub struct TokenMenu {
    pub tiers: HashMap<String, TierRates>,
}

/// Callback surface the quota service uses to stop or restart a user's
/// bots without depending on the lifecycle module directly — wired in at
/// startup by whatever owns both services.
#[async_trait]
pub trait BotLifecycleControl: Send + Sync {
    async fn stop_bot(&self, bot_id: &str);
    async fn start_bot(&self, bot_id: &str);
}

pub struct QuotaService {
    db: Db,
    token_menu: RwLock<TokenMenu>,
    lifecycle: RwLock<Option<Arc<dyn BotLifecycleControl>>>,
}

impl QuotaService {
    pub fn new(db: Db) -> Self {
        QuotaService {
            db,
            token_menu: RwLock::new(TokenMenu::default()),
            lifecycle: RwLock::new(None),
        }
    }

    pub async fn set_lifecycle_control(&self, lifecycle: Arc<dyn BotLifecycleControl>) {
        *self.lifecycle.write().await = Some(lifecycle);
    }

    pub async fn load_token_menu(&self) {
        let doc = self
            .db
            .global_configurations
            .find_one(doc! {"_id": "token_menu"})
            .await;
        match doc {
            Ok(Some(doc)) => {
                let mut tiers = HashMap::new();
                for tier in ["high", "low"] {
                    if let Ok(menu) = doc.get_document(tier) {
                        tiers.insert(
                            tier.to_string(),
                            TierRates {
                                input_tokens_per_million: menu.get_f64("input_tokens").unwrap_or(0.0),
                                cached_input_tokens_per_million: menu.get_f64("cached_input_tokens").unwrap_or(0.0),
                                output_tokens_per_million: menu.get_f64("output_tokens").unwrap_or(0.0),
                            },
                        );
                    }
                }
                *self.token_menu.write().await = TokenMenu { tiers };
            }
            Ok(None) => error!("token_menu not found in global configurations"),
            Err(e) => error!("failed to load token_menu: {e}"),
        }
    }

    pub fn calculate_cost(&self, input_tokens: u64, output_tokens: u64, config_tier: &str, cached_input_tokens: u64) -> f64 {
        let menu = match self.token_menu.try_read() {
            Ok(m) => m,
            Err(_) => return 0.0,
        };
        let Some(rates) = menu.tiers.get(config_tier) else {
            warn!(config_tier, "unknown config tier, cost not computed");
            return 0.0;
        };

        let uncached_input = input_tokens.saturating_sub(cached_input_tokens);
        (uncached_input as f64 * rates.input_tokens_per_million / 1_000_000.0)
            + (cached_input_tokens as f64 * rates.cached_input_tokens_per_million / 1_000_000.0)
            + (output_tokens as f64 * rates.output_tokens_per_million / 1_000_000.0)
    }

    /// Atomically increments `dollars_used`, then re-reads to decide
    /// whether the user just crossed their limit. The increment and the
    /// disable are two separate writes — a concurrent increment between
    /// them can at most delay the disable by one event, never lose it,
    /// since every subsequent call re-checks the same condition.
    pub async fn update_user_usage(&self, user_id: &str, cost: f64) -> mongodb::error::Result<()> {
        if cost <= 0.0 {
            return Ok(());
        }

        self.db
            .user_auth_credentials
            .update_one(doc! {"user_id": user_id}, doc! {"$inc": {"llm_quota.dollars_used": cost}})
            .await?;

        let user = self.db.user_auth_credentials.find_one(doc! {"user_id": user_id}).await?;
        let Some(user) = user else { return Ok(()) };

        if !user.llm_quota.enabled {
            return Ok(());
        }

        if user.llm_quota.dollars_used >= user.llm_quota.dollars_per_period {
            info!(user_id, usage = user.llm_quota.dollars_used, limit = user.llm_quota.dollars_per_period, "user exceeded quota, disabling");

            self.db
                .user_auth_credentials
                .update_one(doc! {"user_id": user_id}, doc! {"$set": {"llm_quota.enabled": false}})
                .await?;

            self.stop_user_bots(&user.owned_bots).await;
        }

        Ok(())
    }

    async fn stop_user_bots(&self, owned_bots: &[String]) {
        let Some(lifecycle) = self.lifecycle.read().await.clone() else {
            warn!("no lifecycle control wired in, cannot stop bots over quota");
            return;
        };
        for bot_id in owned_bots {
            lifecycle.stop_bot(bot_id).await;
        }
    }

    /// Auto-starts only bots the owner has activated AND that have
    /// previously paired with WhatsApp — there's nothing to reconnect to
    /// for a bot that was configured but never authenticated.
    async fn start_user_bots(&self, owned_bots: &[String]) {
        let Some(lifecycle) = self.lifecycle.read().await.clone() else {
            return;
        };
        for bot_id in owned_bots {
            let config = match self.db.bot_configurations.find_one(doc! {"bot_id": bot_id}).await {
                Ok(Some(config)) => config,
                Ok(None) => continue,
                Err(e) => {
                    error!(bot_id, "failed to load bot configuration for auto-start: {e}");
                    continue;
                }
            };
            if !config.activated {
                info!(bot_id, "skipping auto-start: bot not activated");
                continue;
            }
            if !config.has_whatsapp_credentials {
                info!(bot_id, "skipping auto-start: no prior WhatsApp pairing");
                continue;
            }
            lifecycle.start_bot(bot_id).await;
        }
    }

    /// Resets any user whose `last_reset + reset_days` has elapsed, and
    /// restarts their bots if the reset re-enables a disabled account.
    pub async fn check_and_reset_quotas(&self) {
        let filter = doc! {"llm_quota": {"$exists": true}};
        let mut cursor = match self.db.user_auth_credentials.find(filter).await {
            Ok(c) => c,
            Err(e) => {
                error!("failed to iterate users for quota reset: {e}");
                return;
            }
        };

        use futures_util::TryStreamExt;
        while let Ok(Some(user)) = cursor.try_next().await {
            let now = Utc::now();
            let next_reset = user.llm_quota.last_reset + chrono::Duration::days(user.llm_quota.reset_days as i64);
            if now < next_reset {
                continue;
            }

            info!(user_id = %user.user_id, "resetting quota");
            let was_disabled = !user.llm_quota.enabled;
            let result = self
                .db
                .user_auth_credentials
                .update_one(
                    doc! {"user_id": &user.user_id},
                    doc! {"$set": {
                        "llm_quota.dollars_used": 0.0,
                        "llm_quota.last_reset": now,
                        "llm_quota.enabled": true,
                    }},
                )
                .await;

            if let Err(e) = result {
                error!(user_id = %user.user_id, "failed to reset quota: {e}");
                continue;
            }

            if was_disabled {
                self.start_user_bots(&user.owned_bots).await;
            }
        }
    }

    /// Called once at startup, after a fixed delay, to bring back bots for
    /// every user whose quota is currently enabled.
    pub async fn start_all_active_users_bots(&self, startup_delay: std::time::Duration) {
        info!(delay_secs = startup_delay.as_secs(), "waiting before auto-starting bots");
        tokio::time::sleep(startup_delay).await;

        let filter = doc! {"llm_quota.enabled": true};
        let mut cursor = match self.db.user_auth_credentials.find(filter).await {
            Ok(c) => c,
            Err(e) => {
                error!("failed to iterate enabled users at startup: {e}");
                return;
            }
        };

        use futures_util::TryStreamExt;
        let mut count = 0;
        while let Ok(Some(user)) = cursor.try_next().await {
            self.start_user_bots(&user.owned_bots).await;
            count += 1;
        }
        info!(count, "processed startup auto-start for enabled users");
    }
}
