//! Composition root for one running bot: builds its provider, queue
//! manager, and feature handlers from a `BotConfig`, and reacts to
//! connect/disconnect events by moving delivery-queue items and
//! (re)scheduling group tracking jobs. The single owner of "what bots are
//! currently running."

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use mongodb::bson::doc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::db::Db;
use crate::delivery::{BotHandle, BotSessionLookup, DeliveryQueueManager};
use crate::features::group_tracking::{
    ActionItemExtractor, GroupTrackingScheduler, HistoryService, TrackingLlmLookup, DEFAULT_HIGH_SYSTEM_PROMPT, DEFAULT_LOW_SYSTEM_PROMPT,
};
use crate::features::AutomaticBotReplyService;
use crate::ingestion::IngestionService;
use crate::llm::{create_tracked_llm, BotLifecycleControl, QuotaService, TokenConsumptionService};
use crate::models::{BotConfig, BotStatus};
use crate::provider::{ChatProvider, SessionEndCallback, StatusChangeCallback, WhatsAppBridgeProvider};
use crate::queue::QueueManager;
use crate::session_manager::SessionManager;

pub struct BotLifecycleService {
    db: Db,
    config: Config,
    delivery: Arc<DeliveryQueueManager>,
    scheduler: Arc<GroupTrackingScheduler>,
    history: Arc<HistoryService>,
    quota: Arc<QuotaService>,
    token_service: Arc<TokenConsumptionService>,
    active_bots: RwLock<HashMap<String, Arc<SessionManager>>>,
}

impl BotLifecycleService {
    pub fn new(
        db: Db,
        config: Config,
        delivery: Arc<DeliveryQueueManager>,
        scheduler: Arc<GroupTrackingScheduler>,
        history: Arc<HistoryService>,
        quota: Arc<QuotaService>,
    ) -> Arc<Self> {
        let token_service = Arc::new(TokenConsumptionService::new(db.clone(), Some(quota.clone())));
        Arc::new(BotLifecycleService {
            db,
            config,
            delivery,
            scheduler,
            history,
            quota,
            token_service,
            active_bots: RwLock::new(HashMap::new()),
        })
    }

    pub async fn active_session(&self, bot_id: &str) -> Option<Arc<SessionManager>> {
        self.active_bots.read().await.get(bot_id).cloned()
    }

    pub async fn is_active(&self, bot_id: &str) -> bool {
        self.active_bots.read().await.contains_key(bot_id)
    }

    async fn load_config(&self, bot_id: &str) -> Option<BotConfig> {
        match self.db.bot_configurations.find_one(doc! {"bot_id": bot_id}).await {
            Ok(config) => config,
            Err(e) => {
                error!(bot_id, "failed to load bot configuration: {e}");
                None
            }
        }
    }

    async fn find_owner(&self, bot_id: &str) -> Option<String> {
        self.db
            .user_auth_credentials
            .find_one(doc! {"owned_bots": bot_id})
            .await
            .ok()
            .flatten()
            .map(|user| user.user_id)
    }

    /// Returns `(server_root, session_base, ws_url)`. `session_base` and
    /// `ws_url` are scoped under `/sessions/{bot_id}`; `server_root` is used
    /// for the non-session-scoped `/initialize` call.
    fn bridge_urls(&self, bot_id: &str) -> (String, String, String) {
        let root = self.config.whatsapp_server_url.trim_end_matches('/').to_string();
        let http = format!("{root}/sessions/{bot_id}");
        let ws = http.replacen("https://", "wss://", 1).replacen("http://", "ws://", 1) + "/ws";
        (root, http, ws)
    }

    /// Builds a fresh, unstarted session from persisted configuration —
    /// provider, queue manager, ingestion service, and whichever message
    /// handler features are enabled.
    async fn build_session(self: &Arc<Self>, config: BotConfig, owner_user_id: String) -> Arc<SessionManager> {
        let (server_root, http_base, ws_url) = self.bridge_urls(&config.bot_id);
        let queue_manager = Arc::new(QueueManager::new(&config, self.db.clone()));

        let status_target = self.clone();
        let on_status_change: StatusChangeCallback = Arc::new(move |bot_id, status| {
            let target = status_target.clone();
            tokio::spawn(async move { target.on_status_change(bot_id, status).await });
        });

        let end_target = self.clone();
        let on_session_end: SessionEndCallback = Arc::new(move |bot_id| {
            let target = end_target.clone();
            tokio::spawn(async move { target.on_bot_disconnected(&bot_id).await });
        });

        let provider: Arc<dyn ChatProvider> = Arc::new(WhatsAppBridgeProvider::new(
            config.bot_id.clone(),
            server_root,
            http_base,
            ws_url,
            queue_manager.clone(),
            config.chat_provider.allow_group_messages,
            Some(on_status_change),
            Some(on_session_end),
        ));

        let session = SessionManager::new(config.bot_id.clone(), provider.clone(), queue_manager.clone());

        let ingestion = Arc::new(IngestionService::new(
            config.bot_id.clone(),
            config.chat_provider.provider_name.clone(),
            queue_manager.clone(),
            self.db.clone(),
        ));
        ingestion.start().await;
        session.register_service(ingestion).await;

        if config.feature_enabled("automatic_bot_reply") {
            self.install_auto_reply(&session, &config, &provider, &owner_user_id, self.token_service.clone()).await;
        }

        session
    }

    async fn install_auto_reply(
        &self,
        session: &Arc<SessionManager>,
        config: &BotConfig,
        provider: &Arc<dyn ChatProvider>,
        owner_user_id: &str,
        token_service: Arc<TokenConsumptionService>,
    ) {
        let options: crate::models::AutomaticBotReplyOptions = config
            .feature("automatic_bot_reply")
            .and_then(|f| serde_json::from_value(f.options.clone()).ok())
            .unwrap_or_default();

        match create_tracked_llm(&config.llm_high, token_service, owner_user_id.to_string(), config.bot_id.clone(), "automatic_bot_reply", "high") {
            Ok(llm) => {
                let system_prompt = options.chat_system_prompt.replace("{user_id}", owner_user_id);
                let service = AutomaticBotReplyService::new(
                    config.bot_id.clone(),
                    provider.clone(),
                    llm,
                    system_prompt,
                    config.context_config.clone(),
                    options.group_whitelist,
                    options.direct_whitelist,
                );
                service.install(session).await;
                session.register_feature("automatic_bot_reply", service).await;
            }
            Err(e) => error!(bot_id = %config.bot_id, "failed to build automatic_bot_reply LLM, feature not installed: {e}"),
        }
    }

    async fn on_status_change(self: Arc<Self>, bot_id: String, status: BotStatus) {
        match status {
            BotStatus::Connected => self.on_bot_connected(bot_id).await,
            BotStatus::Disconnected => self.on_bot_disconnected(&bot_id).await,
            _ => {}
        }
    }

    async fn on_bot_connected(self: Arc<Self>, bot_id: String) {
        if let Err(e) = self.delivery.move_user_to_active(&bot_id).await {
            error!(bot_id = %bot_id, "failed to move delivery items to active queue: {e}");
        }

        if let Err(e) = self
            .db
            .bot_configurations
            .update_one(doc! {"bot_id": &bot_id}, doc! {"$set": {"has_whatsapp_credentials": true}})
            .await
        {
            error!(bot_id = %bot_id, "failed to record successful pairing: {e}");
        }

        let Some(config) = self.load_config(&bot_id).await else {
            return;
        };

        let jobs = if config.feature_enabled("periodic_group_tracking") {
            config
                .feature("periodic_group_tracking")
                .and_then(|f| serde_json::from_value::<crate::models::PeriodicGroupTrackingOptions>(f.options.clone()).ok())
                .map(|options| options.groups)
                .unwrap_or_default()
        } else {
            Vec::new()
        };

        self.scheduler
            .update_jobs(&bot_id, &config.chat_provider.provider_name, &config.profile.timezone, jobs)
            .await;
    }

    async fn on_bot_disconnected(&self, bot_id: &str) {
        info!(bot_id, "bot disconnected, pausing tracking jobs");
        self.scheduler.stop_tracking_jobs(bot_id).await;
    }

    pub async fn start_bot(self: &Arc<Self>, bot_id: &str) {
        if self.is_active(bot_id).await {
            info!(bot_id, "bot already active, skipping start");
            return;
        }

        let Some(config) = self.load_config(bot_id).await else {
            error!(bot_id, "config not found, cannot start");
            return;
        };
        let owner_user_id = self.find_owner(bot_id).await.unwrap_or_else(|| bot_id.to_string());

        let session = self.build_session(config, owner_user_id).await;
        if let Err(e) = session.start().await {
            error!(bot_id, "failed to start session: {e}");
            return;
        }
        self.active_bots.write().await.insert(bot_id.to_string(), session);
    }

    pub async fn stop_bot(&self, bot_id: &str, cleanup_session: bool) {
        let Some(session) = self.active_bots.write().await.remove(bot_id) else {
            return;
        };
        info!(bot_id, cleanup_session, "stopping bot");
        session.stop(cleanup_session).await;

        if let Err(e) = self.delivery.move_user_to_holding(bot_id).await {
            error!(bot_id, "failed to move delivery items to holding queue: {e}");
        }
        self.scheduler.stop_tracking_jobs(bot_id).await;
    }

    pub async fn reload_bot(self: &Arc<Self>, bot_id: &str) {
        self.stop_bot(bot_id, false).await;
        self.start_bot(bot_id).await;
    }

    /// Stops the running instance (if any), drains its delivery items and
    /// tracking state, and deletes the configuration document. Does not
    /// touch the owning user's credentials.
    pub async fn delete_bot(&self, bot_id: &str) -> mongodb::error::Result<bool> {
        self.scheduler.stop_tracking_jobs(bot_id).await;

        if let Some(session) = self.active_bots.write().await.remove(bot_id) {
            session.stop(true).await;
        }

        if let Err(e) = self.delivery.move_user_to_holding(bot_id).await {
            warn!(bot_id, "failed to drain delivery queue before delete: {e}");
        }

        for group in self.history.get_tracked_periods(bot_id, None).await {
            let _ = self.history.delete_group_periods(bot_id, &group.group_identifier).await;
        }

        let result = self.db.bot_configurations.delete_one(doc! {"bot_id": bot_id}).await?;
        Ok(result.deleted_count > 0)
    }

    /// Stops every currently active session without bridge cleanup, so
    /// WhatsApp credentials survive a process restart. Called on shutdown.
    pub async fn stop_all_sessions(&self) {
        let bot_ids: Vec<String> = self.active_bots.read().await.keys().cloned().collect();
        for bot_id in bot_ids {
            self.stop_bot(&bot_id, false).await;
        }
    }
}

// Implemented on `Arc<BotLifecycleService>` rather than on the bare type
// since `start_bot` needs to hand its own `Arc` down into spawned
// callbacks (`build_session`'s status-change closures); both trait
// objects below are always constructed from an already-`Arc`'d service.
#[async_trait]
impl BotLifecycleControl for Arc<BotLifecycleService> {
    async fn stop_bot(&self, bot_id: &str) {
        BotLifecycleService::stop_bot(self, bot_id, true).await;
    }

    async fn start_bot(&self, bot_id: &str) {
        BotLifecycleService::start_bot(self, bot_id).await;
    }
}

#[async_trait]
impl BotSessionLookup for Arc<BotLifecycleService> {
    async fn get(&self, bot_id: &str) -> Option<BotHandle> {
        let session = self.active_session(bot_id).await?;
        let config = self.load_config(bot_id).await?;
        Some(BotHandle {
            session,
            language_code: config.profile.language,
        })
    }
}

/// Extractors are built fresh per fire rather than cached, since each
/// tenant's `llm_low`/`llm_high` configuration can change between runs and
/// the cost of one extra client construction is negligible next to the
/// LLM calls it's about to make.
#[async_trait]
impl TrackingLlmLookup for Arc<BotLifecycleService> {
    async fn extractor_for(&self, bot_id: &str) -> Option<ActionItemExtractor> {
        let config = self.load_config(bot_id).await?;
        let owner_user_id = self.find_owner(bot_id).await.unwrap_or_else(|| bot_id.to_string());

        let low_llm = create_tracked_llm(
            &config.llm_low,
            self.token_service.clone(),
            owner_user_id.clone(),
            bot_id.to_string(),
            "periodic_group_tracking",
            "low",
        )
        .map_err(|e| error!(bot_id, "failed to build periodic_group_tracking low-tier LLM: {e}"))
        .ok()?;

        let high_llm = create_tracked_llm(
            &config.llm_high,
            self.token_service.clone(),
            owner_user_id,
            bot_id.to_string(),
            "periodic_group_tracking",
            "high",
        )
        .map_err(|e| error!(bot_id, "failed to build periodic_group_tracking high-tier LLM: {e}"))
        .ok()?;

        Some(ActionItemExtractor::new(
            low_llm,
            high_llm,
            DEFAULT_LOW_SYSTEM_PROMPT.to_string(),
            DEFAULT_HIGH_SYSTEM_PROMPT.to_string(),
        ))
    }
}
