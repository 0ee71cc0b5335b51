//! Wires every long-lived service together at process startup. The
//! delivery queue and the group tracking scheduler each need a way to look
//! a bot's live session (and, for tracking, its tenant-specific extraction
//! LLMs) back up by id — and the only thing that can answer that is the
//! lifecycle service, which in turn needs the queue and scheduler already
//! built to hand to its own constructor. `LifecycleHandle` breaks that
//! cycle: it's a trait-object-shaped forwarding cell, constructed empty and
//! filled in once the lifecycle service exists.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::info;

use crate::config::Config;
use crate::db::Db;
use crate::delivery::{BotHandle, BotSessionLookup, DeliveryQueueManager};
use crate::features::group_tracking::{ActionItemExtractor, GroupTrackingRunner, GroupTrackingScheduler, HistoryService, TrackingLlmLookup};
use crate::lifecycle::BotLifecycleService;
use crate::llm::{BotLifecycleControl, QuotaService};

const STARTUP_AUTOSTART_DELAY: std::time::Duration = std::time::Duration::from_secs(60);

#[derive(Clone)]
struct LifecycleHandle(Arc<RwLock<Option<Arc<BotLifecycleService>>>>);

impl LifecycleHandle {
    fn empty() -> Self {
        LifecycleHandle(Arc::new(RwLock::new(None)))
    }

    async fn fill(&self, lifecycle: Arc<BotLifecycleService>) {
        *self.0.write().await = Some(lifecycle);
    }

    async fn current(&self) -> Option<Arc<BotLifecycleService>> {
        self.0.read().await.clone()
    }
}

#[async_trait]
impl BotSessionLookup for LifecycleHandle {
    async fn get(&self, bot_id: &str) -> Option<BotHandle> {
        self.current().await?.get(bot_id).await
    }
}

#[async_trait]
impl TrackingLlmLookup for LifecycleHandle {
    async fn extractor_for(&self, bot_id: &str) -> Option<ActionItemExtractor> {
        self.current().await?.extractor_for(bot_id).await
    }
}

#[async_trait]
impl BotLifecycleControl for LifecycleHandle {
    async fn stop_bot(&self, bot_id: &str) {
        if let Some(lifecycle) = self.current().await {
            lifecycle.stop_bot(bot_id).await;
        }
    }

    async fn start_bot(&self, bot_id: &str) {
        if let Some(lifecycle) = self.current().await {
            lifecycle.start_bot(bot_id).await;
        }
    }
}

/// Every long-lived service, handed to both binaries via Rocket's
/// `.manage()`. `backend` uses the full set; `gateway` only touches `db`
/// and `config` directly, reaching the rest through proxied HTTP calls.
pub struct AppState {
    pub db: Db,
    pub config: Config,
    pub quota: Arc<QuotaService>,
    pub delivery: Arc<DeliveryQueueManager>,
    pub history: Arc<HistoryService>,
    pub scheduler: Arc<GroupTrackingScheduler>,
    pub lifecycle: Arc<BotLifecycleService>,
}

impl AppState {
    pub async fn build(db: Db, config: Config) -> anyhow::Result<Arc<Self>> {
        let quota = Arc::new(QuotaService::new(db.clone()));
        quota.load_token_menu().await;

        let handle = LifecycleHandle::empty();

        let delivery = DeliveryQueueManager::new(db.clone(), Arc::new(handle.clone()));
        let history = Arc::new(HistoryService::new(db.clone()));
        let runner = GroupTrackingRunner::new(history.clone(), delivery.clone());
        let scheduler = GroupTrackingScheduler::new(runner, Arc::new(handle.clone()), Arc::new(handle.clone()));

        let lifecycle = BotLifecycleService::new(db.clone(), config.clone(), delivery.clone(), scheduler.clone(), history.clone(), quota.clone());
        handle.fill(lifecycle.clone()).await;

        quota.set_lifecycle_control(Arc::new(handle)).await;

        // Nothing is connected yet at process start, so anything left over
        // in the active queue from the previous run waits in holding until
        // its owning bot reconnects.
        if let Err(e) = delivery.move_all_to_holding().await {
            tracing::error!("failed to move delivery items to holding on startup: {e}");
        }

        Ok(Arc::new(AppState {
            db,
            config,
            quota,
            delivery,
            history,
            scheduler,
            lifecycle,
        }))
    }

    /// Starts the delivery consumer, auto-starts every active user's bots
    /// after a fixed settle delay, and begins the periodic quota-reset
    /// sweep. Called once from `backend`'s entrypoint, after `build` has
    /// already moved every in-flight delivery item to holding.
    pub fn spawn_background_tasks(self: &Arc<Self>) {
        let delivery = self.delivery.clone();
        tokio::spawn(async move {
            delivery.start_consumer().await;
        });

        let quota = self.quota.clone();
        tokio::spawn(async move {
            quota.start_all_active_users_bots(STARTUP_AUTOSTART_DELAY).await;
        });

        let quota = self.quota.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(std::time::Duration::from_secs(3600));
            loop {
                ticker.tick().await;
                info!("running scheduled quota reset sweep");
                quota.check_and_reset_quotas().await;
            }
        });
    }

    /// Stops each active bot session without bridge cleanup (preserving
    /// WhatsApp credentials for the next restart), tears down the group
    /// tracking scheduler, and stops the delivery consumer.
    pub async fn shutdown(&self) {
        info!("shutting down: stopping active sessions, scheduler, and delivery consumer");
        self.lifecycle.stop_all_sessions().await;
        self.scheduler.stop_all().await;
        self.delivery.stop_consumer().await;
    }
}
