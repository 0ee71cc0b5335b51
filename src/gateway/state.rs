use std::time::Duration;

use tracing::info;

use crate::config::Config;
use crate::db::Db;

use super::audit::AuditLogger;
use super::credentials::CredentialsService;
use super::lockout::LockoutManager;
use super::rate_limiter::RateLimiter;
use super::session::SessionStore;

/// Everything the gateway binary needs, managed by Rocket. Unlike
/// `crate::state::AppState` this never touches bot sessions or LLM
/// providers directly — every domain operation is a proxied HTTP call to
/// the backend.
pub struct GatewayState {
    pub config: Config,
    pub credentials: CredentialsService,
    pub sessions: SessionStore,
    pub lockouts: LockoutManager,
    pub audit: AuditLogger,
    pub rate_limiter: RateLimiter,
    pub http: reqwest::Client,
}

impl GatewayState {
    pub fn new(db: Db, config: Config) -> Self {
        let http = reqwest::Client::builder().timeout(Duration::from_secs(30)).build().expect("failed to build reqwest client");

        GatewayState {
            credentials: CredentialsService::new(db.clone()),
            sessions: SessionStore::new(db.clone()),
            lockouts: LockoutManager::new(db.clone()),
            audit: AuditLogger::new(db),
            rate_limiter: RateLimiter::new(),
            config,
            http,
        }
    }

    /// Background sweeps mirroring the original deployment's maintenance
    /// loop: expired sessions once a day, expired lockouts once an hour.
    pub fn spawn_background_tasks(self: &std::sync::Arc<Self>) {
        let state = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(86_400));
            loop {
                ticker.tick().await;
                let removed = state.sessions.cleanup_expired().await;
                info!(removed, "swept stale sessions");
            }
        });

        let state = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(3_600));
            loop {
                ticker.tick().await;
                let removed = state.lockouts.cleanup_expired().await;
                info!(removed, "swept expired account lockouts");
            }
        });
    }
}
