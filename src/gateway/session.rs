//! Gateway-side authentication sessions, distinct from the bot runtime
//! `SessionManager` in `crate::session_manager` (that one owns a live
//! WhatsApp connection; this one owns a login cookie). Mirrors the original
//! gateway's in-memory cache in front of Mongo: a 5-minute TTL per
//! `session_id` so a hot session doesn't round-trip the DB on every proxied
//! request.

use std::collections::HashMap;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use futures_util::TryStreamExt;
use mongodb::bson::doc;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::Db;
use crate::models::{Role, Session, StaleSession, StaleSessionReason};

const SESSION_LIFETIME_HOURS: i64 = 24;
const CACHE_TTL_SECS: u64 = 5 * 60;

pub struct SessionStore {
    db: Db,
    cache: Mutex<HashMap<String, (Session, Instant)>>,
}

impl SessionStore {
    pub fn new(db: Db) -> Self {
        SessionStore { db, cache: Mutex::new(HashMap::new()) }
    }

    async fn cache_get(&self, session_id: &str) -> Option<Session> {
        let cache = self.cache.lock().await;
        let (session, cached_at) = cache.get(session_id)?;
        if cached_at.elapsed().as_secs() < CACHE_TTL_SECS {
            return Some(session.clone());
        }
        None
    }

    async fn cache_put(&self, session: Session) {
        self.cache.lock().await.insert(session.session_id.clone(), (session, Instant::now()));
    }

    async fn cache_evict(&self, session_id: &str) {
        self.cache.lock().await.remove(session_id);
    }

    pub async fn create_session(&self, user_id: &str, role: Role, owned_bots: Vec<String>, ip: Option<String>, user_agent: Option<String>) -> Session {
        let now = Utc::now();
        let session = Session {
            session_id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            role,
            owned_bots,
            created_at: now,
            last_accessed: now,
            expires_at: now + Duration::hours(SESSION_LIFETIME_HOURS),
            ip,
            user_agent,
        };

        if let Err(e) = self.db.authenticated_sessions.insert_one(&session).await {
            warn!(user_id, "failed to persist new session: {e}");
        }
        self.cache_put(session.clone()).await;
        info!(user_id, session_id = %session.session_id, "created session");
        session
    }

    /// Returns the session if it exists and hasn't passed its absolute
    /// expiry. Does not touch `last_accessed` — callers that want heartbeat
    /// bookkeeping call `touch` separately. Checks the in-memory cache
    /// first; a cache hit still re-checks expiry since the cache doesn't
    /// evict proactively between sweeps.
    pub async fn get_session(&self, session_id: &str) -> Option<Session> {
        if let Some(session) = self.cache_get(session_id).await {
            if session.is_expired(Utc::now()) {
                self.cache_evict(session_id).await;
                return None;
            }
            return Some(session);
        }

        let session = self.db.authenticated_sessions.find_one(doc! {"session_id": session_id}).await.ok().flatten()?;
        if session.is_expired(Utc::now()) {
            return None;
        }
        self.cache_put(session.clone()).await;
        Some(session)
    }

    pub async fn touch(&self, session_id: &str) -> bool {
        match self
            .db
            .authenticated_sessions
            .update_one(doc! {"session_id": session_id}, doc! {"$set": {"last_accessed": Utc::now()}})
            .await
        {
            Ok(result) => {
                if result.modified_count > 0 {
                    let mut cache = self.cache.lock().await;
                    if let Some((session, cached_at)) = cache.get_mut(session_id) {
                        session.last_accessed = Utc::now();
                        *cached_at = Instant::now();
                    }
                }
                result.modified_count > 0
            }
            Err(e) => {
                warn!(session_id, "failed to update last_accessed: {e}");
                false
            }
        }
    }

    /// Moves the session out of the active collection into the stale
    /// archive and deletes the active record. Returns `false` if the
    /// session didn't exist (already gone, or expired).
    pub async fn invalidate_session(&self, session_id: &str, reason: StaleSessionReason) -> bool {
        let Some(session) = self.get_session(session_id).await else {
            return false;
        };

        let stale = StaleSession { session: session.clone(), invalidated_at: Utc::now(), reason };
        if let Err(e) = self.db.stale_authenticated_sessions.insert_one(&stale).await {
            warn!(session_id, "failed to archive stale session: {e}");
        }
        if let Err(e) = self.db.authenticated_sessions.delete_one(doc! {"session_id": session_id}).await {
            warn!(session_id, "failed to delete active session: {e}");
        }
        self.cache_evict(session_id).await;
        info!(session_id, user_id = %session.user_id, ?reason, "invalidated session");
        true
    }

    pub async fn get_user_sessions(&self, user_id: &str) -> Vec<Session> {
        let now = Utc::now();
        let cursor = self.db.authenticated_sessions.find(doc! {"user_id": user_id}).await;
        let mut sessions = Vec::new();
        let Ok(mut cursor) = cursor else {
            return sessions;
        };
        while let Ok(Some(session)) = cursor.try_next().await {
            if !session.is_expired(now) {
                sessions.push(session);
            }
        }
        sessions
    }

    pub async fn invalidate_all_user_sessions(&self, user_id: &str, reason: StaleSessionReason) -> usize {
        let sessions = self.get_user_sessions(user_id).await;
        let mut count = 0;
        for session in sessions {
            if self.invalidate_session(&session.session_id, reason).await {
                count += 1;
            }
        }
        count
    }

    pub async fn add_owned_bot(&self, session_id: &str, bot_id: &str) {
        if let Err(e) = self
            .db
            .authenticated_sessions
            .update_one(doc! {"session_id": session_id}, doc! {"$addToSet": {"owned_bots": bot_id}})
            .await
        {
            warn!(session_id, bot_id, "failed to record owned bot on session: {e}");
        }
        self.cache_evict(session_id).await;
    }

    /// Background sweep: archives sessions whose absolute expiry has
    /// passed but that were never explicitly logged out, so the active
    /// collection only ever holds live sessions.
    pub async fn cleanup_expired(&self) -> usize {
        let now = Utc::now();
        let cursor = self.db.authenticated_sessions.find(doc! {"expires_at": {"$lte": now}}).await;
        let Ok(mut cursor) = cursor else {
            return 0;
        };

        let mut expired_ids = Vec::new();
        while let Ok(Some(session)) = cursor.try_next().await {
            expired_ids.push(session.session_id);
        }

        let mut count = 0;
        for session_id in expired_ids {
            if self.invalidate_session(&session_id, StaleSessionReason::Expired).await {
                count += 1;
            }
        }
        count
    }
}

#[derive(Debug, Clone)]
pub struct SessionContext {
    pub session_id: String,
    pub user_id: String,
    pub role: Role,
    pub owned_bots: Vec<String>,
}

impl From<Session> for SessionContext {
    fn from(session: Session) -> Self {
        SessionContext { session_id: session.session_id, user_id: session.user_id, role: session.role, owned_bots: session.owned_bots }
    }
}

/// How long the `stale_authenticated_sessions` archive is considered worth
/// keeping around before a future retention pass could prune it. Not
/// currently swept automatically — the TTL on `audit_logs` covers the
/// security-relevant trail; this archive is diagnostic.
pub const STALE_SESSION_RETENTION_DAYS: i64 = 90;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_is_expired_past_absolute_lifetime() {
        let now = Utc::now();
        let session = Session {
            session_id: "s1".to_string(),
            user_id: "alice".to_string(),
            role: Role::User,
            owned_bots: vec![],
            created_at: now - Duration::hours(25),
            last_accessed: now - Duration::hours(1),
            expires_at: now - Duration::hours(1),
            ip: None,
            user_agent: None,
        };
        assert!(session.is_expired(now));
    }
}
