//! Account lockout after repeated failed logins, persisted in Mongo so it
//! survives gateway restarts and is shared across gateway replicas.
//! `AccountLockout` keeps a timestamp list rather than a raw counter, so a
//! reset is just "drop everything older than the window" instead of a
//! separate last-attempt comparison. Fronted by a 2-minute in-memory cache,
//! mirroring `SessionStore`'s (longer) cache in front of the same Mongo
//! collection pattern.

use std::collections::HashMap;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use mongodb::bson::doc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::db::Db;
use crate::models::AccountLockout;

const CACHE_TTL_SECS: u64 = 2 * 60;

pub struct LockoutManager {
    db: Db,
    cache: Mutex<HashMap<String, (AccountLockout, Instant)>>,
}

impl LockoutManager {
    pub fn new(db: Db) -> Self {
        LockoutManager { db, cache: Mutex::new(HashMap::new()) }
    }

    async fn load(&self, identifier: &str) -> AccountLockout {
        if let Some((lockout, cached_at)) = self.cache.lock().await.get(identifier) {
            if cached_at.elapsed().as_secs() < CACHE_TTL_SECS {
                return lockout.clone();
            }
        }

        let lockout = self
            .db
            .account_lockouts
            .find_one(doc! {"identifier": identifier})
            .await
            .ok()
            .flatten()
            .unwrap_or_else(|| AccountLockout {
                identifier: identifier.to_string(),
                failure_timestamps: Vec::new(),
                locked_until: None,
            });
        self.cache.lock().await.insert(identifier.to_string(), (lockout.clone(), Instant::now()));
        lockout
    }

    async fn save(&self, lockout: &AccountLockout) {
        if let Err(e) = self
            .db
            .account_lockouts
            .update_one(
                doc! {"identifier": &lockout.identifier},
                doc! {"$set": {
                    "identifier": &lockout.identifier,
                    "failure_timestamps": mongodb::bson::to_bson(&lockout.failure_timestamps).unwrap_or(mongodb::bson::Bson::Array(vec![])),
                    "locked_until": lockout.locked_until,
                }},
            )
            .upsert(true)
            .await
        {
            warn!(identifier = %lockout.identifier, "failed to persist account lockout: {e}");
        }
        self.cache.lock().await.insert(lockout.identifier.clone(), (lockout.clone(), Instant::now()));
    }

    /// Returns `(is_locked, locked_until)`.
    pub async fn check_lockout(&self, identifier: &str) -> (bool, Option<DateTime<Utc>>) {
        let lockout = self.load(identifier).await;
        let now = Utc::now();
        if lockout.is_locked(now) {
            return (true, lockout.locked_until);
        }
        (false, None)
    }

    /// Records a failed login attempt and locks the account if this push
    /// the failure count over the threshold within the window. Returns
    /// `(just_locked, locked_until)`.
    pub async fn record_failed_attempt(&self, identifier: &str) -> (bool, Option<DateTime<Utc>>) {
        let mut lockout = self.load(identifier).await;
        let now = Utc::now();
        let window = Duration::seconds(AccountLockout::WINDOW_SECS);

        lockout.failure_timestamps.retain(|t| now.signed_duration_since(*t) < window);
        lockout.failure_timestamps.push(now);

        if lockout.failure_timestamps.len() >= AccountLockout::MAX_FAILURES {
            let locked_until = now + Duration::seconds(AccountLockout::LOCK_SECS);
            lockout.locked_until = Some(locked_until);
            warn!(identifier, attempts = lockout.failure_timestamps.len(), "locking account until {locked_until}");
            self.save(&lockout).await;
            return (true, Some(locked_until));
        }

        lockout.locked_until = None;
        self.save(&lockout).await;
        (false, None)
    }

    /// Clears a lockout record after a successful login.
    pub async fn clear_lockout(&self, identifier: &str) {
        if let Err(e) = self.db.account_lockouts.delete_one(doc! {"identifier": identifier}).await {
            warn!(identifier, "failed to clear account lockout: {e}");
        }
        self.cache.lock().await.remove(identifier);
    }

    /// Administrative unlock: clears both the failure history and any
    /// active lock.
    pub async fn unlock_account(&self, identifier: &str) {
        self.clear_lockout(identifier).await;
        info!(identifier, "manually unlocked account");
    }

    /// Background sweep: drops lockout records whose lock (if any) has
    /// expired and whose failures have all aged out of the window, so the
    /// collection doesn't grow unbounded with stale entries.
    pub async fn cleanup_expired(&self) -> u64 {
        let now = Utc::now();
        let window_cutoff = now - Duration::seconds(AccountLockout::WINDOW_SECS);
        match self
            .db
            .account_lockouts
            .delete_many(doc! {
                "$and": [
                    {"$or": [{"locked_until": null}, {"locked_until": {"$lte": now}}]},
                    {"failure_timestamps": {"$not": {"$elemMatch": {"$gte": window_cutoff}}}},
                ]
            })
            .await
        {
            Ok(result) => result.deleted_count,
            Err(e) => {
                warn!("failed to clean up expired lockouts: {e}");
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lockout_reports_locked_only_before_expiry() {
        let now = Utc::now();
        let locked = AccountLockout {
            identifier: "alice".to_string(),
            failure_timestamps: vec![now],
            locked_until: Some(now + Duration::seconds(60)),
        };
        assert!(locked.is_locked(now));
        assert!(!locked.is_locked(now + Duration::seconds(120)));
    }
}
