//! Security event logging to Mongo, auto-expired by the 30-day TTL index on
//! `audit_logs.timestamp` (see `Db::ensure_indexes`). The stored shape is a
//! real HTTP request/response record (`path`, `method`, `status_code`)
//! rather than a free-form event+details bag, since every event this
//! gateway logs is itself the record of one inbound request.

use serde_json::json;
use tracing::{info, warn};

use crate::db::Db;
use crate::models::AuditLog;

pub struct AuditLogger {
    db: Db,
}

impl AuditLogger {
    pub fn new(db: Db) -> Self {
        AuditLogger { db }
    }

    async fn log(&self, action: &str, user_id: Option<String>, path: &str, method: &str, status_code: u16, ip: Option<String>, detail: Option<String>) {
        let entry = AuditLog {
            timestamp: chrono::Utc::now(),
            user_id: user_id.clone(),
            action: action.to_string(),
            path: path.to_string(),
            method: method.to_string(),
            status_code,
            ip: ip.clone(),
            detail,
        };

        if let Err(e) = self.db.audit_logs.insert_one(&entry).await {
            warn!("failed to write audit log entry for {action}: {e}");
        }
        info!(
            action,
            user_id = user_id.as_deref().unwrap_or("unknown"),
            ip = ip.as_deref().unwrap_or("unknown"),
            "audit event"
        );
    }

    pub async fn login_success(&self, user_id: &str, role: &str, session_id: &str, ip: Option<String>) {
        let detail = json!({"role": role, "session_id": session_id}).to_string();
        self.log("login_success", Some(user_id.to_string()), "/api/auth/login", "POST", 200, ip, Some(detail)).await;
    }

    pub async fn login_failed(&self, user_id: &str, reason: &str, ip: Option<String>) {
        let detail = json!({"reason": reason}).to_string();
        self.log("login_failed", Some(user_id.to_string()), "/api/auth/login", "POST", 401, ip, Some(detail)).await;
    }

    pub async fn permission_denied(&self, user_id: &str, role: &str, requested_path: &str, extracted_user_id: Option<&str>, method: &str, ip: Option<String>) {
        let detail = json!({"role": role, "extracted_user_id": extracted_user_id}).to_string();
        self.log("permission_denied", Some(user_id.to_string()), requested_path, method, 403, ip, Some(detail)).await;
    }

    pub async fn logout(&self, user_id: &str, session_id: &str, ip: Option<String>) {
        let detail = json!({"session_id": session_id}).to_string();
        self.log("logout", Some(user_id.to_string()), "/api/auth/logout", "POST", 200, ip, Some(detail)).await;
    }

    pub async fn account_locked(&self, user_id: &str, failed_attempts: usize, locked_until: chrono::DateTime<chrono::Utc>, ip: Option<String>) {
        let detail = json!({"failed_attempts": failed_attempts, "locked_until": locked_until.to_rfc3339()}).to_string();
        self.log("account_locked", Some(user_id.to_string()), "/api/auth/login", "POST", 423, ip, Some(detail)).await;
    }

    pub async fn account_unlocked(&self, user_id: &str, admin_id: &str, ip: Option<String>) {
        let detail = json!({"unlocked_by": admin_id}).to_string();
        self.log("account_unlocked", Some(user_id.to_string()), "/api/auth/unlock", "POST", 200, ip, Some(detail)).await;
    }

    /// Generic event log for the backend's own admin actions (user
    /// create/update/delete, password reset), which have no gateway
    /// request/response pair of their own to synthesize from. Mirrors the
    /// original's generic `logger.log_event(event_type=..., ...)` call
    /// sites in `user_management.py`.
    pub async fn admin_event(&self, action: &str, actor_user_id: &str, target_user_id: &str, detail: serde_json::Value) {
        let mut detail = detail;
        if let Some(obj) = detail.as_object_mut() {
            obj.insert("target_user".to_string(), json!(target_user_id));
        }
        self.log(action, Some(actor_user_id.to_string()), &format!("/api/internal/users/{target_user_id}"), "POST", 200, None, Some(detail.to_string()))
            .await;
    }
}
