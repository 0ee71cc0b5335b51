//! Account/credentials CRUD, mounted under `/api/internal/users`.
//! Grounded on `original_source/routers/user_management.py`: admin-only
//! list/create/full-update/delete/password-reset, admin-or-self get/patch,
//! the last-admin demotion/deletion guard, and role-change session
//! invalidation all mirror that file's handlers. Reuses
//! `gateway::credentials::CredentialsService` and `gateway::session::SessionStore`
//! directly — both are already plain `Db`-driven services with no
//! gateway-specific coupling, so there is no reason to fork a second copy
//! for the backend side.

use std::sync::Arc;

use mongodb::bson::doc;
use rocket::serde::json::Json;
use rocket::{delete, get, patch, post, put};
use rocket::State;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{AppError, AppResult};
use crate::gateway::audit::AuditLogger;
use crate::gateway::credentials::CredentialsService;
use crate::gateway::session::SessionStore;
use crate::models::{LlmQuota, Role, StaleSessionReason, User, UserProfile};
use crate::state::AppState;

use super::guard::{Identity, RequireAdmin};

fn require_admin_or_self(identity: &Identity, user_id: &str) -> AppResult<()> {
    if identity.is_admin() || identity.user_id == user_id {
        Ok(())
    } else {
        Err(AppError::Permission)
    }
}

async fn admin_count(state: &AppState) -> u64 {
    state.db.user_auth_credentials.count_documents(doc! {"role": "admin"}).await.unwrap_or(0)
}

fn user_to_full_json(user: &User) -> Value {
    json!({
        "user_id": user.user_id,
        "role": user.role,
        "owned_bots": user.owned_bots,
        "max_bots": user.max_bots,
        "max_enabled_features": user.max_enabled_features,
        "llm_quota": user.llm_quota,
        "profile": user.profile,
    })
}

fn user_to_restricted_json(user: &User) -> Value {
    json!({
        "user_id": user.user_id,
        "owned_bots": user.owned_bots,
        "profile": user.profile,
    })
}

#[get("/api/internal/users")]
pub async fn list_users(state: &State<Arc<AppState>>, _admin: RequireAdmin) -> AppResult<Json<Value>> {
    use futures_util::TryStreamExt;
    let mut cursor = state.db.user_auth_credentials.find(doc! {}).await?;
    let mut users = Vec::new();
    while let Some(user) = cursor.try_next().await? {
        users.push(user_to_full_json(&user));
    }
    Ok(Json(json!(users)))
}

/// Not present in the original router at all — the gateway proxies
/// `/api/external/users/status` to this path
/// (`original_source/gateway/routers/proxy.py::list_users_status_proxy`),
/// but `user_management.py` never defines it, so the call would 404
/// against the real backend. Filled in here as a per-user summary of owned
/// bots and their live status, the natural reading of what a "users
/// status" listing should show, built from `list_users` plus the same
/// owner-map aggregation `bot_management.py::list_bots_status` already
/// does for bots.
#[get("/api/internal/users/status?<user_ids>")]
pub async fn list_users_status(state: &State<Arc<AppState>>, _admin: RequireAdmin, user_ids: Option<Vec<String>>) -> AppResult<Json<Value>> {
    use futures_util::TryStreamExt;
    let filter = match &user_ids {
        Some(ids) if !ids.is_empty() => doc! {"user_id": {"$in": ids}},
        _ => doc! {},
    };

    let mut cursor = state.db.user_auth_credentials.find(filter).await?;
    let mut configurations = Vec::new();
    while let Some(user) = cursor.try_next().await? {
        let mut bots = Vec::new();
        for bot_id in &user.owned_bots {
            let active = state.lifecycle.is_active(bot_id).await;
            bots.push(json!({"bot_id": bot_id, "active": active}));
        }
        configurations.push(json!({
            "user_id": user.user_id,
            "role": user.role,
            "quota_enabled": user.llm_quota.enabled,
            "bots": bots,
        }));
    }

    Ok(Json(json!({"configurations": configurations})))
}

#[get("/api/internal/users/<user_id>")]
pub async fn get_user(state: &State<Arc<AppState>>, identity: Identity, user_id: &str) -> AppResult<Json<Value>> {
    require_admin_or_self(&identity, user_id)?;

    let credentials = CredentialsService::new(state.db.clone());
    let Some(user) = credentials.get_credentials(user_id).await else {
        return Err(AppError::NotFound("User not found".to_string()));
    };

    if identity.is_admin() {
        Ok(Json(user_to_full_json(&user)))
    } else {
        Ok(Json(user_to_restricted_json(&user)))
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub user_id: String,
    pub password: String,
    pub role: Role,
    #[serde(default)]
    pub max_bots: Option<u32>,
    #[serde(default)]
    pub max_enabled_features: Option<u32>,
    #[serde(default)]
    pub llm_quota_dollars_per_period: Option<f64>,
    #[serde(default)]
    pub profile: UserProfile,
}

#[post("/api/internal/users", data = "<body>")]
pub async fn create_user(state: &State<Arc<AppState>>, admin: RequireAdmin, body: Json<CreateUserRequest>) -> AppResult<Json<Value>> {
    let body = body.into_inner();
    let credentials = CredentialsService::new(state.db.clone());

    credentials
        .create_credentials(
            &body.user_id,
            &body.password,
            body.role,
            body.max_bots.unwrap_or(5),
            body.max_enabled_features.unwrap_or(3),
            body.llm_quota_dollars_per_period.unwrap_or(5.0),
            body.profile,
        )
        .await
        .map_err(AppError::Validation)?;

    let audit = AuditLogger::new(state.db.clone());
    audit.admin_event("user_created", &admin.0.user_id, &body.user_id, json!({"role": body.role})).await;

    Ok(Json(json!({"status": "success", "user_id": body.user_id})))
}

#[derive(Debug, Deserialize, Default)]
pub struct AdminUpdateRequest {
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub max_bots: Option<u32>,
    #[serde(default)]
    pub max_enabled_features: Option<u32>,
    #[serde(default)]
    pub llm_quota: Option<LlmQuota>,
    #[serde(default)]
    pub profile: Option<UserProfile>,
}

#[put("/api/internal/users/<user_id>", data = "<body>")]
pub async fn update_user_full(state: &State<Arc<AppState>>, admin: RequireAdmin, user_id: &str, body: Json<AdminUpdateRequest>) -> AppResult<Json<Value>> {
    let body = body.into_inner();
    let credentials = CredentialsService::new(state.db.clone());
    let Some(existing) = credentials.get_credentials(user_id).await else {
        return Err(AppError::NotFound("User not found".to_string()));
    };

    if existing.role == Role::Admin && body.role == Some(Role::User) && admin_count(state).await <= 1 {
        return Err(AppError::Validation("Cannot demote the last administrator.".to_string()));
    }

    let mut patch = doc! {};
    let mut updated_keys = Vec::new();
    if let Some(role) = body.role {
        patch.insert("role", if role == Role::Admin { "admin" } else { "user" });
        updated_keys.push("role");
    }
    if let Some(max_bots) = body.max_bots {
        patch.insert("max_bots", max_bots as i32);
        updated_keys.push("max_bots");
    }
    if let Some(max_enabled_features) = body.max_enabled_features {
        patch.insert("max_enabled_features", max_enabled_features as i32);
        updated_keys.push("max_enabled_features");
    }
    if let Some(llm_quota) = &body.llm_quota {
        patch.insert("llm_quota", mongodb::bson::to_bson(llm_quota).unwrap_or(mongodb::bson::Bson::Null));
        updated_keys.push("llm_quota");
    }
    if let Some(profile) = &body.profile {
        patch.insert("profile", mongodb::bson::to_bson(profile).unwrap_or(mongodb::bson::Bson::Null));
        updated_keys.push("profile");
    }

    credentials.update_fields(user_id, patch).await.map_err(AppError::Validation)?;

    if let Some(role) = body.role {
        if role != existing.role {
            let sessions = SessionStore::new(state.db.clone());
            sessions.invalidate_all_user_sessions(user_id, StaleSessionReason::Superseded).await;
        }
    }

    let audit = AuditLogger::new(state.db.clone());
    audit.admin_event("user_updated_full", &admin.0.user_id, user_id, json!({"updates": updated_keys})).await;

    Ok(Json(json!({"status": "success"})))
}

#[derive(Debug, Deserialize, Default)]
pub struct PatchUserRequest {
    #[serde(default)]
    pub profile: Option<UserProfile>,
}

#[patch("/api/internal/users/<user_id>", data = "<body>")]
pub async fn update_user_partial(state: &State<Arc<AppState>>, identity: Identity, user_id: &str, body: Json<PatchUserRequest>) -> AppResult<Json<Value>> {
    require_admin_or_self(&identity, user_id)?;
    let body = body.into_inner();

    let credentials = CredentialsService::new(state.db.clone());
    if credentials.get_credentials(user_id).await.is_none() {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    let Some(profile) = body.profile else {
        return Ok(Json(json!({"status": "success", "message": "No changes detected"})));
    };

    let patch = doc! {"profile": mongodb::bson::to_bson(&profile).unwrap_or(mongodb::bson::Bson::Null)};
    credentials.update_fields(user_id, patch).await.map_err(AppError::Validation)?;

    let audit = AuditLogger::new(state.db.clone());
    audit.admin_event("user_updated", &identity.user_id, user_id, json!({"updates": ["profile"], "type": "partial"})).await;

    Ok(Json(json!({"status": "success"})))
}

#[delete("/api/internal/users/<user_id>")]
pub async fn delete_user(state: &State<Arc<AppState>>, admin: RequireAdmin, user_id: &str) -> AppResult<Json<Value>> {
    let credentials = CredentialsService::new(state.db.clone());
    let Some(existing) = credentials.get_credentials(user_id).await else {
        return Err(AppError::NotFound("User not found".to_string()));
    };

    if existing.role == Role::Admin && admin_count(state).await <= 1 {
        return Err(AppError::Validation("Cannot delete the last administrator.".to_string()));
    }
    if user_id == admin.0.user_id {
        return Err(AppError::Validation("Cannot delete your own account.".to_string()));
    }

    let sessions = SessionStore::new(state.db.clone());
    sessions.invalidate_all_user_sessions(user_id, StaleSessionReason::LoggedOut).await;
    credentials.delete_credentials(user_id).await;

    let audit = AuditLogger::new(state.db.clone());
    audit.admin_event("user_deleted", &admin.0.user_id, user_id, json!({})).await;

    Ok(Json(json!({"status": "success"})))
}

#[derive(Debug, Deserialize)]
pub struct PasswordResetRequest {
    pub password: String,
}

#[put("/api/internal/users/<user_id>/password", data = "<body>")]
pub async fn reset_password(state: &State<Arc<AppState>>, admin: RequireAdmin, user_id: &str, body: Json<PasswordResetRequest>) -> AppResult<Json<Value>> {
    let credentials = CredentialsService::new(state.db.clone());
    credentials.update_password(user_id, &body.password).await.map_err(AppError::Validation)?;

    let sessions = SessionStore::new(state.db.clone());
    sessions.invalidate_all_user_sessions(user_id, StaleSessionReason::Superseded).await;

    let audit = AuditLogger::new(state.db.clone());
    audit.admin_event("password_reset", &admin.0.user_id, user_id, json!({})).await;

    Ok(Json(json!({"status": "success"})))
}

#[get("/api/internal/users/validate/user_id?<value>")]
pub async fn validate_user_id(state: &State<Arc<AppState>>, _identity: Identity, value: &str) -> AppResult<Json<Value>> {
    let exists = state.db.user_auth_credentials.find_one(doc! {"user_id": value}).await?.is_some();
    if exists {
        Ok(Json(json!({"valid": false, "error_message": "User ID already exists."})))
    } else {
        Ok(Json(json!({"valid": true, "error_message": Value::Null})))
    }
}

#[get("/api/internal/users/validate/email?<value>")]
pub async fn validate_email(state: &State<Arc<AppState>>, _identity: Identity, value: &str) -> AppResult<Json<Value>> {
    let exists = state.db.user_auth_credentials.find_one(doc! {"profile.email": value}).await?.is_some();
    Ok(Json(json!({"available": !exists})))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restricted_view_drops_role_and_limits() {
        let user = User {
            user_id: "alice".to_string(),
            password_hash: "hash".to_string(),
            role: Role::User,
            owned_bots: vec!["alice_bot".to_string()],
            max_bots: 5,
            max_enabled_features: 3,
            llm_quota: LlmQuota { dollars_per_period: 5.0, dollars_used: 0.0, last_reset: chrono::Utc::now(), reset_days: 7, enabled: true },
            profile: UserProfile::default(),
        };

        let restricted = user_to_restricted_json(&user);
        assert!(restricted.get("role").is_none());
        assert!(restricted.get("llm_quota").is_none());
        assert_eq!(restricted["user_id"], "alice");
    }
}
