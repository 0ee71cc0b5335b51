//! Bot configuration CRUD and lifecycle actions, mounted under
//! `/api/internal/bots`. Grounded on
//! `original_source/routers/bot_management.py`: the route surface, the
//! link-before-you-start conflict check, and the role-filtered
//! schema/defaults/configuration views all mirror that file's handlers
//! one-for-one. Ownership enforcement itself happens at the gateway
//! (`gateway::permission`); these routes trust the `Identity` the gateway
//! forwards and only use its role to decide *how much* of a bot's
//! configuration to show.

use std::sync::Arc;

use mongodb::bson::doc;
use rocket::serde::json::Json;
use rocket::{delete, get, patch, post, put, State};
use serde_json::{json, Value};

use crate::config::llm_provider_config_schema;
use crate::error::{AppError, AppResult};
use crate::models::{is_valid_identifier, BotConfig, Role};
use crate::state::AppState;

use super::guard::Identity;

async fn find_owner(state: &AppState, bot_id: &str) -> String {
    state
        .db
        .user_auth_credentials
        .find_one(doc! {"owned_bots": bot_id})
        .await
        .ok()
        .flatten()
        .map(|user| user.user_id)
        .unwrap_or_else(|| "unknown".to_string())
}

async fn load_config(state: &AppState, bot_id: &str) -> Option<BotConfig> {
    state.db.bot_configurations.find_one(doc! {"bot_id": bot_id}).await.ok().flatten()
}

/// The view a non-admin owner gets back: `bot_id`, the user-facing profile
/// metadata, and the features map — never the provider/LLM credentials.
/// Mirrors `RegularBotConfiguration` in the original's config models.
fn restrict_config(config: &BotConfig) -> Value {
    json!({
        "bot_id": config.bot_id,
        "profile": config.profile,
        "features": config.features,
    })
}

async fn bot_status_json(state: &AppState, bot_id: &str, heartbeat: bool) -> Value {
    match state.lifecycle.active_session(bot_id).await {
        Some(session) => {
            let status = session.provider.get_status(heartbeat).await;
            json!({"status": status, "authenticated": session.provider.is_connected().await})
        }
        None => json!({"status": "disconnected", "authenticated": false}),
    }
}

#[get("/api/internal/bots?<bot_ids>")]
pub async fn list_bots(state: &State<Arc<AppState>>, _identity: Identity, bot_ids: Option<Vec<String>>) -> AppResult<Json<Value>> {
    let filter = match &bot_ids {
        Some(ids) if !ids.is_empty() => doc! {"bot_id": {"$in": ids}},
        _ => doc! {},
    };

    let mut cursor = state.db.bot_configurations.find(filter).await?;
    let mut ids = Vec::new();
    use futures_util::TryStreamExt;
    while let Some(config) = cursor.try_next().await? {
        ids.push(config.bot_id);
    }
    Ok(Json(json!({"bot_ids": ids})))
}

#[get("/api/internal/bots/status?<bot_ids>")]
pub async fn list_bots_status(state: &State<Arc<AppState>>, _identity: Identity, bot_ids: Option<Vec<String>>) -> AppResult<Json<Value>> {
    let filter = match &bot_ids {
        Some(ids) if !ids.is_empty() => doc! {"bot_id": {"$in": ids}},
        _ => doc! {},
    };

    let mut owner_map = std::collections::HashMap::new();
    {
        use futures_util::TryStreamExt;
        let mut cursor = state.db.user_auth_credentials.find(doc! {}).await?;
        while let Some(user) = cursor.try_next().await? {
            for bot_id in &user.owned_bots {
                owner_map.insert(bot_id.clone(), user.user_id.clone());
            }
        }
    }

    let mut configurations = Vec::new();
    {
        use futures_util::TryStreamExt;
        let mut cursor = state.db.bot_configurations.find(filter).await?;
        while let Some(config) = cursor.try_next().await? {
            let status = bot_status_json(state, &config.bot_id, false).await;
            configurations.push(json!({
                "bot_id": config.bot_id,
                "status": status["status"],
                "authenticated": status["authenticated"],
                "owner": owner_map.get(&config.bot_id).cloned().unwrap_or_else(|| "unknown".to_string()),
            }));
        }
    }

    Ok(Json(json!({"configurations": configurations})))
}

#[get("/api/internal/bots/schema")]
pub async fn get_configuration_schema(identity: Identity) -> Json<Value> {
    if identity.is_admin() {
        Json(json!({
            "type": "object",
            "properties": {
                "bot_id": {"type": "string"},
                "owner_user_id": {"type": "string"},
                "chat_provider": {"type": "object"},
                "llm_high": llm_provider_config_schema(),
                "llm_low": llm_provider_config_schema(),
                "queue_config": {"type": "object"},
                "context_config": {"type": "object"},
                "features": {"type": "object"},
                "profile": {"type": "object"},
                "activated": {"type": "boolean"},
            },
            "required": ["bot_id", "owner_user_id", "chat_provider", "llm_high", "llm_low"],
        }))
    } else {
        Json(json!({
            "type": "object",
            "properties": {
                "bot_id": {"type": "string"},
                "profile": {"type": "object"},
                "features": {"type": "object"},
            },
            "required": ["bot_id"],
        }))
    }
}

#[get("/api/internal/bots/defaults")]
pub async fn get_bot_defaults(state: &State<Arc<AppState>>, identity: Identity) -> Json<Value> {
    let llm = &state.config.default_llm;
    let full = json!({
        "bot_id": "default_template",
        "owner_user_id": "",
        "chat_provider": {"provider_name": "whatsapp", "base_url": null, "allow_group_messages": false},
        "llm_high": {"provider_name": llm.provider, "model": llm.high_model, "temperature": llm.temperature, "reasoning_effort": llm.reasoning_effort, "api_key_source": if llm.api_key_source == crate::config::ApiKeySource::Explicit { "explicit" } else { "environment" }},
        "llm_low": {"provider_name": llm.provider, "model": llm.low_model, "temperature": llm.temperature, "reasoning_effort": llm.reasoning_effort, "api_key_source": if llm.api_key_source == crate::config::ApiKeySource::Explicit { "explicit" } else { "environment" }},
        "queue_config": crate::models::QueueConfig::default(),
        "context_config": crate::models::ContextConfig::default(),
        "features": {},
        "profile": crate::models::UserProfileMeta::default(),
        "activated": true,
    });

    if identity.is_admin() {
        Json(full)
    } else {
        Json(json!({
            "bot_id": full["bot_id"],
            "profile": full["profile"],
            "features": full["features"],
        }))
    }
}

#[get("/api/internal/bots/<bot_id>/info")]
pub async fn get_bot_info(state: &State<Arc<AppState>>, _identity: Identity, bot_id: &str) -> AppResult<Json<Value>> {
    if load_config(state, bot_id).await.is_none() {
        return Err(AppError::NotFound("Configuration not found".to_string()));
    }
    let status = bot_status_json(state, bot_id, false).await;
    let owner = find_owner(state, bot_id).await;

    Ok(Json(json!({
        "configurations": [{
            "bot_id": bot_id,
            "status": status["status"],
            "authenticated": status["authenticated"],
            "owner": owner,
        }]
    })))
}

#[get("/api/internal/bots/<bot_id>/status")]
pub async fn get_bot_status(state: &State<Arc<AppState>>, _identity: Identity, bot_id: &str) -> AppResult<Json<Value>> {
    if !state.lifecycle.is_active(bot_id).await {
        return Err(AppError::NotFound("No active session found.".to_string()));
    }
    let status = bot_status_json(state, bot_id, true).await;
    Ok(Json(json!({"status": status["status"], "qr": Value::Null})))
}

#[get("/api/internal/bots/<bot_id>")]
pub async fn get_bot_configuration(state: &State<Arc<AppState>>, identity: Identity, bot_id: &str) -> AppResult<Json<Value>> {
    let Some(config) = load_config(state, bot_id).await else {
        return Err(AppError::NotFound("Configuration not found.".to_string()));
    };

    if identity.is_admin() {
        Ok(Json(serde_json::to_value(&config).unwrap_or(Value::Null)))
    } else {
        Ok(Json(restrict_config(&config)))
    }
}

#[put("/api/internal/bots/<bot_id>", data = "<body>")]
pub async fn save_bot_configuration(state: &State<Arc<AppState>>, _identity: Identity, bot_id: &str, body: Json<BotConfig>) -> AppResult<Json<Value>> {
    let config = body.into_inner();
    if config.bot_id != bot_id {
        return Err(AppError::Validation("Bot ID mismatch.".to_string()));
    }
    if !is_valid_identifier(bot_id) {
        return Err(AppError::Validation("bot_id must be 1-30 chars of [A-Za-z0-9_-]".to_string()));
    }

    state.db.bot_configurations.replace_one(doc! {"bot_id": bot_id}, &config).upsert(true).await?;

    tracing::info!(bot_id, "saved bot configuration");
    Ok(Json(json!({"status": "success", "bot_id": bot_id})))
}

/// Partial update, absent from the original router (which only ever
/// exposes a full-replace PUT) but named explicitly in this platform's
/// external surface — merges the patch body's top-level fields over the
/// stored configuration and re-validates the result, the same
/// merge-then-strictly-validate shape `user_management.py`'s PATCH handler
/// uses for user profiles.
#[patch("/api/internal/bots/<bot_id>", data = "<body>")]
pub async fn patch_bot_configuration(state: &State<Arc<AppState>>, _identity: Identity, bot_id: &str, body: Json<Value>) -> AppResult<Json<Value>> {
    let Some(existing) = load_config(state, bot_id).await else {
        return Err(AppError::NotFound("Configuration not found.".to_string()));
    };

    let mut merged = serde_json::to_value(&existing).unwrap_or(Value::Null);
    if let (Value::Object(base), Value::Object(patch)) = (&mut merged, body.into_inner()) {
        for (key, value) in patch {
            if key == "bot_id" {
                continue;
            }
            base.insert(key, value);
        }
    }

    let updated: BotConfig = serde_json::from_value(merged).map_err(|e| AppError::Validation(format!("validation failed: {e}")))?;
    state.db.bot_configurations.replace_one(doc! {"bot_id": bot_id}, &updated).await?;

    Ok(Json(json!({"status": "success"})))
}

#[delete("/api/internal/bots/<bot_id>")]
pub async fn delete_bot(state: &State<Arc<AppState>>, _identity: Identity, bot_id: &str) -> AppResult<Json<Value>> {
    let deleted = state.lifecycle.delete_bot(bot_id).await?;
    if !deleted {
        return Err(AppError::NotFound("Configuration not found.".to_string()));
    }

    state
        .db
        .user_auth_credentials
        .update_one(doc! {"owned_bots": bot_id}, doc! {"$pull": {"owned_bots": bot_id}})
        .await?;

    tracing::info!(bot_id, "deleted bot configuration");
    Ok(Json(json!({"status": "success", "bot_id": bot_id})))
}

#[post("/api/internal/bots/<bot_id>/actions/link")]
pub async fn link_bot(state: &State<Arc<AppState>>, _identity: Identity, bot_id: &str) -> AppResult<Json<Value>> {
    if state.lifecycle.is_active(bot_id).await {
        let session = state.lifecycle.active_session(bot_id).await;
        let dead = match &session {
            Some(session) => session.provider.get_status(false).await.is_dead(),
            None => true,
        };
        if dead {
            tracing::info!(bot_id, "cleaning up dead session before linking");
            state.lifecycle.stop_bot(bot_id, false).await;
        } else {
            return Err(AppError::Conflict("Active session exists".to_string()));
        }
    }

    if load_config(state, bot_id).await.is_none() {
        return Err(AppError::NotFound("Configuration not found".to_string()));
    }

    state.lifecycle.start_bot(bot_id).await;
    Ok(Json(json!({"status": "success", "message": "Session started"})))
}

#[post("/api/internal/bots/<bot_id>/actions/unlink")]
pub async fn unlink_bot(state: &State<Arc<AppState>>, _identity: Identity, bot_id: &str) -> AppResult<Json<Value>> {
    if !state.lifecycle.is_active(bot_id).await {
        return Err(AppError::NotFound("No active session found.".to_string()));
    }
    state.lifecycle.stop_bot(bot_id, true).await;
    Ok(Json(json!({"status": "success", "message": "Session unlinked"})))
}

#[post("/api/internal/bots/<bot_id>/actions/reload")]
pub async fn reload_bot(state: &State<Arc<AppState>>, _identity: Identity, bot_id: &str) -> AppResult<Json<Value>> {
    if !state.lifecycle.is_active(bot_id).await {
        return Err(AppError::NotFound("No active session found.".to_string()));
    }
    state.lifecycle.reload_bot(bot_id).await;
    Ok(Json(json!({"status": "success", "message": "Reloaded"})))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restrict_config_drops_provider_fields() {
        let config = BotConfig {
            bot_id: "alice_bot".to_string(),
            owner_user_id: "alice".to_string(),
            chat_provider: crate::models::ChatProviderConfig { provider_name: "whatsapp".to_string(), base_url: None, allow_group_messages: false },
            llm_high: crate::models::LlmProviderConfig {
                provider_name: "openai".to_string(),
                model: "gpt-4.1".to_string(),
                temperature: 0.2,
                reasoning_effort: None,
                api_key_source: crate::models::ApiKeySource::Environment,
                api_key: None,
                record_llm_interactions: false,
            },
            llm_low: crate::models::LlmProviderConfig {
                provider_name: "openai".to_string(),
                model: "gpt-4.1-mini".to_string(),
                temperature: 0.2,
                reasoning_effort: None,
                api_key_source: crate::models::ApiKeySource::Environment,
                api_key: None,
                record_llm_interactions: false,
            },
            queue_config: Default::default(),
            context_config: Default::default(),
            features: Default::default(),
            profile: Default::default(),
            activated: true,
            has_whatsapp_credentials: false,
        };

        let restricted = restrict_config(&config);
        assert!(restricted.get("llm_high").is_none());
        assert!(restricted.get("owner_user_id").is_none());
        assert_eq!(restricted["bot_id"], "alice_bot");
    }
}
