//! Tracked-group history inspection/clearing, mounted under
//! `/api/internal/features/periodic_group_tracking`. Grounded on
//! `original_source/routers/features/periodic_group_tracking.py`, backed by
//! the same `HistoryService` the scheduler itself writes through.

use std::sync::Arc;

use rocket::serde::json::Json;
use rocket::{delete, get};
use rocket::State;
use serde_json::{json, Value};

use crate::error::AppResult;
use crate::state::AppState;

use super::guard::Identity;

#[get("/api/internal/features/periodic_group_tracking/trackedGroupMessages/<bot_id>")]
pub async fn get_all_tracked_messages(state: &State<Arc<AppState>>, _identity: Identity, bot_id: &str) -> AppResult<Json<Value>> {
    let periods = state.history.get_tracked_periods(bot_id, None).await;
    Ok(Json(json!(periods)))
}

#[get("/api/internal/features/periodic_group_tracking/trackedGroupMessages/<bot_id>/<group_id>")]
pub async fn get_group_tracked_messages(state: &State<Arc<AppState>>, _identity: Identity, bot_id: &str, group_id: &str) -> AppResult<Json<Value>> {
    let periods = state.history.get_tracked_periods(bot_id, Some(group_id)).await;
    Ok(Json(json!(periods)))
}

#[delete("/api/internal/features/periodic_group_tracking/trackedGroupMessages/<bot_id>")]
pub async fn delete_all_tracked_messages(state: &State<Arc<AppState>>, _identity: Identity, bot_id: &str) -> AppResult<Json<Value>> {
    let deleted = state.history.delete_all_periods(bot_id).await?;
    Ok(Json(json!({"status": "success", "deleted": deleted})))
}

#[delete("/api/internal/features/periodic_group_tracking/trackedGroupMessages/<bot_id>/<group_id>")]
pub async fn delete_group_tracked_messages(state: &State<Arc<AppState>>, _identity: Identity, bot_id: &str, group_id: &str) -> AppResult<Json<Value>> {
    let deleted = state.history.delete_group_periods(bot_id, group_id).await?;
    Ok(Json(json!({"status": "success", "deleted": deleted})))
}
