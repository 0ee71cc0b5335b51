//! Async message delivery queue inspection/deletion, mounted under
//! `/api/internal/async-message-delivery-queue`. Grounded on
//! `original_source/routers/async_message_delivery_queue.py`; the three
//! `queue_type` path segments map onto `Db::delivery_queue_active` /
//! `_failed` / `_holding` (the original's "unconnected" collection — see
//! `Db`'s doc comment for the naming note).

use std::sync::Arc;

use futures_util::TryStreamExt;
use mongodb::bson::doc;
use mongodb::Collection;
use rocket::serde::json::Json;
use rocket::{delete, get};
use rocket::State;
use serde_json::{json, Value};

use crate::error::{AppError, AppResult};
use crate::models::DeliveryJob;
use crate::state::AppState;

use super::guard::Identity;

fn collection_for<'a>(state: &'a AppState, queue_type: &str) -> AppResult<&'a Collection<DeliveryJob>> {
    match queue_type {
        "active" => Ok(&state.db.delivery_queue_active),
        "failed" => Ok(&state.db.delivery_queue_failed),
        "unconnected" => Ok(&state.db.delivery_queue_holding),
        _ => Err(AppError::Validation("Invalid queue type. Must be 'active', 'failed', or 'unconnected'.".to_string())),
    }
}

#[get("/api/internal/async-message-delivery-queue/<queue_type>/<user_id>")]
pub async fn get_delivery_queue(state: &State<Arc<AppState>>, _identity: Identity, queue_type: &str, user_id: &str) -> AppResult<Json<Value>> {
    let collection = collection_for(state, queue_type)?;
    let mut cursor = collection.find(doc! {"destination.user_id": user_id}).await?;
    let mut jobs = Vec::new();
    while let Some(job) = cursor.try_next().await? {
        jobs.push(job);
    }
    Ok(Json(json!(jobs)))
}

#[delete("/api/internal/async-message-delivery-queue/<queue_type>/<message_id>")]
pub async fn delete_delivery_item(state: &State<Arc<AppState>>, _identity: Identity, queue_type: &str, message_id: &str) -> AppResult<Json<Value>> {
    let collection = collection_for(state, queue_type)?;
    let result = collection.delete_one(doc! {"message_id": message_id}).await?;
    if result.deleted_count == 0 {
        return Err(AppError::NotFound("Message not found.".to_string()));
    }
    Ok(Json(json!({"status": "success"})))
}
