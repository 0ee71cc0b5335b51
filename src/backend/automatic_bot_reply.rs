//! Per-correspondent message queue inspection/clearing, mounted under
//! `/api/internal/features/automatic_bot_reply`. Grounded on
//! `original_source/routers/features/automatic_bot_reply.py`: unlike the
//! original, which stores one document per message, `queues` here holds one
//! document per `(bot_id, correspondent_identifier)` with an embedded
//! message array (see `Db::queues` / `QueueDocument`), so the fan-out into a
//! `{correspondent_id: [...]}` map happens over documents rather than rows.
//! The original's "context"/"incoming-buffer" endpoints read chatbot-model
//! in-memory state this crate doesn't keep a Rust-side equivalent of and are
//! left out rather than faked.

use std::sync::Arc;

use futures_util::TryStreamExt;
use mongodb::bson::doc;
use rocket::serde::json::Json;
use rocket::{delete, get};
use rocket::State;
use serde_json::{json, Value};

use crate::error::{AppError, AppResult};
use crate::state::AppState;

use super::guard::Identity;

#[get("/api/internal/features/automatic_bot_reply/queue/<bot_id>")]
pub async fn get_bot_queue(state: &State<Arc<AppState>>, _identity: Identity, bot_id: &str) -> AppResult<Json<Value>> {
    let mut cursor = state.db.queues.find(doc! {"bot_id": bot_id}).await?;
    let mut grouped = serde_json::Map::new();
    while let Some(queue) = cursor.try_next().await? {
        grouped.insert(queue.correspondent_identifier, json!(queue.messages));
    }
    Ok(Json(Value::Object(grouped)))
}

#[delete("/api/internal/features/automatic_bot_reply/queue/<bot_id>")]
pub async fn clear_all_bot_queues(state: &State<Arc<AppState>>, _identity: Identity, bot_id: &str) -> AppResult<Json<Value>> {
    let result = state.db.queues.delete_many(doc! {"bot_id": bot_id}).await?;
    if result.deleted_count == 0 {
        return Err(AppError::NotFound(format!("no queues exist for bot {bot_id}")));
    }
    Ok(Json(json!({"status": "success", "deleted": result.deleted_count})))
}

#[delete("/api/internal/features/automatic_bot_reply/queue/<bot_id>/<correspondent_id>")]
pub async fn clear_correspondent_queue(state: &State<Arc<AppState>>, _identity: Identity, bot_id: &str, correspondent_id: &str) -> AppResult<Json<Value>> {
    let result = state
        .db
        .queues
        .delete_one(doc! {"bot_id": bot_id, "correspondent_identifier": correspondent_id})
        .await?;
    if result.deleted_count == 0 {
        return Err(AppError::NotFound(format!("queue {bot_id}/{correspondent_id} does not exist")));
    }
    Ok(Json(json!({"status": "success"})))
}
