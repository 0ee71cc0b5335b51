use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use mongodb::bson::doc;
use tokio::sync::Mutex;
use tracing::warn;

use crate::db::Db;
use crate::models::{BotConfig, GroupRef, Message, MessageSource, Sender};

use super::correspondent_queue::CorrespondentQueue;

pub type QueueCallback =
    Arc<dyn Fn(String, String, Message) -> BoxFuture<'static, ()> + Send + Sync>;

/// Owns every correspondent queue for one bot, spawning them on first use
/// and fanning new messages out to registered callbacks. The callback list
/// is shared with every queue spawned after registration, mirroring
/// `register_callback` applying retroactively and prospectively in the
/// source system.
pub struct QueueManager {
    bot_id: String,
    db: Db,
    queues: Mutex<HashMap<String, Arc<Mutex<CorrespondentQueue>>>>,
    callbacks: Mutex<Vec<QueueCallback>>,
    queue_config: mongodb::bson::Document,
}

impl QueueManager {
    pub fn new(bot: &BotConfig, db: Db) -> Self {
        let queue_config = mongodb::bson::to_document(&bot.queue_config)
            .unwrap_or_default();
        QueueManager {
            bot_id: bot.bot_id.clone(),
            db,
            queues: Mutex::new(HashMap::new()),
            callbacks: Mutex::new(Vec::new()),
            queue_config,
        }
    }

    pub async fn register_callback(&self, callback: QueueCallback) {
        self.callbacks.lock().await.push(callback);
    }

    async fn archived_max_id(&self, correspondent_id: &str) -> Option<u64> {
        let filter = doc! {
            "bot_id": &self.bot_id,
            "correspondent_id": correspondent_id,
        };
        match self.db.message_archive.find_one(filter).sort(doc! {"message.id": -1}).await {
            Ok(Some(doc)) => doc
                .get_document("message")
                .ok()
                .and_then(|m| m.get_i64("id").ok())
                .map(|id| id as u64),
            Ok(None) => None,
            Err(e) => {
                warn!(bot_id = %self.bot_id, correspondent_id, "archive lookup failed: {e}");
                None
            }
        }
    }

    pub async fn get_or_create_queue(&self, correspondent_id: &str) -> Arc<Mutex<CorrespondentQueue>> {
        let mut queues = self.queues.lock().await;
        if let Some(existing) = queues.get(correspondent_id) {
            return existing.clone();
        }

        let config = mongodb::bson::from_document(self.queue_config.clone()).unwrap_or_default();
        let mut queue = CorrespondentQueue::new(self.bot_id.clone(), correspondent_id.to_string(), config);
        queue.seed_next_id(self.archived_max_id(correspondent_id).await);

        let handle = Arc::new(Mutex::new(queue));
        queues.insert(correspondent_id.to_string(), handle.clone());
        handle
    }

    pub async fn add_message(
        &self,
        correspondent_id: &str,
        content: String,
        sender: Sender,
        source: MessageSource,
        originating_time_ms: Option<i64>,
        group: Option<GroupRef>,
    ) {
        let handle = self.get_or_create_queue(correspondent_id).await;
        let message = {
            let mut queue = handle.lock().await;
            queue.add_message(content, sender, source, originating_time_ms, group)
        };

        let callbacks = self.callbacks.lock().await.clone();
        for callback in callbacks {
            let fut = callback(self.bot_id.clone(), correspondent_id.to_string(), message.clone());
            tokio::spawn(fut);
        }
    }

    pub async fn correspondent_ids(&self) -> Vec<String> {
        self.queues.lock().await.keys().cloned().collect()
    }

    pub async fn pop_message(&self, correspondent_id: &str) -> Option<Message> {
        let handle = {
            let queues = self.queues.lock().await;
            queues.get(correspondent_id).cloned()
        }?;
        handle.lock().await.pop_message()
    }
}
