use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::TryStreamExt;
use mongodb::bson::doc;
use mongodb::options::ReturnDocument;
use mongodb::Collection;
use rand::Rng;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::db::Db;
use crate::models::{DeliveryDestination, DeliveryJob, QueueMessageType};
use crate::session_manager::SessionManager;

use super::processors;

/// The provider and owner metadata the consumer needs to actually deliver
/// one user's jobs, resolved at dispatch time rather than held statically
/// so a freshly (re)started bot session is picked up without restarting
/// the consumer.
pub struct BotHandle {
    pub session: Arc<SessionManager>,
    pub language_code: String,
}

#[async_trait]
pub trait BotSessionLookup: Send + Sync {
    async fn get(&self, bot_id: &str) -> Option<BotHandle>;
}

pub struct DeliveryQueueManager {
    db: Db,
    lookup: Arc<dyn BotSessionLookup>,
    running: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl DeliveryQueueManager {
    pub fn new(db: Db, lookup: Arc<dyn BotSessionLookup>) -> Arc<Self> {
        Arc::new(DeliveryQueueManager {
            db,
            lookup,
            running: AtomicBool::new(false),
            task: Mutex::new(None),
        })
    }

    pub async fn enqueue(
        &self,
        user_id: &str,
        provider_name: &str,
        message_type: QueueMessageType,
        content: serde_json::Value,
    ) -> mongodb::error::Result<()> {
        let job = DeliveryJob {
            message_id: Uuid::new_v4().to_string(),
            destination: DeliveryDestination {
                user_id: user_id.to_string(),
                provider_name: provider_name.to_string(),
            },
            send_attempts: 0,
            created_at: chrono::Utc::now(),
            message_type: message_type.as_str().to_string(),
            content,
        };
        self.db.delivery_queue_active.insert_one(&job).await?;
        Ok(())
    }

    pub async fn start_consumer(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("delivery queue consumer starting");
        let this = self.clone();
        let handle = tokio::spawn(async move { this.consumer_loop().await });
        *self.task.lock().await = Some(handle);
    }

    pub async fn stop_consumer(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.task.lock().await.take() {
            handle.abort();
        }
        info!("delivery queue consumer stopped");
    }

    async fn consumer_loop(self: Arc<Self>) {
        while self.running.load(Ordering::SeqCst) {
            let jitter_secs = rand::thread_rng().gen_range(1.0f64..12.0f64);
            tokio::time::sleep(Duration::from_secs_f64(jitter_secs)).await;

            if let Err(e) = self.process_one().await {
                error!("delivery queue consumer iteration failed: {e}");
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
        }
    }

    async fn process_one(&self) -> mongodb::error::Result<()> {
        let pipeline = vec![doc! {"$sample": {"size": 1}}];
        let mut cursor = self.db.delivery_queue_active.aggregate(pipeline).await?;
        let Some(raw) = cursor.try_next().await? else {
            return Ok(());
        };
        let candidate: DeliveryJob = mongodb::bson::from_document(raw)?;

        if candidate.attempts_exhausted() {
            warn!(message_id = %candidate.message_id, "delivery job exhausted attempts, moving to failed queue");
            self.db.delivery_queue_failed.insert_one(&candidate).await?;
            self.db.delivery_queue_active.delete_one(doc! {"message_id": &candidate.message_id}).await?;
            return Ok(());
        }

        let Some(handle) = self.lookup.get(&candidate.destination.user_id).await else {
            return Ok(());
        };
        if !handle.session.provider.is_connected().await {
            return Ok(());
        }

        let updated = self
            .db
            .delivery_queue_active
            .find_one_and_update(doc! {"message_id": &candidate.message_id}, doc! {"$inc": {"send_attempts": 1}})
            .return_document(ReturnDocument::After)
            .await?;
        let Some(job) = updated else {
            return Ok(());
        };

        info!(message_id = %job.message_id, attempts = job.send_attempts, "sending delivery queue item");

        match processors::process(&job, handle.session.provider.as_ref(), &handle.language_code).await {
            Ok(()) => {
                self.db.delivery_queue_active.delete_one(doc! {"message_id": &job.message_id}).await?;
                info!(message_id = %job.message_id, "delivered, removed from queue");
            }
            Err(processors::ProcessError::UnknownType(message_type)) => {
                warn!(message_id = %job.message_id, message_type, "unrecognized delivery message type, dead-lettering");
                self.db.delivery_queue_failed.insert_one(&job).await?;
                self.db.delivery_queue_active.delete_one(doc! {"message_id": &job.message_id}).await?;
            }
            Err(e) => {
                error!(message_id = %job.message_id, "failed to deliver item, leaving for retry: {e}");
            }
        }

        Ok(())
    }

    pub async fn move_user_to_holding(&self, user_id: &str) -> mongodb::error::Result<u64> {
        move_matching(&self.db.delivery_queue_active, &self.db.delivery_queue_holding, doc! {"destination.user_id": user_id}).await
    }

    pub async fn move_user_to_active(&self, user_id: &str) -> mongodb::error::Result<u64> {
        move_matching(&self.db.delivery_queue_holding, &self.db.delivery_queue_active, doc! {"destination.user_id": user_id}).await
    }

    /// Used on startup: nothing is connected yet, so everything active
    /// moves to holding until each bot reconnects.
    pub async fn move_all_to_holding(&self) -> mongodb::error::Result<u64> {
        move_matching(&self.db.delivery_queue_active, &self.db.delivery_queue_holding, doc! {}).await
    }
}

async fn move_matching(from: &Collection<DeliveryJob>, to: &Collection<DeliveryJob>, filter: mongodb::bson::Document) -> mongodb::error::Result<u64> {
    let mut cursor = from.find(filter.clone()).await?;
    let mut items = Vec::new();
    while let Some(item) = cursor.try_next().await? {
        items.push(item);
    }
    if items.is_empty() {
        return Ok(0);
    }
    let moved = items.len() as u64;
    to.insert_many(&items).await?;
    from.delete_many(filter).await?;
    Ok(moved)
}
