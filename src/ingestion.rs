//! Background drain of correspondent queues into the durable archive
//! collection, so queue eviction never loses history a tenant might want
//! to audit later.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mongodb::bson::doc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::db::Db;
use crate::queue::QueueManager;
use crate::session_manager::AssociatedService;

const IDLE_POLL: Duration = Duration::from_secs(1);

pub struct IngestionService {
    bot_id: String,
    provider_name: String,
    queue_manager: Arc<QueueManager>,
    db: Db,
    stop: Arc<AtomicBool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl IngestionService {
    pub fn new(bot_id: String, provider_name: String, queue_manager: Arc<QueueManager>, db: Db) -> Self {
        IngestionService {
            bot_id,
            provider_name,
            queue_manager,
            db,
            stop: Arc::new(AtomicBool::new(false)),
            task: Mutex::new(None),
        }
    }

    pub async fn start(&self) {
        let mut guard = self.task.lock().await;
        if guard.is_some() {
            return;
        }

        let bot_id = self.bot_id.clone();
        let provider_name = self.provider_name.clone();
        let queue_manager = self.queue_manager.clone();
        let db = self.db.clone();
        let stop = self.stop.clone();

        info!(bot_id = %bot_id, "ingestion service starting");
        let handle = tokio::spawn(async move {
            while !stop.load(Ordering::SeqCst) {
                let mut any_processed = false;

                for correspondent_id in queue_manager.correspondent_ids().await {
                    while let Some(message) = queue_manager.pop_message(&correspondent_id).await {
                        any_processed = true;
                        let message_doc = match mongodb::bson::to_document(&message) {
                            Ok(d) => d,
                            Err(e) => {
                                error!(bot_id = %bot_id, correspondent_id = %correspondent_id, "failed to serialize message: {e}");
                                continue;
                            }
                        };
                        let archived = doc! {
                            "bot_id": &bot_id,
                            "provider_name": &provider_name,
                            "correspondent_id": &correspondent_id,
                            "message": message_doc,
                        };
                        if let Err(e) = db.message_archive.insert_one(archived).await {
                            error!(bot_id = %bot_id, correspondent_id = %correspondent_id, message_id = message.id, "failed to archive message: {e}");
                        } else {
                            info!(bot_id = %bot_id, correspondent_id = %correspondent_id, message_id = message.id, "message archived");
                        }
                    }
                }

                if !any_processed {
                    tokio::time::sleep(IDLE_POLL).await;
                }
            }
            info!(bot_id = %bot_id, "ingestion service shutting down");
        });

        *guard = Some(handle);
    }

    pub async fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.task.lock().await.take() {
            let _ = handle.await;
        }
    }
}

#[async_trait]
impl AssociatedService for IngestionService {
    async fn stop(&self) {
        IngestionService::stop(self).await;
    }

    fn name(&self) -> &str {
        "ingestion"
    }
}
