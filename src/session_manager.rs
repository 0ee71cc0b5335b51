//! Composition root for one running bot: owns the chat provider and queue
//! manager, and fans inbound messages out to whatever feature handlers
//! registered themselves before `start()`.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::models::{BotStatus, Message, MessageSource};
use crate::provider::ChatProvider;
use crate::queue::QueueManager;

pub type MessageHandler = Arc<dyn Fn(String, Message) -> BoxFuture<'static, ()> + Send + Sync>;

/// An object with a lifecycle tied to the session (e.g. the ingestion
/// service, the group-tracking scheduler for this bot). Stopped in LIFO
/// registration order on `SessionManager::stop`.
#[async_trait]
pub trait AssociatedService: Send + Sync {
    async fn stop(&self);
    fn name(&self) -> &str;
}

pub struct SessionManager {
    pub bot_id: String,
    pub provider: Arc<dyn ChatProvider>,
    pub queue_manager: Arc<QueueManager>,
    message_handlers: Mutex<Vec<MessageHandler>>,
    associated_services: Mutex<Vec<Arc<dyn AssociatedService>>>,
    features: Mutex<HashMap<String, Arc<dyn Any + Send + Sync>>>,
}

impl SessionManager {
    pub fn new(bot_id: String, provider: Arc<dyn ChatProvider>, queue_manager: Arc<QueueManager>) -> Arc<Self> {
        let session = Arc::new(SessionManager {
            bot_id,
            provider,
            queue_manager,
            message_handlers: Mutex::new(Vec::new()),
            associated_services: Mutex::new(Vec::new()),
            features: Mutex::new(HashMap::new()),
        });

        let dispatch_target = session.clone();
        let callback: crate::queue::QueueCallback = Arc::new(move |bot_id, correspondent_id, message| {
            let session = dispatch_target.clone();
            Box::pin(async move {
                session.on_queue_message(bot_id, correspondent_id, message).await;
            })
        });
        let session_for_registration = session.clone();
        tokio::spawn(async move {
            session_for_registration.queue_manager.register_callback(callback).await;
        });

        session
    }

    pub async fn register_message_handler(&self, handler: MessageHandler) {
        self.message_handlers.lock().await.push(handler);
    }

    pub async fn register_service(&self, service: Arc<dyn AssociatedService>) {
        info!(bot_id = %self.bot_id, service = service.name(), "registered associated service");
        self.associated_services.lock().await.push(service);
    }

    pub async fn register_feature(&self, name: &str, feature: Arc<dyn Any + Send + Sync>) {
        self.features.lock().await.insert(name.to_string(), feature);
    }

    pub async fn feature(&self, name: &str) -> Option<Arc<dyn Any + Send + Sync>> {
        self.features.lock().await.get(name).cloned()
    }

    async fn on_queue_message(&self, _bot_id: String, correspondent_id: String, message: Message) {
        if matches!(message.source, MessageSource::Bot | MessageSource::UserOutgoing) {
            return;
        }

        let handlers = self.message_handlers.lock().await.clone();
        let bot_id = self.bot_id.clone();
        let joins: Vec<_> = handlers
            .into_iter()
            .map(|handler| tokio::spawn(handler(correspondent_id.clone(), message.clone())))
            .collect();
        for join in joins {
            if let Err(e) = join.await {
                error!(bot_id = %bot_id, "feature handler panicked: {e}");
            }
        }
    }

    pub async fn start(&self) -> Result<(), crate::provider::ProviderError> {
        info!(bot_id = %self.bot_id, "starting session");
        self.provider.start_listening().await
    }

    pub async fn stop(&self, cleanup_session: bool) {
        info!(bot_id = %self.bot_id, cleanup_session, "stopping session");
        let services: Vec<_> = self.associated_services.lock().await.drain(..).collect();
        for service in services.into_iter().rev() {
            info!(bot_id = %self.bot_id, service = service.name(), "stopping associated service");
            service.stop().await;
        }

        if let Err(e) = self.provider.stop_listening(cleanup_session).await {
            error!(bot_id = %self.bot_id, "error stopping provider: {e}");
        }
    }

    pub async fn get_status(&self, heartbeat: bool) -> BotStatus {
        self.provider.get_status(heartbeat).await
    }
}
