mod error;
mod whatsapp_bridge;

pub use error::ProviderError;
pub use whatsapp_bridge::{SessionEndCallback, StatusChangeCallback, WhatsAppBridgeProvider};

use async_trait::async_trait;

use crate::models::{BotStatus, Message};

/// A chat provider owns one WhatsApp bridge connection for one bot.
/// Implementations are responsible for turning inbound wire events into
/// classified `Message`s and pushing them onto the bot's queue manager;
/// `fetch_historic_messages` is the only call that returns messages
/// directly to a caller.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn start_listening(&self) -> Result<(), ProviderError>;
    async fn stop_listening(&self, cleanup_session: bool) -> Result<(), ProviderError>;
    async fn send_message(&self, recipient: &str, content: &str) -> Result<String, ProviderError>;
    async fn send_file(
        &self,
        recipient: &str,
        data: Vec<u8>,
        filename: &str,
        mime_type: &str,
        caption: Option<&str>,
    ) -> Result<String, ProviderError>;
    async fn get_status(&self, heartbeat: bool) -> BotStatus;
    async fn is_connected(&self) -> bool;
    /// The provider's own connected identity (e.g. the bot's WhatsApp JID),
    /// once known. Used to address delivery-queue items back to the owner.
    async fn own_identifier(&self) -> Option<String>;
    async fn fetch_historic_messages(
        &self,
        identifier: &str,
        limit: usize,
    ) -> Result<Vec<Message>, ProviderError>;
}
