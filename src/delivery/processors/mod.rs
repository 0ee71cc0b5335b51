mod ics;
mod text;

use crate::models::{DeliveryJob, QueueMessageType};
use crate::provider::{ChatProvider, ProviderError};

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("no processor for message type {0:?}")]
    UnknownType(String),
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Dispatches a job to its processor. An unrecognized `message_type`
/// deliberately does not retry — the caller dead-letters it instead.
pub async fn process(job: &DeliveryJob, provider: &dyn ChatProvider, language_code: &str) -> Result<(), ProcessError> {
    match job.known_type() {
        Some(QueueMessageType::Text) => text::process(job, provider).await,
        Some(QueueMessageType::IcsActionableItem) => ics::process(job, provider, language_code).await,
        None => Err(ProcessError::UnknownType(job.message_type.clone())),
    }
}
