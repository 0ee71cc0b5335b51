use crate::models::DeliveryJob;
use crate::provider::ChatProvider;

use super::ProcessError;

pub async fn process(job: &DeliveryJob, provider: &dyn ChatProvider) -> Result<(), ProcessError> {
    let recipient = provider.own_identifier().await.unwrap_or_else(|| job.destination.user_id.clone());
    let text = job.content.as_str().map(str::to_string).unwrap_or_else(|| job.content.to_string());
    provider.send_message(&recipient, &text).await?;
    Ok(())
}
