use chrono::Utc;

use crate::models::DeliveryJob;
use crate::provider::ChatProvider;

use super::super::actionable_item_formatter;
use super::ProcessError;

pub async fn process(job: &DeliveryJob, provider: &dyn ChatProvider, language_code: &str) -> Result<(), ProcessError> {
    let recipient = provider.own_identifier().await.unwrap_or_else(|| job.destination.user_id.clone());

    let caption = actionable_item_formatter::format_card(&job.content, language_code);
    let ics_bytes = actionable_item_formatter::generate_ics(&job.content, Utc::now().naive_utc());
    let filename = format!("task_{}.ics", &job.message_id[..job.message_id.len().min(8)]);

    provider
        .send_file(&recipient, ics_bytes, &filename, "text/calendar", Some(&caption))
        .await?;
    Ok(())
}
