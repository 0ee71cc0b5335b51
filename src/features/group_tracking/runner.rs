//! Runs one fire of one tracked group's schedule: fetch recent history,
//! compute the processing window, dedup against what's already been seen,
//! persist the period, then extract and enqueue any action items.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use chrono_tz::Tz;
use rand::Rng;
use tracing::{error, info, warn};

use crate::delivery::DeliveryQueueManager;
use crate::models::{Message, QueueMessageType, TrackedGroupJobConfig};
use crate::session_manager::SessionManager;

use super::cron_window;
use super::extractor::ActionItemExtractor;
use super::history::HistoryService;

/// Spread fires across up to a minute so many groups on the same cron
/// expression don't all hit the provider and the LLM at once.
const MAX_STARTUP_JITTER_SECONDS: u64 = 60;

/// Builds a fresh extractor for a bot, wired to that bot's own LLM
/// configuration. Implemented by whatever owns bot configuration, since
/// tenants can each point `llm_low`/`llm_high` at different providers.
#[async_trait]
pub trait TrackingLlmLookup: Send + Sync {
    async fn extractor_for(&self, bot_id: &str) -> Option<ActionItemExtractor>;
}

pub struct GroupTrackingRunner {
    history: Arc<HistoryService>,
    delivery: Arc<DeliveryQueueManager>,
}

impl GroupTrackingRunner {
    pub fn new(history: Arc<HistoryService>, delivery: Arc<DeliveryQueueManager>) -> Arc<Self> {
        Arc::new(GroupTrackingRunner { history, delivery })
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn run_tracking_cycle(
        &self,
        session: Arc<SessionManager>,
        provider_name: &str,
        job: &TrackedGroupJobConfig,
        timezone: &str,
        language_name: &str,
        extractor: &ActionItemExtractor,
    ) {
        let jitter = rand::thread_rng().gen_range(0u64..MAX_STARTUP_JITTER_SECONDS);
        tokio::time::sleep(Duration::from_secs(jitter)).await;

        if !session.provider.is_connected().await {
            return;
        }

        let messages = match session.provider.fetch_historic_messages(&job.group_identifier, 500).await {
            Ok(messages) => messages,
            Err(e) => {
                error!(bot_id = %session.bot_id, group = %job.group_identifier, "failed to fetch group history: {e}");
                return;
            }
        };

        let last_run = self.history.get_last_run(&session.bot_id, &job.group_identifier).await;
        let now = Utc::now();
        let Some((window_start, window_end)) = cron_window::calculate_window(&job.cron_schedule, timezone, now, last_run) else {
            warn!(bot_id = %session.bot_id, group = %job.group_identifier, "could not compute tracking window, skipping this fire");
            return;
        };

        let seen_ids = self.history.get_recent_message_ids(&session.bot_id, &job.group_identifier).await;

        let mut alternate_identifiers: HashSet<String> = HashSet::new();
        let mut window_messages: Vec<Message> = messages
            .into_iter()
            .filter(|message| {
                let originating = message.originating_time_ms.unwrap_or(message.accepted_time_ms);
                match Utc.timestamp_millis_opt(originating).single() {
                    Some(dt) => dt > window_start && dt <= window_end,
                    None => false,
                }
            })
            .filter(|message| message.provider_message_id.as_ref().map(|id| !seen_ids.contains(id)).unwrap_or(true))
            .collect();

        for message in &window_messages {
            if let Some(group) = &message.group {
                alternate_identifiers.insert(group.identifier.clone());
                alternate_identifiers.extend(group.alternate_identifiers.iter().cloned());
            }
        }
        window_messages.sort_by_key(|message| message.originating_time_ms.unwrap_or(message.accepted_time_ms));

        if let Err(e) = self
            .history
            .save_tracking_result(
                &session.bot_id,
                &job.group_identifier,
                &job.display_name,
                &job.cron_schedule,
                window_messages.clone(),
                window_start,
                window_end,
                alternate_identifiers,
            )
            .await
        {
            error!(bot_id = %session.bot_id, group = %job.group_identifier, "failed to save tracking result: {e}");
            return;
        }

        if window_messages.is_empty() {
            return;
        }

        let tz: Tz = timezone.parse().unwrap_or(chrono_tz::UTC);
        let mut action_items = extractor.extract(&window_messages, tz, language_name).await;

        if let Err(e) = self
            .history
            .save_action_items(&session.bot_id, &job.group_identifier, window_end, action_items.clone())
            .await
        {
            error!(bot_id = %session.bot_id, group = %job.group_identifier, "failed to save action items: {e}");
        }

        for item in action_items.iter_mut() {
            if let Some(obj) = item.as_object_mut() {
                obj.insert("group_display_name".to_string(), serde_json::Value::String(job.display_name.clone()));
            }
            if let Err(e) = self
                .delivery
                .enqueue(&session.bot_id, provider_name, QueueMessageType::IcsActionableItem, item.clone())
                .await
            {
                error!(bot_id = %session.bot_id, "failed to enqueue action item: {e}");
            }
        }

        info!(
            bot_id = %session.bot_id,
            group = %job.group_identifier,
            messages = window_messages.len(),
            action_items = action_items.len(),
            "tracking cycle complete",
        );
    }
}
