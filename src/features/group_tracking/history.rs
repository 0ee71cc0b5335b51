//! Persistence for group tracking: group metadata, append-only periods, and
//! the last-fired cursor each tracked group resumes from.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use mongodb::bson::doc;
use tracing::error;

use crate::db::Db;
use crate::models::{Message, TrackedPeriod};

/// How many of the most recent periods are consulted to dedup messages
/// whose timestamp moved between fetches.
const DEDUP_LOOKBACK_PERIODS: i64 = 5;

pub struct HistoryService {
    db: Db,
}

impl HistoryService {
    pub fn new(db: Db) -> Self {
        HistoryService { db }
    }

    pub async fn get_last_run(&self, bot_id: &str, group_identifier: &str) -> Option<DateTime<Utc>> {
        self.db
            .group_tracking_state
            .find_one(doc! {"bot_id": bot_id, "group_identifier": group_identifier})
            .await
            .ok()
            .flatten()
            .map(|state| state.last_fired_at)
    }

    pub async fn get_recent_message_ids(&self, bot_id: &str, group_identifier: &str) -> HashSet<String> {
        let mut ids = HashSet::new();
        let cursor = self
            .db
            .tracked_group_periods
            .find(doc! {"bot_id": bot_id, "group_identifier": group_identifier})
            .sort(doc! {"window_end": -1})
            .limit(DEDUP_LOOKBACK_PERIODS)
            .await;

        let mut cursor = match cursor {
            Ok(c) => c,
            Err(e) => {
                error!(bot_id, group_identifier, "failed to load periods for dedup: {e}");
                return ids;
            }
        };

        while let Ok(Some(period)) = cursor.try_next().await {
            for message in period.messages {
                if let Some(pid) = message.provider_message_id {
                    ids.insert(pid);
                }
            }
        }
        ids
    }

    /// Upserts the group metadata (merging `alternate_identifiers`), inserts
    /// the period document, and advances `last_fired_at` to `window_end`.
    /// Not wrapped in a transaction: each write is independent-idempotent
    /// enough that a crash between them just costs one retried window on
    /// the next fire rather than corrupting state.
    #[allow(clippy::too_many_arguments)]
    pub async fn save_tracking_result(
        &self,
        bot_id: &str,
        group_identifier: &str,
        display_name: &str,
        cron_schedule: &str,
        messages: Vec<Message>,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        mut alternate_identifiers: HashSet<String>,
    ) -> mongodb::error::Result<()> {
        alternate_identifiers.insert(group_identifier.to_string());
        alternate_identifiers.insert(display_name.to_string());
        let alternates: Vec<String> = alternate_identifiers.into_iter().collect();

        self.db
            .tracked_groups
            .update_one(
                doc! {"bot_id": bot_id, "group_identifier": group_identifier},
                doc! {"$set": {
                    "bot_id": bot_id,
                    "group_identifier": group_identifier,
                    "display_name": display_name,
                    "cron_schedule": cron_schedule,
                    "alternate_identifiers": &alternates,
                }, "$setOnInsert": {"created_at": Utc::now()}},
            )
            .upsert(true)
            .await?;

        let period = TrackedPeriod {
            bot_id: bot_id.to_string(),
            group_identifier: group_identifier.to_string(),
            window_start,
            window_end,
            messages,
            action_items: Vec::new(),
            created_at: Utc::now(),
        };
        self.db.tracked_group_periods.insert_one(&period).await?;

        self.db
            .group_tracking_state
            .update_one(
                doc! {"bot_id": bot_id, "group_identifier": group_identifier},
                doc! {"$set": {"bot_id": bot_id, "group_identifier": group_identifier, "last_fired_at": window_end}},
            )
            .upsert(true)
            .await?;

        Ok(())
    }

    /// Records extracted action items against the just-inserted period by
    /// replacing its `action_items` array, keyed on the same window.
    pub async fn save_action_items(
        &self,
        bot_id: &str,
        group_identifier: &str,
        window_end: DateTime<Utc>,
        action_items: Vec<serde_json::Value>,
    ) -> mongodb::error::Result<()> {
        self.db
            .tracked_group_periods
            .update_one(
                doc! {"bot_id": bot_id, "group_identifier": group_identifier, "window_end": window_end},
                doc! {"$set": {"action_items": mongodb::bson::to_bson(&action_items).unwrap_or(mongodb::bson::Bson::Array(vec![]))}},
            )
            .await?;
        Ok(())
    }

    pub async fn get_tracked_periods(&self, bot_id: &str, group_identifier: Option<&str>) -> Vec<TrackedPeriod> {
        let mut filter = doc! {"bot_id": bot_id};
        if let Some(group_identifier) = group_identifier {
            filter.insert("group_identifier", group_identifier);
        }

        let cursor = self.db.tracked_group_periods.find(filter).sort(doc! {"window_end": -1}).await;
        match cursor {
            Ok(mut cursor) => {
                let mut periods = Vec::new();
                while let Ok(Some(period)) = cursor.try_next().await {
                    periods.push(period);
                }
                periods
            }
            Err(e) => {
                error!(bot_id, "failed to list tracked periods: {e}");
                Vec::new()
            }
        }
    }

    /// Deletes every tracked group (and its periods/cursor) for a bot, one
    /// group at a time so each deletion stays consistent across the three
    /// collections the way `delete_group_periods` already is for a single
    /// group.
    pub async fn delete_all_periods(&self, bot_id: &str) -> mongodb::error::Result<u64> {
        let groups = self.get_tracked_periods(bot_id, None).await;
        let mut identifiers: HashSet<String> = HashSet::new();
        for period in groups {
            identifiers.insert(period.group_identifier);
        }
        let mut total = 0;
        for group_identifier in identifiers {
            total += self.delete_group_periods(bot_id, &group_identifier).await?;
        }
        Ok(total)
    }

    pub async fn delete_group_periods(&self, bot_id: &str, group_identifier: &str) -> mongodb::error::Result<u64> {
        let result = self
            .db
            .tracked_group_periods
            .delete_many(doc! {"bot_id": bot_id, "group_identifier": group_identifier})
            .await?;
        self.db
            .tracked_groups
            .delete_one(doc! {"bot_id": bot_id, "group_identifier": group_identifier})
            .await?;
        self.db
            .group_tracking_state
            .delete_one(doc! {"bot_id": bot_id, "group_identifier": group_identifier})
            .await?;
        Ok(result.deleted_count)
    }
}
