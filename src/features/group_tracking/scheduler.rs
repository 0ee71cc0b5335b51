//! Keeps one background task alive per tracked group, each sleeping until
//! its next cron occurrence and then firing the runner. Jobs are keyed
//! `{bot_id}:{group_identifier}` so all of a bot's jobs can be torn down by
//! prefix on disconnect, reload, or unlink without touching other bots.

use std::collections::HashMap;
use std::sync::Arc;

use chrono_tz::Tz;
use cron::Schedule;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::delivery::BotSessionLookup;
use crate::models::TrackedGroupJobConfig;

use super::cron_window;
use super::runner::{GroupTrackingRunner, TrackingLlmLookup};

pub struct GroupTrackingScheduler {
    runner: Arc<GroupTrackingRunner>,
    lookup: Arc<dyn BotSessionLookup>,
    llm_lookup: Arc<dyn TrackingLlmLookup>,
    jobs: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl GroupTrackingScheduler {
    pub fn new(runner: Arc<GroupTrackingRunner>, lookup: Arc<dyn BotSessionLookup>, llm_lookup: Arc<dyn TrackingLlmLookup>) -> Arc<Self> {
        Arc::new(GroupTrackingScheduler {
            runner,
            lookup,
            llm_lookup,
            jobs: Mutex::new(HashMap::new()),
        })
    }

    /// Replaces all of `bot_id`'s jobs with `configs`. Called whenever the
    /// owner saves their periodic group tracking settings.
    pub async fn update_jobs(
        self: &Arc<Self>,
        bot_id: &str,
        provider_name: &str,
        timezone: &str,
        configs: Vec<TrackedGroupJobConfig>,
    ) {
        self.stop_tracking_jobs(bot_id).await;

        let tz: Tz = match timezone.parse() {
            Ok(tz) => tz,
            Err(_) => {
                warn!(bot_id, timezone, "unknown timezone, tracking jobs not scheduled");
                return;
            }
        };

        let mut jobs = self.jobs.lock().await;
        for config in configs {
            let schedule = match cron_window::parse_schedule(&config.cron_schedule) {
                Ok(schedule) => schedule,
                Err(e) => {
                    error!(bot_id, group = %config.group_identifier, "invalid cron schedule, skipping job: {e}");
                    continue;
                }
            };

            let job_id = format!("{bot_id}:{}", config.group_identifier);
            let this = self.clone();
            let bot_id = bot_id.to_string();
            let provider_name = provider_name.to_string();
            let timezone = timezone.to_string();

            let handle = tokio::spawn(async move {
                this.run_job_loop(bot_id, provider_name, timezone, config, schedule, tz).await;
            });
            info!(job_id = %job_id, "scheduled tracking job");
            jobs.insert(job_id, handle);
        }
    }

    /// Stops all tracking jobs for a bot without deleting any persisted data.
    pub async fn stop_tracking_jobs(&self, bot_id: &str) {
        let prefix = format!("{bot_id}:");
        let mut jobs = self.jobs.lock().await;
        let stale: Vec<String> = jobs.keys().filter(|id| id.starts_with(&prefix)).cloned().collect();
        for job_id in stale {
            if let Some(handle) = jobs.remove(&job_id) {
                handle.abort();
                info!(job_id = %job_id, "stopped tracking job");
            }
        }
    }

    /// Aborts every scheduled tracking job for every bot. Called on process shutdown.
    pub async fn stop_all(&self) {
        let mut jobs = self.jobs.lock().await;
        for (job_id, handle) in jobs.drain() {
            handle.abort();
            info!(job_id = %job_id, "stopped tracking job");
        }
    }

    async fn run_job_loop(
        self: Arc<Self>,
        bot_id: String,
        provider_name: String,
        timezone: String,
        config: TrackedGroupJobConfig,
        schedule: Schedule,
        tz: Tz,
    ) {
        loop {
            let Some(next) = schedule.upcoming(tz).next() else {
                error!(bot_id = %bot_id, group = %config.group_identifier, "cron schedule has no future occurrences, stopping job");
                return;
            };
            let now = chrono::Utc::now().with_timezone(&tz);
            let until = (next - now).to_std().unwrap_or(std::time::Duration::from_secs(1));
            tokio::time::sleep(until).await;

            let Some(handle) = self.lookup.get(&bot_id).await else {
                warn!(bot_id = %bot_id, "no active session for tracking job, skipping this fire");
                continue;
            };

            let Some(extractor) = self.llm_lookup.extractor_for(&bot_id).await else {
                warn!(bot_id = %bot_id, "could not build extraction LLMs for tracking job, skipping this fire");
                continue;
            };

            self.runner
                .run_tracking_cycle(
                    handle.session,
                    &provider_name,
                    &config,
                    &timezone,
                    &handle.language_code,
                    &extractor,
                )
                .await;
        }
    }
}
