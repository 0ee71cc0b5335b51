//! MongoDB connection and collection handles, built once at startup and
//! shared behind `Arc` via Rocket's `.manage()` (the teacher's `Db` wrapper
//! around a `rusqlite` pool plays the same composition role here, backed by
//! the async `mongodb` driver instead).

use mongodb::bson::doc;
use mongodb::options::{ClientOptions, IndexOptions};
use mongodb::{Client, Collection, Database, IndexModel};
use tracing::{info, warn};

use crate::models::{
    AccountLockout, AuditLog, BotConfig, DeliveryJob, Message, Session, StaleSession,
    TokenEvent, TrackedGroup, TrackedPeriod, TrackingState, User,
};

/// One correspondent's queue, persisted as a document holding the full
/// message list. Kept distinct from `Message` itself since the queue owns
/// bookkeeping (`next_id`, eviction totals) the individual messages don't.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct QueueDocument {
    pub bot_id: String,
    pub correspondent_identifier: String,
    pub next_id: u64,
    pub messages: Vec<Message>,
}

#[derive(Clone)]
pub struct Db {
    pub database: Database,
    pub bot_configurations: Collection<BotConfig>,
    pub queues: Collection<QueueDocument>,
    pub user_auth_credentials: Collection<User>,
    pub authenticated_sessions: Collection<Session>,
    pub stale_authenticated_sessions: Collection<StaleSession>,
    pub audit_logs: Collection<AuditLog>,
    pub account_lockouts: Collection<AccountLockout>,
    pub tracked_groups: Collection<TrackedGroup>,
    pub tracked_group_periods: Collection<TrackedPeriod>,
    pub group_tracking_state: Collection<TrackingState>,
    pub delivery_queue_active: Collection<DeliveryJob>,
    pub delivery_queue_holding: Collection<DeliveryJob>,
    pub delivery_queue_failed: Collection<DeliveryJob>,
    pub token_consumption: Collection<TokenEvent>,
    pub global_configurations: Collection<mongodb::bson::Document>,
    /// Durable archive that queues are drained into by the ingestion service.
    /// Typed as a raw document since the archived shape (message plus
    /// `bot_id`/`provider_name`/`correspondent_id` annotations) lives with
    /// the ingestion module rather than the shared model layer.
    pub message_archive: Collection<mongodb::bson::Document>,
}

impl Db {
    pub async fn connect(mongodb_url: &str, database_name: &str) -> anyhow::Result<Self> {
        info!("connecting to MongoDB at {mongodb_url}");
        let mut options = ClientOptions::parse(mongodb_url).await?;
        options.app_name = Some("chatimposter".to_string());
        let client = Client::with_options(options)?;
        // Force a round-trip so a misconfigured deployment fails at boot.
        client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await?;
        let database = client.database(database_name);

        let db = Db {
            bot_configurations: database.collection("bot_configurations"),
            queues: database.collection("queues"),
            user_auth_credentials: database.collection("user_auth_credentials"),
            authenticated_sessions: database.collection("authenticated_sessions"),
            stale_authenticated_sessions: database.collection("stale_authenticated_sessions"),
            audit_logs: database.collection("audit_logs"),
            account_lockouts: database.collection("account_lockouts"),
            tracked_groups: database.collection("tracked_groups"),
            tracked_group_periods: database.collection("tracked_group_periods"),
            group_tracking_state: database.collection("group_tracking_state"),
            delivery_queue_active: database.collection("async_message_delivery_queue_active"),
            delivery_queue_holding: database.collection("async_message_delivery_queue_holding"),
            delivery_queue_failed: database.collection("async_message_delivery_queue_failed"),
            token_consumption: database.collection("token_consumption"),
            global_configurations: database.collection("global_configurations"),
            message_archive: database.collection("message_archive"),
            database,
        };

        db.ensure_indexes().await;
        info!("connected to MongoDB");
        Ok(db)
    }

    async fn ensure_indexes(&self) {
        let unique = || IndexOptions::builder().unique(true).build();
        let sparse_unique = || IndexOptions::builder().unique(true).sparse(true).build();
        let ttl = |secs: u32| IndexOptions::builder().expire_after(Some(std::time::Duration::from_secs(secs as u64))).build();

        if let Err(e) = self
            .bot_configurations
            .create_index(IndexModel::builder().keys(doc! {"bot_id": 1}).options(unique()).build())
            .await
        {
            warn!("could not create index on bot_configurations.bot_id: {e}");
        }

        if let Err(e) = self
            .user_auth_credentials
            .create_index(IndexModel::builder().keys(doc! {"user_id": 1}).options(unique()).build())
            .await
        {
            warn!("could not create unique index on user_auth_credentials: {e}");
        }

        if let Err(e) = self
            .authenticated_sessions
            .create_index(IndexModel::builder().keys(doc! {"session_id": 1}).options(unique()).build())
            .await
        {
            warn!("could not create index on authenticated_sessions.session_id: {e}");
        }
        if let Err(e) = self
            .authenticated_sessions
            .create_index(IndexModel::builder().keys(doc! {"user_id": 1}).build())
            .await
        {
            warn!("could not create index on authenticated_sessions.user_id: {e}");
        }
        if let Err(e) = self
            .authenticated_sessions
            .create_index(IndexModel::builder().keys(doc! {"expires_at": 1}).options(ttl(0)).build())
            .await
        {
            warn!("could not create TTL index on authenticated_sessions.expires_at: {e}");
        }

        if let Err(e) = self
            .audit_logs
            .create_index(IndexModel::builder().keys(doc! {"timestamp": 1}).options(ttl(2_592_000)).build())
            .await
        {
            warn!("could not create TTL index on audit_logs.timestamp: {e}");
        }
        if let Err(e) = self
            .audit_logs
            .create_index(IndexModel::builder().keys(doc! {"user_id": 1}).build())
            .await
        {
            warn!("could not create index on audit_logs.user_id: {e}");
        }

        if let Err(e) = self
            .account_lockouts
            .create_index(IndexModel::builder().keys(doc! {"identifier": 1}).options(sparse_unique()).build())
            .await
        {
            warn!("could not create index on account_lockouts.identifier: {e}");
        }

        if let Err(e) = self
            .tracked_groups
            .create_index(
                IndexModel::builder()
                    .keys(doc! {"bot_id": 1, "group_identifier": 1})
                    .options(unique())
                    .build(),
            )
            .await
        {
            warn!("could not create index on tracked_groups: {e}");
        }

        if let Err(e) = self
            .group_tracking_state
            .create_index(
                IndexModel::builder()
                    .keys(doc! {"bot_id": 1, "group_identifier": 1})
                    .options(unique())
                    .build(),
            )
            .await
        {
            warn!("could not create index on group_tracking_state: {e}");
        }

        if let Err(e) = self
            .queues
            .create_index(
                IndexModel::builder()
                    .keys(doc! {"bot_id": 1, "correspondent_identifier": 1})
                    .options(unique())
                    .build(),
            )
            .await
        {
            warn!("could not create index on queues: {e}");
        }

        if let Err(e) = self
            .message_archive
            .create_index(
                IndexModel::builder()
                    .keys(doc! {"bot_id": 1, "correspondent_id": 1, "message.id": 1})
                    .build(),
            )
            .await
        {
            warn!("could not create index on message_archive: {e}");
        }

        info!("ensured MongoDB indexes");
    }
}
