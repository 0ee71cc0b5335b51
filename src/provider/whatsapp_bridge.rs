use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{info, warn};

use crate::models::{BotStatus, GroupRef, Message, MessageSource, Sender};
use crate::queue::QueueManager;

use super::error::ProviderError;
use super::ChatProvider;

const PENDING_ECHO_TTL: Duration = Duration::from_secs(30);
const SENT_IDS_TTL: Duration = Duration::from_secs(300);
const SENT_IDS_CAP: usize = 2_000;
const RECONNECT_BASE: Duration = Duration::from_secs(1);
const RECONNECT_MAX: Duration = Duration::from_secs(30);

pub type StatusChangeCallback = Arc<dyn Fn(String, BotStatus) + Send + Sync>;
pub type SessionEndCallback = Arc<dyn Fn(String) + Send + Sync>;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireEvent {
    #[serde(rename = "status_update")]
    Status { status: String, user_jid: Option<String> },
    Messages { items: Vec<WireMessage> },
}

#[derive(Debug, Deserialize)]
struct WireGroup {
    id: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    direction: String,
    sender: String,
    #[serde(default)]
    display_name: Option<String>,
    message: String,
    #[serde(default)]
    group: Option<WireGroup>,
    #[serde(default)]
    provider_message_id: Option<String>,
    #[serde(default, rename = "originating_time")]
    originating_time_ms: Option<i64>,
}

struct PendingEcho {
    recipient: String,
    content: String,
    sent_at: DateTime<Utc>,
}

/// A WebSocket-plus-HTTP client for an external WhatsApp bridge process.
/// One instance per bot. Suppresses the bridge's own echo of the bot's
/// outbound sends via a sent-ids cache keyed by the bridge's returned
/// message id, falling back to a short-lived pending-echo buffer keyed by
/// `(recipient, content)` for bridges that don't echo the id back in time.
struct Inner {
    bot_id: String,
    /// `{WHATSAPP_SERVER_URL}/sessions/{bot_id}` — base for all per-session endpoints.
    http_base_url: String,
    /// `{WHATSAPP_SERVER_URL}/initialize` — not session-scoped, called once before listening starts.
    initialize_url: String,
    ws_url: String,
    http: reqwest::Client,
    queue_manager: Arc<QueueManager>,
    status: RwLock<BotStatus>,
    user_jid: RwLock<Option<String>>,
    is_listening: AtomicBool,
    sent_ids: Mutex<HashMap<String, DateTime<Utc>>>,
    pending_echo: Mutex<VecDeque<PendingEcho>>,
    on_status_change: Option<StatusChangeCallback>,
    on_session_end: Option<SessionEndCallback>,
    listen_handle: Mutex<Option<JoinHandle<()>>>,
    /// Live write half of the WS connection, used to send heartbeat pings. Cleared on disconnect.
    ws_sink: Mutex<Option<WsSink>>,
    allow_group_messages: bool,
}

/// Thin `Arc` handle around the shared state so the reconnect loop spawned
/// by `start_listening` can hold its own owned reference instead of
/// borrowing across an `await` boundary.
#[derive(Clone)]
pub struct WhatsAppBridgeProvider(Arc<Inner>);

impl WhatsAppBridgeProvider {
    pub fn new(
        bot_id: String,
        server_root_url: String,
        http_base_url: String,
        ws_url: String,
        queue_manager: Arc<QueueManager>,
        allow_group_messages: bool,
        on_status_change: Option<StatusChangeCallback>,
        on_session_end: Option<SessionEndCallback>,
    ) -> Self {
        let initialize_url = format!("{}/initialize", server_root_url.trim_end_matches('/'));
        WhatsAppBridgeProvider(Arc::new(Inner {
            bot_id,
            http_base_url,
            initialize_url,
            ws_url,
            http: reqwest::Client::new(),
            queue_manager,
            status: RwLock::new(BotStatus::Initializing),
            user_jid: RwLock::new(None),
            is_listening: AtomicBool::new(false),
            sent_ids: Mutex::new(HashMap::new()),
            pending_echo: Mutex::new(VecDeque::new()),
            on_status_change,
            on_session_end,
            listen_handle: Mutex::new(None),
            ws_sink: Mutex::new(None),
            allow_group_messages,
        }))
    }
}

impl Inner {
    async fn set_status(&self, status: BotStatus) {
        let mut guard = self.status.write().await;
        if *guard == status {
            return;
        }
        *guard = status;
        drop(guard);
        info!(bot_id = %self.bot_id, ?status, "provider status changed");
        if let Some(cb) = &self.on_status_change {
            cb(self.bot_id.clone(), status);
        }
    }

    async fn record_sent_id(&self, provider_message_id: String) {
        let now = Utc::now();
        let mut cache = self.sent_ids.lock().await;
        cache.insert(provider_message_id, now);
        cache.retain(|_, ts| now.signed_duration_since(*ts).to_std().unwrap_or_default() < SENT_IDS_TTL);
        if cache.len() > SENT_IDS_CAP {
            let cutoff = cache.len() - SENT_IDS_CAP;
            let mut entries: Vec<_> = cache.iter().map(|(k, v)| (k.clone(), *v)).collect();
            entries.sort_by_key(|(_, ts)| *ts);
            for (k, _) in entries.into_iter().take(cutoff) {
                cache.remove(&k);
            }
        }
    }

    async fn push_pending_echo(&self, recipient: String, content: String) {
        let mut buf = self.pending_echo.lock().await;
        buf.push_back(PendingEcho { recipient, content, sent_at: Utc::now() });
        let cutoff = Utc::now() - chrono::Duration::from_std(PENDING_ECHO_TTL).unwrap();
        while buf.front().map(|e| e.sent_at < cutoff).unwrap_or(false) {
            buf.pop_front();
        }
    }

    /// Consumes a matching pending-echo entry if one exists within the TTL.
    async fn take_pending_echo(&self, recipient: &str, content: &str) -> bool {
        let mut buf = self.pending_echo.lock().await;
        let cutoff = Utc::now() - chrono::Duration::from_std(PENDING_ECHO_TTL).unwrap();
        buf.retain(|e| e.sent_at >= cutoff);
        if let Some(pos) = buf
            .iter()
            .position(|e| e.recipient == recipient && e.content == content)
        {
            buf.remove(pos);
            true
        } else {
            false
        }
    }

    async fn handle_wire_message(&self, item: WireMessage) {
        let group = item.group.as_ref().map(|g| GroupRef {
            identifier: g.id.clone(),
            display_name: g.name.clone().unwrap_or_else(|| g.id.clone()),
            alternate_identifiers: vec![],
        });

        if group.is_some() && !self.allow_group_messages {
            return;
        }

        let sender = Sender {
            identifier: item.sender.clone(),
            display_name: item.display_name.clone().unwrap_or_else(|| item.sender.clone()),
            alternate_identifiers: vec![],
        };

        let source = match item.direction.as_str() {
            "incoming" => MessageSource::User,
            "outgoing" => {
                let is_bot = if let Some(id) = &item.provider_message_id {
                    let mut cache = self.sent_ids.lock().await;
                    cache.remove(id).is_some()
                } else {
                    false
                };
                let is_bot = is_bot || self.take_pending_echo(&item.sender, &item.message).await;
                if is_bot {
                    MessageSource::Bot
                } else {
                    MessageSource::UserOutgoing
                }
            }
            other => {
                warn!(bot_id = %self.bot_id, direction = other, "unknown message direction, dropping");
                return;
            }
        };

        let correspondent_id = group
            .as_ref()
            .map(|g| g.identifier.clone())
            .unwrap_or_else(|| item.sender.clone());

        self.queue_manager
            .add_message(
                &correspondent_id,
                item.message,
                sender,
                source,
                item.originating_time_ms,
                group,
            )
            .await;
    }

    async fn handle_status_event(&self, status: &str, user_jid: Option<String>) {
        if let Some(jid) = user_jid {
            *self.user_jid.write().await = Some(jid);
        }
        let mapped = match status {
            "qr_pending" => BotStatus::QrPending,
            "connected" => BotStatus::Connected,
            "disconnected" => BotStatus::Disconnected,
            "logged_out" | "auth_failed" => {
                self.set_status(BotStatus::Terminated).await;
                if let Some(cb) = &self.on_session_end {
                    cb(self.bot_id.clone());
                }
                return;
            }
            other => {
                warn!(bot_id = %self.bot_id, status = other, "unrecognized bridge status");
                return;
            }
        };
        self.set_status(mapped).await;
    }
}

#[async_trait]
impl ChatProvider for WhatsAppBridgeProvider {
    async fn start_listening(&self) -> Result<(), ProviderError> {
        if self.0.is_listening.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.0.set_status(BotStatus::Initializing).await;

        let response = self
            .0
            .http
            .post(&self.0.initialize_url)
            .json(&serde_json::json!({
                "session_id": self.0.bot_id,
                "allow_group_messages": self.0.allow_group_messages,
            }))
            .send()
            .await
            .map_err(|e| ProviderError::Connection(e.to_string()))?;
        if !response.status().is_success() {
            self.0.is_listening.store(false, Ordering::SeqCst);
            return Err(ProviderError::Message(format!("bridge rejected initialize: {}", response.status())));
        }

        // A handle isn't retained across restarts: the reconnect loop below
        // owns the whole lifetime of this provider's WS connection, via its
        // own clone of the shared `Arc<Inner>`.
        let ws_url = self.0.ws_url.clone();
        let bot_id = self.0.bot_id.clone();
        let this = self.0.clone();

        let handle = tokio::spawn(async move {
            let mut backoff = RECONNECT_BASE;
            loop {
                if !this.is_listening.load(Ordering::SeqCst) {
                    return;
                }
                match tokio_tungstenite::connect_async(&ws_url).await {
                    Ok((stream, _response)) => {
                        backoff = RECONNECT_BASE;
                        let (write, mut read) = stream.split();
                        *this.ws_sink.lock().await = Some(write);
                        while let Some(msg) = read.next().await {
                            if !this.is_listening.load(Ordering::SeqCst) {
                                return;
                            }
                            match msg {
                                Ok(WsMessage::Text(text)) => {
                                    match serde_json::from_str::<WireEvent>(&text) {
                                        Ok(WireEvent::Status { status, user_jid }) => {
                                            this.handle_status_event(&status, user_jid).await;
                                        }
                                        Ok(WireEvent::Messages { items }) => {
                                            for item in items {
                                                this.handle_wire_message(item).await;
                                            }
                                        }
                                        Err(e) => warn!(bot_id = %bot_id, "unparseable bridge event: {e}"),
                                    }
                                }
                                Ok(WsMessage::Close(_)) => break,
                                Ok(_) => {}
                                Err(e) => {
                                    warn!(bot_id = %bot_id, "bridge websocket error: {e}");
                                    break;
                                }
                            }
                        }
                        *this.ws_sink.lock().await = None;
                    }
                    Err(e) => {
                        warn!(bot_id = %bot_id, "bridge connection failed: {e}");
                    }
                }

                if !this.is_listening.load(Ordering::SeqCst) {
                    return;
                }
                this.set_status(BotStatus::Disconnected).await;
                tokio::time::sleep(backoff).await;
                backoff = std::cmp::min(backoff * 2, RECONNECT_MAX);
            }
        });

        *self.0.listen_handle.lock().await = Some(handle);
        Ok(())
    }

    async fn stop_listening(&self, cleanup_session: bool) -> Result<(), ProviderError> {
        self.0.is_listening.store(false, Ordering::SeqCst);
        if let Some(handle) = self.0.listen_handle.lock().await.take() {
            handle.abort();
        }
        *self.0.ws_sink.lock().await = None;
        if cleanup_session {
            if let Err(e) = self.0.http.delete(&self.0.http_base_url).send().await {
                warn!(bot_id = %self.0.bot_id, "failed to delete bridge session: {e}");
            }
        }
        self.0.set_status(BotStatus::Terminated).await;
        Ok(())
    }

    async fn send_message(&self, recipient: &str, content: &str) -> Result<String, ProviderError> {
        self.0.push_pending_echo(recipient.to_string(), content.to_string()).await;

        let url = format!("{}/send", self.0.http_base_url);
        let response = self
            .0
            .http
            .post(&url)
            .json(&serde_json::json!({"recipient": recipient, "message": content}))
            .send()
            .await
            .map_err(|e| ProviderError::Connection(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ProviderError::Message(format!(
                "bridge returned status {}",
                response.status()
            )));
        }

        #[derive(Deserialize)]
        struct SendAck {
            provider_message_id: String,
        }
        let ack: SendAck = response
            .json()
            .await
            .map_err(|e| ProviderError::Message(e.to_string()))?;

        self.0.record_sent_id(ack.provider_message_id.clone()).await;
        Ok(ack.provider_message_id)
    }

    async fn send_file(
        &self,
        recipient: &str,
        data: Vec<u8>,
        filename: &str,
        mime_type: &str,
        caption: Option<&str>,
    ) -> Result<String, ProviderError> {
        self.0
            .push_pending_echo(recipient.to_string(), caption.unwrap_or(filename).to_string())
            .await;

        use base64::Engine;
        let encoded = base64::engine::general_purpose::STANDARD.encode(&data);
        // Files go through the same endpoint as text, with base64 content.
        let url = format!("{}/send", self.0.http_base_url);
        let response = self
            .0
            .http
            .post(&url)
            .json(&serde_json::json!({
                "recipient": recipient,
                "message": encoded,
                "filename": filename,
                "mime_type": mime_type,
                "caption": caption,
            }))
            .send()
            .await
            .map_err(|e| ProviderError::Connection(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ProviderError::Message(format!(
                "bridge returned status {}",
                response.status()
            )));
        }

        #[derive(Deserialize)]
        struct SendAck {
            provider_message_id: String,
        }
        let ack: SendAck = response
            .json()
            .await
            .map_err(|e| ProviderError::Message(e.to_string()))?;

        self.0.record_sent_id(ack.provider_message_id.clone()).await;
        Ok(ack.provider_message_id)
    }

    async fn get_status(&self, heartbeat: bool) -> BotStatus {
        if heartbeat {
            let mut guard = self.0.ws_sink.lock().await;
            if let Some(sink) = guard.as_mut() {
                if let Err(e) = sink.send(WsMessage::Ping(Vec::new().into())).await {
                    warn!(bot_id = %self.0.bot_id, "heartbeat ping failed: {e}");
                }
            }
        }
        *self.0.status.read().await
    }

    async fn is_connected(&self) -> bool {
        *self.0.status.read().await == BotStatus::Connected && self.0.user_jid.read().await.is_some()
    }

    async fn own_identifier(&self) -> Option<String> {
        self.0.user_jid.read().await.clone()
    }

    async fn fetch_historic_messages(
        &self,
        identifier: &str,
        limit: usize,
    ) -> Result<Vec<Message>, ProviderError> {
        let url = format!("{}/history", self.0.http_base_url);
        let response = self
            .0
            .http
            .post(&url)
            .json(&serde_json::json!({"group_id": identifier, "limit": limit}))
            .send()
            .await
            .map_err(|e| ProviderError::Connection(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ProviderError::Transient(format!(
                "history fetch returned status {}",
                response.status()
            )));
        }

        let items: Vec<WireMessage> = response
            .json()
            .await
            .map_err(|e| ProviderError::Message(e.to_string()))?;

        let mut messages = Vec::with_capacity(items.len());
        for (idx, item) in items.into_iter().enumerate() {
            let group = item.group.as_ref().map(|g| GroupRef {
                identifier: g.id.clone(),
                display_name: g.name.clone().unwrap_or_else(|| g.id.clone()),
                alternate_identifiers: vec![],
            });
            let sender = Sender {
                identifier: item.sender.clone(),
                display_name: item.display_name.clone().unwrap_or_else(|| item.sender.clone()),
                alternate_identifiers: vec![],
            };
            let source = if item.direction == "outgoing" {
                MessageSource::Bot
            } else {
                MessageSource::User
            };
            messages.push(Message {
                id: idx as u64,
                content: item.message,
                sender,
                source,
                accepted_time_ms: item.originating_time_ms.unwrap_or_else(|| Utc::now().timestamp_millis()),
                originating_time_ms: item.originating_time_ms,
                group,
                provider_message_id: item.provider_message_id,
            });
        }
        Ok(messages)
    }
}
