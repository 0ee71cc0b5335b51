use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sender {
    pub identifier: String,
    pub display_name: String,
    #[serde(default)]
    pub alternate_identifiers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupRef {
    pub identifier: String,
    pub display_name: String,
    #[serde(default)]
    pub alternate_identifiers: Vec<String>,
}

/// Where a message came from, relative to the bot: a human correspondent,
/// the bot's own reply, or the owner typing on their own phone (observed as
/// an "outgoing" WhatsApp event that did not originate from the bot).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageSource {
    User,
    Bot,
    UserOutgoing,
}

/// One immutable message inside a correspondent queue. `id` is assigned by
/// the owning queue and is monotonic within that queue only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: u64,
    pub content: String,
    pub sender: Sender,
    pub source: MessageSource,
    pub accepted_time_ms: i64,
    #[serde(default)]
    pub originating_time_ms: Option<i64>,
    #[serde(default)]
    pub group: Option<GroupRef>,
    #[serde(default)]
    pub provider_message_id: Option<String>,
}

impl Message {
    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }
}
