use std::collections::VecDeque;

use chrono::Utc;
use tracing::info;

use crate::models::{GroupRef, Message, MessageSource, QueueConfig, Sender};

/// Bounded FIFO for one `(bot, correspondent)` pair. All limits are
/// enforced inside `add_message`; nothing outside this type ever removes a
/// message except `pop_message`, so the invariants in the data model hold
/// between calls as well as during them.
pub struct CorrespondentQueue {
    pub bot_id: String,
    pub correspondent_id: String,
    config: QueueConfig,
    messages: VecDeque<Message>,
    next_id: u64,
    total_chars: usize,
}

impl CorrespondentQueue {
    pub fn new(bot_id: impl Into<String>, correspondent_id: impl Into<String>, config: QueueConfig) -> Self {
        CorrespondentQueue {
            bot_id: bot_id.into(),
            correspondent_id: correspondent_id.into(),
            config,
            messages: VecDeque::new(),
            next_id: 1,
            total_chars: 0,
        }
    }

    /// Seeds the id counter from the archive's persisted maximum, called
    /// once when a queue is first spawned by the manager.
    pub fn seed_next_id(&mut self, archived_max_id: Option<u64>) {
        if let Some(max) = archived_max_id {
            self.next_id = max + 1;
        }
    }

    fn evict_by_age(&mut self, now_ms: i64) {
        let max_age_ms = self.config.max_days as i64 * 24 * 60 * 60 * 1000;
        while let Some(front) = self.messages.front() {
            if now_ms - front.accepted_time_ms > max_age_ms {
                let evicted = self.messages.pop_front().unwrap();
                self.total_chars -= evicted.char_len();
                self.log_eviction(&evicted, "age");
            } else {
                break;
            }
        }
    }

    fn evict_by_characters(&mut self, incoming_len: usize) {
        while !self.messages.is_empty() && self.total_chars + incoming_len > self.config.max_characters {
            let evicted = self.messages.pop_front().unwrap();
            self.total_chars -= evicted.char_len();
            self.log_eviction(&evicted, "total_characters");
        }
    }

    fn evict_by_count(&mut self) {
        while self.messages.len() >= self.config.max_messages {
            let evicted = self.messages.pop_front().unwrap();
            self.total_chars -= evicted.char_len();
            self.log_eviction(&evicted, "message_count");
        }
    }

    fn log_eviction(&self, evicted: &Message, reason: &str) {
        info!(
            bot_id = %self.bot_id,
            correspondent_id = %self.correspondent_id,
            evicted_message_id = evicted.id,
            reason,
            "queue eviction"
        );
    }

    /// Truncates, evicts (age, then projected total characters, then
    /// count), appends, and returns the stored message. Never fails.
    pub fn add_message(
        &mut self,
        content: String,
        sender: Sender,
        source: MessageSource,
        originating_time_ms: Option<i64>,
        group: Option<GroupRef>,
    ) -> Message {
        let mut content = content;
        if content.chars().count() > self.config.max_characters_single_message {
            info!(
                bot_id = %self.bot_id,
                correspondent_id = %self.correspondent_id,
                limit = self.config.max_characters_single_message,
                "truncating oversized message"
            );
            content = content
                .chars()
                .take(self.config.max_characters_single_message)
                .collect();
        }

        let now_ms = Utc::now().timestamp_millis();
        let new_len = content.chars().count();

        self.evict_by_age(now_ms);
        self.evict_by_characters(new_len);
        self.evict_by_count();

        let message = Message {
            id: self.next_id,
            content,
            sender,
            source,
            accepted_time_ms: now_ms,
            originating_time_ms,
            group,
            provider_message_id: None,
        };
        self.next_id += 1;
        self.total_chars += message.char_len();
        self.messages.push_back(message.clone());

        info!(
            bot_id = %self.bot_id,
            correspondent_id = %self.correspondent_id,
            message_id = message.id,
            queue_len = self.messages.len(),
            total_chars = self.total_chars,
            "message enqueued"
        );

        message
    }

    pub fn pop_message(&mut self) -> Option<Message> {
        let popped = self.messages.pop_front();
        if let Some(m) = &popped {
            self.total_chars -= m.char_len();
        }
        popped
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sender() -> Sender {
        Sender {
            identifier: "alice".to_string(),
            display_name: "Alice".to_string(),
            alternate_identifiers: vec![],
        }
    }

    #[test]
    fn truncates_oversized_message() {
        let config = QueueConfig {
            max_messages: 10,
            max_characters: 1000,
            max_days: 7,
            max_characters_single_message: 5,
        };
        let mut q = CorrespondentQueue::new("bot1", "alice", config);
        let m = q.add_message("hello world".to_string(), sender(), MessageSource::User, None, None);
        assert_eq!(m.content, "hello");
    }

    #[test]
    fn evicts_by_message_count() {
        let config = QueueConfig {
            max_messages: 2,
            max_characters: 1_000_000,
            max_days: 7,
            max_characters_single_message: 1_000,
        };
        let mut q = CorrespondentQueue::new("bot1", "alice", config);
        q.add_message("a".to_string(), sender(), MessageSource::User, None, None);
        q.add_message("b".to_string(), sender(), MessageSource::User, None, None);
        q.add_message("c".to_string(), sender(), MessageSource::User, None, None);
        assert_eq!(q.len(), 2);
        let contents: Vec<_> = q.messages().map(|m| m.content.clone()).collect();
        assert_eq!(contents, vec!["b", "c"]);
    }

    #[test]
    fn evicts_by_total_characters_before_count() {
        let config = QueueConfig {
            max_messages: 100,
            max_characters: 5,
            max_days: 7,
            max_characters_single_message: 100,
        };
        let mut q = CorrespondentQueue::new("bot1", "alice", config);
        q.add_message("abc".to_string(), sender(), MessageSource::User, None, None);
        q.add_message("de".to_string(), sender(), MessageSource::User, None, None);
        // adding "fg" (2 chars) would make total 3+2+2=7 > 5, so "abc" is evicted first
        q.add_message("fg".to_string(), sender(), MessageSource::User, None, None);
        let contents: Vec<_> = q.messages().map(|m| m.content.clone()).collect();
        assert_eq!(contents, vec!["de", "fg"]);
    }

    #[test]
    fn ids_are_monotonic_and_seedable() {
        let mut q = CorrespondentQueue::new("bot1", "alice", QueueConfig::default());
        q.seed_next_id(Some(41));
        let m = q.add_message("hi".to_string(), sender(), MessageSource::User, None, None);
        assert_eq!(m.id, 42);
    }

    #[test]
    fn pop_message_is_fifo_and_updates_char_total() {
        let mut q = CorrespondentQueue::new("bot1", "alice", QueueConfig::default());
        q.add_message("one".to_string(), sender(), MessageSource::User, None, None);
        q.add_message("two".to_string(), sender(), MessageSource::User, None, None);
        let popped = q.pop_message().unwrap();
        assert_eq!(popped.content, "one");
        assert_eq!(q.len(), 1);
    }
}
