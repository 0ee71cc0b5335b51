//! Whitelist-gated LLM auto-reply, installed as a message handler on a
//! bot's session. One instance owns all per-correspondent (or shared,
//! depending on `context_config.shared_context`) conversation histories.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::llm::{ChatRole, ChatTurn, LlmProvider};
use crate::models::{ContextConfig, Message};
use crate::provider::ChatProvider;
use crate::session_manager::SessionManager;

use super::whitelist;

#[derive(Debug, Clone)]
struct HistoryTurn {
    role: ChatRole,
    content: String,
    timestamp: DateTime<Utc>,
}

pub struct AutomaticBotReplyService {
    bot_id: String,
    provider: Arc<dyn ChatProvider>,
    llm: Arc<dyn LlmProvider>,
    system_prompt: String,
    context_config: ContextConfig,
    group_whitelist: Vec<String>,
    direct_whitelist: Vec<String>,
    histories: Mutex<HashMap<String, Vec<HistoryTurn>>>,
}

impl AutomaticBotReplyService {
    pub fn new(
        bot_id: String,
        provider: Arc<dyn ChatProvider>,
        llm: Arc<dyn LlmProvider>,
        system_prompt: String,
        context_config: ContextConfig,
        group_whitelist: Vec<String>,
        direct_whitelist: Vec<String>,
    ) -> Arc<Self> {
        Arc::new(AutomaticBotReplyService {
            bot_id,
            provider,
            llm,
            system_prompt,
            context_config,
            group_whitelist,
            direct_whitelist,
            histories: Mutex::new(HashMap::new()),
        })
    }

    /// Registers this feature's handler on the session so it fires on
    /// every non-echo inbound message.
    pub async fn install(self: &Arc<Self>, session: &Arc<SessionManager>) {
        let service = self.clone();
        session
            .register_message_handler(Arc::new(move |correspondent_id, message| {
                let service = service.clone();
                Box::pin(async move {
                    service.handle_message(correspondent_id, message).await;
                })
            }))
            .await;
    }

    async fn handle_message(&self, correspondent_id: String, message: Message) {
        let allowed = if let Some(group) = &message.group {
            if self.group_whitelist.is_empty() {
                return;
            }
            let identifiers = [group.identifier.as_str(), group.display_name.as_str()];
            whitelist::check(&identifiers, &self.group_whitelist)
        } else {
            if self.direct_whitelist.is_empty() {
                return;
            }
            let mut identifiers = vec![message.sender.identifier.as_str()];
            identifiers.extend(message.sender.alternate_identifiers.iter().map(String::as_str));
            whitelist::check(&identifiers, &self.direct_whitelist)
        };

        if !allowed.is_allowed {
            info!(bot_id = %self.bot_id, correspondent_id, "auto-reply: sender not whitelisted, ignoring");
            return;
        }

        let session_key = if self.context_config.shared_context {
            self.bot_id.clone()
        } else {
            correspondent_id.clone()
        };

        let formatted_question = format!("{}: {}", message.sender.display_name, message.content);

        let history_snapshot: Vec<ChatTurn> = {
            let mut histories = self.histories.lock().await;
            let history = histories.entry(session_key.clone()).or_default();
            trim_history(&self.context_config, history);
            history
                .iter()
                .map(|turn| ChatTurn { role: turn.role, content: turn.content.clone() })
                .collect()
        };

        let completion = match self
            .llm
            .complete(&self.system_prompt, &history_snapshot, &formatted_question)
            .await
        {
            Ok(completion) => completion,
            Err(e) => {
                error!(bot_id = %self.bot_id, correspondent_id, "auto-reply LLM call failed: {e}");
                return;
            }
        };

        let single_limit = self.context_config.max_characters_single_message;
        let mut histories = self.histories.lock().await;
        let history = histories.entry(session_key).or_default();
        history.push(HistoryTurn {
            role: ChatRole::User,
            content: truncate(&formatted_question, single_limit),
            timestamp: Utc::now(),
        });
        history.push(HistoryTurn {
            role: ChatRole::Assistant,
            content: truncate(&format!("Bot: {}", completion.text), single_limit),
            timestamp: Utc::now(),
        });
        drop(histories);

        if let Err(e) = self.provider.send_message(&correspondent_id, &completion.text).await {
            error!(bot_id = %self.bot_id, correspondent_id, "auto-reply: failed to send response: {e}");
        }
    }

}

/// Evicts by age, then total characters, then count — reserving room for
/// the two turns about to be appended, matching the check the Python
/// original makes before invoking the model.
fn trim_history(context_config: &ContextConfig, history: &mut Vec<HistoryTurn>) {
    let now = Utc::now();
    let max_age = Duration::days(context_config.max_days as i64);

    while let Some(front) = history.first() {
        if now - front.timestamp > max_age {
            history.remove(0);
        } else {
            break;
        }
    }

    let mut total_chars: usize = history.iter().map(|t| t.content.len()).sum();
    while total_chars > context_config.max_characters && !history.is_empty() {
        total_chars -= history.remove(0).content.len();
    }

    while history.len() + 2 > context_config.max_messages && !history.is_empty() {
        history.remove(0);
    }
}

fn truncate(content: &str, limit: usize) -> String {
    if limit == 0 || content.len() <= limit {
        content.to_string()
    } else {
        content.chars().take(limit).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(content: &str, age_days: i64) -> HistoryTurn {
        HistoryTurn {
            role: ChatRole::User,
            content: content.to_string(),
            timestamp: Utc::now() - Duration::days(age_days),
        }
    }

    fn config_with_limits(max_messages: usize, max_characters: usize, max_days: u32) -> ContextConfig {
        ContextConfig {
            shared_context: true,
            max_messages,
            max_characters,
            max_days,
            max_characters_single_message: 1000,
        }
    }

    #[test]
    fn evicts_by_age() {
        let config = config_with_limits(100, 100_000, 1);
        let mut history = vec![turn("old", 5), turn("new", 0)];
        trim_history(&config, &mut history);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content, "new");
    }

    #[test]
    fn evicts_by_characters_before_count() {
        let config = config_with_limits(100, 5, 30);
        let mut history = vec![turn("aaaa", 0), turn("bb", 0)];
        trim_history(&config, &mut history);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content, "bb");
    }

    #[test]
    fn reserves_room_for_two_upcoming_turns() {
        let config = config_with_limits(3, 100_000, 30);
        let mut history = vec![turn("a", 0), turn("b", 0), turn("c", 0)];
        trim_history(&config, &mut history);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content, "c");
    }

    #[test]
    fn truncate_respects_char_boundary_limit() {
        assert_eq!(truncate("hello world", 5), "hello");
        assert_eq!(truncate("short", 100), "short");
        assert_eq!(truncate("anything", 0), "anything");
    }
}
