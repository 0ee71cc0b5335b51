//! Two-stage action-item extraction over a tracking period's messages:
//! a `low`-tier pass turns the raw transcript into structured items, then
//! a `high`-tier pass refines it. Stage 2 failures fall back to stage 1
//! rather than losing the period's output.

use std::sync::Arc;

use chrono::TimeZone;
use chrono_tz::Tz;
use serde_json::Value;
use tracing::{error, warn};

use crate::llm::LlmProvider;
use crate::models::Message;

pub const DEFAULT_LOW_SYSTEM_PROMPT: &str = "You read a WhatsApp group transcript and extract actionable tasks, \
deadlines, and commitments mentioned by participants. Respond in {language_name}. \
Return ONLY a JSON array of objects, each with: task_title, task_description, text_deadline (as written), \
timestamp_deadline (YYYY-MM-DD HH:MM:SS if inferable, else empty), and relevant_task_messages \
(an array of {{sender, content}} objects quoting the messages that support this item). \
If no action items are present, return an empty array.";

pub const DEFAULT_HIGH_SYSTEM_PROMPT: &str = "You refine a draft JSON array of action items extracted from a \
WhatsApp group chat. Merge duplicates, drop anything that isn't a genuine actionable item or deadline, and \
tighten titles and descriptions. Respond in {language_name}. Return ONLY the refined JSON array, with the same \
shape as the input: task_title, task_description, text_deadline, timestamp_deadline, relevant_task_messages.";

pub struct ActionItemExtractor {
    low_llm: Arc<dyn LlmProvider>,
    high_llm: Arc<dyn LlmProvider>,
    low_system_prompt_template: String,
    high_system_prompt_template: String,
}

impl ActionItemExtractor {
    pub fn new(
        low_llm: Arc<dyn LlmProvider>,
        high_llm: Arc<dyn LlmProvider>,
        low_system_prompt_template: String,
        high_system_prompt_template: String,
    ) -> Self {
        ActionItemExtractor {
            low_llm,
            high_llm,
            low_system_prompt_template,
            high_system_prompt_template,
        }
    }

    pub async fn extract(&self, messages: &[Message], timezone: Tz, language_name: &str) -> Vec<Value> {
        let messages_json = build_input_json(messages, timezone);
        let low_system_prompt = self.low_system_prompt_template.replace("{language_name}", language_name);

        let low_result = match self.low_llm.complete(&low_system_prompt, &[], &messages_json).await {
            Ok(completion) => sanitize(&completion.text),
            Err(e) => {
                error!("stage 1 (low) action item extraction failed: {e}");
                return Vec::new();
            }
        };

        let high_system_prompt = self.high_system_prompt_template.replace("{language_name}", language_name);
        let final_text = match self.high_llm.complete(&high_system_prompt, &[], &low_result).await {
            Ok(completion) => sanitize(&completion.text),
            Err(e) => {
                warn!("stage 2 (high) refinement failed, falling back to stage 1 output: {e}");
                low_result
            }
        };

        parse_llm_json(&final_text)
    }
}

fn sanitize(text: &str) -> String {
    text.replace("\\'", "'")
}

fn build_input_json(messages: &[Message], timezone: Tz) -> String {
    let formatted: Vec<Value> = messages
        .iter()
        .map(|message| {
            let originating_ms = message.originating_time_ms.unwrap_or(message.accepted_time_ms);
            let when = chrono::Utc
                .timestamp_millis_opt(originating_ms)
                .single()
                .map(|dt| dt.with_timezone(&timezone).format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_default();
            serde_json::json!({
                "when": when,
                "sender": message.sender.display_name,
                "content": message.content,
            })
        })
        .collect();
    serde_json::to_string_pretty(&formatted).unwrap_or_else(|_| "[]".to_string())
}

/// Strips a leading/trailing markdown code fence (with or without a `json`
/// language tag) before parsing, and tolerates anything that isn't a JSON
/// array by returning an empty result rather than erroring.
fn parse_llm_json(text: &str) -> Vec<Value> {
    let mut cleaned = text.trim();
    if let Some(rest) = cleaned.strip_prefix("```json") {
        cleaned = rest;
    } else if let Some(rest) = cleaned.strip_prefix("```") {
        cleaned = rest;
    }
    let cleaned = cleaned.strip_suffix("```").unwrap_or(cleaned).trim();

    match serde_json::from_str::<Value>(cleaned) {
        Ok(Value::Array(items)) => items,
        Ok(other) => {
            warn!(kind = ?other, "LLM returned valid JSON but not an array");
            Vec::new()
        }
        Err(e) => {
            error!("failed to parse LLM JSON: {e}");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_json_array() {
        let items = parse_llm_json(r#"[{"title": "a"}]"#);
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn strips_json_code_fence() {
        let items = parse_llm_json("```json\n[{\"title\": \"a\"}, {\"title\": \"b\"}]\n```");
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn strips_bare_code_fence() {
        let items = parse_llm_json("```\n[]\n```");
        assert!(items.is_empty());
    }

    #[test]
    fn non_array_json_yields_empty() {
        let items = parse_llm_json(r#"{"title": "a"}"#);
        assert!(items.is_empty());
    }

    #[test]
    fn invalid_json_yields_empty() {
        let items = parse_llm_json("not json at all");
        assert!(items.is_empty());
    }
}
