use async_trait::async_trait;

use super::error::LlmError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub cached_input_tokens: u64,
    pub output_tokens: u64,
}

#[derive(Debug, Clone)]
pub struct LlmCompletion {
    pub text: String,
    pub usage: TokenUsage,
}

/// One configured model. `complete` takes the system prompt separately from
/// the turn history since every provider implementation needs it placed
/// first regardless of wire format.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn complete(&self, system_prompt: &str, history: &[ChatTurn], question: &str) -> Result<LlmCompletion, LlmError>;
}
