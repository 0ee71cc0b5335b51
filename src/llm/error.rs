#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("unknown LLM provider: {0}")]
    UnknownProvider(String),
    #[error("invalid LLM configuration: {0}")]
    Configuration(String),
    #[error("LLM request failed: {0}")]
    Request(String),
}
