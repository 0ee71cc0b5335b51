mod error;
mod factory;
mod openai_provider;
mod provider;
mod quota;
mod token_consumption;
mod tracked;

pub use error::LlmError;
pub use factory::create_tracked_llm;
pub use openai_provider::OpenAiProvider;
pub use provider::{ChatRole, ChatTurn, LlmCompletion, LlmProvider, TokenUsage};
pub use quota::{BotLifecycleControl, QuotaService, TierRates, TokenMenu};
pub use token_consumption::TokenConsumptionService;
pub use tracked::TrackedLlmProvider;
