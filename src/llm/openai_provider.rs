use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;

use crate::models::{ApiKeySource, LlmProviderConfig};

use super::error::LlmError;
use super::provider::{ChatRole, ChatTurn, LlmCompletion, LlmProvider, TokenUsage};

/// Adapter over `async-openai`, the only concretely wired provider. Honors
/// the same `api_key_source` contract the bot configuration schema
/// documents: `environment` reads `OPENAI_API_KEY` from the process
/// environment, `explicit` requires a key baked into the bot config.
pub struct OpenAiProvider {
    client: Client<OpenAIConfig>,
    model: String,
    temperature: f32,
}

impl OpenAiProvider {
    pub fn new(config: &LlmProviderConfig) -> Result<Self, LlmError> {
        let openai_config = match config.api_key_source {
            ApiKeySource::Environment => {
                if std::env::var("OPENAI_API_KEY").is_err() {
                    return Err(LlmError::Configuration(
                        "OPENAI_API_KEY is not set and api_key_source is 'environment'".to_string(),
                    ));
                }
                OpenAIConfig::new()
            }
            ApiKeySource::Explicit => {
                let key = config.api_key.clone().ok_or_else(|| {
                    LlmError::Configuration(
                        "api_key_source is 'explicit' but no api_key was provided".to_string(),
                    )
                })?;
                OpenAIConfig::new().with_api_key(key)
            }
        };

        Ok(OpenAiProvider {
            client: Client::with_config(openai_config),
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn complete(&self, system_prompt: &str, history: &[ChatTurn], question: &str) -> Result<LlmCompletion, LlmError> {
        let mut messages = vec![ChatCompletionRequestSystemMessageArgs::default()
            .content(system_prompt)
            .build()
            .map_err(|e| LlmError::Request(e.to_string()))?
            .into()];

        for turn in history {
            let message = match turn.role {
                ChatRole::User => ChatCompletionRequestUserMessageArgs::default()
                    .content(turn.content.clone())
                    .build()
                    .map_err(|e| LlmError::Request(e.to_string()))?
                    .into(),
                ChatRole::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                    .content(turn.content.clone())
                    .build()
                    .map_err(|e| LlmError::Request(e.to_string()))?
                    .into(),
            };
            messages.push(message);
        }

        messages.push(
            ChatCompletionRequestUserMessageArgs::default()
                .content(question)
                .build()
                .map_err(|e| LlmError::Request(e.to_string()))?
                .into(),
        );

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .temperature(self.temperature)
            .messages(messages)
            .build()
            .map_err(|e| LlmError::Request(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| LlmError::Request(e.to_string()))?;

        let text = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .unwrap_or_default();

        let usage = response
            .usage
            .map(|u| TokenUsage {
                input_tokens: u.prompt_tokens as u64,
                output_tokens: u.completion_tokens as u64,
                cached_input_tokens: u
                    .prompt_tokens_details
                    .as_ref()
                    .and_then(|d| d.cached_tokens)
                    .unwrap_or(0) as u64,
            })
            .unwrap_or_default();

        Ok(LlmCompletion { text, usage })
    }
}
