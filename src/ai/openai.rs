//! OpenAI-compatible provider (OpenAI, OpenRouter, Groq, Gemini's OpenAI
//! surface, ...) through `async-openai`.

use std::sync::Arc;

use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::error;

use super::{AiError, ChatHandle, Content, GenerativeModel, MODEL_TAG};
use crate::config::AiConfig;

struct OpenAiClient {
    client: Client<OpenAIConfig>,
    model: String,
    max_output_tokens: u32,
}

#[derive(Clone)]
pub struct OpenAiModel {
    inner: Arc<OpenAiClient>,
}

impl OpenAiModel {
    pub fn new(config: &AiConfig) -> Self {
        let mut oai_config = OpenAIConfig::new().with_api_key(config.api_key.clone());
        if let Some(base_url) = &config.base_url {
            oai_config = oai_config.with_api_base(base_url.trim_end_matches('/'));
        }

        Self {
            inner: Arc::new(OpenAiClient {
                client: Client::with_config(oai_config),
                model: config.model.clone(),
                max_output_tokens: config.max_output_tokens,
            }),
        }
    }
}

fn transport(e: OpenAIError) -> AiError {
    AiError::Transport(e.to_string())
}

/// Maps Gemini-style turns onto chat-completion messages: `model` turns
/// become assistant messages, everything else a user message.
fn to_request_messages(
    system_instruction: &str,
    contents: &[Content],
) -> Result<Vec<ChatCompletionRequestMessage>, AiError> {
    let mut messages: Vec<ChatCompletionRequestMessage> = Vec::with_capacity(contents.len() + 1);

    if !system_instruction.is_empty() {
        messages.push(
            ChatCompletionRequestSystemMessageArgs::default()
                .content(system_instruction.to_string())
                .build()
                .map_err(transport)?
                .into(),
        );
    }

    for content in contents {
        let message = if content.role == MODEL_TAG {
            ChatCompletionRequestAssistantMessageArgs::default()
                .content(content.text())
                .build()
                .map_err(transport)?
                .into()
        } else {
            ChatCompletionRequestUserMessageArgs::default()
                .content(content.text())
                .build()
                .map_err(transport)?
                .into()
        };
        messages.push(message);
    }

    Ok(messages)
}

impl OpenAiClient {
    async fn complete(
        &self,
        system_instruction: &str,
        contents: &[Content],
    ) -> Result<String, AiError> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .max_tokens(self.max_output_tokens)
            .messages(to_request_messages(system_instruction, contents)?)
            .build()
            .map_err(transport)?;

        let response = self.client.chat().create(request).await.map_err(|e| {
            error!("Failed to create chat completion: {:?}", e);
            transport(e)
        })?;

        response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .filter(|text| !text.trim().is_empty())
            .ok_or(AiError::EmptyResponse)
    }
}

pub struct OpenAiChat {
    client: Arc<OpenAiClient>,
    system_instruction: String,
    history: Mutex<Vec<Content>>,
}

#[async_trait]
impl ChatHandle for OpenAiChat {
    async fn send_message(&self, text: &str) -> Result<String, AiError> {
        let mut contents = self.history.lock().await.clone();
        contents.push(Content::user(text));

        let reply = self
            .client
            .complete(&self.system_instruction, &contents)
            .await?;

        let mut history = self.history.lock().await;
        history.push(Content::user(text));
        history.push(Content::model(&reply));
        Ok(reply)
    }
}

#[async_trait]
impl GenerativeModel for OpenAiModel {
    fn start_chat(&self, system_instruction: String, history: Vec<Content>) -> Arc<dyn ChatHandle> {
        Arc::new(OpenAiChat {
            client: self.inner.clone(),
            system_instruction,
            history: Mutex::new(history),
        })
    }

    async fn generate(&self, system_instruction: &str, text: &str) -> Result<String, AiError> {
        self.inner
            .complete(system_instruction, &[Content::user(text)])
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_turns_become_assistant_messages() {
        let messages = to_request_messages(
            "You are Felicity.",
            &[Content::user("hi"), Content::model("hello")],
        )
        .unwrap();

        assert_eq!(messages.len(), 3);
        assert!(matches!(messages[0], ChatCompletionRequestMessage::System(_)));
        assert!(matches!(messages[1], ChatCompletionRequestMessage::User(_)));
        assert!(matches!(messages[2], ChatCompletionRequestMessage::Assistant(_)));
    }

    #[test]
    fn test_empty_system_instruction_is_omitted() {
        let messages = to_request_messages("", &[Content::user("hi")]).unwrap();
        assert_eq!(messages.len(), 1);
        assert!(matches!(messages[0], ChatCompletionRequestMessage::User(_)));
    }
}
