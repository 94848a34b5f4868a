//! Generative-language backends.
//!
//! The chat core talks to the outside model only through [`GenerativeModel`]
//! (one-shot generation, used for titles) and [`ChatHandle`] (a conversation
//! seeded with prior turns). Turns use the Gemini `Content` shape; the
//! OpenAI-compatible backend converts them on the way out.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{AiConfig, AiProvider};

pub mod gemini;
pub mod openai;
pub mod scripted;

pub use gemini::GeminiModel;
pub use openai::OpenAiModel;
pub use scripted::{Script, ScriptedModel};

pub const USER_TAG: &str = "user";
pub const MODEL_TAG: &str = "model";

#[derive(Debug, thiserror::Error)]
pub enum AiError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("provider returned no text")]
    EmptyResponse,
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}

/// One turn of a conversation in the provider's wire format.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Part {
    #[serde(default)]
    pub text: String,
}

impl Content {
    pub fn new(role: &str, text: &str) -> Self {
        Content {
            role: role.to_string(),
            parts: vec![Part {
                text: text.to_string(),
            }],
        }
    }

    pub fn user(text: &str) -> Self {
        Self::new(USER_TAG, text)
    }

    pub fn model(text: &str) -> Self {
        Self::new(MODEL_TAG, text)
    }

    /// All text parts joined in order.
    pub fn text(&self) -> String {
        self.parts.iter().map(|p| p.text.as_str()).collect()
    }
}

/// A live conversation. Each successful `send_message` extends the handle's
/// own history with the user turn and the reply; failed sends leave it as is.
#[async_trait]
pub trait ChatHandle: Send + Sync {
    async fn send_message(&self, text: &str) -> Result<String, AiError>;
}

#[async_trait]
pub trait GenerativeModel: Send + Sync {
    /// Opens a conversation seeded with `history`.
    fn start_chat(&self, system_instruction: String, history: Vec<Content>) -> Arc<dyn ChatHandle>;

    /// Single-turn generation with a system instruction.
    async fn generate(&self, system_instruction: &str, text: &str) -> Result<String, AiError>;
}

/// Applies the upstream deadline; expiry becomes `AiError::Timeout`.
pub async fn bounded<T, F>(limit: Duration, call: F) -> Result<T, AiError>
where
    F: Future<Output = Result<T, AiError>>,
{
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| AiError::Timeout(limit))?
}

pub fn from_config(config: &AiConfig) -> Result<Arc<dyn GenerativeModel>, anyhow::Error> {
    let model: Arc<dyn GenerativeModel> = match config.provider {
        AiProvider::Gemini => Arc::new(GeminiModel::new(config)?),
        AiProvider::OpenAi => Arc::new(OpenAiModel::new(config)),
        AiProvider::Scripted => Arc::new(ScriptedModel::echo()),
    };
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bounded_passes_through_result() {
        let result = bounded(Duration::from_secs(1), async { Ok::<_, AiError>(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_bounded_times_out() {
        let result: Result<(), AiError> = bounded(Duration::from_millis(10), async {
            std::future::pending::<()>().await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(AiError::Timeout(_))));
    }

    #[test]
    fn test_content_text_joins_parts() {
        let content = Content {
            role: MODEL_TAG.to_string(),
            parts: vec![
                Part {
                    text: "Hello, ".to_string(),
                },
                Part {
                    text: "world".to_string(),
                },
            ],
        };
        assert_eq!(content.text(), "Hello, world");
    }
}
