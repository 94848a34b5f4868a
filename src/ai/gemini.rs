//! Google Gemini provider over the REST `generateContent` endpoint.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, error};

use super::{AiError, ChatHandle, Content, GenerativeModel};
use crate::config::AiConfig;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_output_tokens: u32,
}

#[derive(Clone)]
pub struct GeminiModel {
    inner: Arc<GeminiClient>,
}

impl GeminiModel {
    pub fn new(config: &AiConfig) -> Result<Self, anyhow::Error> {
        if config.api_key.trim().is_empty() {
            return Err(anyhow::anyhow!("AI_API_KEY must not be empty"));
        }
        let client = Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()?;
        let base_url = config
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            inner: Arc::new(GeminiClient {
                client,
                api_key: config.api_key.clone(),
                base_url,
                model: config.model.clone(),
                max_output_tokens: config.max_output_tokens,
            }),
        })
    }
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

impl GeminiClient {
    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }

    fn build_body(&self, system_instruction: &str, contents: &[Content]) -> Value {
        let mut body = json!({
            "contents": contents,
            "generationConfig": { "maxOutputTokens": self.max_output_tokens },
        });
        if !system_instruction.is_empty() {
            body["system_instruction"] = json!({ "parts": [{ "text": system_instruction }] });
        }
        body
    }

    async fn generate_content(
        &self,
        system_instruction: &str,
        contents: &[Content],
    ) -> Result<String, AiError> {
        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&self.build_body(system_instruction, contents))
            .send()
            .await
            .map_err(|e| {
                error!("HTTP request error: {}", e);
                AiError::Transport(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read response body".to_string());
            error!("Error response from Gemini: {}", body);
            return Err(AiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed = response
            .json::<GenerateContentResponse>()
            .await
            .map_err(|e| AiError::Transport(e.to_string()))?;
        extract_text(parsed)
    }
}

fn extract_text(response: GenerateContentResponse) -> Result<String, AiError> {
    let text = response
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| content.text())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(AiError::EmptyResponse);
    }
    Ok(text)
}

pub struct GeminiChat {
    client: Arc<GeminiClient>,
    system_instruction: String,
    history: Mutex<Vec<Content>>,
}

#[async_trait]
impl ChatHandle for GeminiChat {
    async fn send_message(&self, text: &str) -> Result<String, AiError> {
        let mut contents = self.history.lock().await.clone();
        contents.push(Content::user(text));

        let reply = self
            .client
            .generate_content(&self.system_instruction, &contents)
            .await?;

        let mut history = self.history.lock().await;
        history.push(Content::user(text));
        history.push(Content::model(&reply));
        debug!(turns = history.len(), "Gemini chat advanced");
        Ok(reply)
    }
}

#[async_trait]
impl GenerativeModel for GeminiModel {
    fn start_chat(&self, system_instruction: String, history: Vec<Content>) -> Arc<dyn ChatHandle> {
        Arc::new(GeminiChat {
            client: self.inner.clone(),
            system_instruction,
            history: Mutex::new(history),
        })
    }

    async fn generate(&self, system_instruction: &str, text: &str) -> Result<String, AiError> {
        self.inner
            .generate_content(system_instruction, &[Content::user(text)])
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AiProvider;
    use std::time::Duration;

    fn config() -> AiConfig {
        AiConfig {
            provider: AiProvider::Gemini,
            api_key: "test-key".to_string(),
            model: "gemini-2.5-flash".to_string(),
            base_url: Some("https://example.test/".to_string()),
            timeout: Duration::from_secs(5),
            max_output_tokens: 2000,
        }
    }

    #[test]
    fn test_new_rejects_empty_api_key() {
        let mut config = config();
        config.api_key = "  ".to_string();
        assert!(GeminiModel::new(&config).is_err());
    }

    #[test]
    fn test_endpoint_strips_trailing_slash() {
        let model = GeminiModel::new(&config()).unwrap();
        assert_eq!(
            model.inner.endpoint(),
            "https://example.test/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }

    #[test]
    fn test_build_body_keeps_turn_tags_and_system_instruction() {
        let model = GeminiModel::new(&config()).unwrap();
        let body = model.inner.build_body(
            "Be kind.",
            &[Content::user("hi"), Content::model("hello"), Content::user("how are you")],
        );

        assert_eq!(body["system_instruction"]["parts"][0]["text"], "Be kind.");
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][1]["role"], "model");
        assert_eq!(body["contents"][1]["parts"][0]["text"], "hello");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 2000);
    }

    #[test]
    fn test_build_body_without_system_instruction() {
        let model = GeminiModel::new(&config()).unwrap();
        let body = model.inner.build_body("", &[Content::user("hi")]);
        assert!(body.get("system_instruction").is_none());
    }

    #[test]
    fn test_extract_text_from_candidate() {
        let raw = r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Hi "},{"text":"there"}]},"finishReason":"STOP"}]}"#;
        let parsed: GenerateContentResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(extract_text(parsed).unwrap(), "Hi there");
    }

    #[test]
    fn test_extract_text_empty_candidates() {
        let parsed: GenerateContentResponse = serde_json::from_str(r#"{"candidates":[]}"#).unwrap();
        assert!(matches!(extract_text(parsed), Err(AiError::EmptyResponse)));
    }

    #[test]
    fn test_extract_text_blocked_prompt_without_content() {
        let raw = r#"{"candidates":[{"finishReason":"SAFETY"}]}"#;
        let parsed: GenerateContentResponse = serde_json::from_str(raw).unwrap();
        assert!(matches!(extract_text(parsed), Err(AiError::EmptyResponse)));
    }
}
