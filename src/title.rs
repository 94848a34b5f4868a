//! Chat title generation from the first user message.

use std::sync::Arc;
use std::time::Duration;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{error, instrument};

use crate::ai::{bounded, AiError, GenerativeModel};
use crate::models::PLACEHOLDER_TITLE;
use crate::prompts::Prompts;

lazy_static! {
    static ref WHITESPACE_RUN: Regex = Regex::new(r"\s+").unwrap();
}

/// Upper bound on stored title length, in characters.
const MAX_TITLE_CHARS: usize = 80;

fn is_edge_noise(c: char) -> bool {
    c.is_whitespace() || c.is_ascii_punctuation() || matches!(c, '“' | '”' | '‘' | '’' | '«' | '»')
}

/// Normalises raw model output into a label: first non-empty line, inner
/// whitespace collapsed, quotes and punctuation stripped from both edges.
/// `None` when nothing usable is left.
pub fn clean_title(raw: &str) -> Option<String> {
    let line = raw.lines().map(str::trim).find(|line| !line.is_empty())?;
    let collapsed = WHITESPACE_RUN.replace_all(line, " ");
    let trimmed = collapsed.trim_matches(is_edge_noise);
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(MAX_TITLE_CHARS).collect::<String>().trim_end().to_string())
}

pub struct TitleSummarizer {
    model: Arc<dyn GenerativeModel>,
    timeout: Duration,
}

impl TitleSummarizer {
    pub fn new(model: Arc<dyn GenerativeModel>, timeout: Duration) -> Self {
        Self { model, timeout }
    }

    /// Asks the model for a label. Every failure, including unusable
    /// output, is returned to the caller.
    #[instrument(name = "summarize_title", skip_all)]
    pub async fn try_summarize(&self, text: &str) -> Result<String, AiError> {
        let raw = bounded(self.timeout, self.model.generate(Prompts::CHAT_TITLER, text)).await?;
        clean_title(&raw).ok_or(AiError::EmptyResponse)
    }

    /// Like `try_summarize`, but logs failures and falls back to the
    /// placeholder title.
    pub async fn summarize(&self, text: &str) -> String {
        match self.try_summarize(text).await {
            Ok(title) => title,
            Err(e) => {
                error!("Error generating chat title: {}", e);
                PLACEHOLDER_TITLE.to_string()
            }
        }
    }
}
