//! Conversion between persisted messages and provider turns.

use crate::ai::{Content, MODEL_TAG, USER_TAG};
use crate::models::{Message, Role};

fn tag(role: Role) -> &'static str {
    match role {
        Role::User => USER_TAG,
        Role::Model => MODEL_TAG,
    }
}

/// Persisted messages to provider turns, in order, content verbatim.
/// Timestamps are dropped; the provider has no field for them.
pub fn encode(messages: &[Message]) -> Vec<Content> {
    messages
        .iter()
        .map(|message| Content::new(tag(message.role), &message.content))
        .collect()
}

/// Provider turns back to `(role, content)` pairs. Anything not tagged
/// `model` is treated as the human party.
pub fn decode(contents: &[Content]) -> Vec<(Role, String)> {
    contents
        .iter()
        .map(|content| {
            let role = if content.role == MODEL_TAG {
                Role::Model
            } else {
                Role::User
            };
            (role, content.text())
        })
        .collect()
}
