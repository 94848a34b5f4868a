use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::Chat;

#[derive(Serialize, ToSchema)]
pub struct ChatSummary {
    pub id: Uuid,
    pub title: String,
    #[serde(rename = "lastMessageTime")]
    pub last_message_time: DateTime<Utc>,
}

impl From<Chat> for ChatSummary {
    fn from(chat: Chat) -> Self {
        ChatSummary {
            id: chat.id,
            title: chat.title,
            last_message_time: chat.updated_at,
        }
    }
}
