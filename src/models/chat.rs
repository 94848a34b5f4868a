use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Title every chat starts with until the first message is summarized.
pub const PLACEHOLDER_TITLE: &str = "New Chat";

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Chat {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    /// Number of appended messages; the append path bumps it atomically.
    pub message_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Chat {
    pub fn new(user_id: Uuid) -> Self {
        Chat {
            user_id,
            ..Default::default()
        }
    }

    pub fn has_placeholder_title(&self) -> bool {
        self.title == PLACEHOLDER_TITLE
    }
}

impl Default for Chat {
    fn default() -> Self {
        Chat {
            id: Uuid::new_v4(),
            user_id: Uuid::nil(),
            title: PLACEHOLDER_TITLE.to_string(),
            message_count: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}
