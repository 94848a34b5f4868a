//! Persistence seams.
//!
//! Handlers and the chat-session core only see these traits. `PgStore` is
//! the production backend; `MemoryStore` keeps everything in process and
//! backs the tests.

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{Chat, Grievance, Message, Role, User};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with `Conflict` when the email is already registered.
    async fn create_user(&self, user: &User) -> StoreResult<User>;

    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>>;

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    async fn find_user_by_google_id(&self, google_id: &str) -> StoreResult<Option<User>>;

    /// Writes every mutable column of `user` and bumps `updated_at`.
    async fn update_user(&self, user: &User) -> StoreResult<User>;

    /// Removes the user together with their chats, messages and grievances.
    async fn delete_user(&self, id: Uuid) -> StoreResult<()>;
}

#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Creates an empty chat with the placeholder title.
    async fn create_chat(&self, owner_id: Uuid) -> StoreResult<Chat>;

    /// Returns the chat only when it belongs to `owner_id`.
    async fn find_chat(&self, chat_id: Uuid, owner_id: Uuid) -> StoreResult<Option<Chat>>;

    /// Chats with at least one message, most recently active first.
    async fn list_chats(&self, owner_id: Uuid) -> StoreResult<Vec<Chat>>;

    /// Full message sequence in conversational order.
    async fn messages(&self, chat_id: Uuid) -> StoreResult<Vec<Message>>;

    /// Appends one message as a single atomic write. The returned message's
    /// `seq` is the chat's message count after the append, so `seq == 1`
    /// identifies the first message. Fails with `NotFound` for unknown chats.
    async fn append_message(&self, chat_id: Uuid, role: Role, content: &str)
        -> StoreResult<Message>;

    async fn set_title(&self, chat_id: Uuid, title: &str) -> StoreResult<()>;
}

#[async_trait]
pub trait GrievanceStore: Send + Sync {
    async fn create_grievance(&self, grievance: &Grievance) -> StoreResult<Grievance>;

    /// Newest first.
    async fn list_grievances_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Grievance>>;

    /// Newest first.
    async fn list_all_grievances(&self) -> StoreResult<Vec<Grievance>>;

    /// Records the admin response and marks the ticket `Responded`.
    async fn respond_to_grievance(&self, id: Uuid, response: &str) -> StoreResult<Grievance>;
}
