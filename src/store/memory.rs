use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{ChatStore, GrievanceStore, StoreError, StoreResult, UserStore};
use crate::models::{Chat, Grievance, GrievanceStatus, Message, Role, User};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    chats: HashMap<Uuid, Chat>,
    messages: HashMap<Uuid, Vec<Message>>,
    grievances: HashMap<Uuid, Grievance>,
}

/// Process-local store with the same contract as `PgStore`. Every operation
/// takes the single lock once, so each call is atomic like its SQL
/// counterpart.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create_user(&self, user: &User) -> StoreResult<User> {
        let mut tables = self.tables.write().await;
        if tables.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::Conflict("User already exists".to_string()));
        }
        tables.users.insert(user.id, user.clone());
        Ok(user.clone())
    }

    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }

    async fn find_user_by_google_id(&self, google_id: &str) -> StoreResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .values()
            .find(|u| u.google_id.as_deref() == Some(google_id))
            .cloned())
    }

    async fn update_user(&self, user: &User) -> StoreResult<User> {
        let mut tables = self.tables.write().await;
        if tables
            .users
            .values()
            .any(|u| u.id != user.id && u.email == user.email)
        {
            return Err(StoreError::Conflict("Email already exists".to_string()));
        }
        let stored = tables.users.get_mut(&user.id).ok_or(StoreError::NotFound)?;
        *stored = User {
            updated_at: Utc::now(),
            ..user.clone()
        };
        Ok(stored.clone())
    }

    async fn delete_user(&self, id: Uuid) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        tables.users.remove(&id).ok_or(StoreError::NotFound)?;

        let owned: Vec<Uuid> = tables
            .chats
            .values()
            .filter(|c| c.user_id == id)
            .map(|c| c.id)
            .collect();
        for chat_id in owned {
            tables.chats.remove(&chat_id);
            tables.messages.remove(&chat_id);
        }
        tables.grievances.retain(|_, g| g.user_id != id);
        Ok(())
    }
}

#[async_trait]
impl ChatStore for MemoryStore {
    async fn create_chat(&self, owner_id: Uuid) -> StoreResult<Chat> {
        let chat = Chat::new(owner_id);
        let mut tables = self.tables.write().await;
        tables.chats.insert(chat.id, chat.clone());
        tables.messages.insert(chat.id, Vec::new());
        Ok(chat)
    }

    async fn find_chat(&self, chat_id: Uuid, owner_id: Uuid) -> StoreResult<Option<Chat>> {
        let tables = self.tables.read().await;
        Ok(tables
            .chats
            .get(&chat_id)
            .filter(|c| c.user_id == owner_id)
            .cloned())
    }

    async fn list_chats(&self, owner_id: Uuid) -> StoreResult<Vec<Chat>> {
        let tables = self.tables.read().await;
        let mut chats: Vec<Chat> = tables
            .chats
            .values()
            .filter(|c| c.user_id == owner_id && c.message_count > 0)
            .cloned()
            .collect();
        chats.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(chats)
    }

    async fn messages(&self, chat_id: Uuid) -> StoreResult<Vec<Message>> {
        let tables = self.tables.read().await;
        Ok(tables.messages.get(&chat_id).cloned().unwrap_or_default())
    }

    async fn append_message(
        &self,
        chat_id: Uuid,
        role: Role,
        content: &str,
    ) -> StoreResult<Message> {
        let mut tables = self.tables.write().await;
        let chat = tables.chats.get_mut(&chat_id).ok_or(StoreError::NotFound)?;
        chat.message_count += 1;
        chat.updated_at = Utc::now();

        let message = Message::new(chat_id, chat.message_count, role, content);
        tables
            .messages
            .entry(chat_id)
            .or_default()
            .push(message.clone());
        Ok(message)
    }

    async fn set_title(&self, chat_id: Uuid, title: &str) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let chat = tables.chats.get_mut(&chat_id).ok_or(StoreError::NotFound)?;
        chat.title = title.to_string();
        chat.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl GrievanceStore for MemoryStore {
    async fn create_grievance(&self, grievance: &Grievance) -> StoreResult<Grievance> {
        let mut tables = self.tables.write().await;
        tables.grievances.insert(grievance.id, grievance.clone());
        Ok(grievance.clone())
    }

    async fn list_grievances_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Grievance>> {
        let tables = self.tables.read().await;
        let mut grievances: Vec<Grievance> = tables
            .grievances
            .values()
            .filter(|g| g.user_id == user_id)
            .cloned()
            .collect();
        grievances.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(grievances)
    }

    async fn list_all_grievances(&self) -> StoreResult<Vec<Grievance>> {
        let tables = self.tables.read().await;
        let mut grievances: Vec<Grievance> = tables.grievances.values().cloned().collect();
        grievances.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(grievances)
    }

    async fn respond_to_grievance(&self, id: Uuid, response: &str) -> StoreResult<Grievance> {
        let mut tables = self.tables.write().await;
        let grievance = tables.grievances.get_mut(&id).ok_or(StoreError::NotFound)?;
        grievance.response = Some(response.to_string());
        grievance.status = GrievanceStatus::Responded;
        grievance.updated_at = Utc::now();
        Ok(grievance.clone())
    }
}
