//! Connection id -> live conversational handle bound to one chat.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::ai::{ChatHandle, GenerativeModel};
use crate::codec;
use crate::models::User;
use crate::prompts::Prompts;
use crate::store::{ChatStore, StoreError};

pub type ConnectionId = Uuid;

#[derive(Clone)]
pub struct LiveSession {
    pub chat_id: Uuid,
    pub handle: Arc<dyn ChatHandle>,
}

impl fmt::Debug for LiveSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveSession")
            .field("chat_id", &self.chat_id)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("chat {0} not found")]
    ChatNotFound(Uuid),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Process-wide soft state: nothing here survives a restart, and every entry
/// can be rebuilt from the store with `materialize`.
pub struct SessionRegistry {
    chats: Arc<dyn ChatStore>,
    model: Arc<dyn GenerativeModel>,
    sessions: RwLock<HashMap<ConnectionId, LiveSession>>,
}

impl SessionRegistry {
    pub fn new(chats: Arc<dyn ChatStore>, model: Arc<dyn GenerativeModel>) -> Self {
        Self {
            chats,
            model,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Loads `chat_id` (owned by `owner`) with its full history and installs a
    /// fresh handle for `conn`, replacing any previous binding. On error the
    /// previous binding is left as it was.
    pub async fn materialize(
        &self,
        conn: ConnectionId,
        owner: &User,
        chat_id: Uuid,
    ) -> Result<LiveSession, RegistryError> {
        let chat = self
            .chats
            .find_chat(chat_id, owner.id)
            .await?
            .ok_or(RegistryError::ChatNotFound(chat_id))?;
        let history = self.chats.messages(chat.id).await?;

        let handle = self
            .model
            .start_chat(Prompts::assistant_persona(&owner.name), codec::encode(&history));
        let session = LiveSession {
            chat_id: chat.id,
            handle,
        };

        let replaced = self.sessions.write().await.insert(conn, session.clone());
        info!(
            connection = %conn,
            chat_id = %chat.id,
            turns = history.len(),
            replaced = replaced.is_some(),
            "Materialized chat session"
        );
        Ok(session)
    }

    /// Creates an empty chat for `owner` and binds `conn` to it. A chat whose
    /// materialization fails after creation is left in the store.
    pub async fn create_and_materialize(
        &self,
        conn: ConnectionId,
        owner: &User,
    ) -> Result<Uuid, RegistryError> {
        let chat = self.chats.create_chat(owner.id).await?;
        self.materialize(conn, owner, chat.id).await?;
        Ok(chat.id)
    }

    pub async fn get(&self, conn: ConnectionId) -> Option<LiveSession> {
        self.sessions.read().await.get(&conn).cloned()
    }

    pub async fn release(&self, conn: ConnectionId) {
        if self.sessions.write().await.remove(&conn).is_some() {
            debug!(connection = %conn, "Released chat session");
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{Content, ScriptedModel};
    use crate::models::Role;
    use crate::store::{MemoryStore, UserStore};

    struct Fixture {
        store: Arc<MemoryStore>,
        model: ScriptedModel,
        registry: SessionRegistry,
        owner: User,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let model = ScriptedModel::echo();
        let registry = SessionRegistry::new(store.clone(), Arc::new(model.clone()));
        let owner = store
            .create_user(&User::new("Asha", "asha@example.com"))
            .await
            .unwrap();
        Fixture {
            store,
            model,
            registry,
            owner,
        }
    }

    #[tokio::test]
    async fn test_create_and_materialize_binds_empty_chat() {
        let f = fixture().await;
        let conn = Uuid::new_v4();

        let chat_id = f.registry.create_and_materialize(conn, &f.owner).await.unwrap();

        let session = f.registry.get(conn).await.unwrap();
        assert_eq!(session.chat_id, chat_id);
        let chat = f.store.find_chat(chat_id, f.owner.id).await.unwrap().unwrap();
        assert!(chat.has_placeholder_title());
        assert_eq!(chat.message_count, 0);
        assert_eq!(f.model.started_histories(), vec![Vec::<Content>::new()]);
    }

    #[tokio::test]
    async fn test_materialize_seeds_full_history() {
        let f = fixture().await;
        let chat = f.store.create_chat(f.owner.id).await.unwrap();
        f.store.append_message(chat.id, Role::User, "Hi").await.unwrap();
        f.store.append_message(chat.id, Role::Model, "Hello!").await.unwrap();

        f.registry.materialize(Uuid::new_v4(), &f.owner, chat.id).await.unwrap();

        assert_eq!(
            f.model.started_histories(),
            vec![vec![Content::user("Hi"), Content::model("Hello!")]]
        );
    }

    #[tokio::test]
    async fn test_switching_chats_replaces_binding() {
        let f = fixture().await;
        let conn = Uuid::new_v4();
        let first = f.store.create_chat(f.owner.id).await.unwrap();
        let second = f.store.create_chat(f.owner.id).await.unwrap();

        f.registry.materialize(conn, &f.owner, first.id).await.unwrap();
        f.registry.materialize(conn, &f.owner, second.id).await.unwrap();

        assert_eq!(f.registry.len().await, 1);
        assert_eq!(f.registry.get(conn).await.unwrap().chat_id, second.id);
    }

    #[tokio::test]
    async fn test_failed_materialize_keeps_previous_binding() {
        let f = fixture().await;
        let conn = Uuid::new_v4();
        let chat = f.store.create_chat(f.owner.id).await.unwrap();
        f.registry.materialize(conn, &f.owner, chat.id).await.unwrap();

        let missing = Uuid::new_v4();
        let err = f.registry.materialize(conn, &f.owner, missing).await.unwrap_err();

        assert!(matches!(err, RegistryError::ChatNotFound(id) if id == missing));
        assert_eq!(f.registry.get(conn).await.unwrap().chat_id, chat.id);
    }

    #[tokio::test]
    async fn test_foreign_chat_is_not_found() {
        let f = fixture().await;
        let other = f
            .store
            .create_user(&User::new("Ben", "ben@example.com"))
            .await
            .unwrap();
        let theirs = f.store.create_chat(other.id).await.unwrap();

        let err = f
            .registry
            .materialize(Uuid::new_v4(), &f.owner, theirs.id)
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::ChatNotFound(_)));
        assert!(f.registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let f = fixture().await;
        let conn = Uuid::new_v4();
        f.registry.create_and_materialize(conn, &f.owner).await.unwrap();

        f.registry.release(conn).await;
        f.registry.release(conn).await;

        assert!(f.registry.get(conn).await.is_none());
        assert!(f.registry.is_empty().await);
    }
}
