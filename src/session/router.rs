//! Per-connection event handling: join, create, send, disconnect.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::events::{ClientEvent, EventSink, FrameError, SendMessagePayload, ServerEvent, JOIN_CHAT};
use super::registry::{ConnectionId, LiveSession, SessionRegistry};
use crate::ai::bounded;
use crate::models::{Role, User};
use crate::store::ChatStore;
use crate::title::TitleSummarizer;

pub const JOIN_FAILED: &str = "Failed to join chat";
pub const CREATE_FAILED: &str = "Failed to create new chat";
pub const EMPTY_MESSAGE: &str = "Message must not be empty";
pub const RESYNC_FAILED_NOTICE: &str = "Sorry, I couldn't connect to this chat.";
pub const FALLBACK_NOTICE: &str = "Sorry, an error occurred. Please try again.";

/// An authenticated socket. The user is fixed at handshake.
#[derive(Clone, Debug)]
pub struct Connection {
    pub id: ConnectionId,
    pub user: User,
}

impl Connection {
    pub fn new(user: User) -> Self {
        Self {
            id: Uuid::new_v4(),
            user,
        }
    }
}

#[derive(Clone)]
pub struct EventRouter {
    registry: Arc<SessionRegistry>,
    chats: Arc<dyn ChatStore>,
    titles: Arc<TitleSummarizer>,
    reply_timeout: Duration,
}

impl EventRouter {
    pub fn new(
        registry: Arc<SessionRegistry>,
        chats: Arc<dyn ChatStore>,
        titles: Arc<TitleSummarizer>,
        reply_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            chats,
            titles,
            reply_timeout,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Entry point for one text frame. A known event with an unreadable
    /// payload is answered with an error; anything else unreadable is dropped.
    pub async fn handle_frame(&self, conn: &Connection, text: &str, sink: &dyn EventSink) {
        match ClientEvent::parse(text) {
            Ok(event) => self.dispatch(conn, event, sink).await,
            Err(FrameError::BadPayload { event, reason }) => {
                warn!(connection = %conn.id, event, "Rejected event payload: {}", reason);
                let message = if event == JOIN_CHAT {
                    JOIN_FAILED
                } else {
                    RESYNC_FAILED_NOTICE
                };
                sink.emit(ServerEvent::error(message)).await;
            }
            Err(FrameError::Unrecognized(reason)) => {
                debug!(connection = %conn.id, "Ignoring frame: {}", reason);
            }
        }
    }

    pub async fn dispatch(&self, conn: &Connection, event: ClientEvent, sink: &dyn EventSink) {
        match event {
            ClientEvent::JoinChat(chat_id) => self.join_chat(conn, chat_id, sink).await,
            ClientEvent::CreateNewChat => self.create_new_chat(conn, sink).await,
            ClientEvent::SendMessage(payload) => self.send_message(conn, payload, sink).await,
        }
    }

    #[instrument(skip_all, fields(connection = %conn.id, chat_id = %chat_id))]
    pub async fn join_chat(&self, conn: &Connection, chat_id: Uuid, sink: &dyn EventSink) {
        if let Err(e) = self.registry.materialize(conn.id, &conn.user, chat_id).await {
            warn!("Failed to join chat: {}", e);
            sink.emit(ServerEvent::error(JOIN_FAILED)).await;
        }
    }

    #[instrument(skip_all, fields(connection = %conn.id))]
    pub async fn create_new_chat(&self, conn: &Connection, sink: &dyn EventSink) {
        match self.registry.create_and_materialize(conn.id, &conn.user).await {
            Ok(chat_id) => {
                info!(%chat_id, "Created chat");
                sink.emit(ServerEvent::ChatCreated(chat_id)).await;
            }
            Err(e) => {
                error!("Failed to create new chat: {}", e);
                sink.emit(ServerEvent::error(CREATE_FAILED)).await;
            }
        }
    }

    /// Binding for `chat_id`, re-materializing when the connection is bound
    /// elsewhere or not at all.
    async fn resync(&self, conn: &Connection, chat_id: Uuid) -> Option<LiveSession> {
        if let Some(session) = self.registry.get(conn.id).await {
            if session.chat_id == chat_id {
                return Some(session);
            }
        }
        match self.registry.materialize(conn.id, &conn.user, chat_id).await {
            Ok(session) => Some(session),
            Err(e) => {
                warn!("Failed to re-synchronize chat session: {}", e);
                None
            }
        }
    }

    #[instrument(skip_all, fields(connection = %conn.id, chat_id = %payload.chat_id))]
    pub async fn send_message(
        &self,
        conn: &Connection,
        payload: SendMessagePayload,
        sink: &dyn EventSink,
    ) {
        let SendMessagePayload { message, chat_id } = payload;
        if message.trim().is_empty() {
            sink.emit(ServerEvent::error(EMPTY_MESSAGE)).await;
            return;
        }

        let Some(session) = self.resync(conn, chat_id).await else {
            sink.emit(receive(RESYNC_FAILED_NOTICE, chat_id)).await;
            return;
        };

        let appended = match self.chats.append_message(chat_id, Role::User, &message).await {
            Ok(appended) => appended,
            Err(e) => {
                error!("Failed to save user message: {}", e);
                sink.emit(receive(FALLBACK_NOTICE, chat_id)).await;
                return;
            }
        };

        if appended.seq == 1 {
            self.assign_title(chat_id, &message, sink).await;
        }

        let reply = match bounded(self.reply_timeout, session.handle.send_message(&message)).await {
            Ok(reply) => reply,
            Err(e) => {
                error!("Error from AI service: {}", e);
                sink.emit(receive(FALLBACK_NOTICE, chat_id)).await;
                return;
            }
        };

        // The human turn stays persisted even if this write fails.
        if let Err(e) = self.chats.append_message(chat_id, Role::Model, &reply).await {
            error!("Failed to save model reply: {}", e);
        }

        sink.emit(receive(&reply, chat_id)).await;
    }

    /// Runs once per chat, after its first message is stored. A failed
    /// summary leaves the placeholder title and emits nothing.
    pub async fn assign_title(&self, chat_id: Uuid, first_message: &str, sink: &dyn EventSink) {
        let title = match self.titles.try_summarize(first_message).await {
            Ok(title) => title,
            Err(e) => {
                warn!(%chat_id, "Title generation failed, keeping placeholder: {}", e);
                return;
            }
        };

        if let Err(e) = self.chats.set_title(chat_id, &title).await {
            error!(%chat_id, "Failed to save chat title: {}", e);
            return;
        }

        sink.emit(ServerEvent::TitleUpdated {
            chat_id,
            new_title: title,
        })
        .await;
    }

    pub async fn disconnect(&self, conn: &Connection) {
        self.registry.release(conn.id).await;
        info!(connection = %conn.id, "Connection closed");
    }
}

fn receive(content: &str, chat_id: Uuid) -> ServerEvent {
    ServerEvent::ReceiveMessage {
        content: content.to_string(),
        chat_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{Content, Script, ScriptedModel};
    use crate::models::PLACEHOLDER_TITLE;
    use crate::store::{MemoryStore, UserStore};
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<ServerEvent>>,
    }

    impl RecordingSink {
        fn take(&self) -> Vec<ServerEvent> {
            std::mem::take(&mut *self.events.lock().unwrap())
        }
    }

    #[async_trait]
    impl EventSink for RecordingSink {
        async fn emit(&self, event: ServerEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        model: ScriptedModel,
        router: EventRouter,
        conn: Connection,
        sink: RecordingSink,
    }

    async fn fixture(model: ScriptedModel) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let shared: Arc<dyn crate::ai::GenerativeModel> = Arc::new(model.clone());
        let registry = Arc::new(SessionRegistry::new(store.clone(), shared.clone()));
        let titles = Arc::new(TitleSummarizer::new(shared, Duration::from_millis(200)));
        let router = EventRouter::new(registry, store.clone(), titles, Duration::from_millis(200));
        let user = store
            .create_user(&User::new("Asha", "asha@example.com"))
            .await
            .unwrap();
        Fixture {
            store,
            model,
            router,
            conn: Connection::new(user),
            sink: RecordingSink::default(),
        }
    }

    impl Fixture {
        async fn create_chat(&self) -> Uuid {
            self.router.create_new_chat(&self.conn, &self.sink).await;
            match self.sink.take().as_slice() {
                [ServerEvent::ChatCreated(id)] => *id,
                other => panic!("expected chatCreated, got {:?}", other),
            }
        }

        async fn send(&self, chat_id: Uuid, message: &str) {
            let event = ClientEvent::SendMessage(SendMessagePayload {
                message: message.to_string(),
                chat_id,
            });
            self.router.dispatch(&self.conn, event, &self.sink).await;
        }

        async fn contents(&self, chat_id: Uuid) -> Vec<(Role, String)> {
            self.store
                .messages(chat_id)
                .await
                .unwrap()
                .into_iter()
                .map(|m| (m.role, m.content))
                .collect()
        }
    }

    #[tokio::test]
    async fn test_hello_scenario() {
        let f = fixture(ScriptedModel::new(
            Script::Reply("Hi there! How are you feeling?".to_string()),
            Script::Reply("Greeting".to_string()),
        ))
        .await;
        let chat_id = f.create_chat().await;

        let chat = f.store.find_chat(chat_id, f.conn.user.id).await.unwrap().unwrap();
        assert_eq!(chat.title, PLACEHOLDER_TITLE);
        assert!(f.store.messages(chat_id).await.unwrap().is_empty());

        f.send(chat_id, "Hello").await;

        assert_eq!(
            f.sink.take(),
            vec![
                ServerEvent::TitleUpdated {
                    chat_id,
                    new_title: "Greeting".to_string()
                },
                receive("Hi there! How are you feeling?", chat_id),
            ]
        );
        assert_eq!(
            f.contents(chat_id).await,
            vec![
                (Role::User, "Hello".to_string()),
                (Role::Model, "Hi there! How are you feeling?".to_string()),
            ]
        );
        let chat = f.store.find_chat(chat_id, f.conn.user.id).await.unwrap().unwrap();
        assert_eq!(chat.title, "Greeting");
    }

    #[tokio::test]
    async fn test_title_assigned_only_once() {
        let f = fixture(ScriptedModel::echo()).await;
        let chat_id = f.create_chat().await;

        f.send(chat_id, "Exams are stressing me out").await;
        f.send(chat_id, "What should I do first?").await;

        let titles: Vec<_> = f
            .sink
            .take()
            .into_iter()
            .filter(|e| matches!(e, ServerEvent::TitleUpdated { .. }))
            .collect();
        assert_eq!(
            titles,
            vec![ServerEvent::TitleUpdated {
                chat_id,
                new_title: "Exams are stressing".to_string()
            }]
        );
        assert_eq!(f.model.generate_requests().len(), 1);
    }

    #[tokio::test]
    async fn test_title_failure_keeps_placeholder_silently() {
        let f = fixture(ScriptedModel::new(Script::Echo, Script::Fail)).await;
        let chat_id = f.create_chat().await;

        f.send(chat_id, "Hello").await;

        assert_eq!(f.sink.take(), vec![receive("You said: Hello", chat_id)]);
        let chat = f.store.find_chat(chat_id, f.conn.user.id).await.unwrap().unwrap();
        assert_eq!(chat.title, PLACEHOLDER_TITLE);
    }

    #[tokio::test]
    async fn test_upstream_failure_keeps_human_message_only() {
        let f = fixture(ScriptedModel::new(Script::Fail, Script::Reply("Greeting".to_string()))).await;
        let chat_id = f.create_chat().await;

        f.send(chat_id, "Hello").await;

        let notices: Vec<_> = f
            .sink
            .take()
            .into_iter()
            .filter(|e| matches!(e, ServerEvent::ReceiveMessage { .. }))
            .collect();
        assert_eq!(notices, vec![receive(FALLBACK_NOTICE, chat_id)]);
        assert_eq!(f.contents(chat_id).await, vec![(Role::User, "Hello".to_string())]);
    }

    #[tokio::test]
    async fn test_chat_recovers_after_upstream_failure() {
        let f = fixture(ScriptedModel::new(Script::Fail, Script::Reply("Greeting".to_string()))).await;
        let chat_id = f.create_chat().await;
        f.send(chat_id, "Hello").await;
        f.sink.take();

        f.model.set_reply(Script::Echo);
        f.send(chat_id, "Still there?").await;

        assert_eq!(f.sink.take(), vec![receive("You said: Still there?", chat_id)]);
        assert_eq!(
            f.contents(chat_id).await,
            vec![
                (Role::User, "Hello".to_string()),
                (Role::User, "Still there?".to_string()),
                (Role::Model, "You said: Still there?".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_upstream_timeout_is_a_failure() {
        let f = fixture(ScriptedModel::new(Script::Hang, Script::Fail)).await;
        let chat_id = f.create_chat().await;

        f.send(chat_id, "Hello").await;

        assert_eq!(f.sink.take(), vec![receive(FALLBACK_NOTICE, chat_id)]);
        assert_eq!(f.contents(chat_id).await, vec![(Role::User, "Hello".to_string())]);
    }

    #[tokio::test]
    async fn test_stale_binding_resyncs_into_target_chat() {
        let f = fixture(ScriptedModel::echo()).await;
        let first = f.create_chat().await;
        f.send(first, "First chat message").await;
        let second = f.create_chat().await;
        f.sink.take();

        // Bound to `second`; send into `first`.
        f.send(first, "Back to the first").await;

        assert_eq!(f.contents(second).await, vec![]);
        assert_eq!(f.contents(first).await.len(), 4);
        assert_eq!(
            f.router.registry().get(f.conn.id).await.unwrap().chat_id,
            first
        );
        // The rebuilt handle saw the full history of `first`.
        let seeded = f.model.started_histories().last().cloned().unwrap();
        assert_eq!(
            seeded,
            vec![
                Content::user("First chat message"),
                Content::model("You said: First chat message"),
            ]
        );
    }

    #[tokio::test]
    async fn test_send_without_binding_materializes() {
        let f = fixture(ScriptedModel::echo()).await;
        let chat = f.store.create_chat(f.conn.user.id).await.unwrap();

        f.send(chat.id, "Hi").await;

        assert_eq!(f.sink.take().last(), Some(&receive("You said: Hi", chat.id)));
        assert_eq!(f.contents(chat.id).await.len(), 2);
    }

    #[tokio::test]
    async fn test_send_to_unknown_chat_reports_connection_failure() {
        let f = fixture(ScriptedModel::echo()).await;
        let missing = Uuid::new_v4();

        f.send(missing, "Hi").await;

        assert_eq!(f.sink.take(), vec![receive(RESYNC_FAILED_NOTICE, missing)]);
        assert!(f.model.sent_messages().is_empty());
    }

    #[tokio::test]
    async fn test_empty_message_rejected() {
        let f = fixture(ScriptedModel::echo()).await;
        let chat_id = f.create_chat().await;

        f.send(chat_id, "   ").await;

        assert_eq!(f.sink.take(), vec![ServerEvent::error(EMPTY_MESSAGE)]);
        assert!(f.contents(chat_id).await.is_empty());
    }

    #[tokio::test]
    async fn test_join_sequence_leaves_one_session() {
        let f = fixture(ScriptedModel::echo()).await;
        let c1 = f.store.create_chat(f.conn.user.id).await.unwrap();
        f.store.append_message(c1.id, Role::User, "kept").await.unwrap();
        let c2 = f.store.create_chat(f.conn.user.id).await.unwrap();

        f.router.dispatch(&f.conn, ClientEvent::JoinChat(c1.id), &f.sink).await;
        f.router.dispatch(&f.conn, ClientEvent::JoinChat(c2.id), &f.sink).await;

        assert!(f.sink.take().is_empty());
        assert_eq!(f.router.registry().len().await, 1);
        assert_eq!(f.router.registry().get(f.conn.id).await.unwrap().chat_id, c2.id);
        assert_eq!(f.contents(c1.id).await, vec![(Role::User, "kept".to_string())]);
    }

    #[tokio::test]
    async fn test_join_unknown_chat_emits_error() {
        let f = fixture(ScriptedModel::echo()).await;

        f.router.join_chat(&f.conn, Uuid::new_v4(), &f.sink).await;

        assert_eq!(f.sink.take(), vec![ServerEvent::error(JOIN_FAILED)]);
        assert!(f.router.registry().is_empty().await);
    }

    #[tokio::test]
    async fn test_join_with_malformed_chat_id_emits_error() {
        let f = fixture(ScriptedModel::echo()).await;

        f.router
            .handle_frame(&f.conn, r#"{"event":"joinChat","data":"not-a-chat-id"}"#, &f.sink)
            .await;

        assert_eq!(f.sink.take(), vec![ServerEvent::error(JOIN_FAILED)]);
        assert!(f.router.registry().is_empty().await);
    }

    #[tokio::test]
    async fn test_send_with_malformed_chat_id_emits_error() {
        let f = fixture(ScriptedModel::echo()).await;

        f.router
            .handle_frame(
                &f.conn,
                r#"{"event":"sendMessage","data":{"message":"Hi","chatId":"zzz"}}"#,
                &f.sink,
            )
            .await;

        assert_eq!(f.sink.take(), vec![ServerEvent::error(RESYNC_FAILED_NOTICE)]);
        assert!(f.model.sent_messages().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_frames_are_dropped() {
        let f = fixture(ScriptedModel::echo()).await;

        f.router
            .handle_frame(&f.conn, r#"{"event":"deleteChat","data":null}"#, &f.sink)
            .await;
        f.router.handle_frame(&f.conn, "not json", &f.sink).await;

        assert!(f.sink.take().is_empty());
        assert!(f.router.registry().is_empty().await);
    }

    #[tokio::test]
    async fn test_frame_dispatches_known_event() {
        let f = fixture(ScriptedModel::echo()).await;

        f.router
            .handle_frame(&f.conn, r#"{"event":"createNewChat"}"#, &f.sink)
            .await;

        assert!(matches!(f.sink.take().as_slice(), [ServerEvent::ChatCreated(_)]));
        assert_eq!(f.router.registry().len().await, 1);
    }

    #[tokio::test]
    async fn test_disconnect_releases_session() {
        let f = fixture(ScriptedModel::echo()).await;
        f.create_chat().await;

        f.router.disconnect(&f.conn).await;

        assert!(f.router.registry().is_empty().await);
    }
}
