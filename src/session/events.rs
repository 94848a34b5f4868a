//! Socket frames. Every frame is `{"event": <name>, "data": <payload>}`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SendMessagePayload {
    pub message: String,
    #[serde(rename = "chatId")]
    pub chat_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    JoinChat(Uuid),
    CreateNewChat,
    SendMessage(SendMessagePayload),
}

pub const JOIN_CHAT: &str = "joinChat";
pub const CREATE_NEW_CHAT: &str = "createNewChat";
pub const SEND_MESSAGE: &str = "sendMessage";

#[derive(Deserialize)]
struct RawFrame {
    event: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, PartialEq, Eq)]
pub enum FrameError {
    /// Not an event frame, or an event name nothing handles.
    Unrecognized(String),
    /// A known event whose payload did not parse.
    BadPayload { event: &'static str, reason: String },
}

fn bad_payload(event: &'static str) -> impl Fn(serde_json::Error) -> FrameError {
    move |e| FrameError::BadPayload {
        event,
        reason: e.to_string(),
    }
}

impl ClientEvent {
    /// Reads the event name first so a known event with a broken payload
    /// can still be answered.
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let raw: RawFrame =
            serde_json::from_str(text).map_err(|e| FrameError::Unrecognized(e.to_string()))?;

        match raw.event.as_str() {
            JOIN_CHAT => serde_json::from_value(raw.data)
                .map(ClientEvent::JoinChat)
                .map_err(bad_payload(JOIN_CHAT)),
            CREATE_NEW_CHAT => Ok(ClientEvent::CreateNewChat),
            SEND_MESSAGE => serde_json::from_value(raw.data)
                .map(ClientEvent::SendMessage)
                .map_err(bad_payload(SEND_MESSAGE)),
            other => Err(FrameError::Unrecognized(format!("unknown event `{}`", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    ChatCreated(Uuid),
    ReceiveMessage {
        content: String,
        #[serde(rename = "chatId")]
        chat_id: Uuid,
    },
    TitleUpdated {
        #[serde(rename = "chatId")]
        chat_id: Uuid,
        #[serde(rename = "newTitle")]
        new_title: String,
    },
    Error {
        message: String,
    },
}

impl ServerEvent {
    pub fn error(message: &str) -> Self {
        ServerEvent::Error {
            message: message.to_string(),
        }
    }
}

/// Outbound side of one connection.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: ServerEvent);
}
