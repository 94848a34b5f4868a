//! In-process model with programmable behaviour. Used by the test suite
//! and by `AI_PROVIDER=scripted` for running the service without an API key.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{AiError, ChatHandle, Content, GenerativeModel};

#[derive(Clone, Debug)]
pub enum Script {
    /// Replies `"You said: <text>"`; titles are the first three words.
    Echo,
    Reply(String),
    Fail,
    /// Never resolves, for exercising timeouts.
    Hang,
}

#[derive(Default)]
struct Recorded {
    started: Vec<Vec<Content>>,
    sent: Vec<String>,
    generated: Vec<String>,
}

struct ScriptState {
    reply: Mutex<Script>,
    title: Script,
    recorded: Mutex<Recorded>,
}

#[derive(Clone)]
pub struct ScriptedModel {
    state: Arc<ScriptState>,
}

impl ScriptedModel {
    pub fn new(reply: Script, title: Script) -> Self {
        Self {
            state: Arc::new(ScriptState {
                reply: Mutex::new(reply),
                title,
                recorded: Mutex::new(Recorded::default()),
            }),
        }
    }

    pub fn echo() -> Self {
        Self::new(Script::Echo, Script::Echo)
    }

    /// Replaces the reply behaviour for every handle, live ones included.
    pub fn set_reply(&self, script: Script) {
        *lock(&self.state.reply) = script;
    }

    /// Histories every `start_chat` call was seeded with, oldest first.
    pub fn started_histories(&self) -> Vec<Vec<Content>> {
        lock(&self.state.recorded).started.clone()
    }

    /// Texts forwarded through any chat handle.
    pub fn sent_messages(&self) -> Vec<String> {
        lock(&self.state.recorded).sent.clone()
    }

    /// Texts passed to one-shot generation.
    pub fn generate_requests(&self) -> Vec<String> {
        lock(&self.state.recorded).generated.clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn run(script: Script, echo: String) -> Result<String, AiError> {
    match script {
        Script::Echo => Ok(echo),
        Script::Reply(text) => Ok(text),
        Script::Fail => Err(AiError::Transport("scripted failure".to_string())),
        Script::Hang => std::future::pending().await,
    }
}

pub struct ScriptedChat {
    state: Arc<ScriptState>,
}

#[async_trait]
impl ChatHandle for ScriptedChat {
    async fn send_message(&self, text: &str) -> Result<String, AiError> {
        lock(&self.state.recorded).sent.push(text.to_string());
        let script = lock(&self.state.reply).clone();
        run(script, format!("You said: {}", text)).await
    }
}

#[async_trait]
impl GenerativeModel for ScriptedModel {
    fn start_chat(&self, _system_instruction: String, history: Vec<Content>) -> Arc<dyn ChatHandle> {
        lock(&self.state.recorded).started.push(history);
        Arc::new(ScriptedChat {
            state: self.state.clone(),
        })
    }

    async fn generate(&self, _system_instruction: &str, text: &str) -> Result<String, AiError> {
        lock(&self.state.recorded).generated.push(text.to_string());
        let script = self.state.title.clone();
        let echo = text.split_whitespace().take(3).collect::<Vec<_>>().join(" ");
        run(script, echo).await
    }
}
