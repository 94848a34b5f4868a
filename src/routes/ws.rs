//! `GET /ws`: the real-time chat channel.

use std::sync::Arc;

use actix_web::{get, rt, web, HttpRequest, HttpResponse};
use actix_ws::{Message, MessageStream, Session};
use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::auth::bearer_token;
use crate::session::{Connection, EventRouter, EventSink, ServerEvent};
use crate::AppState;

#[derive(Deserialize)]
pub struct SocketQuery {
    token: Option<String>,
}

/// Writes events to one socket. Sends after the peer has gone are dropped.
struct SocketSink {
    session: Session,
}

#[async_trait]
impl EventSink for SocketSink {
    async fn emit(&self, event: ServerEvent) {
        let frame = match serde_json::to_string(&event) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Failed to encode event: {}", e);
                return;
            }
        };
        let mut session = self.session.clone();
        if session.text(frame).await.is_err() {
            debug!("Dropped event for closed socket");
        }
    }
}

/// Authenticates before upgrading; a rejected handshake never reaches the
/// router and leaves no state behind.
#[get("/ws")]
pub async fn chat_socket(
    req: HttpRequest,
    body: web::Payload,
    query: web::Query<SocketQuery>,
    app_state: web::Data<Arc<AppState>>,
) -> Result<HttpResponse, actix_web::Error> {
    let token = query
        .into_inner()
        .token
        .or_else(|| bearer_token(req.headers()).map(str::to_owned));
    let user = app_state.authenticator.authenticate(token.as_deref()).await?;

    let (response, session, stream) = actix_ws::handle(&req, body)?;
    let conn = Connection::new(user);
    info!(connection = %conn.id, user_id = %conn.user.id, "Socket connected");

    rt::spawn(run_connection(app_state.router.clone(), conn, session, stream));
    Ok(response)
}

async fn run_connection(
    router: EventRouter,
    conn: Connection,
    mut session: Session,
    mut stream: MessageStream,
) {
    let conn = Arc::new(conn);
    let sink = Arc::new(SocketSink {
        session: session.clone(),
    });
    let mut in_flight: Vec<tokio::task::JoinHandle<()>> = Vec::new();

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                // Each frame runs on its own task; handlers re-read the
                // registry binding themselves.
                let router = router.clone();
                let conn = conn.clone();
                let sink = sink.clone();
                in_flight.retain(|task| !task.is_finished());
                in_flight.push(rt::spawn(async move {
                    router.handle_frame(&conn, &text, sink.as_ref()).await;
                }));
            }
            Ok(Message::Ping(bytes)) => {
                if session.pong(&bytes).await.is_err() {
                    break;
                }
            }
            Ok(Message::Close(reason)) => {
                debug!(connection = %conn.id, "Client closed socket: {:?}", reason);
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(connection = %conn.id, "Socket protocol error: {}", e);
                break;
            }
        }
    }

    // Let running handlers finish so none can re-bind after the release.
    for task in in_flight {
        let _ = task.await;
    }
    router.disconnect(&conn).await;
    let _ = session.close(None).await;
}
