use std::sync::Arc;

use actix_web::{get, web};
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::auth::AuthenticatedUser;
use crate::models::Message;
use crate::types::ChatSummary;
use crate::AppState;

#[utoipa::path(
    get,
    path = "/api/chats",
    tag = "chats",
    responses((status = 200, description = "Chats with messages, newest activity first", body = [ChatSummary]))
)]
#[get("")]
pub async fn list_chats(
    app_state: web::Data<Arc<AppState>>,
    authenticated_user: AuthenticatedUser,
) -> Result<web::Json<Vec<ChatSummary>>, AppError> {
    let chats = app_state.chats.list_chats(authenticated_user.user.id).await?;
    Ok(web::Json(chats.into_iter().map(ChatSummary::from).collect()))
}

#[utoipa::path(
    get,
    path = "/api/chats/{chat_id}",
    tag = "chats",
    params(("chat_id" = Uuid, Path, description = "Chat id")),
    responses(
        (status = 200, body = [Message]),
        (status = 404, description = "No such chat for this user"),
    )
)]
#[get("/{chat_id}")]
pub async fn get_chat_messages(
    app_state: web::Data<Arc<AppState>>,
    authenticated_user: AuthenticatedUser,
    chat_id: web::Path<Uuid>,
) -> Result<web::Json<Vec<Message>>, AppError> {
    let chat = app_state
        .chats
        .find_chat(chat_id.into_inner(), authenticated_user.user.id)
        .await?
        .ok_or_else(|| AppError::not_found("Chat"))?;

    let messages = app_state.chats.messages(chat.id).await?;
    Ok(web::Json(messages))
}
