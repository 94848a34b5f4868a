use std::sync::Arc;

use actix_web::{delete, get, put, web};
use tracing::info;

use super::{normalize_email, required};
use crate::auth::hash_password;
use crate::error::AppError;
use crate::middleware::auth::AuthenticatedUser;
use crate::types::{MessageResponse, ProfileResponse, UpdateAvatarRequest, UpdateProfileRequest};
use crate::AppState;

#[utoipa::path(
    get,
    path = "/api/users/profile",
    tag = "users",
    responses(
        (status = 200, body = ProfileResponse),
        (status = 401, description = "Missing or invalid token"),
    )
)]
#[get("/profile")]
pub async fn get_profile(authenticated_user: AuthenticatedUser) -> web::Json<ProfileResponse> {
    web::Json(ProfileResponse::from(&authenticated_user.user))
}

#[utoipa::path(
    put,
    path = "/api/users/profile",
    tag = "users",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, body = ProfileResponse),
        (status = 400, description = "Email already in use"),
    )
)]
#[put("/profile")]
pub async fn update_profile(
    app_state: web::Data<Arc<AppState>>,
    authenticated_user: AuthenticatedUser,
    web::Json(body): web::Json<UpdateProfileRequest>,
) -> Result<web::Json<ProfileResponse>, AppError> {
    let mut user = authenticated_user.user;

    if let Some(name) = body.name.filter(|n| !n.trim().is_empty()) {
        user.name = name.trim().to_string();
    }
    if let Some(email) = body.email.filter(|e| !e.trim().is_empty()) {
        user.email = normalize_email(&email);
    }
    if let Some(password) = body.password.filter(|p| !p.is_empty()) {
        user.password_hash = Some(hash_password(&password)?);
    }

    let user = app_state.users.update_user(&user).await?;
    Ok(web::Json(ProfileResponse::from(&user)))
}

#[utoipa::path(
    delete,
    path = "/api/users/profile",
    tag = "users",
    responses((status = 200, body = MessageResponse))
)]
#[delete("/profile")]
pub async fn delete_profile(
    app_state: web::Data<Arc<AppState>>,
    authenticated_user: AuthenticatedUser,
) -> Result<web::Json<MessageResponse>, AppError> {
    let user_id = authenticated_user.user.id;
    app_state.users.delete_user(user_id).await?;
    info!(%user_id, "Deleted user account");
    Ok(web::Json(MessageResponse {
        message: "User removed".to_string(),
    }))
}

#[utoipa::path(
    put,
    path = "/api/users/profile/avatar",
    tag = "users",
    request_body = UpdateAvatarRequest,
    responses(
        (status = 200, body = ProfileResponse),
        (status = 400, description = "Avatar missing"),
    )
)]
#[put("/profile/avatar")]
pub async fn update_avatar(
    app_state: web::Data<Arc<AppState>>,
    authenticated_user: AuthenticatedUser,
    web::Json(body): web::Json<UpdateAvatarRequest>,
) -> Result<web::Json<ProfileResponse>, AppError> {
    let mut user = authenticated_user.user;
    user.avatar = Some(required(body.avatar, "Avatar")?);
    let user = app_state.users.update_user(&user).await?;
    Ok(web::Json(ProfileResponse::from(&user)))
}
