use std::sync::Arc;

use actix_web::{get, http::StatusCode, post, web, HttpResponse, Responder};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::{normalize_email, required};
use crate::auth::{hash_password, verify_password};
use crate::config::GoogleOAuthConfig;
use crate::error::{AppError, AuthFailure};
use crate::models::User;
use crate::store::UserStore;
use crate::types::{AuthResponse, LoginRequest, OAuthCallbackQuery, RegisterRequest};
use crate::AppState;

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";

fn sign_in(app_state: &AppState, user: &User) -> Result<AuthResponse, AppError> {
    let token = app_state
        .authenticator
        .keys()
        .sign(user.id)
        .map_err(|e| AppError::Internal(format!("Failed to sign token: {}", e)))?;
    Ok(AuthResponse::new(user, token))
}

#[utoipa::path(
    post,
    path = "/api/auth/register",
    tag = "auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = AuthResponse),
        (status = 400, description = "Missing field or email already registered"),
    )
)]
#[post("/register")]
pub async fn register(
    app_state: web::Data<Arc<AppState>>,
    web::Json(body): web::Json<RegisterRequest>,
) -> Result<HttpResponse, AppError> {
    let name = required(body.name, "Name")?;
    let email = normalize_email(&required(body.email, "Email")?);
    let password = required(body.password, "Password")?;

    if app_state.users.find_user_by_email(&email).await?.is_some() {
        return Err(AppError::validation("User already exists"));
    }

    let mut user = User::new(&name, &email);
    user.password_hash = Some(hash_password(&password)?);
    let user = app_state.users.create_user(&user).await?;

    info!(user_id = %user.id, "Registered user");
    Ok(HttpResponse::Created().json(sign_in(&app_state, &user)?))
}

#[utoipa::path(
    post,
    path = "/api/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in", body = AuthResponse),
        (status = 400, description = "Missing field"),
        (status = 401, description = "Invalid email or password"),
    )
)]
#[post("/login")]
pub async fn login(
    app_state: web::Data<Arc<AppState>>,
    web::Json(body): web::Json<LoginRequest>,
) -> Result<web::Json<AuthResponse>, AppError> {
    let email = normalize_email(&required(body.email, "Email")?);
    let password = required(body.password, "Password")?;

    let user = app_state.users.find_user_by_email(&email).await?;
    let verified = user.filter(|user| {
        user.password_hash
            .as_deref()
            .map(|hash| verify_password(&password, hash))
            .unwrap_or(false)
    });

    match verified {
        Some(user) => Ok(web::Json(sign_in(&app_state, &user)?)),
        None => {
            info!("Failed login attempt");
            Err(AppError::Unauthenticated(AuthFailure::InvalidCredential))
        }
    }
}

fn found(url: String) -> web::Redirect {
    web::Redirect::to(url).using_status_code(StatusCode::FOUND)
}

fn login_failed(app_state: &AppState) -> web::Redirect {
    found(format!("{}/login/failed", app_state.config.client_url))
}

fn google_config(app_state: &AppState) -> Result<&GoogleOAuthConfig, AppError> {
    app_state
        .config
        .google
        .as_ref()
        .ok_or_else(|| AppError::NotFound("Google sign-in is not configured".to_string()))
}

#[get("/google")]
pub async fn google_login(app_state: web::Data<Arc<AppState>>) -> Result<impl Responder, AppError> {
    let google = google_config(&app_state)?;
    let url = Url::parse_with_params(
        GOOGLE_AUTH_URL,
        &[
            ("client_id", google.client_id.as_str()),
            ("redirect_uri", google.redirect_url.as_str()),
            ("response_type", "code"),
            ("scope", "openid email profile"),
            ("prompt", "select_account"),
        ],
    )
    .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(found(url.to_string()))
}

#[derive(Serialize)]
struct GoogleTokenRequest<'a> {
    code: &'a str,
    client_id: &'a str,
    client_secret: &'a str,
    redirect_uri: &'a str,
    grant_type: &'a str,
}

#[derive(Deserialize)]
struct GoogleTokenResponse {
    access_token: String,
}

#[derive(Deserialize, Debug)]
pub struct GoogleProfile {
    pub sub: String,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
}

async fn exchange_code_for_profile(
    client: &reqwest::Client,
    google: &GoogleOAuthConfig,
    code: &str,
) -> Result<GoogleProfile, AppError> {
    let upstream = |e: reqwest::Error| AppError::Internal(format!("Google request failed: {}", e));

    let response = client
        .post(GOOGLE_TOKEN_URL)
        .form(&GoogleTokenRequest {
            code,
            client_id: &google.client_id,
            client_secret: &google.client_secret,
            redirect_uri: &google.redirect_url,
            grant_type: "authorization_code",
        })
        .send()
        .await
        .map_err(upstream)?;

    if !response.status().is_success() {
        let error_body = response
            .text()
            .await
            .unwrap_or_else(|_| "Failed to read response body".to_string());
        error!("Error response from Google token endpoint: {}", error_body);
        return Err(AppError::Unauthenticated(AuthFailure::InvalidCredential));
    }
    let token = response.json::<GoogleTokenResponse>().await.map_err(upstream)?;

    let response = client
        .get(GOOGLE_USERINFO_URL)
        .bearer_auth(&token.access_token)
        .send()
        .await
        .map_err(upstream)?;

    if !response.status().is_success() {
        error!("Google userinfo returned {}", response.status());
        return Err(AppError::Unauthenticated(AuthFailure::InvalidCredential));
    }
    response.json::<GoogleProfile>().await.map_err(upstream)
}

/// Finds the account for a Google identity: by Google id, else by email
/// (linking the Google id to it), else a new account.
pub async fn link_google_account(
    users: &dyn UserStore,
    profile: &GoogleProfile,
) -> Result<User, AppError> {
    if let Some(user) = users.find_user_by_google_id(&profile.sub).await? {
        return Ok(user);
    }

    let email = normalize_email(&profile.email);
    if let Some(mut user) = users.find_user_by_email(&email).await? {
        user.google_id = Some(profile.sub.clone());
        if user.avatar.is_none() {
            user.avatar = profile.picture.clone();
        }
        info!(user_id = %user.id, "Linked Google account to existing user");
        return Ok(users.update_user(&user).await?);
    }

    let name = profile
        .name
        .clone()
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_string());
    let mut user = User::new(&name, &email);
    user.google_id = Some(profile.sub.clone());
    user.avatar = profile.picture.clone();

    Ok(users.create_user(&user).await?)
}

#[get("/google/callback")]
pub async fn google_callback(
    app_state: web::Data<Arc<AppState>>,
    query: web::Query<OAuthCallbackQuery>,
) -> impl Responder {
    let query = query.into_inner();
    let Some(code) = query.code.filter(|code| !code.is_empty()) else {
        warn!("Google callback without code: {:?}", query.error);
        return login_failed(&app_state);
    };

    let result = async {
        let google = google_config(&app_state)?;
        let profile = exchange_code_for_profile(&app_state.http_client, google, &code).await?;
        let user = link_google_account(app_state.users.as_ref(), &profile).await?;
        sign_in(&app_state, &user)
    }
    .await;

    match result {
        Ok(auth) => {
            info!(user_id = %auth.id, "Google sign-in succeeded");
            found(format!("{}/home?token={}", app_state.config.client_url, auth.token))
        }
        Err(e) => {
            error!("Google sign-in failed: {}", e);
            login_failed(&app_state)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn profile(sub: &str, email: &str) -> GoogleProfile {
        GoogleProfile {
            sub: sub.to_string(),
            email: email.to_string(),
            name: Some("Asha Rao".to_string()),
            picture: Some("https://example.com/a.png".to_string()),
        }
    }

    #[tokio::test]
    async fn test_link_creates_new_account() {
        let store = MemoryStore::new();
        let user = link_google_account(&store, &profile("g-1", "Asha@Example.com")).await.unwrap();

        assert_eq!(user.email, "asha@example.com");
        assert_eq!(user.google_id.as_deref(), Some("g-1"));
        assert_eq!(user.name, "Asha Rao");
    }

    #[tokio::test]
    async fn test_link_attaches_to_existing_email() {
        let store = MemoryStore::new();
        let existing = store.create_user(&User::new("Asha", "asha@example.com")).await.unwrap();

        let user = link_google_account(&store, &profile("g-1", "asha@example.com")).await.unwrap();

        assert_eq!(user.id, existing.id);
        assert_eq!(user.google_id.as_deref(), Some("g-1"));
        assert_eq!(user.avatar.as_deref(), Some("https://example.com/a.png"));
    }

    #[tokio::test]
    async fn test_link_prefers_google_id() {
        let store = MemoryStore::new();
        let first = link_google_account(&store, &profile("g-1", "asha@example.com")).await.unwrap();

        // Email changed on the Google side; the subject id still matches.
        let again = link_google_account(&store, &profile("g-1", "asha.rao@example.com")).await.unwrap();

        assert_eq!(again.id, first.id);
        assert_eq!(again.email, "asha@example.com");
    }
}
