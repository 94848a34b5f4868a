use std::sync::Arc;

use actix_web::http::header::{HeaderMap, AUTHORIZATION};
use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{AppError, AuthFailure};
use crate::models::User;
use crate::store::UserStore;

/// Issued tokens stay valid for 30 days.
const TOKEN_TTL_SECS: usize = 60 * 60 * 24 * 30;

#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    pub iat: usize,
}

impl JwtKeys {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }

    pub fn sign(&self, user_id: Uuid) -> Result<String, jsonwebtoken::errors::Error> {
        let now = Utc::now().timestamp() as usize;
        let claims = Claims {
            sub: user_id.to_string(),
            exp: now + TOKEN_TTL_SECS,
            iat: now,
        };
        encode(&Header::default(), &claims, &self.encoding)
    }

    /// Checks signature and expiry, returning the claims.
    pub fn verify(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        decode::<Claims>(token, &self.decoding, &Validation::default()).map(|data| data.claims)
    }
}

pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))
}

/// False for malformed stored hashes as well as mismatches.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            warn!("Stored password hash is malformed: {}", e);
            false
        }
    }
}

/// Pulls the token out of an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Resolves a bearer credential to a stored user. Shared by the HTTP
/// middleware and the WebSocket handshake.
#[derive(Clone)]
pub struct Authenticator {
    keys: JwtKeys,
    users: Arc<dyn UserStore>,
}

impl Authenticator {
    pub fn new(keys: JwtKeys, users: Arc<dyn UserStore>) -> Self {
        Self { keys, users }
    }

    pub fn keys(&self) -> &JwtKeys {
        &self.keys
    }

    pub async fn authenticate(&self, token: Option<&str>) -> Result<User, AppError> {
        let token = token
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(AppError::Unauthenticated(AuthFailure::NoCredential))?;

        let claims = self.keys.verify(token).map_err(|e| {
            warn!("Invalid token: {:?}", e);
            AppError::Unauthenticated(AuthFailure::InvalidCredential)
        })?;

        let user_id = Uuid::parse_str(&claims.sub)
            .map_err(|_| AppError::Unauthenticated(AuthFailure::InvalidCredential))?;

        match self.users.find_user(user_id).await? {
            Some(user) => {
                info!(user_id = %user.id, "Authenticated user");
                Ok(user)
            }
            None => {
                warn!(%user_id, "Token subject has no user");
                Err(AppError::Unauthenticated(AuthFailure::UnknownSubject))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use actix_web::http::header::HeaderValue;

    fn authenticator() -> (Authenticator, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (
            Authenticator::new(JwtKeys::new(b"test-secret"), store.clone()),
            store,
        )
    }

    fn failure(result: Result<User, AppError>) -> AuthFailure {
        match result {
            Err(AppError::Unauthenticated(reason)) => reason,
            other => panic!("expected an authentication failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_valid_token_resolves_user() {
        let (auth, store) = authenticator();
        let user = store.create_user(&User::new("Asha", "asha@example.com")).await.unwrap();
        let token = auth.keys().sign(user.id).unwrap();

        let resolved = auth.authenticate(Some(&token)).await.unwrap();
        assert_eq!(resolved.id, user.id);
    }

    #[tokio::test]
    async fn test_missing_token() {
        let (auth, _) = authenticator();
        assert_eq!(failure(auth.authenticate(None).await), AuthFailure::NoCredential);
        assert_eq!(failure(auth.authenticate(Some("  ")).await), AuthFailure::NoCredential);
    }

    #[tokio::test]
    async fn test_bad_signature_and_garbage() {
        let (auth, store) = authenticator();
        let user = store.create_user(&User::new("Asha", "asha@example.com")).await.unwrap();
        let foreign = JwtKeys::new(b"other-secret").sign(user.id).unwrap();

        assert_eq!(failure(auth.authenticate(Some(&foreign)).await), AuthFailure::InvalidCredential);
        assert_eq!(failure(auth.authenticate(Some("not-a-jwt")).await), AuthFailure::InvalidCredential);
    }

    #[tokio::test]
    async fn test_expired_token() {
        let (auth, _) = authenticator();
        let claims = Claims {
            sub: Uuid::new_v4().to_string(),
            exp: 1_000,
            iat: 0,
        };
        let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(b"test-secret")).unwrap();
        assert_eq!(failure(auth.authenticate(Some(&token)).await), AuthFailure::InvalidCredential);
    }

    #[tokio::test]
    async fn test_unknown_subject() {
        let (auth, _) = authenticator();
        let token = auth.keys().sign(Uuid::new_v4()).unwrap();
        assert_eq!(failure(auth.authenticate(Some(&token)).await), AuthFailure::UnknownSubject);
    }

    #[test]
    fn test_password_hash_round_trip() {
        let hash = hash_password("hunter22").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("hunter22", &hash));
        assert!(!verify_password("hunter23", &hash));
        assert!(!verify_password("hunter22", "plaintext"));
    }

    #[test]
    fn test_bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def.ghi"));
        assert_eq!(bearer_token(&headers), Some("abc.def.ghi"));
    }
}
