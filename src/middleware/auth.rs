use std::{
    future::{ready, Ready},
    rc::Rc,
    sync::Arc,
};

use actix_web::{
    dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform},
    Error, FromRequest, HttpMessage, HttpRequest,
};
use futures_util::future::LocalBoxFuture;
use tracing::info;

use crate::auth::{bearer_token, Authenticator};
use crate::error::{AppError, AuthFailure};
use crate::models::User;

/// The caller, resolved once per request by [`Authentication`].
#[derive(Clone, Debug)]
pub struct AuthenticatedUser {
    pub user: User,
}

/// Same as [`AuthenticatedUser`] but rejects non-admins with 403.
#[derive(Clone, Debug)]
pub struct AdminUser {
    pub user: User,
}

pub struct Authentication {
    pub authenticator: Arc<Authenticator>,
}

// Middleware factory is `Transform` trait
// `S` - type of the next service
// `B` - type of response's body
impl<S, B> Transform<S, ServiceRequest> for Authentication
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = AuthenticationMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AuthenticationMiddleware {
            service: Rc::new(service),
            authenticator: self.authenticator.clone(),
        }))
    }
}

pub struct AuthenticationMiddleware<S> {
    service: Rc<S>,
    authenticator: Arc<Authenticator>,
}

impl<S, B> Service<ServiceRequest> for AuthenticationMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let authenticator = self.authenticator.clone();

        Box::pin(async move {
            let token = bearer_token(req.headers()).map(str::to_owned);

            // Resolution failures are recorded, not returned, so unprotected
            // routes under the same scope still run; the extractor decides.
            match authenticator.authenticate(token.as_deref()).await {
                Ok(user) => {
                    req.extensions_mut().insert(AuthenticatedUser { user });
                }
                Err(AppError::Unauthenticated(reason)) => {
                    if reason != AuthFailure::NoCredential {
                        info!("Rejected credential on {}: {}", req.path(), reason);
                    }
                    req.extensions_mut().insert(reason);
                }
                Err(e) => return Err(e.into()),
            }

            service.call(req).await
        })
    }
}

fn resolved_user(req: &HttpRequest) -> Result<User, AppError> {
    let extensions = req.extensions();
    if let Some(authenticated) = extensions.get::<AuthenticatedUser>() {
        return Ok(authenticated.user.clone());
    }
    let reason = extensions
        .get::<AuthFailure>()
        .copied()
        .unwrap_or(AuthFailure::NoCredential);
    Err(AppError::Unauthenticated(reason))
}

impl FromRequest for AuthenticatedUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(resolved_user(req).map(|user| AuthenticatedUser { user }))
    }
}

impl FromRequest for AdminUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(resolved_user(req).and_then(|user| {
            if user.is_admin() {
                Ok(AdminUser { user })
            } else {
                Err(AppError::Forbidden("Admin access required".to_string()))
            }
        }))
    }
}
