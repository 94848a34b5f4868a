use std::sync::Arc;

use actix_cors::Cors;
use actix_web::http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use actix_web::web::{self, ServiceConfig};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

pub mod ai;
pub mod auth;
pub mod codec;
pub mod config;
pub mod error;
pub mod middleware;
pub mod models;
pub mod prompts;
pub mod routes;
pub mod session;
pub mod store;
pub mod title;
pub mod types;

pub use config::AppConfig;

use crate::ai::GenerativeModel;
use crate::auth::{Authenticator, JwtKeys};
use crate::error::AppError;
use crate::middleware::auth::Authentication;
use crate::session::{EventRouter, SessionRegistry};
use crate::store::{ChatStore, GrievanceStore, UserStore};
use crate::title::TitleSummarizer;

pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: Arc<dyn UserStore>,
    pub chats: Arc<dyn ChatStore>,
    pub grievances: Arc<dyn GrievanceStore>,
    pub authenticator: Arc<Authenticator>,
    pub router: EventRouter,
    pub http_client: reqwest::Client,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        users: Arc<dyn UserStore>,
        chats: Arc<dyn ChatStore>,
        grievances: Arc<dyn GrievanceStore>,
        model: Arc<dyn GenerativeModel>,
    ) -> Self {
        let authenticator = Arc::new(Authenticator::new(
            JwtKeys::new(config.jwt_secret.as_bytes()),
            users.clone(),
        ));
        let registry = Arc::new(SessionRegistry::new(chats.clone(), model.clone()));
        let titles = Arc::new(TitleSummarizer::new(model, config.ai.timeout));
        let router = EventRouter::new(registry, chats.clone(), titles, config.ai.timeout);

        AppState {
            config: Arc::new(config),
            users,
            chats,
            grievances,
            authenticator,
            router,
            http_client: reqwest::Client::new(),
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(title = "Felicity API"),
    paths(
        routes::auth::register,
        routes::auth::login,
        routes::users::get_profile,
        routes::users::update_profile,
        routes::users::delete_profile,
        routes::users::update_avatar,
        routes::chat::list_chats,
        routes::chat::get_chat_messages,
        routes::grievances::list_grievances,
        routes::grievances::create_grievance,
        routes::admin::list_all_grievances,
        routes::admin::respond_to_grievance,
    ),
    components(schemas(
        types::RegisterRequest,
        types::LoginRequest,
        types::AuthResponse,
        types::ProfileResponse,
        types::UpdateProfileRequest,
        types::UpdateAvatarRequest,
        types::MessageResponse,
        types::ChatSummary,
        types::CreateGrievanceRequest,
        types::RespondGrievanceRequest,
        models::Message,
        models::Role,
        models::Grievance,
        models::GrievanceStatus,
        models::UserRole,
    ))
)]
pub struct ApiDoc;

fn cors(config: &AppConfig) -> Cors {
    Cors::default()
        .allowed_origin("http://localhost:3000")
        .allowed_origin(&config.client_url)
        .allowed_origin_fn(|origin, _req_head| {
            origin
                .to_str()
                .map(|origin| origin.starts_with("https://") && origin.ends_with(".vercel.app"))
                .unwrap_or(false)
        })
        .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
        .allowed_headers(vec![AUTHORIZATION, ACCEPT, CONTENT_TYPE])
        .supports_credentials()
        .max_age(86400)
}

/// Mounts every route. Shared by the shuttle entrypoint and the
/// integration tests.
pub fn configure(
    state: Arc<AppState>,
) -> impl FnOnce(&mut ServiceConfig) + Send + Clone + 'static {
    move |cfg: &mut ServiceConfig| {
        let authentication = || Authentication {
            authenticator: state.authenticator.clone(),
        };
        let json_config = web::JsonConfig::default()
            .error_handler(|err, _req| AppError::validation(err.to_string()).into());
        let query_config = web::QueryConfig::default()
            .error_handler(|err, _req| AppError::validation(err.to_string()).into());
        let path_not_found = |what: &'static str| {
            web::PathConfig::default().error_handler(move |_err, _req| AppError::not_found(what).into())
        };

        cfg.service(
            web::scope("")
                .wrap(cors(&state.config))
                .app_data(web::Data::new(state.clone()))
                .app_data(json_config)
                .app_data(query_config)
                .service(routes::health::health)
                .service(routes::ws::chat_socket)
                .service(Scalar::with_url("/docs", ApiDoc::openapi()))
                .service(
                    web::scope("/api/auth")
                        .service(routes::auth::register)
                        .service(routes::auth::login)
                        .service(routes::auth::google_login)
                        .service(routes::auth::google_callback),
                )
                .service(
                    web::scope("/api/users")
                        .wrap(authentication())
                        .service(routes::users::get_profile)
                        .service(routes::users::update_profile)
                        .service(routes::users::delete_profile)
                        .service(routes::users::update_avatar),
                )
                .service(
                    web::scope("/api/chats")
                        .wrap(authentication())
                        .app_data(path_not_found("Chat"))
                        .service(routes::chat::list_chats)
                        .service(routes::chat::get_chat_messages),
                )
                .service(
                    web::scope("/api/grievances")
                        .wrap(authentication())
                        .service(routes::grievances::list_grievances)
                        .service(routes::grievances::create_grievance),
                )
                .service(
                    web::scope("/api/admin")
                        .wrap(authentication())
                        .app_data(path_not_found("Grievance"))
                        .service(routes::admin::list_all_grievances)
                        .service(routes::admin::respond_to_grievance),
                )
                .default_service(web::to(routes::health::not_found)),
        );
    }
}
