use std::sync::Arc;

use actix_web::{get, web, HttpRequest, HttpResponse};
use chrono::Utc;
use serde_json::{json, Value};

use crate::error::AppError;
use crate::AppState;

#[get("/health")]
pub async fn health(app_state: web::Data<Arc<AppState>>) -> web::Json<Value> {
    web::Json(json!({
        "status": "OK",
        "timestamp": Utc::now().to_rfc3339(),
        "environment": app_state.config.environment,
    }))
}

/// Fallback for unmatched routes.
pub async fn not_found(req: HttpRequest) -> Result<HttpResponse, AppError> {
    Err(AppError::NotFound(format!(
        "Route {} {} not found",
        req.method(),
        req.path()
    )))
}
