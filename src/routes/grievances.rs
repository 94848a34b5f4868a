use std::sync::Arc;

use actix_web::{get, post, web, HttpResponse};
use tracing::info;

use super::required;
use crate::error::AppError;
use crate::middleware::auth::AuthenticatedUser;
use crate::models::Grievance;
use crate::types::CreateGrievanceRequest;
use crate::AppState;

#[utoipa::path(
    get,
    path = "/api/grievances",
    tag = "grievances",
    responses((status = 200, body = [Grievance]))
)]
#[get("")]
pub async fn list_grievances(
    app_state: web::Data<Arc<AppState>>,
    authenticated_user: AuthenticatedUser,
) -> Result<web::Json<Vec<Grievance>>, AppError> {
    let grievances = app_state
        .grievances
        .list_grievances_for_user(authenticated_user.user.id)
        .await?;
    Ok(web::Json(grievances))
}

#[utoipa::path(
    post,
    path = "/api/grievances",
    tag = "grievances",
    request_body = CreateGrievanceRequest,
    responses(
        (status = 201, body = Grievance),
        (status = 400, description = "Subject or message missing"),
    )
)]
#[post("")]
pub async fn create_grievance(
    app_state: web::Data<Arc<AppState>>,
    authenticated_user: AuthenticatedUser,
    web::Json(body): web::Json<CreateGrievanceRequest>,
) -> Result<HttpResponse, AppError> {
    let subject = required(body.subject, "Subject")?;
    let message = required(body.message, "Message")?;
    let mood = body.mood.map(|m| m.trim().to_string()).filter(|m| !m.is_empty());

    let grievance = Grievance::new(authenticated_user.user.id, &subject, &message, mood);
    let grievance = app_state.grievances.create_grievance(&grievance).await?;

    info!(grievance_id = %grievance.id, "Grievance submitted");
    Ok(HttpResponse::Created().json(grievance))
}
