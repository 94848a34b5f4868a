use std::sync::Arc;

use actix_web::{get, put, web};
use tracing::info;
use uuid::Uuid;

use super::required;
use crate::error::AppError;
use crate::middleware::auth::AdminUser;
use crate::models::Grievance;
use crate::store::StoreError;
use crate::types::RespondGrievanceRequest;
use crate::AppState;

#[utoipa::path(
    get,
    path = "/api/admin/grievances",
    tag = "admin",
    responses(
        (status = 200, body = [Grievance]),
        (status = 403, description = "Caller is not an admin"),
    )
)]
#[get("/grievances")]
pub async fn list_all_grievances(
    app_state: web::Data<Arc<AppState>>,
    _admin: AdminUser,
) -> Result<web::Json<Vec<Grievance>>, AppError> {
    Ok(web::Json(app_state.grievances.list_all_grievances().await?))
}

#[utoipa::path(
    put,
    path = "/api/admin/grievances/{grievance_id}",
    tag = "admin",
    params(("grievance_id" = Uuid, Path, description = "Grievance id")),
    request_body = RespondGrievanceRequest,
    responses(
        (status = 200, body = Grievance),
        (status = 403, description = "Caller is not an admin"),
        (status = 404, description = "No such grievance"),
    )
)]
#[put("/grievances/{grievance_id}")]
pub async fn respond_to_grievance(
    app_state: web::Data<Arc<AppState>>,
    admin: AdminUser,
    grievance_id: web::Path<Uuid>,
    web::Json(body): web::Json<RespondGrievanceRequest>,
) -> Result<web::Json<Grievance>, AppError> {
    let response = required(body.response, "Response")?;
    let grievance = app_state
        .grievances
        .respond_to_grievance(grievance_id.into_inner(), &response)
        .await
        .map_err(|e| match e {
            StoreError::NotFound => AppError::not_found("Grievance"),
            other => other.into(),
        })?;

    info!(grievance_id = %grievance.id, admin_id = %admin.user.id, "Grievance answered");
    Ok(web::Json(grievance))
}
