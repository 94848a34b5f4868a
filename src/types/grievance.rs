use serde::Deserialize;
use utoipa::ToSchema;

#[derive(Deserialize, ToSchema)]
pub struct CreateGrievanceRequest {
    pub subject: Option<String>,
    pub message: Option<String>,
    pub mood: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct RespondGrievanceRequest {
    pub response: Option<String>,
}
