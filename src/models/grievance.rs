use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Type, ToSchema)]
#[sqlx(type_name = "grievance_status")]
pub enum GrievanceStatus {
    Pending,
    Responded,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Grievance {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub user_id: Uuid,
    pub subject: String,
    pub message: String,
    pub mood: Option<String>,
    pub status: GrievanceStatus,
    pub response: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Grievance {
    pub fn new(user_id: Uuid, subject: &str, message: &str, mood: Option<String>) -> Self {
        Grievance {
            user_id,
            subject: subject.to_string(),
            message: message.to_string(),
            mood,
            ..Default::default()
        }
    }
}

impl Default for Grievance {
    fn default() -> Self {
        Grievance {
            id: Uuid::new_v4(),
            user_id: Uuid::nil(),
            subject: String::new(),
            message: String::new(),
            mood: None,
            status: GrievanceStatus::Pending,
            response: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}
