pub mod admin;
pub mod auth;
pub mod chat;
pub mod grievances;
pub mod health;
pub mod users;
pub mod ws;

use crate::error::AppError;

/// Trimmed value of a required body field, or a 400 naming the field.
pub(crate) fn required(value: Option<String>, field: &str) -> Result<String, AppError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::validation(format!("{} is required", field)))
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_trims_and_rejects_blank() {
        assert_eq!(required(Some("  Asha ".into()), "Name").unwrap(), "Asha");
        let err = required(Some("   ".into()), "Name").unwrap_err();
        assert_eq!(err.to_string(), "Name is required");
        assert!(required(None, "Email").is_err());
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email(" Asha@Example.COM "), "asha@example.com");
    }
}
