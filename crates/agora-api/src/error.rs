use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;
use validator::ValidationErrors;

use agora_db::DbError;
use agora_media::MediaError;
use agora_types::api::ErrorBody;

pub const GENERIC_ERROR: &str = "An unexpected error occurred.";
const ALREADY_REPORTED: &str = "You have already reported this item.";

#[derive(Debug, Error)]
pub enum ApiError {
    /// First failing field of a request body.
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("item already reported as {report_id}")]
    AlreadyReported { report_id: String },

    #[error("{0}")]
    TooManyRequests(String),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden(message.into())
    }

    pub fn unauthorized() -> Self {
        ApiError::Unauthorized("Authentication credentials were not provided or are invalid.".into())
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        let fields = errors.field_errors();
        let mut names: Vec<_> = fields.keys().collect();
        names.sort();
        let message = names
            .first()
            .and_then(|name| {
                let first = fields.get(*name)?.first()?;
                Some(
                    first
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("Invalid value for {}.", name)),
                )
            })
            .unwrap_or_else(|| "Invalid request.".to_string());
        ApiError::Validation(message)
    }
}

/// Friendly text for a violated uniqueness constraint.
fn duplicate_message(constraint: &str) -> &'static str {
    match constraint {
        "accounts.email" => "An account with this email already exists.",
        _ => "Duplicate entry detected.",
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut existing_report_id = None;
        let (status, message) = match self {
            ApiError::Validation(m) | ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, m),
            ApiError::Forbidden(m) => (StatusCode::FORBIDDEN, m),
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            ApiError::AlreadyReported { report_id } => {
                existing_report_id = Some(report_id);
                (StatusCode::CONFLICT, ALREADY_REPORTED.to_string())
            }
            ApiError::TooManyRequests(m) => (StatusCode::TOO_MANY_REQUESTS, m),
            ApiError::Db(DbError::Duplicate { ref constraint }) => {
                (StatusCode::BAD_REQUEST, duplicate_message(constraint).to_string())
            }
            ApiError::Db(DbError::Rejected(ref reason)) => {
                (StatusCode::BAD_REQUEST, format!("Request rejected: {}.", reason))
            }
            ApiError::Media(ref e @ (MediaError::TooLarge { .. } | MediaError::Unsupported(_))) => {
                (StatusCode::BAD_REQUEST, e.to_string())
            }
            other => {
                error!("Request failed: {:?}", other);
                (StatusCode::INTERNAL_SERVER_ERROR, GENERIC_ERROR.to_string())
            }
        };

        let body = ErrorBody {
            success: false,
            message,
            requires_verification: false,
            existing_report_id,
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[derive(Validate)]
    struct Form {
        #[validate(length(min = 3, message = "b is too short"))]
        b: String,
        #[validate(length(min = 3, message = "a is too short"))]
        a: String,
    }

    #[test]
    fn first_field_error_by_name() {
        let err = Form { a: "x".into(), b: "y".into() }.validate().unwrap_err();
        match ApiError::from(err) {
            ApiError::Validation(m) => assert_eq!(m, "a is too short"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn duplicates_are_friendly() {
        let resp = ApiError::Db(DbError::Duplicate { constraint: "accounts.email".into() }).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(duplicate_message("posts.slug"), "Duplicate entry detected.");
    }

    #[test]
    fn internal_errors_are_generic() {
        let resp = ApiError::Internal(anyhow::anyhow!("disk on fire")).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
