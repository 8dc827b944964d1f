// src/error.rs

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// Global Application Error Enum.
/// Every variant maps to an HTTP status and a stable reason code that clients can match on.
#[derive(Debug)]
pub enum AppError {
    // 500 Internal Server Error
    InternalServerError(String),

    // 400 Bad Request
    BadRequest(String),

    // 401 Unauthorized
    AuthError(String),

    // 403 Forbidden (not the owner, not an administrator)
    Forbidden(String),

    // 404 Not Found
    NotFound(String),

    // 409 Wrong lifecycle status for the requested transition
    InvalidState(String),

    // 403 Access token has not been verified for this attempt
    TokenRequired,

    // 409 The exam window was closed by an administrator
    ExamClosed,

    // 409 Submission arrived after duration plus grace period
    TimeExpired,

    // 409 The question bank changed under a resumed attempt
    QuestionBankChanged,

    // 422 The event has no usable questions
    Configuration(String),
}

impl AppError {
    /// Machine-checkable reason code included in every error body.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::InternalServerError(_) => "internal",
            AppError::BadRequest(_) => "bad_request",
            AppError::AuthError(_) => "unauthorized",
            AppError::Forbidden(_) => "forbidden",
            AppError::NotFound(_) => "not_found",
            AppError::InvalidState(_) => "invalid_state",
            AppError::TokenRequired => "token_required",
            AppError::ExamClosed => "exam_closed",
            AppError::TimeExpired => "time_expired",
            AppError::QuestionBankChanged => "question_bank_changed",
            AppError::Configuration(_) => "configuration",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::AuthError(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) | AppError::TokenRequired => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidState(_)
            | AppError::ExamClosed
            | AppError::TimeExpired
            | AppError::QuestionBankChanged => StatusCode::CONFLICT,
            AppError::Configuration(_) => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }

    fn message(&self) -> String {
        match self {
            AppError::InternalServerError(_) => "Internal Server Error".to_string(),
            AppError::BadRequest(msg)
            | AppError::AuthError(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::InvalidState(msg)
            | AppError::Configuration(msg) => msg.clone(),
            AppError::TokenRequired => {
                "This exam requires an access token. Verify your token first.".to_string()
            }
            AppError::ExamClosed => "The exam window has been closed.".to_string(),
            AppError::TimeExpired => "The time for this exam has run out.".to_string(),
            AppError::QuestionBankChanged => {
                "The questions for this exam changed after you started. Please contact an administrator."
                    .to_string()
            }
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for AppError {}

/// Converts the error into a JSON response `{"error": ..., "code": ...}`.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let AppError::InternalServerError(msg) = &self {
            tracing::error!("Internal Server Error: {}", msg);
        }

        let body = Json(json!({
            "error": self.message(),
            "code": self.code(),
        }));

        (self.status(), body).into_response()
    }
}

/// Converts `sqlx::Error` into `AppError::InternalServerError`.
/// Allows using `?` operator on database queries.
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::InternalServerError(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::BadRequest(err.to_string())
    }
}
