// src/error.rs

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

use crate::engine::error::{ErrorKind, QuizError};

/// Global Application Error Enum.
/// Maps engine errors and request problems to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    // 500 Internal Server Error
    InternalServerError(String),

    // 400 Bad Request
    BadRequest(String),

    // 401 Unauthorized
    AuthError(String),

    // Any engine failure; status picked from its kind.
    Quiz(QuizError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Quiz(err) => write!(f, "{}", err),
            other => write!(f, "{:?}", other),
        }
    }
}

impl std::error::Error for AppError {}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Permission => StatusCode::FORBIDDEN,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::StateConflict => StatusCode::CONFLICT,
        ErrorKind::Capacity => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Configuration | ErrorKind::Storage => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Implements `IntoResponse` for `AppError`.
/// Engine errors carry their stable code and kind; internal details are
/// logged and masked.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Internal Server Error" }),
                )
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            AppError::AuthError(msg) => (StatusCode::UNAUTHORIZED, json!({ "error": msg })),
            AppError::Quiz(err) => {
                let kind = err.kind();
                let status = status_for(kind);
                let message = if status.is_server_error() {
                    tracing::error!("Engine failure ({}): {}", err.code(), err);
                    "Internal Server Error".to_string()
                } else {
                    err.to_string()
                };
                (
                    status,
                    json!({
                        "error": message,
                        "code": err.code(),
                        "kind": kind.as_str(),
                    }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

/// Allows using `?` on engine calls inside handlers.
impl From<QuizError> for AppError {
    fn from(err: QuizError) -> Self {
        AppError::Quiz(err)
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::session::SessionStatus;

    #[test]
    fn kinds_map_to_statuses() {
        let cases = [
            (QuizError::InvalidArgument("x".into()), StatusCode::BAD_REQUEST),
            (
                QuizError::PermissionDenied { session_code: "S1".into(), user_id: 2 },
                StatusCode::FORBIDDEN,
            ),
            (QuizError::SessionNotFound("S1".into()), StatusCode::NOT_FOUND),
            (
                QuizError::SessionFinished { status: SessionStatus::Completed },
                StatusCode::CONFLICT,
            ),
            (QuizError::NoMoreQuestions, StatusCode::UNPROCESSABLE_ENTITY),
            (QuizError::UnsupportedQuestionType(8), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            assert_eq!(AppError::from(err).into_response().status(), expected);
        }
    }
}
