use axum::extract::Request;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::store::StoreError;
use crate::validation::ValidationErrors;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not found")]
    NotFound,

    /// Login failure; deliberately silent about which credential was wrong.
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationErrors),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Store error: {0}")]
    Store(StoreError),

    #[error("Password hashing error: {0}")]
    Password(#[from] bcrypt::BcryptError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Internal cause of a 500, attached to the response for the development-mode
/// middleware. Never serialized in production.
#[derive(Debug, Clone)]
pub struct ErrorDetail(pub String);

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => AppError::NotFound,
            StoreError::Conflict(what) => AppError::Conflict(what),
            other => AppError::Store(other),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            AppError::NotFound => (StatusCode::NOT_FOUND, json!({ "error": "Not found" })),
            AppError::InvalidCredentials => (
                StatusCode::NOT_FOUND,
                json!({ "error": "Invalid credentials" }),
            ),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                json!({ "error": "Unauthorized" }),
            ),
            AppError::Forbidden => (StatusCode::FORBIDDEN, json!({ "error": "Forbidden" })),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            AppError::Validation(errors) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "Validation failed", "fields": errors }),
            ),
            AppError::Conflict(what) => (
                StatusCode::CONFLICT,
                json!({ "error": format!("{} already exists", what) }),
            ),
            AppError::Store(_) | AppError::Password(_) | AppError::Internal(_) => {
                tracing::error!("{}", self);
                let mut response = (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "Internal server error" })),
                )
                    .into_response();
                response
                    .extensions_mut()
                    .insert(ErrorDetail(self.to_string()));
                return response;
            }
        };

        (status, Json(body)).into_response()
    }
}

/// Development-mode middleware: rewrites 500 responses to include the
/// internal cause under `detail`.
pub async fn expose_error_detail(req: Request, next: Next) -> Response {
    let response = next.run(req).await;
    match response.extensions().get::<ErrorDetail>().cloned() {
        Some(ErrorDetail(detail)) => (
            response.status(),
            Json(json!({ "error": "Internal server error", "detail": detail })),
        )
            .into_response(),
        None => response,
    }
}

pub type AppResult<T> = Result<T, AppError>;
