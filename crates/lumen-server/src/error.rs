//! HTTP error mapping for chat handlers.

use std::any::Any;

use axum::Json;
use axum::body::Body;
use axum::extract::multipart::MultipartError;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use lumen_core::domain::ChatError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    #[error("{0}")]
    Unavailable(String),

    /// Unexpected failure after input was accepted. Answered as a short
    /// text body rather than an error status.
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::OK,
        }
    }
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::EmptyInput
            | ChatError::UnsupportedImage
            | ChatError::InvalidImageData(_)
            | ChatError::NoImageText => ApiError::BadRequest(err.to_string()),
            ChatError::GenerationUnavailable(_) => ApiError::Unavailable(err.to_string()),
            ChatError::Upload(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge(err.body_text())
        } else {
            ApiError::BadRequest(err.body_text())
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Internal(message) => {
                tracing::error!("chat request failed: {}", message);
                (
                    StatusCode::OK,
                    [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                    Body::from(format!("Sorry, I encountered an error: {message}")),
                )
                    .into_response()
            }
            other => {
                let status = other.status();
                tracing::warn!(status = status.as_u16(), "{}", other);
                (status, Json(json!({ "detail": other.to_string() }))).into_response()
            }
        }
    }
}

/// Response for a handler that panicked: 500 with a `detail` body.
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let message = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    tracing::error!("handler panicked: {}", message);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "detail": format!("Internal server error: {message}") })),
    )
        .into_response()
}
