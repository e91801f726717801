//! Error kinds for the renewal, OCSP, and CRL HTTP surfaces. Every
//! handler-facing error collapses into one of a small number of HTTP
//! outcomes, and internal detail is logged but never echoed back to the
//! caller.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("forbidden")]
    Forbidden,

    #[error("invalid request: {message}")]
    InvalidRequest {
        message: String,
        hints: Vec<(String, String)>,
    },

    #[error("too many requests")]
    Throttled,

    #[error("payload too large")]
    PayloadTooLarge,

    #[error("internal error")]
    Internal(#[source] anyhow::Error),
}

impl AppError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
            hints: Vec::new(),
        }
    }

    pub fn invalid_with(message: impl Into<String>, key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
            hints: vec![(key.into(), value.into())],
        }
    }

    pub fn internal(err: impl Into<anyhow::Error>) -> Self {
        Self::Internal(err.into())
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    hints: Vec<(String, String)>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Forbidden => {
                tracing::warn!("request rejected: forbidden");
                (
                    StatusCode::FORBIDDEN,
                    Json(ErrorBody { error: "forbidden".into(), hints: vec![] }),
                )
                    .into_response()
            }
            AppError::InvalidRequest { message, hints } => {
                tracing::info!(message = %message, "request rejected: invalid request");
                (
                    StatusCode::BAD_REQUEST,
                    Json(ErrorBody { error: message, hints }),
                )
                    .into_response()
            }
            AppError::Throttled => (
                StatusCode::TOO_MANY_REQUESTS,
                Json(ErrorBody { error: "too many requests".into(), hints: vec![] }),
            )
                .into_response(),
            AppError::PayloadTooLarge => (
                StatusCode::PAYLOAD_TOO_LARGE,
                Json(ErrorBody { error: "payload too large".into(), hints: vec![] }),
            )
                .into_response(),
            AppError::Internal(err) => {
                tracing::error!(error = %err, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorBody { error: "internal error".into(), hints: vec![] }),
                )
                    .into_response()
            }
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Internal(err.into())
    }
}
