// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// HTTP error responses.

use axum::Json;
use axum::extract::multipart::MultipartError;
use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use stapel_core::StapelError;
use thiserror::Error;

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Errors surfaced by request handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unsupported content type: {0}")]
    UnsupportedMediaType(String),

    #[error("malformed multipart body: {0}")]
    Multipart(#[from] MultipartError),

    #[error("{0}")]
    MultipartRejected(#[from] MultipartRejection),

    #[error("malformed JSON body: {0}")]
    Json(#[from] JsonRejection),

    #[error(transparent)]
    Core(#[from] StapelError),
}

/// `{"success": false, "error": "..."}`
#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::Multipart(err) => err.status(),
            Self::MultipartRejected(rejection) => rejection.status(),
            Self::Json(rejection) => rejection.status(),
            Self::Core(
                StapelError::Validation(_)
                | StapelError::UnsupportedOperation(_)
                | StapelError::Serialization(_),
            ) => StatusCode::BAD_REQUEST,
            Self::Core(StapelError::Storage(_)) => StatusCode::INSUFFICIENT_STORAGE,
            Self::Core(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "Request rejected");
        }
        let body = ErrorBody {
            success: false,
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
