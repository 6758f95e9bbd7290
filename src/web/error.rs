//! JSON error responses for the HTTP layer

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use thiserror::Error;

use crate::error::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Engine(#[from] Error),
}

#[derive(Serialize)]
struct ErrBody {
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let AppError::Engine(err) = self;
        if err.is_retryable() {
            tracing::warn!("service busy: {err:#}");
            let body = ErrBody {
                error: "service busy, retry later".into(),
            };
            return (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response();
        }
        tracing::error!("internal error: {err:#}");
        let body = ErrBody {
            error: "internal server error".into(),
        };
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}
