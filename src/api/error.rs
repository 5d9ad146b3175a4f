//! HTTP rendering of auth failures.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::error;

use crate::auth::{AuthError, FailureKind};

/// Message shared by every 401. The precise cause is only logged.
pub const UNAUTHENTICATED_MESSAGE: &str = "Authentication required";

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}

pub fn status_for(err: &AuthError) -> StatusCode {
    match err.kind() {
        FailureKind::Authentication => StatusCode::UNAUTHORIZED,
        FailureKind::Authorization => StatusCode::FORBIDDEN,
        FailureKind::NotFound => StatusCode::NOT_FOUND,
        FailureKind::BadRequest => StatusCode::BAD_REQUEST,
        FailureKind::Institution => match err {
            AuthError::TenantUnreachable(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        },
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        let body = match self.kind() {
            FailureKind::Authentication => ErrorBody {
                error: "unauthenticated",
                message: UNAUTHENTICATED_MESSAGE.to_string(),
            },
            FailureKind::Institution => {
                error!(code = self.code(), "Request failed: {}", self);
                ErrorBody {
                    error: self.code(),
                    message: "Internal error".to_string(),
                }
            }
            _ => ErrorBody {
                error: self.code(),
                message: self.to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}
