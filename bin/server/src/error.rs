//! Request-level error responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use gatehouse_access::AuthError;

/// Errors surfaced to API callers as JSON bodies.
#[derive(Debug)]
pub enum ApiError {
    /// Authentication failed or no session could be established.
    Unauthorized { message: String },
    /// The request is not authorized.
    Forbidden { message: String },
    /// The provider requires consent; the caller must visit the URL.
    ConsentRequired { consent_url: String },
    /// Unexpected server-side failure.
    Internal { message: String },
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Unauthorized { message } => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": message })),
            )
                .into_response(),
            Self::Forbidden { message } => {
                (StatusCode::FORBIDDEN, Json(json!({ "error": message }))).into_response()
            }
            Self::ConsentRequired { consent_url } => (
                StatusCode::FORBIDDEN,
                Json(json!({
                    "error": "consent required",
                    "consent_url": consent_url,
                })),
            )
                .into_response(),
            Self::Internal { message } => {
                tracing::error!("internal error: {}", message);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "internal server error" })),
                )
                    .into_response()
            }
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidAuth { .. } => Self::Unauthorized {
                message: "Unauthorized".to_string(),
            },
            AuthError::ConsentRequired { consent_url } => Self::ConsentRequired { consent_url },
            AuthError::SessionCreation { reason } => {
                tracing::error!("session creation failed: {}", reason);
                Self::Unauthorized {
                    message: "Failed to create session".to_string(),
                }
            }
            AuthError::FlowState { .. } | AuthError::Provider { .. } => {
                tracing::warn!("authentication failed: {}", err);
                Self::Unauthorized {
                    message: "Unauthorized".to_string(),
                }
            }
        }
    }
}
