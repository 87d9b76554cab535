use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Outcome errors of the issue and confirm operations.
///
/// Messages are returned to callers verbatim, so none of them carry internal detail.
#[derive(Debug, Error)]
pub enum ApprovalError {
    #[error("{0}")]
    Validation(String),
    #[error("Authenticated user has no tenant.")]
    NoTenantContext,
    #[error("Insufficient permissions.")]
    PermissionDenied,
    #[error("User does not belong to your tenant.")]
    SubjectNotFound,
    #[error("User has no WebAuthn credentials.")]
    NoCredentials,
    #[error("Invalid or expired token.")]
    InvalidToken,
    #[error("Token already used.")]
    AlreadyUsed,
    #[error("Token expired.")]
    Expired,
    #[error("WebAuthn verification failed.")]
    VerificationFailed,
    #[error("Internal server error.")]
    Internal(#[from] anyhow::Error),
}

impl ApprovalError {
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_)
            | Self::NoTenantContext
            | Self::NoCredentials
            | Self::InvalidToken
            | Self::Expired
            | Self::VerificationFailed => StatusCode::BAD_REQUEST,
            Self::PermissionDenied | Self::SubjectNotFound => StatusCode::FORBIDDEN,
            Self::AlreadyUsed => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApprovalError {
    fn into_response(self) -> Response {
        (
            self.status_code(),
            Json(json!({ "detail": self.to_string() })),
        )
            .into_response()
    }
}
