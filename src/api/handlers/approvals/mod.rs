//! Step-up approval endpoints.
//!
//! - `POST /v1/approvals/terms/token`: an authenticated tenant admin issues a
//!   single-use token plus WebAuthn options for a subject in the same tenant.
//! - `POST /v1/approvals/terms/confirm`: the token holder submits the assertion;
//!   the token is the only credential.

pub mod confirm;
pub mod token;
pub mod types;


use axum::{
    Json,
    body::Bytes,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::de::DeserializeOwned;
use tracing::{debug, error};

use crate::approval::ApprovalError;

const MAX_APPROVAL_JSON_BYTES: usize = 32 * 1024;
type HandlerError = Box<Response>;

fn parse_json<T: DeserializeOwned>(body: &Bytes) -> Result<T, HandlerError> {
    if body.len() > MAX_APPROVAL_JSON_BYTES {
        return Err(Box::new(
            (
                StatusCode::PAYLOAD_TOO_LARGE,
                Json(types::ErrorResponse {
                    detail: "Request body too large.".to_string(),
                }),
            )
                .into_response(),
        ));
    }
    serde_json::from_slice(body).map_err(|err| {
        Box::new(ApprovalError::Validation(format!("Invalid payload: {err}")).into_response())
    })
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(types::ErrorResponse {
            detail: "Authentication credentials were not provided.".to_string(),
        }),
    )
        .into_response()
}

fn error_response(err: ApprovalError, request_id: &str) -> Response {
    match &err {
        ApprovalError::Internal(cause) => {
            error!(request_id = %request_id, "Approval request failed: {cause:#}");
        }
        other => debug!(request_id = %request_id, "Approval request rejected: {other}"),
    }
    err.into_response()
}
