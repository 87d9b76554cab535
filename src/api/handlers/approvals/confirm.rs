use axum::{
    Json,
    body::Bytes,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use secrecy::SecretString;

use super::{
    error_response, parse_json,
    types::{ConfirmTokenRequest, ConfirmTokenResponse, ErrorResponse},
};
use crate::{
    api::handlers::{extract_client_ip, extract_user_agent, request_id},
    approval::{ApprovalService, ConfirmRequest, NetworkMetadata},
};

#[utoipa::path(
    post,
    path = "/v1/approvals/terms/confirm",
    request_body = ConfirmTokenRequest,
    responses(
        (status = 200, description = "Approval recorded", body = ConfirmTokenResponse),
        (status = 400, description = "Invalid or expired token, or verification failed", body = ErrorResponse),
        (status = 409, description = "Token already used", body = ErrorResponse),
        (status = 413, description = "Request body too large", body = ErrorResponse)
    ),
    tag = "approvals"
)]
/// Consume an approval token with a WebAuthn assertion.
pub async fn confirm_token(
    headers: HeaderMap,
    service: Extension<ApprovalService>,
    body: Bytes,
) -> impl IntoResponse {
    let request_id = request_id(&headers);

    let request = match parse_json::<ConfirmTokenRequest>(&body) {
        Ok(request) => request,
        Err(response) => return *response,
    };
    if let Err(err) = request.validate() {
        return error_response(err, &request_id);
    }

    let confirm = ConfirmRequest {
        token: SecretString::from(request.approval_token.trim().to_string()),
        approved: request.approved,
        assertion: request.webauthn_response,
        network: NetworkMetadata {
            ip_address: extract_client_ip(&headers),
            user_agent: extract_user_agent(&headers),
        },
    };

    match service.confirm(confirm).await {
        Ok(confirmation) => (
            StatusCode::OK,
            Json(ConfirmTokenResponse::from(confirmation)),
        )
            .into_response(),
        Err(err) => error_response(err, &request_id),
    }
}
