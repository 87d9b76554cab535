use axum::{
    Json,
    body::Bytes,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};

use super::{
    error_response, parse_json,
    types::{ErrorResponse, IssueTokenRequest, IssueTokenResponse},
    unauthorized,
};
use crate::{
    api::handlers::{extract_session_token, request_id},
    approval::ApprovalService,
};

#[utoipa::path(
    post,
    path = "/v1/approvals/terms/token",
    request_body = IssueTokenRequest,
    responses(
        (status = 201, description = "Approval token issued", body = IssueTokenResponse),
        (status = 400, description = "Invalid request, no tenant or no credentials", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 403, description = "Not a tenant admin or subject outside the tenant", body = ErrorResponse),
        (status = 413, description = "Request body too large", body = ErrorResponse)
    ),
    tag = "approvals"
)]
/// Issue a single-use approval token for a subject in the caller's tenant.
pub async fn issue_token(
    headers: HeaderMap,
    service: Extension<ApprovalService>,
    body: Bytes,
) -> impl IntoResponse {
    let request_id = request_id(&headers);

    let Some(session_token) = extract_session_token(&headers) else {
        return unauthorized();
    };
    let actor = match service.authenticate(&session_token).await {
        Ok(Some(actor)) => actor,
        Ok(None) => return unauthorized(),
        Err(err) => return error_response(err, &request_id),
    };

    let request = match parse_json::<IssueTokenRequest>(&body) {
        Ok(request) => request,
        Err(response) => return *response,
    };
    let request = match request.into_issue_request() {
        Ok(request) => request,
        Err(err) => return error_response(err, &request_id),
    };

    match service.issue(&actor, request).await {
        Ok(issued) => (
            StatusCode::CREATED,
            Json(IssueTokenResponse::from(issued)),
        )
            .into_response(),
        Err(err) => error_response(err, &request_id),
    }
}
