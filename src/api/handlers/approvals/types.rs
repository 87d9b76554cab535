use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::approval::{
    ApprovalError, Confirmation, DEFAULT_DOCUMENT_TYPE, DEFAULT_PURPOSE, IssueRequest,
    IssuedApproval, TransactionDescriptor,
};

const MAX_PURPOSE_CHARS: usize = 64;
const MAX_DOCUMENT_TYPE_CHARS: usize = 32;
const MAX_DOCUMENT_VERSION_CHARS: usize = 64;
const MAX_DOCUMENT_HASH_CHARS: usize = 128;

#[derive(Debug, Deserialize, ToSchema)]
pub struct IssueTokenRequest {
    pub user_id: Uuid,
    #[serde(default)]
    pub purpose: Option<String>,
    #[serde(default)]
    pub document_type: Option<String>,
    #[serde(default)]
    pub document_version: Option<String>,
    #[serde(default)]
    pub document_hash: Option<String>,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub context: Option<Value>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct IssueTokenResponse {
    pub approval_token: String,
    pub expires_at: DateTime<Utc>,
    #[schema(value_type = Object)]
    pub webauthn_options: Value,
    pub purpose: String,
    pub document_type: String,
    pub document_version: String,
    pub document_hash: String,
}

/// The token is the bearer credential here, so this type has no `Debug`.
#[derive(Deserialize, ToSchema)]
pub struct ConfirmTokenRequest {
    pub approval_token: String,
    pub approved: bool,
    #[schema(value_type = Object)]
    pub webauthn_response: Value,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ConfirmTokenResponse {
    pub success: bool,
    pub approved: bool,
    pub status: String,
    pub audit_id: Uuid,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub detail: String,
}

fn required_field(
    name: &str,
    value: Option<String>,
    default: &str,
    max_chars: usize,
) -> Result<String, ApprovalError> {
    let Some(value) = value else {
        return Ok(default.to_string());
    };
    let value = value.trim().to_string();
    if value.is_empty() {
        return Err(ApprovalError::Validation(format!(
            "{name}: This field may not be blank."
        )));
    }
    bounded_field(name, value, max_chars)
}

fn optional_field(
    name: &str,
    value: Option<String>,
    max_chars: usize,
) -> Result<String, ApprovalError> {
    let value = value.unwrap_or_default().trim().to_string();
    bounded_field(name, value, max_chars)
}

fn bounded_field(name: &str, value: String, max_chars: usize) -> Result<String, ApprovalError> {
    if value.chars().count() > max_chars {
        return Err(ApprovalError::Validation(format!(
            "{name}: Ensure this field has no more than {max_chars} characters."
        )));
    }
    Ok(value)
}

fn context_map(value: Option<Value>) -> Result<Map<String, Value>, ApprovalError> {
    match value {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(map)) => Ok(map),
        Some(_) => Err(ApprovalError::Validation(
            "context: Expected a JSON object.".to_string(),
        )),
    }
}

impl IssueTokenRequest {
    /// Apply defaults and length limits.
    ///
    /// # Errors
    /// Returns `Validation` describing the first invalid field.
    pub fn into_issue_request(self) -> Result<IssueRequest, ApprovalError> {
        Ok(IssueRequest {
            subject_user_id: self.user_id,
            descriptor: TransactionDescriptor {
                purpose: required_field(
                    "purpose",
                    self.purpose,
                    DEFAULT_PURPOSE,
                    MAX_PURPOSE_CHARS,
                )?,
                document_type: required_field(
                    "document_type",
                    self.document_type,
                    DEFAULT_DOCUMENT_TYPE,
                    MAX_DOCUMENT_TYPE_CHARS,
                )?,
                document_version: optional_field(
                    "document_version",
                    self.document_version,
                    MAX_DOCUMENT_VERSION_CHARS,
                )?,
                document_hash: optional_field(
                    "document_hash",
                    self.document_hash,
                    MAX_DOCUMENT_HASH_CHARS,
                )?,
                extra: context_map(self.context)?,
            },
        })
    }
}

impl ConfirmTokenRequest {
    /// # Errors
    /// Returns `Validation` for a blank token or a non-object assertion.
    pub fn validate(&self) -> Result<(), ApprovalError> {
        if self.approval_token.trim().is_empty() {
            return Err(ApprovalError::Validation(
                "approval_token: This field may not be blank.".to_string(),
            ));
        }
        if !self.webauthn_response.is_object() {
            return Err(ApprovalError::Validation(
                "webauthn_response: Expected a JSON object.".to_string(),
            ));
        }
        Ok(())
    }
}

impl From<IssuedApproval> for IssueTokenResponse {
    fn from(issued: IssuedApproval) -> Self {
        Self {
            approval_token: issued.token.expose_secret().to_string(),
            expires_at: issued.expires_at,
            webauthn_options: issued.webauthn_options,
            purpose: issued.descriptor.purpose,
            document_type: issued.descriptor.document_type,
            document_version: issued.descriptor.document_version,
            document_hash: issued.descriptor.document_hash,
        }
    }
}

impl From<Confirmation> for ConfirmTokenResponse {
    fn from(confirmation: Confirmation) -> Self {
        Self {
            success: true,
            approved: confirmation.approved,
            status: confirmation.status.as_str().to_string(),
            audit_id: confirmation.audit_id,
        }
    }
}
