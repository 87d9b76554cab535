//! Biometric challenge collaborator.
//!
//! Challenge generation and assertion verification are consumed as an opaque
//! service; this module only fixes the shapes that cross the boundary.

mod remote;
#[cfg(test)]
pub(crate) mod stub;

pub use remote::RemoteChallengeService;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::{approval::BoundContext, directory::UserSnapshot};

/// Challenge payload handed back to the browser, plus its opaque reference.
#[derive(Clone, Debug, PartialEq)]
pub struct Challenge {
    pub options: Value,
    pub challenge_id: String,
}

/// Result of asking the collaborator to verify an assertion.
///
/// `Err` from [`ChallengeService::verify_response`] is reserved for a
/// collaborator that could not answer at all.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VerifyOutcome {
    Verified {
        credential_id: String,
        challenge_id: String,
    },
    Rejected {
        reason: String,
        credential_id: String,
        challenge_id: String,
    },
    MalformedInput(String),
}

#[async_trait]
pub trait ChallengeService: Send + Sync {
    async fn generate_challenge(
        &self,
        subject: &UserSnapshot,
        approval_id: &str,
        context: &BoundContext,
    ) -> Result<Challenge>;

    async fn verify_response(
        &self,
        subject: &UserSnapshot,
        approval_id: &str,
        assertion: &Value,
        context: &BoundContext,
    ) -> Result<VerifyOutcome>;
}
