use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, error, instrument};
use url::Url;

use super::{Challenge, ChallengeService, VerifyOutcome};
use crate::{APP_USER_AGENT, approval::BoundContext, directory::UserSnapshot};

const CHALLENGES_PATH: &str = "/v1/challenges";
const VERIFY_PATH: &str = "/v1/challenges/verify";

/// HTTP client for the challenge/verify service.
#[derive(Clone, Debug)]
pub struct RemoteChallengeService {
    client: Client,
    challenges_url: Url,
    verify_url: Url,
}

#[derive(Deserialize)]
struct VerifyBody {
    verified: bool,
    #[serde(default)]
    credential_id: Option<String>,
    #[serde(default)]
    challenge_id: Option<String>,
    #[serde(default)]
    detail: Option<String>,
}

fn endpoint_url(base: &Url, path: &str) -> Result<Url> {
    if base.cannot_be_a_base() {
        return Err(anyhow!("challenge service URL cannot be a base: {base}"));
    }
    let mut url = base.clone();
    let joined = format!("{}{path}", base.path().trim_end_matches('/'));
    url.set_path(&joined);
    debug!("challenge endpoint URL: {}", url);
    Ok(url)
}

fn error_detail(body: &Value) -> String {
    body.get("detail")
        .or_else(|| body.get("error"))
        .and_then(Value::as_str)
        .unwrap_or("malformed assertion")
        .to_string()
}

impl RemoteChallengeService {
    /// # Errors
    /// Returns an error if the base URL is invalid or the HTTP client cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base = Url::parse(base_url).context("invalid challenge service URL")?;
        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(timeout)
            .build()
            .context("failed to build challenge service client")?;
        Ok(Self {
            client,
            challenges_url: endpoint_url(&base, CHALLENGES_PATH)?,
            verify_url: endpoint_url(&base, VERIFY_PATH)?,
        })
    }
}

#[async_trait]
impl ChallengeService for RemoteChallengeService {
    #[instrument(skip(self, subject, context), fields(user_id = %subject.id))]
    async fn generate_challenge(
        &self,
        subject: &UserSnapshot,
        approval_id: &str,
        context: &BoundContext,
    ) -> Result<Challenge> {
        let response = self
            .client
            .post(self.challenges_url.clone())
            .json(&json!({
                "user_id": subject.id,
                "email": subject.email,
                "approval_id": approval_id,
                "context": context,
            }))
            .send()
            .await
            .context("challenge request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body: Value = response.json().await.unwrap_or(Value::Null);
            error!("Failed to generate challenge: {status}, {}", error_detail(&body));
            return Err(anyhow!("challenge service returned {status}"));
        }

        let options: Value = response
            .json()
            .await
            .context("failed to decode challenge options")?;
        let challenge_id = options
            .get("challengeId")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Ok(Challenge {
            options,
            challenge_id,
        })
    }

    #[instrument(skip(self, subject, assertion, context), fields(user_id = %subject.id))]
    async fn verify_response(
        &self,
        subject: &UserSnapshot,
        approval_id: &str,
        assertion: &Value,
        context: &BoundContext,
    ) -> Result<VerifyOutcome> {
        let response = self
            .client
            .post(self.verify_url.clone())
            .json(&json!({
                "user_id": subject.id,
                "approval_id": approval_id,
                "credential": assertion,
                "context": context,
            }))
            .send()
            .await
            .context("verify request failed")?;

        let status = response.status();
        if status == StatusCode::BAD_REQUEST || status == StatusCode::UNPROCESSABLE_ENTITY {
            let body: Value = response.json().await.unwrap_or(Value::Null);
            return Ok(VerifyOutcome::MalformedInput(error_detail(&body)));
        }
        if !status.is_success() {
            return Err(anyhow!("verify service returned {status}"));
        }

        let body: VerifyBody = response
            .json()
            .await
            .context("failed to decode verify response")?;
        let credential_id = body.credential_id.unwrap_or_default();
        let challenge_id = body.challenge_id.unwrap_or_default();
        Ok(if body.verified {
            VerifyOutcome::Verified {
                credential_id,
                challenge_id,
            }
        } else {
            VerifyOutcome::Rejected {
                reason: body
                    .detail
                    .unwrap_or_else(|| "assertion not verified".to_string()),
                credential_id,
                challenge_id,
            }
        })
    }
}
