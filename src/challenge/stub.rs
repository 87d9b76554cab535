use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::{
    collections::HashMap,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use super::{Challenge, ChallengeService, VerifyOutcome};
use crate::{approval::BoundContext, directory::UserSnapshot};

/// How the stub answers verification requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StubVerify {
    /// Verified when the context matches the one the challenge was bound to.
    Bound,
    Reject,
    Malformed,
    /// Both generation and verification fail.
    Unavailable,
}

/// In-process collaborator that remembers which context each challenge was bound to.
pub struct StubChallengeService {
    mode: Mutex<StubVerify>,
    bound: Mutex<HashMap<String, BoundContext>>,
    verify_calls: AtomicUsize,
}

impl StubChallengeService {
    pub fn new(mode: StubVerify) -> Self {
        Self {
            mode: Mutex::new(mode),
            bound: Mutex::new(HashMap::new()),
            verify_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_mode(&self, mode: StubVerify) {
        if let Ok(mut current) = self.mode.lock() {
            *current = mode;
        }
    }

    pub fn verify_calls(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
    }

    fn mode(&self) -> StubVerify {
        self.mode.lock().map_or(StubVerify::Unavailable, |mode| *mode)
    }
}

fn challenge_id_for(approval_id: &str) -> String {
    format!("challenge-{approval_id}")
}

#[async_trait]
impl ChallengeService for StubChallengeService {
    async fn generate_challenge(
        &self,
        _subject: &UserSnapshot,
        approval_id: &str,
        context: &BoundContext,
    ) -> Result<Challenge> {
        if self.mode() == StubVerify::Unavailable {
            return Err(anyhow!("challenge service unavailable"));
        }
        let challenge_id = challenge_id_for(approval_id);
        self.bound
            .lock()
            .map_err(|_| anyhow!("stub lock poisoned"))?
            .insert(approval_id.to_string(), context.clone());
        Ok(Challenge {
            options: json!({
                "challenge": "c3R1Yi1jaGFsbGVuZ2U",
                "challengeId": challenge_id,
                "userVerification": "required",
            }),
            challenge_id,
        })
    }

    async fn verify_response(
        &self,
        _subject: &UserSnapshot,
        approval_id: &str,
        _assertion: &Value,
        context: &BoundContext,
    ) -> Result<VerifyOutcome> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        let challenge_id = challenge_id_for(approval_id);
        match self.mode() {
            StubVerify::Bound => {
                let bound = self
                    .bound
                    .lock()
                    .map_err(|_| anyhow!("stub lock poisoned"))?
                    .get(approval_id)
                    .cloned();
                Ok(if bound.as_ref() == Some(context) {
                    VerifyOutcome::Verified {
                        credential_id: "stub-credential".to_string(),
                        challenge_id,
                    }
                } else {
                    VerifyOutcome::Rejected {
                        reason: "context mismatch".to_string(),
                        credential_id: String::new(),
                        challenge_id,
                    }
                })
            }
            StubVerify::Reject => Ok(VerifyOutcome::Rejected {
                reason: "signature mismatch".to_string(),
                credential_id: "stub-credential".to_string(),
                challenge_id,
            }),
            StubVerify::Malformed => Ok(VerifyOutcome::MalformedInput(
                "missing clientDataJSON".to_string(),
            )),
            StubVerify::Unavailable => Err(anyhow!("challenge service unavailable")),
        }
    }
}
