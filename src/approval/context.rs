//! Canonical transaction context bound into the challenge and the assertion.
//!
//! The same structure must be rebuilt at confirmation time; the challenge
//! service ties the assertion to it, so any divergence fails verification.

use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::model::{ApprovalSession, TransactionDescriptor};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct BoundContext(Map<String, Value>);

impl BoundContext {
    /// Build the canonical context.
    ///
    /// `extra` is nested under its own key and only present when non-empty, so
    /// transactions without extras share one stable shape.
    #[must_use]
    pub fn bind(descriptor: &TransactionDescriptor, subject_user_id: Uuid, tenant_id: Uuid) -> Self {
        let mut map = Map::new();
        map.insert(
            "purpose".to_string(),
            Value::String(descriptor.purpose.clone()),
        );
        map.insert(
            "document_type".to_string(),
            Value::String(descriptor.document_type.clone()),
        );
        map.insert(
            "document_version".to_string(),
            Value::String(descriptor.document_version.clone()),
        );
        map.insert(
            "document_hash".to_string(),
            Value::String(descriptor.document_hash.clone()),
        );
        map.insert(
            "subject_user_id".to_string(),
            Value::String(subject_user_id.to_string()),
        );
        map.insert("tenant_id".to_string(), Value::String(tenant_id.to_string()));
        if !descriptor.extra.is_empty() {
            map.insert("extra".to_string(), Value::Object(descriptor.extra.clone()));
        }
        Self(map)
    }

    #[must_use]
    pub fn for_session(session: &ApprovalSession) -> Self {
        Self::bind(
            &session.descriptor,
            session.subject_user_id,
            session.tenant_id,
        )
    }

    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    /// Deterministic serialisation with keys sorted at every level.
    #[must_use]
    pub fn canonical_json(&self) -> String {
        sorted(&Value::Object(self.0.clone())).to_string()
    }

    /// SHA-256 of the canonical serialisation.
    #[must_use]
    pub fn digest(&self) -> Vec<u8> {
        let mut hasher = Sha256::new();
        hasher.update(self.canonical_json().as_bytes());
        hasher.finalize().to_vec()
    }
}

// `Map` keeps insertion order when serde_json's `preserve_order` feature is unified in.
fn sorted(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = Map::with_capacity(map.len());
            for key in keys {
                if let Some(inner) = map.get(key) {
                    out.insert(key.clone(), sorted(inner));
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        other => other.clone(),
    }
}
