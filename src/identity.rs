//! Identity records and the lookup capability the session core depends on.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A durable identity record keyed by a stable subject id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    /// Subject id embedded in tokens
    pub uuid: String,
    pub email: String,
    /// Additional profile fields, flattened into the JSON representation
    #[serde(flatten)]
    pub profile: serde_json::Map<String, serde_json::Value>,
}

impl Identity {
    pub fn new(uuid: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            email: email.into(),
            profile: serde_json::Map::new(),
        }
    }
}

/// Identity store failures (connectivity, throttling, corrupt rows).
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("identity store unavailable: {0}")]
    Unavailable(String),
}

/// Keyed lookup of identities by subject, backed by a uniqueness index.
#[async_trait]
pub trait IdentityLookup: Send + Sync {
    /// Return every record whose subject matches. Callers treat any count
    /// other than one as a failure.
    async fn find_by_subject(&self, subject: &str) -> Result<Vec<Identity>, LookupError>;
}

/// Reduce a lookup result to its only record. Zero or several matches yield `None`.
pub fn single_match(mut records: Vec<Identity>) -> Option<Identity> {
    if records.len() == 1 { records.pop() } else { None }
}
