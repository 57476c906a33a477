use serde::{Deserialize, Serialize};

use crate::model::snapshot::{IntegritySnapshot, Verification};

/// Response to storing a ledger digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotStored {
    pub message: String,
    pub digest: String,
    /// Unix seconds.
    pub taken_at: i64,
}

impl From<IntegritySnapshot> for SnapshotStored {
    fn from(snapshot: IntegritySnapshot) -> Self {
        Self {
            message: "Vote hash stored".to_string(),
            digest: snapshot.digest,
            taken_at: snapshot.taken_at.timestamp(),
        }
    }
}

/// Result of verifying the ledger against the latest digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationDesc {
    pub verified: bool,
    pub stored_digest: Option<String>,
    pub computed_digest: String,
}

impl From<Verification> for VerificationDesc {
    fn from(verification: Verification) -> Self {
        Self {
            verified: verification.verified,
            stored_digest: verification.stored_digest,
            computed_digest: verification.computed_digest,
        }
    }
}
