//! Best-effort change detection over the candidate ledger.
//!
//! A snapshot is a digest of the full candidate collection at a point in
//! time. Comparing a fresh digest with the latest stored one detects
//! accidental changes between the two points; it is not a security control,
//! since anyone able to store a snapshot can store another after tampering.

use chrono::{DateTime, Utc};
use data_encoding::HEXLOWER;
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use rocket::serde::json::serde_json;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::candidate::Candidate;

/// Version tag of the canonical ledger serialization.
pub const DIGEST_VERSION: u32 = 1;

/// A stored ledger digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegritySnapshot {
    pub digest: String,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub taken_at: DateTime<Utc>,
}

impl IntegritySnapshot {
    /// Take a snapshot of the given ledger now.
    pub fn of(candidates: &[Candidate]) -> Self {
        Self {
            digest: ledger_digest(candidates),
            taken_at: Utc::now(),
        }
    }
}

/// Canonical form of the ledger: candidates sorted by name, each as a
/// `[name, vote_count]` pair.
#[derive(Serialize)]
struct CanonicalLedger<'a> {
    version: u32,
    candidates: Vec<(&'a str, u64)>,
}

/// Hex SHA-256 of the canonical serialization of `candidates`.
/// The result does not depend on the order the candidates are given in.
pub fn ledger_digest(candidates: &[Candidate]) -> String {
    let mut entries: Vec<(&str, u64)> = candidates
        .iter()
        .map(|c| (c.name.as_str(), c.vote_count))
        .collect();
    entries.sort_unstable();
    let canonical = CanonicalLedger {
        version: DIGEST_VERSION,
        candidates: entries,
    };
    // Serializing strings and integers to JSON cannot fail.
    let bytes = serde_json::to_vec(&canonical).unwrap();
    HEXLOWER.encode(&Sha256::digest(&bytes))
}

/// Outcome of comparing the current ledger against the latest snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    pub verified: bool,
    pub stored_digest: Option<String>,
    pub computed_digest: String,
}

impl Verification {
    /// Compare `candidates` with `latest`. With no snapshot stored there is
    /// nothing to verify against, which counts as unverified.
    pub fn compare(latest: Option<&IntegritySnapshot>, candidates: &[Candidate]) -> Self {
        let computed_digest = ledger_digest(candidates);
        let stored_digest = latest.map(|s| s.digest.clone());
        Self {
            verified: stored_digest.as_deref() == Some(computed_digest.as_str()),
            stored_digest,
            computed_digest,
        }
    }
}
