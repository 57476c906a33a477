use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A candidate and their running tally, as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    /// Candidate names are unique, so they double as the ID.
    #[serde(rename = "_id")]
    pub name: String,
    pub vote_count: u64,
    /// Insertion sequence number; listing is ordered by this.
    pub seq: u64,
}

impl Candidate {
    pub fn new(name: String, seq: u64) -> Self {
        Self {
            name,
            vote_count: 0,
            seq,
        }
    }
}

/// Normalise a candidate name supplied by a client.
pub fn candidate_name(raw: &str) -> Result<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(Error::bad_request("Candidate name is required"));
    }
    Ok(name.to_string())
}
