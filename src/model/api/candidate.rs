use serde::{Deserialize, Serialize};

use crate::model::candidate::Candidate;

/// Body of an add-candidate request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCandidate {
    pub name: String,
}

/// A candidate and their tally, as shown to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateDesc {
    pub name: String,
    pub vote_count: u64,
}

impl From<Candidate> for CandidateDesc {
    fn from(candidate: Candidate) -> Self {
        Self {
            name: candidate.name,
            vote_count: candidate.vote_count,
        }
    }
}
