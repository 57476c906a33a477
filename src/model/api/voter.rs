use serde::{Deserialize, Serialize};

/// Body of a registration request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub identity: String,
    /// Older clients send this as `voterName`.
    #[serde(default, alias = "voterName")]
    pub display_name: String,
}

/// Response to a successful registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registered {
    pub message: String,
    pub identity: String,
}

/// Body of an eligibility check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EligibilityRequest {
    pub identity: String,
}

/// Body of a vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRequest {
    pub identity: String,
    /// Older clients send this as `candidate`.
    #[serde(alias = "candidate")]
    pub candidate_name: String,
}
