use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use super::identity::VoterKey;

/// Display name used when the voter gives none.
pub const ANONYMOUS_VOTER: &str = "Anonymous Voter";

/// A registered voter, as stored.
///
/// `has_voted` only ever moves from `false` to `true`, and only inside the
/// vote transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voter {
    /// Voter unique ID: the HMAC of their identity token.
    #[serde(rename = "_id")]
    pub key: VoterKey,
    pub display_name: String,
    pub has_voted: bool,
    pub voted_for: Option<String>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub registered_at: DateTime<Utc>,
}

impl Voter {
    /// Create a voter who has not yet voted.
    pub fn new(key: VoterKey, display_name: &str) -> Self {
        let display_name = display_name.trim();
        let display_name = if display_name.is_empty() {
            ANONYMOUS_VOTER
        } else {
            display_name
        };
        Self {
            key,
            display_name: display_name.to_string(),
            has_voted: false,
            voted_for: None,
            registered_at: Utc::now(),
        }
    }

    /// Record that this voter has cast their vote.
    pub fn mark_voted(&mut self, candidate: &str) {
        self.has_voted = true;
        self.voted_for = Some(candidate.to_string());
    }
}
