use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::model::window::{is_open, ElectionWindow};

/// Body of a start-voting request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartVoting {
    /// Length of the voting period in seconds.
    pub duration: u64,
}

/// Response to a successful start-voting request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VotingStarted {
    pub message: String,
    pub start_time: i64,
    pub end_time: i64,
}

impl From<ElectionWindow> for VotingStarted {
    fn from(window: ElectionWindow) -> Self {
        Self {
            message: "Voting started".to_string(),
            start_time: window.start_time.timestamp(),
            end_time: window.end_time.timestamp(),
        }
    }
}

/// The current voting period, in Unix seconds. Both times are `null` when
/// no period is configured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VotingTime {
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
    pub open: bool,
}

impl From<Option<ElectionWindow>> for VotingTime {
    fn from(window: Option<ElectionWindow>) -> Self {
        Self {
            start_time: window.map(|w| w.start_time.timestamp()),
            end_time: window.map(|w| w.end_time.timestamp()),
            open: is_open(window.as_ref(), Utc::now()),
        }
    }
}
