//! API-friendly (JSON) request and response types.
//!
//! Field names are camelCase and times are Unix seconds, as expected by the
//! web frontend.

pub mod caller;
pub mod candidate;
pub mod snapshot;
pub mod voter;
pub mod window;

use serde::{Deserialize, Serialize};

/// A plain success message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub message: String,
}

impl Message {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
