//! Election data types.
//!
//! - [`api`] holds the JSON shapes exchanged with clients.
//! - [`mongodb`] holds the glue for storing the other types in MongoDB.

pub mod api;
pub mod candidate;
pub mod identity;
pub mod mongodb;
pub mod snapshot;
pub mod voter;
pub mod window;
