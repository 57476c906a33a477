use mongodb::{
    bson::doc,
    options::{FindOneAndUpdateOptions, ReturnDocument, UpdateOptions},
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::mongodb::Coll;

/// ID of the counter handing out candidate sequence numbers.
pub const CANDIDATE_SEQ_COUNTER_ID: &str = "candidate_seq";

/// A counter object used to implement auto-increment fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Counter {
    #[serde(rename = "_id")]
    pub id: String,
    pub next: u64,
}

impl Counter {
    /// Atomically retrieve the next value of the counter with the given ID.
    pub async fn next(counters: &Coll<Counter>, id: &str) -> Result<u64> {
        let update = doc! {
            "$inc": { "next": 1 }
        };
        let options: FindOneAndUpdateOptions = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::Before)
            .build();
        let counter = counters
            .find_one_and_update(doc! { "_id": id }, update, options)
            .await?
            .ok_or_else(|| {
                Error::StorageUnavailable(format!("Failed to find counter with ID {id}"))
            })?;
        Ok(counter.next)
    }
}

/// Ensure the counter with the given ID exists, creating it at `start` if not.
///
/// This operation is idempotent and never resets an existing counter.
pub async fn ensure_counter_exists(counters: &Coll<Counter>, id: &str, start: u64) -> Result<()> {
    let update = doc! {
        "$setOnInsert": { "next": start as i64 }
    };
    let options = UpdateOptions::builder().upsert(true).build();
    counters
        .update_one(doc! { "_id": id }, update, options)
        .await?;
    Ok(())
}
