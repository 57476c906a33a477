use std::ops::Deref;

use mongodb::{
    bson::doc, error::Error as DbError, options::IndexOptions, Collection, Database, IndexModel,
};
use serde::{Deserialize, Serialize};

use crate::model::{
    candidate::Candidate, snapshot::IntegritySnapshot, voter::Voter, window::ElectionWindow,
};

use super::counter::Counter;

/// A type that can be directly inserted/read to/from the database.
pub trait MongoCollection {
    /// The name of the collection.
    const NAME: &'static str;
}

/// A database collection of the given type.
pub struct Coll<T>(Collection<T>);

impl<T> Coll<T>
where
    T: MongoCollection,
{
    /// Get a handle on this collection in the given database.
    pub fn from_db(db: &Database) -> Self {
        Self(db.collection(T::NAME))
    }
}

// `Derive(Clone)` would only derive if `T: Clone`, but we don't need that bound.
impl<T> Clone for Coll<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Deref for Coll<T> {
    type Target = Collection<T>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// The persisted election window. There is at most one of these, under a
/// fixed ID; an absent `window` means no window is configured.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowSetting {
    #[serde(rename = "_id")]
    pub id: String,
    pub window: Option<ElectionWindow>,
}

impl WindowSetting {
    pub const ID: &'static str = "election_window";

    pub fn new(window: Option<ElectionWindow>) -> Self {
        Self {
            id: Self::ID.to_string(),
            window,
        }
    }
}

const VOTERS: &str = "voters";
impl MongoCollection for Voter {
    const NAME: &'static str = VOTERS;
}

const CANDIDATES: &str = "candidates";
impl MongoCollection for Candidate {
    const NAME: &'static str = CANDIDATES;
}

const SETTINGS: &str = "settings";
impl MongoCollection for WindowSetting {
    const NAME: &'static str = SETTINGS;
}

const SNAPSHOTS: &str = "integrity_snapshots";
impl MongoCollection for IntegritySnapshot {
    const NAME: &'static str = SNAPSHOTS;
}

const COUNTERS: &str = "counters";
impl MongoCollection for Counter {
    const NAME: &'static str = COUNTERS;
}

/// Ensure that all the required indexes exist on the given database.
///
/// Voters and candidates are unique by `_id`, which needs no extra index.
/// This operation is idempotent.
pub async fn ensure_indexes_exist(db: &Database) -> Result<(), DbError> {
    debug!("Ensuring collection indexes exist");

    let unique = IndexOptions::builder().unique(true).build();

    // Candidate collection.
    let candidate_index = IndexModel::builder()
        .keys(doc! {"seq": 1})
        .options(unique)
        .build();
    Coll::<Candidate>::from_db(db)
        .create_index(candidate_index, None)
        .await?;

    // Snapshot collection.
    let snapshot_index = IndexModel::builder()
        .keys(doc! {"taken_at": -1, "_id": -1})
        .build();
    Coll::<IntegritySnapshot>::from_db(db)
        .create_index(snapshot_index, None)
        .await?;

    Ok(())
}
