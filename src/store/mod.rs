//! Storage backends for the ballot box.
//!
//! [`ElectionStore`] is the seam between the vote-handling logic and the
//! document store. Two backends are provided:
//!
//! - [`MemoryStore`]: everything behind one async `RwLock`, for development
//!   and tests.
//! - [`MongoStore`]: MongoDB, using a multi-document transaction for votes.

mod memory;
mod mongo;
#[cfg(test)]
pub(crate) mod faulty;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

use crate::error::Result;
use crate::model::{
    candidate::Candidate,
    identity::VoterKey,
    snapshot::IntegritySnapshot,
    voter::Voter,
    window::{ElectionWindow, WindowPolicy},
};

/// Persistent state behind the ballot box.
///
/// Implementations must be `Send + Sync` as one store is shared by every
/// in-flight request. Every failure of the underlying storage is reported as
/// [`crate::error::Error::StorageUnavailable`].
#[rocket::async_trait]
pub trait ElectionStore: Send + Sync {
    /// Insert a new voter. Fails with `DuplicateIdentity` if the key exists,
    /// and with `RegistrationClosed` if the election window is open at the
    /// moment of insertion.
    async fn insert_voter(&self, voter: &Voter) -> Result<()>;

    /// Look up a voter by key.
    async fn find_voter(&self, key: &VoterKey) -> Result<Option<Voter>>;

    /// Insert a new candidate with a zero tally and the next sequence number.
    /// Fails with `DuplicateCandidate` if the name exists.
    async fn insert_candidate(&self, name: &str) -> Result<Candidate>;

    /// All candidates in insertion order.
    async fn candidates(&self) -> Result<Vec<Candidate>>;

    /// Atomically mark the voter as having voted and add one to the
    /// candidate's tally, returning the updated candidate.
    ///
    /// Fails with `VoterNotFound`, `AlreadyVoted`, `ElectionClosed` (the
    /// window as seen by this same atomic unit does not admit the vote under
    /// `policy`), or `CandidateNotFound`, in that order, without changing
    /// anything. Of several concurrent calls for the same voter, at most one
    /// succeeds.
    async fn record_vote(
        &self,
        key: &VoterKey,
        candidate: &str,
        policy: WindowPolicy,
    ) -> Result<Candidate>;

    /// The configured election window, if any.
    async fn election_window(&self) -> Result<Option<ElectionWindow>>;

    /// Replace (or clear, with `None`) the election window.
    async fn set_election_window(&self, window: Option<ElectionWindow>) -> Result<()>;

    /// Append a snapshot to the log.
    async fn append_snapshot(&self, snapshot: &IntegritySnapshot) -> Result<()>;

    /// The most recently taken snapshot, if any.
    async fn latest_snapshot(&self) -> Result<Option<IntegritySnapshot>>;
}
