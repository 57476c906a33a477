//! A store that misbehaves on purpose, for exercising failure paths.

use chrono::{Duration, Utc};

use crate::error::{Error, Result};
use crate::model::{
    candidate::Candidate, identity::VoterKey, snapshot::IntegritySnapshot, voter::Voter,
    window::{ElectionWindow, WindowPolicy},
};

use super::{ElectionStore, MemoryStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Every vote fails as if the database were unreachable.
    FailVotes,
    /// The window expires between the caller's checks and the vote write.
    CloseWindowBeforeVote,
    /// Voting opens between the caller's checks and the voter insert.
    OpenWindowBeforeRegister,
}

/// [`MemoryStore`] with one injected [`Fault`].
pub struct FaultyStore {
    inner: MemoryStore,
    fault: Fault,
}

impl FaultyStore {
    pub fn new(fault: Fault) -> Self {
        Self {
            inner: MemoryStore::new(),
            fault,
        }
    }
}

#[rocket::async_trait]
impl ElectionStore for FaultyStore {
    async fn insert_voter(&self, voter: &Voter) -> Result<()> {
        if self.fault == Fault::OpenWindowBeforeRegister {
            let open = ElectionWindow::starting_at(Utc::now(), 3600)?;
            self.inner.set_election_window(Some(open)).await?;
        }
        self.inner.insert_voter(voter).await
    }

    async fn find_voter(&self, key: &VoterKey) -> Result<Option<Voter>> {
        self.inner.find_voter(key).await
    }

    async fn insert_candidate(&self, name: &str) -> Result<Candidate> {
        self.inner.insert_candidate(name).await
    }

    async fn candidates(&self) -> Result<Vec<Candidate>> {
        self.inner.candidates().await
    }

    async fn record_vote(
        &self,
        key: &VoterKey,
        candidate: &str,
        policy: WindowPolicy,
    ) -> Result<Candidate> {
        match self.fault {
            Fault::FailVotes => {
                return Err(Error::StorageUnavailable(
                    "connection reset by peer".to_string(),
                ))
            }
            Fault::CloseWindowBeforeVote => {
                let past = ElectionWindow::starting_at(Utc::now() - Duration::hours(2), 3600)?;
                self.inner.set_election_window(Some(past)).await?;
            }
            Fault::OpenWindowBeforeRegister => {}
        }
        self.inner.record_vote(key, candidate, policy).await
    }

    async fn election_window(&self) -> Result<Option<ElectionWindow>> {
        self.inner.election_window().await
    }

    async fn set_election_window(&self, window: Option<ElectionWindow>) -> Result<()> {
        self.inner.set_election_window(window).await
    }

    async fn append_snapshot(&self, snapshot: &IntegritySnapshot) -> Result<()> {
        self.inner.append_snapshot(snapshot).await
    }

    async fn latest_snapshot(&self) -> Result<Option<IntegritySnapshot>> {
        self.inner.latest_snapshot().await
    }
}
