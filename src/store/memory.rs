//! In-memory storage backend.

use std::collections::HashMap;

use chrono::Utc;
use rocket::tokio::sync::RwLock;

use crate::error::{Error, Result};
use crate::model::{
    candidate::Candidate, identity::VoterKey, snapshot::IntegritySnapshot, voter::Voter,
    window::{is_open, ElectionWindow, WindowPolicy},
};

use super::ElectionStore;

#[derive(Debug, Default)]
struct State {
    voters: HashMap<VoterKey, Voter>,
    /// Kept in insertion order.
    candidates: Vec<Candidate>,
    next_seq: u64,
    window: Option<ElectionWindow>,
    snapshots: Vec<IntegritySnapshot>,
}

impl State {
    fn candidate_mut(&mut self, name: &str) -> Option<&mut Candidate> {
        self.candidates.iter_mut().find(|c| c.name == name)
    }
}

/// Election state held in process memory behind a single `RwLock`.
///
/// Nothing survives a restart, so this is meant for development and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[rocket::async_trait]
impl ElectionStore for MemoryStore {
    async fn insert_voter(&self, voter: &Voter) -> Result<()> {
        let mut state = self.state.write().await;
        if is_open(state.window.as_ref(), Utc::now()) {
            return Err(Error::RegistrationClosed);
        }
        if state.voters.contains_key(&voter.key) {
            return Err(Error::DuplicateIdentity);
        }
        state.voters.insert(voter.key.clone(), voter.clone());
        Ok(())
    }

    async fn find_voter(&self, key: &VoterKey) -> Result<Option<Voter>> {
        Ok(self.state.read().await.voters.get(key).cloned())
    }

    async fn insert_candidate(&self, name: &str) -> Result<Candidate> {
        let mut state = self.state.write().await;
        if state.candidates.iter().any(|c| c.name == name) {
            return Err(Error::DuplicateCandidate(name.to_string()));
        }
        state.next_seq += 1;
        let candidate = Candidate::new(name.to_string(), state.next_seq);
        state.candidates.push(candidate.clone());
        Ok(candidate)
    }

    async fn candidates(&self) -> Result<Vec<Candidate>> {
        Ok(self.state.read().await.candidates.clone())
    }

    async fn record_vote(
        &self,
        key: &VoterKey,
        candidate: &str,
        policy: WindowPolicy,
    ) -> Result<Candidate> {
        // All checks and both mutations happen under one write lock.
        let mut state = self.state.write().await;
        match state.voters.get(key) {
            None => return Err(Error::VoterNotFound),
            Some(voter) if voter.has_voted => return Err(Error::AlreadyVoted),
            Some(_) => {}
        }
        if !policy.permits_vote(state.window.as_ref(), Utc::now()) {
            return Err(Error::ElectionClosed);
        }
        let updated = {
            let entry = state
                .candidate_mut(candidate)
                .ok_or_else(|| Error::CandidateNotFound(candidate.to_string()))?;
            entry.vote_count += 1;
            entry.clone()
        };
        // Presence checked above, under the same lock.
        if let Some(voter) = state.voters.get_mut(key) {
            voter.mark_voted(candidate);
        }
        Ok(updated)
    }

    async fn election_window(&self) -> Result<Option<ElectionWindow>> {
        Ok(self.state.read().await.window)
    }

    async fn set_election_window(&self, window: Option<ElectionWindow>) -> Result<()> {
        self.state.write().await.window = window;
        Ok(())
    }

    async fn append_snapshot(&self, snapshot: &IntegritySnapshot) -> Result<()> {
        self.state.write().await.snapshots.push(snapshot.clone());
        Ok(())
    }

    async fn latest_snapshot(&self) -> Result<Option<IntegritySnapshot>> {
        let state = self.state.read().await;
        // Later entries win ties on timestamp.
        let latest = state
            .snapshots
            .iter()
            .enumerate()
            .max_by_key(|(i, s)| (s.taken_at, *i))
            .map(|(_, s)| s.clone());
        Ok(latest)
    }
}
