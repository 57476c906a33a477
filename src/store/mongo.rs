//! MongoDB storage backend.
//!
//! Votes are recorded in a multi-document transaction, which requires the
//! server to be running as a replica set.

use std::time::{Duration, Instant};

use chrono::Utc;
use mongodb::{
    bson::doc,
    error::{Error as DbError, TRANSIENT_TRANSACTION_ERROR, UNKNOWN_TRANSACTION_COMMIT_RESULT},
    options::{FindOneAndUpdateOptions, FindOneOptions, FindOptions, ReplaceOptions, ReturnDocument},
    Client, ClientSession, Database,
};
use rocket::futures::TryStreamExt;
use rocket::tokio::time::sleep;

use crate::error::{Error, Result};
use crate::model::{
    candidate::Candidate,
    identity::VoterKey,
    mongodb::{
        ensure_counter_exists, ensure_indexes_exist, is_duplicate_key_error, Coll, Counter,
        WindowSetting, CANDIDATE_SEQ_COUNTER_ID,
    },
    snapshot::IntegritySnapshot,
    voter::Voter,
    window::{is_open, ElectionWindow, WindowPolicy},
};

use super::ElectionStore;

/// How many times a commit with an unknown outcome is retried.
const MAX_COMMIT_ATTEMPTS: usize = 5;

/// First pause between transaction attempts; doubles up to [`MAX_BACKOFF`].
const INITIAL_BACKOFF: Duration = Duration::from_millis(5);
const MAX_BACKOFF: Duration = Duration::from_millis(250);

/// Pause before transaction attempt number `attempt + 1`.
fn transaction_backoff(attempt: u32) -> Duration {
    INITIAL_BACKOFF
        .checked_mul(1 << attempt.min(16))
        .map_or(MAX_BACKOFF, |d| d.min(MAX_BACKOFF))
}

/// Result of one transaction attempt. `Ok(Err(_))` is a business rejection,
/// after which the transaction has been aborted.
type Attempt<T> = std::result::Result<Result<T>, DbError>;

/// Election state held in a MongoDB database.
#[derive(Clone)]
pub struct MongoStore {
    client: Client,
    db: Database,
    voters: Coll<Voter>,
    candidates: Coll<Candidate>,
    settings: Coll<WindowSetting>,
    snapshots: Coll<IntegritySnapshot>,
    counters: Coll<Counter>,
    /// How long a transaction keeps being retried after write conflicts.
    retry_window: Duration,
}

impl MongoStore {
    /// Wrap the named database, ensuring indexes and counters exist.
    /// Conflicting transactions are retried for up to `retry_window`.
    pub async fn connect(client: Client, db_name: &str, retry_window: Duration) -> Result<Self> {
        let db = client.database(db_name);
        ensure_indexes_exist(&db).await?;
        let store = Self {
            voters: Coll::from_db(&db),
            candidates: Coll::from_db(&db),
            settings: Coll::from_db(&db),
            snapshots: Coll::from_db(&db),
            counters: Coll::from_db(&db),
            client,
            db,
            retry_window,
        };
        ensure_counter_exists(&store.counters, CANDIDATE_SEQ_COUNTER_ID, 1).await?;
        Ok(store)
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// The election window as seen by the transaction on `session`.
    async fn window_in(
        &self,
        session: &mut ClientSession,
    ) -> std::result::Result<Option<ElectionWindow>, DbError> {
        let setting = self
            .settings
            .find_one_with_session(doc! { "_id": WindowSetting::ID }, None, session)
            .await?;
        Ok(setting.and_then(|s| s.window))
    }

    /// Run the registration transaction once.
    async fn try_insert_voter(&self, session: &mut ClientSession, voter: &Voter) -> Attempt<()> {
        session.start_transaction(None).await?;

        if is_open(self.window_in(session).await?.as_ref(), Utc::now()) {
            session.abort_transaction().await?;
            return Ok(Err(Error::RegistrationClosed));
        }
        match self
            .voters
            .insert_one_with_session(voter, None, session)
            .await
        {
            Ok(_) => {}
            Err(err) if is_duplicate_key_error(&err) => {
                session.abort_transaction().await?;
                return Ok(Err(Error::DuplicateIdentity));
            }
            Err(err) => return Err(err),
        }

        commit_with_retry(session).await?;
        Ok(Ok(()))
    }

    /// Run the vote transaction once.
    async fn try_record_vote(
        &self,
        session: &mut ClientSession,
        key: &VoterKey,
        candidate: &str,
        policy: WindowPolicy,
    ) -> Attempt<Candidate> {
        session.start_transaction(None).await?;

        // Flip `has_voted` only if it is still false.
        let filter = doc! {
            "_id": key.as_str(),
            "has_voted": false,
        };
        let update = doc! {
            "$set": {
                "has_voted": true,
                "voted_for": candidate,
            }
        };
        let flipped = self
            .voters
            .find_one_and_update_with_session(filter, update, None, session)
            .await?;
        if flipped.is_none() {
            session.abort_transaction().await?;
            return Ok(Err(self.voter_rejection(key).await?));
        }

        // The window is read in the same transaction as the writes.
        let window = self.window_in(session).await?;
        if !policy.permits_vote(window.as_ref(), Utc::now()) {
            session.abort_transaction().await?;
            return Ok(Err(Error::ElectionClosed));
        }

        // Increment the tally in the same transaction.
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();
        let updated = self
            .candidates
            .find_one_and_update_with_session(
                doc! { "_id": candidate },
                doc! { "$inc": { "vote_count": 1 } },
                options,
                session,
            )
            .await?;
        let updated = match updated {
            Some(updated) => updated,
            None => {
                session.abort_transaction().await?;
                return Ok(Err(Error::CandidateNotFound(candidate.to_string())));
            }
        };

        commit_with_retry(session).await?;
        Ok(Ok(updated))
    }

    /// Why a voter's `has_voted` flag could not be flipped.
    async fn voter_rejection(&self, key: &VoterKey) -> std::result::Result<Error, DbError> {
        let existing = self.voters.find_one(doc! { "_id": key.as_str() }, None).await?;
        Ok(match existing {
            Some(_) => Error::AlreadyVoted,
            None => Error::VoterNotFound,
        })
    }

    /// Has the voter's vote been committed? Lookup failures count as no.
    async fn has_voted(&self, key: &VoterKey) -> bool {
        matches!(
            self.voters.find_one(doc! { "_id": key.as_str() }, None).await,
            Ok(Some(Voter { has_voted: true, .. }))
        )
    }

    /// Decide whether to go round again after a failed transaction attempt,
    /// sleeping first if so. Only transient errors within the retry window
    /// are retried.
    async fn should_retry(
        &self,
        session: &mut ClientSession,
        err: &DbError,
        attempt: u32,
        started: Instant,
    ) -> bool {
        // Fails harmlessly if nothing is in progress.
        let _ = session.abort_transaction().await;
        if !err.contains_label(TRANSIENT_TRANSACTION_ERROR) {
            return false;
        }
        let pause = transaction_backoff(attempt);
        if started.elapsed() + pause > self.retry_window {
            return false;
        }
        debug!("Retrying transaction after transient error: {err}");
        sleep(pause).await;
        true
    }
}

/// Commit, retrying while the outcome of the commit is unknown.
async fn commit_with_retry(session: &mut ClientSession) -> std::result::Result<(), DbError> {
    let mut attempts = 0;
    loop {
        attempts += 1;
        match session.commit_transaction().await {
            Err(err)
                if err.contains_label(UNKNOWN_TRANSACTION_COMMIT_RESULT)
                    && attempts < MAX_COMMIT_ATTEMPTS =>
            {
                debug!("Retrying commit with unknown result: {err}");
            }
            result => return result,
        }
    }
}

#[rocket::async_trait]
impl ElectionStore for MongoStore {
    async fn insert_voter(&self, voter: &Voter) -> Result<()> {
        let mut session = self.client.start_session(None).await?;
        let started = Instant::now();
        let mut attempt = 0;
        loop {
            match self.try_insert_voter(&mut session, voter).await {
                Ok(outcome) => return outcome,
                Err(err) => {
                    if !self.should_retry(&mut session, &err, attempt, started).await {
                        return Err(err.into());
                    }
                }
            }
            attempt += 1;
        }
    }

    async fn find_voter(&self, key: &VoterKey) -> Result<Option<Voter>> {
        Ok(self
            .voters
            .find_one(doc! { "_id": key.as_str() }, None)
            .await?)
    }

    async fn insert_candidate(&self, name: &str) -> Result<Candidate> {
        // Reject known duplicates before burning a sequence number.
        if self
            .candidates
            .find_one(doc! { "_id": name }, None)
            .await?
            .is_some()
        {
            return Err(Error::DuplicateCandidate(name.to_string()));
        }
        let seq = Counter::next(&self.counters, CANDIDATE_SEQ_COUNTER_ID).await?;
        let candidate = Candidate::new(name.to_string(), seq);
        match self.candidates.insert_one(&candidate, None).await {
            Ok(_) => Ok(candidate),
            Err(err) if is_duplicate_key_error(&err) => {
                Err(Error::DuplicateCandidate(name.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn candidates(&self) -> Result<Vec<Candidate>> {
        let options = FindOptions::builder().sort(doc! { "seq": 1 }).build();
        let candidates: Vec<Candidate> = self
            .candidates
            .find(None, options)
            .await?
            .try_collect()
            .await?;
        Ok(candidates)
    }

    async fn record_vote(
        &self,
        key: &VoterKey,
        candidate: &str,
        policy: WindowPolicy,
    ) -> Result<Candidate> {
        let mut session = self.client.start_session(None).await?;
        let started = Instant::now();
        let mut attempt = 0;
        loop {
            // A concurrent vote by the same voter shows up as a write
            // conflict; once the winner commits, the conditional update no
            // longer matches.
            match self.try_record_vote(&mut session, key, candidate, policy).await {
                Ok(outcome) => return outcome,
                Err(err) => {
                    if !self.should_retry(&mut session, &err, attempt, started).await {
                        // Out of retries: a voter who has voted by now lost
                        // the race rather than hitting a storage failure.
                        let lost_race = err.contains_label(TRANSIENT_TRANSACTION_ERROR)
                            && self.has_voted(key).await;
                        if lost_race {
                            return Err(Error::AlreadyVoted);
                        }
                        return Err(err.into());
                    }
                }
            }
            attempt += 1;
        }
    }

    async fn election_window(&self) -> Result<Option<ElectionWindow>> {
        let setting = self
            .settings
            .find_one(doc! { "_id": WindowSetting::ID }, None)
            .await?;
        Ok(setting.and_then(|s| s.window))
    }

    async fn set_election_window(&self, window: Option<ElectionWindow>) -> Result<()> {
        let options = ReplaceOptions::builder().upsert(true).build();
        self.settings
            .replace_one(
                doc! { "_id": WindowSetting::ID },
                WindowSetting::new(window),
                options,
            )
            .await?;
        Ok(())
    }

    async fn append_snapshot(&self, snapshot: &IntegritySnapshot) -> Result<()> {
        self.snapshots.insert_one(snapshot, None).await?;
        Ok(())
    }

    async fn latest_snapshot(&self) -> Result<Option<IntegritySnapshot>> {
        let options = FindOneOptions::builder()
            .sort(doc! { "taken_at": -1, "_id": -1 })
            .build();
        Ok(self.snapshots.find_one(None, options).await?)
    }
}
