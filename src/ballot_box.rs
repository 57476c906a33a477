//! The ballot box: voter registration, candidate management, vote casting,
//! and the integrity snapshot, on top of an [`ElectionStore`].

use std::sync::Arc;

use chrono::Utc;

use crate::error::{Error, Result};
use crate::model::{
    candidate::{candidate_name, Candidate},
    identity::{Identity, IdentityIssuer},
    snapshot::{IntegritySnapshot, Verification},
    voter::Voter,
    window::{is_open, ElectionWindow, WindowPolicy},
};
use crate::store::ElectionStore;
use crate::Config;

/// Core election service, shared by every request.
#[derive(Clone)]
pub struct BallotBox {
    store: Arc<dyn ElectionStore>,
    issuer: IdentityIssuer,
    admin: Identity,
    policy: WindowPolicy,
}

impl BallotBox {
    pub fn new(
        store: Arc<dyn ElectionStore>,
        issuer: IdentityIssuer,
        admin: Identity,
        policy: WindowPolicy,
    ) -> Self {
        Self {
            store,
            issuer,
            admin,
            policy,
        }
    }

    /// Build a ballot box over `store` from the application config.
    pub fn from_config(store: Arc<dyn ElectionStore>, config: &Config) -> Result<Self> {
        Ok(Self::new(
            store,
            IdentityIssuer::new(config.identity_secret()),
            Identity::new(config.admin_identity())?,
            config.window_policy(),
        ))
    }

    pub fn store(&self) -> Arc<dyn ElectionStore> {
        self.store.clone()
    }

    /// Fail with `Unauthorized` unless `caller` is the configured admin.
    pub fn ensure_admin(&self, caller: Option<&Identity>, action: &str) -> Result<()> {
        match caller {
            Some(caller) if caller.matches(&self.admin) => Ok(()),
            Some(_) => {
                warn!("Non-admin caller attempted to {action}");
                Err(Error::unauthorized(format!("only the admin may {action}")))
            }
            None => Err(Error::unauthorized(format!("only the admin may {action}"))),
        }
    }

    /// Register a new voter. Only allowed while voting is not open.
    pub async fn register_voter(&self, identity: &Identity, display_name: &str) -> Result<Voter> {
        let window = self.store.election_window().await?;
        if is_open(window.as_ref(), Utc::now()) {
            return Err(Error::RegistrationClosed);
        }

        let voter = Voter::new(self.issuer.voter_key(identity), display_name);
        self.store.insert_voter(&voter).await?;
        info!("Registered voter {}", voter.key);
        Ok(voter)
    }

    /// Check that `identity` is registered and has not yet voted.
    pub async fn check_eligibility(&self, identity: &Identity) -> Result<Voter> {
        let voter = self
            .store
            .find_voter(&self.issuer.voter_key(identity))
            .await?
            .ok_or(Error::VoterNotFound)?;
        if voter.has_voted {
            return Err(Error::AlreadyVoted);
        }
        Ok(voter)
    }

    /// Add a candidate with a zero tally. Admin only.
    pub async fn add_candidate(&self, caller: Option<&Identity>, name: &str) -> Result<Candidate> {
        self.ensure_admin(caller, "add candidates")?;
        let name = candidate_name(name)?;
        let candidate = self.store.insert_candidate(&name).await?;
        info!("Added candidate {}", candidate.name);
        Ok(candidate)
    }

    /// All candidates, in the order they were added.
    pub async fn list_candidates(&self) -> Result<Vec<Candidate>> {
        self.store.candidates().await
    }

    /// Cast `identity`'s single vote for `candidate`.
    ///
    /// The voter and window checks here give precise errors in the usual
    /// case; the store re-checks the voter inside the same atomic unit that
    /// applies the vote, so concurrent calls cannot both succeed.
    pub async fn vote(&self, identity: &Identity, candidate: &str) -> Result<Candidate> {
        let key = self.issuer.voter_key(identity);
        let voter = self
            .store
            .find_voter(&key)
            .await?
            .ok_or(Error::VoterNotFound)?;
        if voter.has_voted {
            return Err(Error::AlreadyVoted);
        }

        let window = self.store.election_window().await?;
        if !self.policy.permits_vote(window.as_ref(), Utc::now()) {
            return Err(Error::ElectionClosed);
        }

        let candidate = candidate_name(candidate)?;
        let updated = self.store.record_vote(&key, &candidate, self.policy).await?;
        info!("Accepted vote from {key} for {}", updated.name);
        Ok(updated)
    }

    /// Open voting now for `duration_secs` seconds. Admin only.
    pub async fn start_voting(
        &self,
        caller: Option<&Identity>,
        duration_secs: u64,
    ) -> Result<ElectionWindow> {
        self.ensure_admin(caller, "start voting")?;
        let window = ElectionWindow::starting_at(Utc::now(), duration_secs)?;
        self.store.set_election_window(Some(window)).await?;
        info!(
            "Voting open from {} until {}",
            window.start_time, window.end_time
        );
        Ok(window)
    }

    /// Clear the election window. Admin only.
    pub async fn stop_voting(&self, caller: Option<&Identity>) -> Result<()> {
        self.ensure_admin(caller, "stop voting")?;
        self.store.set_election_window(None).await?;
        info!("Voting stopped");
        Ok(())
    }

    /// The current election window, if one is configured.
    pub async fn voting_time(&self) -> Result<Option<ElectionWindow>> {
        self.store.election_window().await
    }

    /// Digest the current ledger and append it to the snapshot log. Admin only.
    pub async fn store_snapshot(&self, caller: Option<&Identity>) -> Result<IntegritySnapshot> {
        self.ensure_admin(caller, "store vote hashes")?;
        let candidates = self.store.candidates().await?;
        let snapshot = IntegritySnapshot::of(&candidates);
        self.store.append_snapshot(&snapshot).await?;
        info!("Stored ledger digest {}", snapshot.digest);
        Ok(snapshot)
    }

    /// Compare the current ledger against the latest stored snapshot.
    pub async fn verify(&self) -> Result<Verification> {
        verify_ledger(self.store.as_ref()).await
    }
}

/// Compare the ledger in `store` against its latest snapshot.
pub async fn verify_ledger(store: &dyn ElectionStore) -> Result<Verification> {
    let candidates = store.candidates().await?;
    let latest = store.latest_snapshot().await?;
    let verification = Verification::compare(latest.as_ref(), &candidates);
    if !verification.verified {
        warn!(
            "Ledger digest {} does not match stored digest {:?}",
            verification.computed_digest, verification.stored_digest
        );
    }
    Ok(verification)
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use rocket::futures::future::join_all;
    use rocket::tokio;

    use super::*;
    use crate::store::faulty::{Fault, FaultyStore};
    use crate::{ADMIN_EXAMPLE, NOT_ADMIN_EXAMPLE};

    fn id(raw: &str) -> Identity {
        Identity::new(raw).unwrap()
    }

    fn admin() -> Identity {
        id(ADMIN_EXAMPLE)
    }

    async fn open_voting(ballot_box: &BallotBox) {
        ballot_box
            .start_voting(Some(&admin()), 3600)
            .await
            .unwrap();
    }

    async fn tally(ballot_box: &BallotBox, name: &str) -> u64 {
        ballot_box
            .list_candidates()
            .await
            .unwrap()
            .into_iter()
            .find(|c| c.name == name)
            .unwrap()
            .vote_count
    }

    #[backend_test]
    async fn distinct_registrations_succeed(ballot_box: BallotBox) {
        for i in 0..10 {
            let voter = ballot_box
                .register_voter(&id(&format!("voter-{i}")), "Voter")
                .await
                .unwrap();
            assert!(!voter.has_voted);
        }
    }

    #[backend_test]
    async fn duplicate_registration_rejected(ballot_box: BallotBox) {
        ballot_box.register_voter(&id("A"), "Ada").await.unwrap();
        let err = ballot_box
            .register_voter(&id("A"), "Ada again")
            .await
            .unwrap_err();
        assert_eq!(err, Error::DuplicateIdentity);
    }

    #[backend_test]
    async fn registration_closed_while_voting(ballot_box: BallotBox) {
        open_voting(&ballot_box).await;
        let err = ballot_box.register_voter(&id("A"), "Ada").await.unwrap_err();
        assert_eq!(err, Error::RegistrationClosed);

        // Reopens once voting stops.
        ballot_box.stop_voting(Some(&admin())).await.unwrap();
        ballot_box.register_voter(&id("A"), "Ada").await.unwrap();
    }

    #[backend_test]
    async fn single_vote_scenario(ballot_box: BallotBox) {
        ballot_box.register_voter(&id("A"), "Ada").await.unwrap();
        ballot_box
            .add_candidate(Some(&admin()), "Alice")
            .await
            .unwrap();
        open_voting(&ballot_box).await;

        let alice = ballot_box.vote(&id("A"), "Alice").await.unwrap();
        assert_eq!(alice.vote_count, 1);

        let err = ballot_box.vote(&id("A"), "Alice").await.unwrap_err();
        assert_eq!(err, Error::AlreadyVoted);
        assert_eq!(tally(&ballot_box, "Alice").await, 1);

        let err = ballot_box.check_eligibility(&id("A")).await.unwrap_err();
        assert_eq!(err, Error::AlreadyVoted);
    }

    #[backend_test]
    async fn non_admin_cannot_add_candidates(ballot_box: BallotBox) {
        let err = ballot_box
            .add_candidate(Some(&id(NOT_ADMIN_EXAMPLE)), "Mallory")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));
        let err = ballot_box.add_candidate(None, "Mallory").await.unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));
        assert!(ballot_box.list_candidates().await.unwrap().is_empty());

        // Admin identities are matched regardless of case.
        let shouty = id(&ADMIN_EXAMPLE.to_uppercase());
        ballot_box.add_candidate(Some(&shouty), "Alice").await.unwrap();
    }

    #[backend_test]
    async fn duplicate_candidate_rejected(ballot_box: BallotBox) {
        ballot_box
            .add_candidate(Some(&admin()), "Alice")
            .await
            .unwrap();
        let err = ballot_box
            .add_candidate(Some(&admin()), " Alice ")
            .await
            .unwrap_err();
        assert_eq!(err, Error::DuplicateCandidate("Alice".to_string()));
        let err = ballot_box
            .add_candidate(Some(&admin()), "  ")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));
    }

    #[backend_test]
    async fn unknown_voter_changes_nothing(ballot_box: BallotBox) {
        ballot_box
            .add_candidate(Some(&admin()), "Alice")
            .await
            .unwrap();
        open_voting(&ballot_box).await;

        let err = ballot_box.vote(&id("ghost"), "Alice").await.unwrap_err();
        assert_eq!(err, Error::VoterNotFound);
        assert_eq!(tally(&ballot_box, "Alice").await, 0);
    }

    #[backend_test]
    async fn vote_without_window_by_default(ballot_box: BallotBox) {
        ballot_box.register_voter(&id("A"), "").await.unwrap();
        ballot_box
            .add_candidate(Some(&admin()), "Alice")
            .await
            .unwrap();

        let alice = ballot_box.vote(&id("A"), "Alice").await.unwrap();
        assert_eq!(alice.vote_count, 1);
        let err = ballot_box.vote(&id("A"), "Alice").await.unwrap_err();
        assert_eq!(err, Error::AlreadyVoted);
        assert_eq!(tally(&ballot_box, "Alice").await, 1);
    }

    #[backend_test]
    async fn strict_policy_needs_window(ballot_box: BallotBox) {
        let ballot_box = BallotBox::new(
            ballot_box.store(),
            IdentityIssuer::new("secret"),
            admin(),
            WindowPolicy::Strict,
        );
        ballot_box.register_voter(&id("A"), "Ada").await.unwrap();
        ballot_box
            .add_candidate(Some(&admin()), "Alice")
            .await
            .unwrap();

        let err = ballot_box.vote(&id("A"), "Alice").await.unwrap_err();
        assert_eq!(err, Error::ElectionClosed);

        open_voting(&ballot_box).await;
        ballot_box.vote(&id("A"), "Alice").await.unwrap();
    }

    #[backend_test]
    async fn vote_error_order(ballot_box: BallotBox) {
        ballot_box.register_voter(&id("A"), "Ada").await.unwrap();

        // Voting is closed and the candidate is unknown: closed wins.
        let past = ElectionWindow::starting_at(Utc::now() - Duration::hours(2), 3600).unwrap();
        ballot_box
            .store()
            .set_election_window(Some(past))
            .await
            .unwrap();
        let err = ballot_box.vote(&id("A"), "Nobody").await.unwrap_err();
        assert_eq!(err, Error::ElectionClosed);

        open_voting(&ballot_box).await;
        let err = ballot_box.vote(&id("A"), "Nobody").await.unwrap_err();
        assert_eq!(err, Error::CandidateNotFound("Nobody".to_string()));

        // The failed attempt must not have used up the vote.
        ballot_box.check_eligibility(&id("A")).await.unwrap();
    }

    #[backend_test]
    async fn expired_window_closes_voting(ballot_box: BallotBox) {
        ballot_box.register_voter(&id("A"), "Ada").await.unwrap();
        ballot_box
            .add_candidate(Some(&admin()), "Alice")
            .await
            .unwrap();
        let past = ElectionWindow::starting_at(Utc::now() - Duration::hours(2), 3600).unwrap();
        ballot_box
            .store()
            .set_election_window(Some(past))
            .await
            .unwrap();

        let err = ballot_box.vote(&id("A"), "Alice").await.unwrap_err();
        assert_eq!(err, Error::ElectionClosed);
        assert_eq!(tally(&ballot_box, "Alice").await, 0);
    }

    #[backend_test]
    async fn disabled_policy_ignores_window(ballot_box: BallotBox) {
        let ballot_box = BallotBox::new(
            ballot_box.store(),
            IdentityIssuer::new("secret"),
            admin(),
            WindowPolicy::Disabled,
        );
        ballot_box.register_voter(&id("A"), "Ada").await.unwrap();
        ballot_box
            .add_candidate(Some(&admin()), "Alice")
            .await
            .unwrap();
        ballot_box.vote(&id("A"), "Alice").await.unwrap();
        assert_eq!(tally(&ballot_box, "Alice").await, 1);
    }

    #[rocket::async_test]
    async fn window_closing_mid_vote_is_rejected() {
        crate::init_test_logging();
        let store = FaultyStore::new(Fault::CloseWindowBeforeVote);
        let ballot_box = crate::test_ballot_box(Arc::new(store));
        ballot_box.register_voter(&id("A"), "Ada").await.unwrap();
        ballot_box
            .add_candidate(Some(&admin()), "Alice")
            .await
            .unwrap();
        open_voting(&ballot_box).await;

        let err = ballot_box.vote(&id("A"), "Alice").await.unwrap_err();
        assert_eq!(err, Error::ElectionClosed);
        assert_eq!(tally(&ballot_box, "Alice").await, 0);
        ballot_box.check_eligibility(&id("A")).await.unwrap();
    }

    #[rocket::async_test]
    async fn window_opening_mid_registration_is_rejected() {
        crate::init_test_logging();
        let store = FaultyStore::new(Fault::OpenWindowBeforeRegister);
        let ballot_box = crate::test_ballot_box(Arc::new(store));

        let err = ballot_box.register_voter(&id("A"), "Ada").await.unwrap_err();
        assert_eq!(err, Error::RegistrationClosed);
        assert_eq!(
            ballot_box.check_eligibility(&id("A")).await.unwrap_err(),
            Error::VoterNotFound
        );
    }

    #[backend_test]
    async fn admin_only_window_control(ballot_box: BallotBox) {
        let outsider = id(NOT_ADMIN_EXAMPLE);
        assert!(matches!(
            ballot_box.start_voting(Some(&outsider), 60).await,
            Err(Error::Unauthorized(_))
        ));
        assert!(matches!(
            ballot_box.stop_voting(Some(&outsider)).await,
            Err(Error::Unauthorized(_))
        ));
        assert!(matches!(
            ballot_box.start_voting(Some(&admin()), 0).await,
            Err(Error::BadRequest(_))
        ));
        assert_eq!(ballot_box.voting_time().await.unwrap(), None);

        let window = ballot_box.start_voting(Some(&admin()), 60).await.unwrap();
        assert_eq!(ballot_box.voting_time().await.unwrap(), Some(window));
        assert_eq!(window.end_time - window.start_time, Duration::seconds(60));
    }

    #[backend_test]
    async fn concurrent_votes_same_identity(ballot_box: BallotBox) {
        ballot_box.register_voter(&id("A"), "Ada").await.unwrap();
        ballot_box
            .add_candidate(Some(&admin()), "Alice")
            .await
            .unwrap();
        open_voting(&ballot_box).await;

        let attempts = (0..2).map(|_| {
            let ballot_box = ballot_box.clone();
            tokio::spawn(async move { ballot_box.vote(&id("A"), "Alice").await })
        });
        let results: Vec<Result<Candidate>> = join_all(attempts)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results.contains(&Err(Error::AlreadyVoted)));
        assert_eq!(tally(&ballot_box, "Alice").await, 1);
    }

    #[backend_test]
    async fn concurrent_votes_distinct_identities(ballot_box: BallotBox) {
        const VOTERS: usize = 64;
        for i in 0..VOTERS {
            ballot_box
                .register_voter(&id(&format!("voter-{i}")), "")
                .await
                .unwrap();
        }
        ballot_box
            .add_candidate(Some(&admin()), "Alice")
            .await
            .unwrap();
        open_voting(&ballot_box).await;

        let attempts = (0..VOTERS).map(|i| {
            let ballot_box = ballot_box.clone();
            tokio::spawn(async move { ballot_box.vote(&id(&format!("voter-{i}")), "Alice").await })
        });
        for result in join_all(attempts).await {
            result.unwrap().unwrap();
        }
        assert_eq!(tally(&ballot_box, "Alice").await, VOTERS as u64);
    }

    #[backend_test]
    async fn snapshot_verifies_until_ledger_changes(ballot_box: BallotBox) {
        // Nothing stored yet.
        let verification = ballot_box.verify().await.unwrap();
        assert!(!verification.verified);
        assert_eq!(verification.stored_digest, None);

        ballot_box.register_voter(&id("A"), "Ada").await.unwrap();
        ballot_box
            .add_candidate(Some(&admin()), "Alice")
            .await
            .unwrap();
        let snapshot = ballot_box.store_snapshot(Some(&admin())).await.unwrap();
        let verification = ballot_box.verify().await.unwrap();
        assert!(verification.verified);
        assert_eq!(verification.stored_digest, Some(snapshot.digest.clone()));

        open_voting(&ballot_box).await;
        ballot_box.vote(&id("A"), "Alice").await.unwrap();
        let verification = ballot_box.verify().await.unwrap();
        assert!(!verification.verified);

        // Storing again makes the mismatch disappear.
        ballot_box.store_snapshot(Some(&admin())).await.unwrap();
        assert!(ballot_box.verify().await.unwrap().verified);

        assert!(matches!(
            ballot_box.store_snapshot(Some(&id(NOT_ADMIN_EXAMPLE))).await,
            Err(Error::Unauthorized(_))
        ));
    }

    #[backend_test(mongo)]
    async fn mongo_single_vote_scenario(ballot_box: BallotBox) {
        ballot_box.register_voter(&id("A"), "Ada").await.unwrap();
        ballot_box
            .add_candidate(Some(&admin()), "Alice")
            .await
            .unwrap();
        open_voting(&ballot_box).await;
        ballot_box.vote(&id("A"), "Alice").await.unwrap();
        let err = ballot_box.vote(&id("A"), "Alice").await.unwrap_err();
        assert_eq!(err, Error::AlreadyVoted);
        assert_eq!(tally(&ballot_box, "Alice").await, 1);

        ballot_box.store_snapshot(Some(&admin())).await.unwrap();
        assert!(ballot_box.verify().await.unwrap().verified);
    }
}
