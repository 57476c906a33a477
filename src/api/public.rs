use rocket::{serde::json::Json, Route, State};

use crate::ballot_box::BallotBox;
use crate::error::Result;
use crate::model::api::{
    candidate::CandidateDesc, snapshot::VerificationDesc, window::VotingTime,
};

pub fn routes() -> Vec<Route> {
    routes![list_candidates, get_candidates, voting_time, verify_votes]
}

#[get("/listCandidates")]
async fn list_candidates(ballot_box: &State<BallotBox>) -> Result<Json<Vec<CandidateDesc>>> {
    let candidates = ballot_box.list_candidates().await?;
    Ok(Json(candidates.into_iter().map(Into::into).collect()))
}

/// Older name for [`list_candidates`].
#[get("/getCandidates")]
async fn get_candidates(ballot_box: &State<BallotBox>) -> Result<Json<Vec<CandidateDesc>>> {
    list_candidates(ballot_box).await
}

#[get("/votingTime")]
async fn voting_time(ballot_box: &State<BallotBox>) -> Result<Json<VotingTime>> {
    let window = ballot_box.voting_time().await?;
    Ok(Json(window.into()))
}

#[get("/verifyVotes")]
async fn verify_votes(ballot_box: &State<BallotBox>) -> Result<Json<VerificationDesc>> {
    let verification = ballot_box.verify().await?;
    Ok(Json(verification.into()))
}
