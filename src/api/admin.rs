use rocket::{serde::json::Json, Route, State};

use crate::ballot_box::BallotBox;
use crate::error::Result;
use crate::model::api::{
    caller::Caller,
    candidate::{CandidateDesc, NewCandidate},
    snapshot::SnapshotStored,
    window::{StartVoting, VotingStarted},
    Message,
};

pub fn routes() -> Vec<Route> {
    routes![add_candidate, start_voting, stop_voting, store_vote_hash]
}

#[post("/addCandidate", data = "<candidate>", format = "json")]
async fn add_candidate(
    caller: Caller,
    candidate: Json<NewCandidate>,
    ballot_box: &State<BallotBox>,
) -> Result<Json<CandidateDesc>> {
    let candidate = ballot_box
        .add_candidate(caller.identity(), &candidate.name)
        .await?;
    Ok(Json(candidate.into()))
}

#[post("/startVoting", data = "<request>", format = "json")]
async fn start_voting(
    caller: Caller,
    request: Json<StartVoting>,
    ballot_box: &State<BallotBox>,
) -> Result<Json<VotingStarted>> {
    let window = ballot_box
        .start_voting(caller.identity(), request.duration)
        .await?;
    Ok(Json(window.into()))
}

#[post("/stopVoting")]
async fn stop_voting(caller: Caller, ballot_box: &State<BallotBox>) -> Result<Json<Message>> {
    ballot_box.stop_voting(caller.identity()).await?;
    Ok(Json(Message::new("Voting stopped")))
}

#[post("/storeVoteHash")]
async fn store_vote_hash(
    caller: Caller,
    ballot_box: &State<BallotBox>,
) -> Result<Json<SnapshotStored>> {
    let snapshot = ballot_box.store_snapshot(caller.identity()).await?;
    Ok(Json(snapshot.into()))
}
