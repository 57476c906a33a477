use rocket::{http::Status, response::status::Custom, serde::json::Json, Route, State};

use crate::ballot_box::BallotBox;
use crate::error::Result;
use crate::model::{
    api::{
        voter::{EligibilityRequest, RegisterRequest, Registered, VoteRequest},
        Message,
    },
    identity::Identity,
};

pub fn routes() -> Vec<Route> {
    routes![register_voter, authenticate_voter, vote]
}

#[post("/registerVoter", data = "<request>", format = "json")]
async fn register_voter(
    request: Json<RegisterRequest>,
    ballot_box: &State<BallotBox>,
) -> Result<Custom<Json<Registered>>> {
    let identity = Identity::new(&request.identity)?;
    ballot_box
        .register_voter(&identity, &request.display_name)
        .await?;
    Ok(Custom(
        Status::Created,
        Json(Registered {
            message: "Voter registered successfully".to_string(),
            identity: identity.into(),
        }),
    ))
}

#[post("/authenticateVoter", data = "<request>", format = "json")]
async fn authenticate_voter(
    request: Json<EligibilityRequest>,
    ballot_box: &State<BallotBox>,
) -> Result<Json<Message>> {
    let identity = Identity::new(&request.identity)?;
    ballot_box.check_eligibility(&identity).await?;
    Ok(Json(Message::new("Voter is eligible to vote")))
}

#[post("/vote", data = "<request>", format = "json")]
async fn vote(request: Json<VoteRequest>, ballot_box: &State<BallotBox>) -> Result<Json<Message>> {
    let identity = Identity::new(&request.identity)?;
    ballot_box.vote(&identity, &request.candidate_name).await?;
    Ok(Json(Message::new("Vote cast successfully")))
}
