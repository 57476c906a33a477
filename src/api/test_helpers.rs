//! Request helpers shared by the route tests.

use std::fmt::Display;

use rocket::{
    http::{uri::Origin, ContentType, Header, Status},
    local::asynchronous::{Client, LocalResponse},
    serde::json::{serde_json, Value},
};
use serde::Serialize;

use crate::model::api::{
    caller::IDENTITY_HEADER, candidate::CandidateDesc, voter::RegisterRequest,
};
use crate::ADMIN_EXAMPLE;

/// POST `body` as JSON with no identity header.
pub async fn post_json<'c, 'u: 'c, U, T>(client: &'c Client, uri: U, body: &T) -> LocalResponse<'c>
where
    U: TryInto<Origin<'u>> + Display,
    T: Serialize,
{
    client
        .post(uri)
        .header(ContentType::JSON)
        .body(serde_json::to_string(body).unwrap())
        .dispatch()
        .await
}

/// POST `body` as JSON on behalf of `identity`.
pub async fn post_json_as<'c, 'u: 'c, U, T>(
    client: &'c Client,
    identity: &str,
    uri: U,
    body: &T,
) -> LocalResponse<'c>
where
    U: TryInto<Origin<'u>> + Display,
    T: Serialize,
{
    client
        .post(uri)
        .header(ContentType::JSON)
        .header(Header::new(IDENTITY_HEADER, identity.to_string()))
        .body(serde_json::to_string(body).unwrap())
        .dispatch()
        .await
}

/// The `kind` field of an error response.
pub async fn error_kind(response: LocalResponse<'_>) -> String {
    let body: Value = response.into_json().await.unwrap();
    body["kind"].as_str().unwrap().to_string()
}

pub async fn register(client: &Client, identity: &str) {
    let response = post_json(client, "/registerVoter", &RegisterRequest::example(identity)).await;
    assert_eq!(Status::Created, response.status());
}

pub async fn add_candidate(client: &Client, name: &str) {
    let body = serde_json::json!({ "name": name });
    let response = post_json_as(client, ADMIN_EXAMPLE, "/addCandidate", &body).await;
    assert_eq!(Status::Ok, response.status());
}

pub async fn start_voting(client: &Client, duration: u64) {
    let body = serde_json::json!({ "duration": duration });
    let response = post_json_as(client, ADMIN_EXAMPLE, "/startVoting", &body).await;
    assert_eq!(Status::Ok, response.status());
}

pub async fn candidates(client: &Client) -> Vec<CandidateDesc> {
    let response = client.get("/listCandidates").dispatch().await;
    assert_eq!(Status::Ok, response.status());
    response.into_json().await.unwrap()
}
