//! JSON bodies for requests that never reach a handler.
//!
//! Rocket answers a body its `Json` guard cannot parse with 400 (bad syntax)
//! or 422 (wrong shape). Both are reported here as `BadRequest` with status
//! 400, so clients see one error format whatever went wrong.

use rocket::{http::Status, response::status::Custom, serde::json::Json, Catcher, Request};

use crate::error::{Error, ErrorBody};

pub fn catchers() -> Vec<Catcher> {
    catchers![malformed, unprocessable, not_found, fallback]
}

fn bad_request(req: &Request<'_>) -> Custom<Json<ErrorBody>> {
    let err = Error::bad_request("Malformed request body");
    warn!("{} {}: {err}", req.method(), req.uri());
    Custom(Status::BadRequest, Json(ErrorBody::from(&err)))
}

#[catch(400)]
fn malformed(req: &Request<'_>) -> Custom<Json<ErrorBody>> {
    bad_request(req)
}

#[catch(422)]
fn unprocessable(req: &Request<'_>) -> Custom<Json<ErrorBody>> {
    bad_request(req)
}

#[catch(404)]
fn not_found(req: &Request<'_>) -> Json<ErrorBody> {
    Json(ErrorBody {
        error: format!("No route for {} {}", req.method(), req.uri().path()),
        kind: "NotFound",
        retryable: false,
    })
}

#[catch(default)]
fn fallback(status: Status, _req: &Request<'_>) -> Custom<Json<ErrorBody>> {
    Custom(
        status,
        Json(ErrorBody {
            error: status.reason_lossy().to_string(),
            kind: "Internal",
            retryable: status.class().is_server_error(),
        }),
    )
}
