use rocket::request::{FromRequest, Outcome, Request};

use crate::model::identity::Identity;

/// Header carrying the caller's identity token, as established by the
/// external wallet or credential ceremony.
pub const IDENTITY_HEADER: &str = "X-Identity";

/// Whoever is making the request, if they said.
///
/// This never fails: authorization decisions are left to the ballot box,
/// which reports a missing or wrong identity as `Unauthorized`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller(Option<Identity>);

impl Caller {
    pub fn identity(&self) -> Option<&Identity> {
        self.0.as_ref()
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Caller {
    type Error = (); // No errors possible, use the `!` type once stabilised.

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let identity = req
            .headers()
            .get_one(IDENTITY_HEADER)
            .and_then(|raw| Identity::new(raw).ok());
        Outcome::Success(Caller(identity))
    }
}
