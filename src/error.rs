use mongodb::error::Error as DbError;
use rocket::{
    http::Status,
    response::{self, Responder},
    serde::json::Json,
    Request,
};
use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Every way a request against the ballot box can fail.
///
/// None of these leave partial state behind: a failed vote never increments
/// a counter without also marking the voter, nor vice versa.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("Identity is already registered")]
    DuplicateIdentity,
    #[error("Registration is closed while voting is open")]
    RegistrationClosed,
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Candidate already exists: {0}")]
    DuplicateCandidate(String),
    #[error("Voter not found")]
    VoterNotFound,
    #[error("Voter has already voted")]
    AlreadyVoted,
    #[error("Voting is not open")]
    ElectionClosed,
    #[error("Candidate not found: {0}")]
    CandidateNotFound(String),
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl Error {
    /// A stable, machine-readable name for this error.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DuplicateIdentity => "DuplicateIdentity",
            Self::RegistrationClosed => "RegistrationClosed",
            Self::Unauthorized(_) => "Unauthorized",
            Self::DuplicateCandidate(_) => "DuplicateCandidate",
            Self::VoterNotFound => "VoterNotFound",
            Self::AlreadyVoted => "AlreadyVoted",
            Self::ElectionClosed => "ElectionClosed",
            Self::CandidateNotFound(_) => "CandidateNotFound",
            Self::StorageUnavailable(_) => "StorageUnavailable",
            Self::BadRequest(_) => "BadRequest",
        }
    }

    /// Only storage failures are worth retrying unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StorageUnavailable(_))
    }

    /// The HTTP status this error is reported with.
    pub fn status(&self) -> Status {
        match self {
            Self::Unauthorized(_) => Status::Forbidden,
            Self::StorageUnavailable(_) => Status::InternalServerError,
            _ => Status::BadRequest,
        }
    }

    pub fn unauthorized(action: impl Into<String>) -> Self {
        Self::Unauthorized(action.into())
    }

    pub fn bad_request(reason: impl Into<String>) -> Self {
        Self::BadRequest(reason.into())
    }
}

impl From<DbError> for Error {
    fn from(err: DbError) -> Self {
        Self::StorageUnavailable(err.to_string())
    }
}

/// JSON body sent back for every failed request.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: &'static str,
    pub retryable: bool,
}

impl From<&Error> for ErrorBody {
    fn from(err: &Error) -> Self {
        Self {
            error: err.to_string(),
            kind: err.kind(),
            retryable: err.is_retryable(),
        }
    }
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'o> {
        let status = self.status();
        if status == Status::InternalServerError {
            error!("{self}");
        } else {
            warn!("{self}");
        }
        (status, Json(ErrorBody::from(&self))).respond_to(req)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(Error::AlreadyVoted.status(), Status::BadRequest);
        assert_eq!(Error::DuplicateIdentity.status(), Status::BadRequest);
        assert_eq!(
            Error::CandidateNotFound("Bob".to_string()).status(),
            Status::BadRequest
        );
        assert_eq!(Error::unauthorized("add").status(), Status::Forbidden);
        assert_eq!(
            Error::StorageUnavailable("timeout".to_string()).status(),
            Status::InternalServerError
        );
    }

    #[test]
    fn only_storage_errors_are_retryable() {
        assert!(Error::StorageUnavailable("down".to_string()).is_retryable());
        assert!(!Error::AlreadyVoted.is_retryable());
        assert!(!Error::ElectionClosed.is_retryable());
        assert!(!Error::bad_request("empty").is_retryable());
    }
}
