use log::{error, warn};
use mongodb::error::Error as DbError;
use rocket::{http::Status, response::Responder};
use thiserror::Error;

use crate::model::common::ledger::LedgerId;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(#[from] DbError),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Already exists: {0}")]
    AlreadyExists(String),
    #[error("Election '{0}' has already been activated")]
    AlreadyActivated(String),
    #[error("Election '{0}' is not active")]
    ElectionNotActive(String),
    #[error("Election '{0}' is closed")]
    ElectionClosed(String),
    #[error("Election '{0}' is not closed yet")]
    ElectionNotClosed(String),
    #[error("Append to ledger {ledger} at block {sequence} raced with another append")]
    ConcurrentAppendConflict { ledger: LedgerId, sequence: u64 },
    #[error("Ledger ID {0} is already owned by a different election key")]
    LedgerIdCollision(LedgerId),
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error(transparent)]
    Ballot(#[from] BallotError),
    #[error("Cryptographic failure: {0}")]
    Crypto(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl Error {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn crypto(err: impl ToString) -> Self {
        Self::Crypto(err.to_string())
    }
}

impl From<rsa::Error> for Error {
    fn from(err: rsa::Error) -> Self {
        Self::crypto(err)
    }
}

/// Integrity failures found while verifying a ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ChainError {
    /// The block with this sequence number does not link to its predecessor,
    /// or is out of place in the sequence.
    #[error("Ledger integrity failure: broken link at block {0}")]
    BrokenLink(u64),
}

/// Per-ballot decoding failures. These never abort a tally.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BallotError {
    #[error("Ballot decryption failed")]
    DecryptionFailed,
    #[error("Malformed ballot: {0}")]
    MalformedBallot(String),
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    fn respond_to(self, _: &'r rocket::Request<'_>) -> rocket::response::Result<'o> {
        let status = match self {
            Self::NotFound(_) => Status::NotFound,
            Self::BadRequest(_) | Self::Ballot(_) => Status::BadRequest,
            Self::AlreadyExists(_)
            | Self::AlreadyActivated(_)
            | Self::ElectionNotActive(_)
            | Self::ElectionClosed(_)
            | Self::ElectionNotClosed(_)
            | Self::ConcurrentAppendConflict { .. } => Status::Conflict,
            Self::StorageUnavailable(_) => Status::ServiceUnavailable,
            Self::Chain(_) | Self::LedgerIdCollision(_) | Self::Crypto(_) => {
                Status::InternalServerError
            }
        };
        match self {
            Self::Chain(ref err) => error!("{err}"),
            ref err if status.code >= 500 => error!("{err}"),
            ref err => warn!("{err}"),
        }
        Err(status)
    }
}
