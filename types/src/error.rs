use serde::Serialize;
use thiserror::Error as ThisError;

use crate::{Points, TournamentId, UserId};

/// Coarse failure categories surfaced to callers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    InvalidRegistration,
    NotFound,
    InsufficientFunds,
    Conflict,
    StorageUnavailable,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::InvalidRegistration => "invalid_registration",
            ErrorKind::NotFound => "not_found",
            ErrorKind::InsufficientFunds => "insufficient_funds",
            ErrorKind::Conflict => "conflict",
            ErrorKind::StorageUnavailable => "storage_unavailable",
        }
    }

    /// Conventional HTTP status for the category.
    pub fn status(&self) -> u16 {
        match self {
            ErrorKind::InvalidInput | ErrorKind::InvalidRegistration => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::InsufficientFunds | ErrorKind::Conflict => 422,
            ErrorKind::StorageUnavailable => 503,
        }
    }
}

/// Every failure an arena operation can return.
#[derive(Clone, Debug, ThisError, PartialEq, Eq)]
pub enum Error {
    #[error("expected id greater than 0, got {0}")]
    InvalidId(i64),
    #[error("points must be > 0, got {0}")]
    InvalidPoints(Points),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("invalid registration: {0}")]
    InvalidRegistration(&'static str),
    #[error("user {0} not found")]
    UserNotFound(UserId),
    #[error("tournament {0} not found")]
    TournamentNotFound(TournamentId),
    #[error("insufficient funds (balance={balance}, required={required})")]
    InsufficientFunds { balance: Points, required: Points },
    #[error("user {user} already registered in tournament {tournament}")]
    AlreadyRegistered { tournament: TournamentId, user: UserId },
    #[error("tournament {0} is finished")]
    TournamentFinished(TournamentId),
    #[error("tournament {0} is already finished")]
    AlreadyFinished(TournamentId),
    #[error("tournament {0} has no participants")]
    NoParticipants(TournamentId),
    #[error("user {user} participates in active tournament {tournament}")]
    UserInActiveTournament { user: UserId, tournament: TournamentId },
    #[error("balance overflow for user {0}")]
    BalanceOverflow(UserId),
    #[error("prize overflow in tournament {0}")]
    PrizeOverflow(TournamentId),
    #[error("storage unavailable: {0}")]
    Storage(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidId(_) | Error::InvalidPoints(_) | Error::InvalidInput(_) => {
                ErrorKind::InvalidInput
            }
            Error::InvalidRegistration(_) => ErrorKind::InvalidRegistration,
            Error::UserNotFound(_) | Error::TournamentNotFound(_) => ErrorKind::NotFound,
            Error::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            Error::AlreadyRegistered { .. }
            | Error::TournamentFinished(_)
            | Error::AlreadyFinished(_)
            | Error::NoParticipants(_)
            | Error::UserInActiveTournament { .. }
            | Error::BalanceOverflow(_)
            | Error::PrizeOverflow(_) => ErrorKind::Conflict,
            Error::Storage(_) => ErrorKind::StorageUnavailable,
        }
    }

    /// Stable machine-readable identifier, rendered as the `type` field on the wire.
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidId(_) => "invalid_id",
            Error::InvalidPoints(_) => "invalid_points",
            Error::InvalidInput(_) => "invalid_input",
            Error::InvalidRegistration(_) => "invalid_registration",
            Error::UserNotFound(_) => "user_not_found",
            Error::TournamentNotFound(_) => "tournament_not_found",
            Error::InsufficientFunds { .. } => "insufficient_funds",
            Error::AlreadyRegistered { .. } => "already_registered",
            Error::TournamentFinished(_) => "tournament_finished",
            Error::AlreadyFinished(_) => "already_finished",
            Error::NoParticipants(_) => "no_participants",
            Error::UserInActiveTournament { .. } => "user_in_active_tournament",
            Error::BalanceOverflow(_) => "balance_overflow",
            Error::PrizeOverflow(_) => "prize_overflow",
            Error::Storage(_) => "storage_unavailable",
        }
    }

    pub fn status(&self) -> u16 {
        self.kind().status()
    }
}
