//! Domain types shared by the arena execution core and its HTTP surface.
//!
//! Nothing in this crate performs I/O. Records here are plain values; the
//! atomicity guarantees live in `arena-execution`.

mod error;
pub use error::{Error, ErrorKind};

pub mod tournament;
pub use tournament::{
    ActiveEntry, ActiveTournament, FinishedEntry, FinishedTournament, Participant, Tournament,
    TournamentStatus, TournamentView,
};

pub mod user;
pub use user::User;

/// Identifier assigned to a registered user (always >= 1).
pub type UserId = i64;

/// Identifier assigned to a created tournament (always >= 1).
pub type TournamentId = i64;

/// Point amounts: balances, deposits, prizes.
pub type Points = i64;

/// Charged once at registration, before the account is created.
pub const REGISTRATION_FEE: Points = 300;

/// Reject non-positive ids before they reach a store.
pub fn validate_id(id: i64) -> Result<i64, Error> {
    if id <= 0 {
        return Err(Error::InvalidId(id));
    }
    Ok(id)
}

/// Reject blank names and names with NUL bytes, which text columns cannot hold.
pub fn validate_name(name: &str) -> Result<(), Error> {
    if name.trim().is_empty() {
        return Err(Error::InvalidRegistration("name must not be empty"));
    }
    if name.contains('\0') {
        return Err(Error::InvalidRegistration("name must not contain NUL bytes"));
    }
    Ok(())
}

/// Reject non-positive point amounts for take/fund requests.
pub fn validate_points(points: Points) -> Result<Points, Error> {
    if points <= 0 {
        return Err(Error::InvalidPoints(points));
    }
    Ok(points)
}
