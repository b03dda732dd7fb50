use arena_types::{Error, Points, Tournament, TournamentId, User, UserId};

use crate::{Memory, Postgres};

/// Storage seam for balances and tournament records.
///
/// User-level operations are linearizable per user id. Tournament mutations go
/// through [`Store::with_tournament`], which serializes all work on one tournament.
pub trait Store: Send + Sync {
    /// Create an account with an already-validated opening balance.
    fn create_user(&self, name: &str, balance: Points) -> Result<User, Error>;

    fn user(&self, id: UserId) -> Result<User, Error>;

    /// Remove an account. Fails while the user participates in an active tournament.
    fn delete_user(&self, id: UserId) -> Result<(), Error>;

    /// Subtract `amount` (> 0) or fail with no effect.
    fn debit(&self, id: UserId, amount: Points) -> Result<User, Error>;

    /// Add `amount` (> 0) or fail with no effect.
    fn credit(&self, id: UserId, amount: Points) -> Result<User, Error>;

    fn create_tournament(&self, name: &str, deposit: Points) -> Result<Tournament, Error>;

    fn tournament(&self, id: TournamentId) -> Result<Tournament, Error>;

    /// Run `f` as one atomic unit over tournament `id`.
    ///
    /// No other `with_tournament` call on the same id interleaves with `f`. When
    /// `f` fails, nothing it did is kept.
    fn with_tournament<R>(
        &self,
        id: TournamentId,
        f: impl FnOnce(&mut dyn TournamentTx) -> Result<R, Error>,
    ) -> Result<R, Error>;
}

/// Handle to one locked tournament inside [`Store::with_tournament`].
pub trait TournamentTx {
    /// Current record, reflecting every change made through this handle.
    fn tournament(&self) -> &Tournament;

    /// Load a user, holding it against concurrent balance changes where the backend can.
    fn user(&mut self, id: UserId) -> Result<User, Error>;

    /// Debit the deposit from `user`, append them to the roster and grow the prize.
    fn admit(&mut self, user: &User) -> Result<(), Error>;

    /// Finish with `winner` and credit them the whole prize.
    fn settle(&mut self, winner: UserId) -> Result<(), Error>;

    /// Delete the tournament and its roster once the unit commits.
    fn remove(&mut self) -> Result<(), Error>;
}

/// Backend chosen at startup.
pub enum Backend {
    Memory(Memory),
    Postgres(Postgres),
}

impl Backend {
    pub fn name(&self) -> &'static str {
        match self {
            Backend::Memory(_) => "memory",
            Backend::Postgres(_) => "postgres",
        }
    }
}

impl Store for Backend {
    fn create_user(&self, name: &str, balance: Points) -> Result<User, Error> {
        match self {
            Backend::Memory(store) => store.create_user(name, balance),
            Backend::Postgres(store) => store.create_user(name, balance),
        }
    }

    fn user(&self, id: UserId) -> Result<User, Error> {
        match self {
            Backend::Memory(store) => store.user(id),
            Backend::Postgres(store) => store.user(id),
        }
    }

    fn delete_user(&self, id: UserId) -> Result<(), Error> {
        match self {
            Backend::Memory(store) => store.delete_user(id),
            Backend::Postgres(store) => store.delete_user(id),
        }
    }

    fn debit(&self, id: UserId, amount: Points) -> Result<User, Error> {
        match self {
            Backend::Memory(store) => store.debit(id, amount),
            Backend::Postgres(store) => store.debit(id, amount),
        }
    }

    fn credit(&self, id: UserId, amount: Points) -> Result<User, Error> {
        match self {
            Backend::Memory(store) => store.credit(id, amount),
            Backend::Postgres(store) => store.credit(id, amount),
        }
    }

    fn create_tournament(&self, name: &str, deposit: Points) -> Result<Tournament, Error> {
        match self {
            Backend::Memory(store) => store.create_tournament(name, deposit),
            Backend::Postgres(store) => store.create_tournament(name, deposit),
        }
    }

    fn tournament(&self, id: TournamentId) -> Result<Tournament, Error> {
        match self {
            Backend::Memory(store) => store.tournament(id),
            Backend::Postgres(store) => store.tournament(id),
        }
    }

    fn with_tournament<R>(
        &self,
        id: TournamentId,
        f: impl FnOnce(&mut dyn TournamentTx) -> Result<R, Error>,
    ) -> Result<R, Error> {
        match self {
            Backend::Memory(store) => store.with_tournament(id, f),
            Backend::Postgres(store) => store.with_tournament(id, f),
        }
    }
}
