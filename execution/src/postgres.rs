use arena_types::{
    Error, Participant, Points, Tournament, TournamentId, TournamentStatus, User, UserId,
};
use postgres::{Client, GenericClient, NoTls, Row, Transaction};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{LockResult, Mutex, MutexGuard, TryLockError};
use tracing::{info, warn};

use crate::state::{Store, TournamentTx};

const DEFAULT_MAX_CONNECTIONS: usize = 5;

#[derive(Clone, Debug)]
pub struct PostgresConfig {
    pub url: String,
    pub max_connections: usize,
}

impl PostgresConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

/// Postgres-backed store.
///
/// Holds a fixed set of connections handed out round-robin. Atomicity comes
/// from transactions with `FOR UPDATE` row locks, so correctness does not
/// depend on which connection serves a call.
pub struct Postgres {
    url: String,
    clients: Vec<Mutex<Client>>,
    next: AtomicUsize,
}

fn storage(err: postgres::Error) -> Error {
    Error::Storage(err.to_string())
}

fn user_from_row(row: &Row) -> User {
    User {
        id: row.get("id"),
        name: row.get("name"),
        balance: row.get("balance"),
    }
}

fn init_schema(client: &mut Client) -> Result<(), Error> {
    client
        .batch_execute(
            "CREATE TABLE IF NOT EXISTS users (
                id BIGSERIAL PRIMARY KEY,
                name TEXT NOT NULL,
                balance BIGINT NOT NULL CHECK (balance >= 0)
            );
            CREATE TABLE IF NOT EXISTS tournaments (
                id BIGSERIAL PRIMARY KEY,
                name TEXT NOT NULL,
                deposit BIGINT NOT NULL CHECK (deposit > 0),
                prize BIGINT NOT NULL DEFAULT 0 CHECK (prize >= 0),
                finished BOOLEAN NOT NULL DEFAULT FALSE,
                winner_id BIGINT
            );
            CREATE TABLE IF NOT EXISTS tournament_req (
                seq BIGSERIAL,
                tournament_id BIGINT NOT NULL REFERENCES tournaments(id) ON DELETE CASCADE,
                user_id BIGINT NOT NULL,
                user_name TEXT NOT NULL,
                UNIQUE (tournament_id, user_id)
            );
            CREATE INDEX IF NOT EXISTS tournament_req_user ON tournament_req(user_id);",
        )
        .map_err(storage)
}

/// Load a tournament and its roster. `lock` takes a row lock on the tournament.
fn load_tournament(
    client: &mut impl GenericClient,
    id: TournamentId,
    lock: bool,
) -> Result<Tournament, Error> {
    let query = if lock {
        "SELECT id, name, deposit, prize, finished, winner_id FROM tournaments WHERE id = $1 FOR UPDATE"
    } else {
        "SELECT id, name, deposit, prize, finished, winner_id FROM tournaments WHERE id = $1"
    };
    let row = client
        .query_opt(query, &[&id])
        .map_err(storage)?
        .ok_or(Error::TournamentNotFound(id))?;
    let participants = client
        .query(
            "SELECT user_id, user_name FROM tournament_req WHERE tournament_id = $1 ORDER BY seq",
            &[&id],
        )
        .map_err(storage)?
        .iter()
        .map(|row| Participant {
            user_id: row.get("user_id"),
            name: row.get("user_name"),
        })
        .collect();
    let finished: bool = row.get("finished");
    Ok(Tournament::restore(
        row.get("id"),
        row.get("name"),
        row.get("deposit"),
        row.get("prize"),
        if finished {
            TournamentStatus::Finished
        } else {
            TournamentStatus::Active
        },
        row.get("winner_id"),
        participants,
    ))
}

/// Lock a user row for the rest of the transaction.
fn lock_user(tx: &mut Transaction<'_>, id: UserId) -> Result<User, Error> {
    let row = tx
        .query_opt(
            "SELECT id, name, balance FROM users WHERE id = $1 FOR UPDATE",
            &[&id],
        )
        .map_err(storage)?
        .ok_or(Error::UserNotFound(id))?;
    Ok(user_from_row(&row))
}

fn set_balance(tx: &mut Transaction<'_>, id: UserId, balance: Points) -> Result<User, Error> {
    let row = tx
        .query_one(
            "UPDATE users SET balance = $2 WHERE id = $1 RETURNING id, name, balance",
            &[&id, &balance],
        )
        .map_err(storage)?;
    Ok(user_from_row(&row))
}

impl Postgres {
    /// Open the connections and create the schema if missing.
    pub fn connect(config: &PostgresConfig) -> Result<Self, Error> {
        let count = config.max_connections.max(1);
        let mut clients = Vec::with_capacity(count);
        for _ in 0..count {
            clients.push(Client::connect(&config.url, NoTls).map_err(storage)?);
        }
        if let Some(first) = clients.first_mut() {
            init_schema(first)?;
        }
        info!(connections = count, "postgres store ready");
        Ok(Self {
            url: config.url.clone(),
            clients: clients.into_iter().map(Mutex::new).collect(),
            next: AtomicUsize::new(0),
        })
    }

    /// Borrow an idle connection, reconnecting it if the server dropped it.
    ///
    /// Starts from a rotating index and takes the first client nobody holds;
    /// blocks on the starting client only when every connection is busy.
    fn checkout(&self) -> Result<MutexGuard<'_, Client>, Error> {
        let start = self.next.fetch_add(1, Ordering::Relaxed) % self.clients.len();
        let (index, mut client) = match self.idle(start) {
            Some(found) => found,
            None => (start, recover(self.clients[start].lock(), start)),
        };
        if client.is_closed() {
            warn!(index, "postgres connection closed; reconnecting");
            *client = Client::connect(&self.url, NoTls).map_err(storage)?;
        }
        Ok(client)
    }

    fn idle(&self, start: usize) -> Option<(usize, MutexGuard<'_, Client>)> {
        let len = self.clients.len();
        (0..len).map(|offset| (start + offset) % len).find_map(|index| {
            match self.clients[index].try_lock() {
                Ok(guard) => Some((index, guard)),
                Err(TryLockError::Poisoned(poisoned)) => {
                    Some((index, recover(Err(poisoned), index)))
                }
                Err(TryLockError::WouldBlock) => None,
            }
        })
    }
}

fn recover<'a>(
    result: LockResult<MutexGuard<'a, Client>>,
    index: usize,
) -> MutexGuard<'a, Client> {
    match result {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!(index, "postgres connection lock poisoned; recovering");
            poisoned.into_inner()
        }
    }
}

impl Store for Postgres {
    fn create_user(&self, name: &str, balance: Points) -> Result<User, Error> {
        let mut client = self.checkout()?;
        let row = client
            .query_one(
                "INSERT INTO users (name, balance) VALUES ($1, $2) RETURNING id, name, balance",
                &[&name, &balance],
            )
            .map_err(storage)?;
        Ok(user_from_row(&row))
    }

    fn user(&self, id: UserId) -> Result<User, Error> {
        let mut client = self.checkout()?;
        let row = client
            .query_opt("SELECT id, name, balance FROM users WHERE id = $1", &[&id])
            .map_err(storage)?
            .ok_or(Error::UserNotFound(id))?;
        Ok(user_from_row(&row))
    }

    fn delete_user(&self, id: UserId) -> Result<(), Error> {
        let mut client = self.checkout()?;
        let mut tx = client.transaction().map_err(storage)?;
        lock_user(&mut tx, id)?;
        let active = tx
            .query_opt(
                "SELECT r.tournament_id FROM tournament_req r
                 JOIN tournaments t ON t.id = r.tournament_id
                 WHERE r.user_id = $1 AND NOT t.finished
                 LIMIT 1",
                &[&id],
            )
            .map_err(storage)?;
        if let Some(row) = active {
            return Err(Error::UserInActiveTournament {
                user: id,
                tournament: row.get("tournament_id"),
            });
        }
        tx.execute("DELETE FROM users WHERE id = $1", &[&id])
            .map_err(storage)?;
        tx.commit().map_err(storage)
    }

    fn debit(&self, id: UserId, amount: Points) -> Result<User, Error> {
        let mut client = self.checkout()?;
        let mut tx = client.transaction().map_err(storage)?;
        let mut user = lock_user(&mut tx, id)?;
        let balance = user.debit(amount)?;
        let user = set_balance(&mut tx, id, balance)?;
        tx.commit().map_err(storage)?;
        Ok(user)
    }

    fn credit(&self, id: UserId, amount: Points) -> Result<User, Error> {
        let mut client = self.checkout()?;
        let mut tx = client.transaction().map_err(storage)?;
        let mut user = lock_user(&mut tx, id)?;
        let balance = user.credit(amount)?;
        let user = set_balance(&mut tx, id, balance)?;
        tx.commit().map_err(storage)?;
        Ok(user)
    }

    fn create_tournament(&self, name: &str, deposit: Points) -> Result<Tournament, Error> {
        let mut client = self.checkout()?;
        let row = client
            .query_one(
                "INSERT INTO tournaments (name, deposit) VALUES ($1, $2) RETURNING id",
                &[&name, &deposit],
            )
            .map_err(storage)?;
        Ok(Tournament::new(row.get("id"), name.to_string(), deposit))
    }

    fn tournament(&self, id: TournamentId) -> Result<Tournament, Error> {
        let mut client = self.checkout()?;
        // One snapshot for the row and its roster.
        let mut tx = client
            .build_transaction()
            .read_only(true)
            .isolation_level(postgres::IsolationLevel::RepeatableRead)
            .start()
            .map_err(storage)?;
        let tournament = load_tournament(&mut tx, id, false)?;
        tx.commit().map_err(storage)?;
        Ok(tournament)
    }

    fn with_tournament<R>(
        &self,
        id: TournamentId,
        f: impl FnOnce(&mut dyn TournamentTx) -> Result<R, Error>,
    ) -> Result<R, Error> {
        let mut client = self.checkout()?;
        let mut tx = client.transaction().map_err(storage)?;
        let tournament = load_tournament(&mut tx, id, true)?;
        let mut unit = PostgresTx { tx, tournament };
        // Dropping an uncommitted transaction rolls it back.
        let result = f(&mut unit)?;
        unit.tx.commit().map_err(storage)?;
        Ok(result)
    }
}

struct PostgresTx<'a> {
    tx: Transaction<'a>,
    /// Scratch copy kept in step with the rows written so far.
    tournament: Tournament,
}

impl TournamentTx for PostgresTx<'_> {
    fn tournament(&self) -> &Tournament {
        &self.tournament
    }

    fn user(&mut self, id: UserId) -> Result<User, Error> {
        lock_user(&mut self.tx, id)
    }

    fn admit(&mut self, user: &User) -> Result<(), Error> {
        let prize = self.tournament.check_admit(user.id)?;
        let mut locked = lock_user(&mut self.tx, user.id)?;
        let balance = locked.debit(self.tournament.deposit)?;
        set_balance(&mut self.tx, user.id, balance)?;
        self.tx
            .execute(
                "INSERT INTO tournament_req (tournament_id, user_id, user_name) VALUES ($1, $2, $3)",
                &[&self.tournament.id, &user.id, &locked.name],
            )
            .map_err(storage)?;
        self.tx
            .execute(
                "UPDATE tournaments SET prize = $2 WHERE id = $1",
                &[&self.tournament.id, &prize],
            )
            .map_err(storage)?;
        self.tournament.admit(Participant {
            user_id: user.id,
            name: locked.name,
        })?;
        Ok(())
    }

    fn settle(&mut self, winner: UserId) -> Result<(), Error> {
        let prize = self.tournament.check_settle(winner)?;
        self.tx
            .execute(
                "UPDATE tournaments SET finished = TRUE, winner_id = $2 WHERE id = $1",
                &[&self.tournament.id, &winner],
            )
            .map_err(storage)?;
        let mut locked = lock_user(&mut self.tx, winner)?;
        let balance = locked.credit(prize)?;
        set_balance(&mut self.tx, winner, balance)?;
        self.tournament.settle(winner)?;
        Ok(())
    }

    fn remove(&mut self) -> Result<(), Error> {
        self.tx
            .execute("DELETE FROM tournaments WHERE id = $1", &[&self.tournament.id])
            .map_err(storage)?;
        Ok(())
    }
}
