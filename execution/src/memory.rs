use arena_types::{Error, Participant, Points, Tournament, TournamentId, User, UserId};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::warn;

use crate::state::{Store, TournamentTx};

struct Account {
    user: User,
    /// Active tournaments this user has joined.
    active: BTreeSet<TournamentId>,
    /// Set under the account lock before the map entry is dropped.
    deleted: bool,
}

struct Entry {
    tournament: Tournament,
    deleted: bool,
}

/// In-process store. Every instance is independent.
///
/// Each user and each tournament sits behind its own mutex, so operations on
/// different ids never wait on each other beyond the brief map lookups.
#[derive(Default)]
pub struct Memory {
    users: RwLock<HashMap<UserId, Arc<Mutex<Account>>>>,
    tournaments: RwLock<HashMap<TournamentId, Arc<Mutex<Entry>>>>,
    next_user_id: AtomicI64,
    next_tournament_id: AtomicI64,
}

fn lock<'a, T>(mutex: &'a Mutex<T>, what: &'static str) -> MutexGuard<'a, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!(what, "lock poisoned; recovering");
            poisoned.into_inner()
        }
    }
}

fn read<'a, T>(lock: &'a RwLock<T>, what: &'static str) -> RwLockReadGuard<'a, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!(what, "lock poisoned; recovering");
            poisoned.into_inner()
        }
    }
}

fn write<'a, T>(lock: &'a RwLock<T>, what: &'static str) -> RwLockWriteGuard<'a, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!(what, "lock poisoned; recovering");
            poisoned.into_inner()
        }
    }
}

impl Memory {
    fn account(&self, id: UserId) -> Result<Arc<Mutex<Account>>, Error> {
        read(&self.users, "users")
            .get(&id)
            .cloned()
            .ok_or(Error::UserNotFound(id))
    }

    fn entry(&self, id: TournamentId) -> Result<Arc<Mutex<Entry>>, Error> {
        read(&self.tournaments, "tournaments")
            .get(&id)
            .cloned()
            .ok_or(Error::TournamentNotFound(id))
    }

    /// Run `f` on a live account under its lock.
    fn with_account<R>(
        &self,
        id: UserId,
        f: impl FnOnce(&mut Account) -> Result<R, Error>,
    ) -> Result<R, Error> {
        let account = self.account(id)?;
        let mut guard = lock(&account, "account");
        if guard.deleted {
            return Err(Error::UserNotFound(id));
        }
        f(&mut guard)
    }

    /// Number of registered users (tests and diagnostics).
    pub fn user_count(&self) -> usize {
        read(&self.users, "users").len()
    }
}

impl Store for Memory {
    fn create_user(&self, name: &str, balance: Points) -> Result<User, Error> {
        let id = self.next_user_id.fetch_add(1, Ordering::Relaxed) + 1;
        let user = User {
            id,
            name: name.to_string(),
            balance,
        };
        let account = Account {
            user: user.clone(),
            active: BTreeSet::new(),
            deleted: false,
        };
        write(&self.users, "users").insert(id, Arc::new(Mutex::new(account)));
        Ok(user)
    }

    fn user(&self, id: UserId) -> Result<User, Error> {
        self.with_account(id, |account| Ok(account.user.clone()))
    }

    fn delete_user(&self, id: UserId) -> Result<(), Error> {
        self.with_account(id, |account| {
            if let Some(&tournament) = account.active.iter().next() {
                return Err(Error::UserInActiveTournament { user: id, tournament });
            }
            account.deleted = true;
            Ok(())
        })?;
        write(&self.users, "users").remove(&id);
        Ok(())
    }

    fn debit(&self, id: UserId, amount: Points) -> Result<User, Error> {
        self.with_account(id, |account| {
            account.user.debit(amount)?;
            Ok(account.user.clone())
        })
    }

    fn credit(&self, id: UserId, amount: Points) -> Result<User, Error> {
        self.with_account(id, |account| {
            account.user.credit(amount)?;
            Ok(account.user.clone())
        })
    }

    fn create_tournament(&self, name: &str, deposit: Points) -> Result<Tournament, Error> {
        let id = self.next_tournament_id.fetch_add(1, Ordering::Relaxed) + 1;
        let tournament = Tournament::new(id, name.to_string(), deposit);
        let entry = Entry {
            tournament: tournament.clone(),
            deleted: false,
        };
        write(&self.tournaments, "tournaments").insert(id, Arc::new(Mutex::new(entry)));
        Ok(tournament)
    }

    fn tournament(&self, id: TournamentId) -> Result<Tournament, Error> {
        let entry = self.entry(id)?;
        let guard = lock(&entry, "tournament");
        if guard.deleted {
            return Err(Error::TournamentNotFound(id));
        }
        Ok(guard.tournament.clone())
    }

    fn with_tournament<R>(
        &self,
        id: TournamentId,
        f: impl FnOnce(&mut dyn TournamentTx) -> Result<R, Error>,
    ) -> Result<R, Error> {
        let entry = self.entry(id)?;
        let mut guard = lock(&entry, "tournament");
        if guard.deleted {
            return Err(Error::TournamentNotFound(id));
        }

        let mut tx = MemoryTx {
            store: self,
            tournament: guard.tournament.clone(),
            journal: Vec::new(),
            removed: false,
        };
        let result = f(&mut tx);
        let MemoryTx {
            tournament,
            journal,
            removed,
            ..
        } = tx;

        if result.is_err() {
            self.undo(journal);
            return result;
        }

        // Memberships end only once the unit commits.
        if guard.tournament.is_active() && (removed || !tournament.is_active()) {
            self.release_participants(&tournament);
        }
        guard.tournament = tournament;
        if removed {
            guard.deleted = true;
            drop(guard);
            write(&self.tournaments, "tournaments").remove(&id);
        }
        result
    }
}

/// Balance change made inside a tournament unit, kept until the unit commits.
enum Applied {
    Deposit {
        user: UserId,
        tournament: TournamentId,
        amount: Points,
    },
    Prize {
        user: UserId,
        amount: Points,
    },
}

impl Memory {
    /// Drop `tournament` from every participant's active set.
    fn release_participants(&self, tournament: &Tournament) {
        for participant in tournament.participants() {
            // Accounts cannot be deleted while listed here, so a miss only means
            // the roster outlived an account that never held this membership.
            let _ = self.with_account(participant.user_id, |account| {
                account.active.remove(&tournament.id);
                Ok(())
            });
        }
    }

    /// Reverse the balance changes of a failed unit, newest first.
    fn undo(&self, journal: Vec<Applied>) {
        for applied in journal.into_iter().rev() {
            let reverted = match applied {
                Applied::Deposit {
                    user,
                    tournament,
                    amount,
                } => self.with_account(user, |account| {
                    account.active.remove(&tournament);
                    account.user.credit(amount).map(|_| ())
                }),
                Applied::Prize { user, amount } => self.with_account(user, |account| {
                    account.user.debit(amount).map(|_| ())
                }),
            };
            if let Err(err) = reverted {
                warn!(?err, "failed to revert balance change");
            }
        }
    }
}

struct MemoryTx<'a> {
    store: &'a Memory,
    /// Working copy, written back on commit.
    tournament: Tournament,
    journal: Vec<Applied>,
    removed: bool,
}

impl TournamentTx for MemoryTx<'_> {
    fn tournament(&self) -> &Tournament {
        &self.tournament
    }

    fn user(&mut self, id: UserId) -> Result<User, Error> {
        self.store.user(id)
    }

    fn admit(&mut self, user: &User) -> Result<(), Error> {
        self.tournament.check_admit(user.id)?;
        let deposit = self.tournament.deposit;
        let tournament_id = self.tournament.id;

        // Balance may have moved since `user` was read; the debit re-checks it.
        let name = self.store.with_account(user.id, |account| {
            account.user.debit(deposit)?;
            account.active.insert(tournament_id);
            Ok(account.user.name.clone())
        })?;
        self.journal.push(Applied::Deposit {
            user: user.id,
            tournament: tournament_id,
            amount: deposit,
        });
        self.tournament.admit(Participant {
            user_id: user.id,
            name,
        })?;
        Ok(())
    }

    fn settle(&mut self, winner: UserId) -> Result<(), Error> {
        let prize = self.tournament.check_settle(winner)?;
        self.store.with_account(winner, |account| {
            account.user.credit(prize)?;
            Ok(())
        })?;
        self.journal.push(Applied::Prize {
            user: winner,
            amount: prize,
        });
        self.tournament.settle(winner)?;
        Ok(())
    }

    fn remove(&mut self) -> Result<(), Error> {
        self.removed = true;
        Ok(())
    }
}
