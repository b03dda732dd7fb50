use super::super::*;

impl<S: Store> Engine<S> {
    // === Tournament Registry ===

    pub fn create_tournament(&self, name: &str, deposit: Points) -> Result<Tournament, Error> {
        Tournament::validate(name, deposit)?;
        let tournament = self.store.create_tournament(name, deposit)?;
        info!(tournament = tournament.id, deposit, "created tournament");
        Ok(tournament)
    }

    pub fn tournament(&self, id: TournamentId) -> Result<Tournament, Error> {
        let id = validate_id(id)?;
        let tournament = self.store.tournament(id)?;
        debug!(tournament = id, status = ?tournament.status, "loaded tournament");
        Ok(tournament)
    }

    /// Delete a tournament and return its final record.
    ///
    /// An active tournament with participants is finished first, in the same
    /// unit, so the pool is always paid out before the rows go away.
    pub fn delete_tournament(&self, id: TournamentId) -> Result<Tournament, Error> {
        let id = validate_id(id)?;
        let record = self.store.with_tournament(id, |tx| {
            let tournament = tx.tournament();
            if tournament.is_active() && !tournament.participants().is_empty() {
                let winner = self.settle(tx)?;
                info!(tournament = id, winner, "finished tournament before delete");
            }
            let record = tx.tournament().clone();
            tx.remove()?;
            Ok(record)
        })?;
        info!(tournament = id, "deleted tournament");
        Ok(record)
    }

    // === Join Protocol ===

    /// Admit `user` into tournament `id`, moving the deposit into the prize pool.
    ///
    /// Checks run in a fixed order and the first failure wins: tournament
    /// active, user exists, not yet joined, balance covers the deposit.
    pub fn join(&self, id: TournamentId, user: UserId) -> Result<Tournament, Error> {
        let id = validate_id(id)?;
        let user = validate_id(user)?;
        let joined = self.store.with_tournament(id, |tx| {
            if !tx.tournament().is_active() {
                return Err(Error::TournamentFinished(id));
            }
            let user = tx.user(user)?;
            let tournament = tx.tournament();
            if tournament.contains(user.id) {
                return Err(Error::AlreadyRegistered {
                    tournament: id,
                    user: user.id,
                });
            }
            if user.balance < tournament.deposit {
                return Err(Error::InsufficientFunds {
                    balance: user.balance,
                    required: tournament.deposit,
                });
            }
            tx.admit(&user)?;
            Ok(tx.tournament().clone())
        })?;
        info!(tournament = id, user, prize = joined.prize, "joined tournament");
        Ok(joined)
    }

    // === Finish Protocol ===

    /// Finish tournament `id`, paying the whole prize to a random participant.
    pub fn finish(&self, id: TournamentId) -> Result<Tournament, Error> {
        let id = validate_id(id)?;
        let finished = self.store.with_tournament(id, |tx| {
            self.settle(tx)?;
            Ok(tx.tournament().clone())
        })?;
        info!(
            tournament = id,
            winner = ?finished.winner_id,
            prize = finished.prize,
            "finished tournament"
        );
        Ok(finished)
    }
}
