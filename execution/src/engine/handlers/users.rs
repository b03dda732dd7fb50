use super::super::*;

impl<S: Store> Engine<S> {
    // === User Registry ===

    /// Register a user, charging the registration fee out of `balance`.
    pub fn register_user(&self, name: &str, balance: Points) -> Result<User, Error> {
        let opening = User::opening_balance(name, balance)?;
        let user = self.store.create_user(name, opening)?;
        info!(user = user.id, balance = user.balance, "registered user");
        Ok(user)
    }

    pub fn user(&self, id: UserId) -> Result<User, Error> {
        let id = validate_id(id)?;
        let user = self.store.user(id)?;
        debug!(user = id, balance = user.balance, "loaded user");
        Ok(user)
    }

    /// Delete a user that is not part of any active tournament.
    pub fn delete_user(&self, id: UserId) -> Result<(), Error> {
        let id = validate_id(id)?;
        self.store.delete_user(id)?;
        info!(user = id, "deleted user");
        Ok(())
    }

    /// Withdraw `points` from a user's balance.
    pub fn take(&self, id: UserId, points: Points) -> Result<User, Error> {
        let id = validate_id(id)?;
        let points = validate_points(points)?;
        let user = self.store.debit(id, points)?;
        info!(user = id, points, balance = user.balance, "took points");
        Ok(user)
    }

    /// Add `points` to a user's balance.
    pub fn fund(&self, id: UserId, points: Points) -> Result<User, Error> {
        let id = validate_id(id)?;
        let points = validate_points(points)?;
        let user = self.store.credit(id, points)?;
        info!(user = id, points, balance = user.balance, "funded user");
        Ok(user)
    }
}
