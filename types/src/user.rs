use serde::{Deserialize, Serialize};

use crate::{validate_name, Error, Points, UserId, REGISTRATION_FEE};

/// A registered account. Wire shape: `{id, name, balance}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub balance: Points,
}

impl User {
    /// Validate a registration request and return the balance the account opens with.
    ///
    /// The fee is checked before anything is written; a request that cannot
    /// cover it never creates a record.
    pub fn opening_balance(name: &str, requested: Points) -> Result<Points, Error> {
        validate_name(name)?;
        if requested < REGISTRATION_FEE {
            return Err(Error::InvalidRegistration(
                "balance must cover the 300 point registration fee",
            ));
        }
        Ok(requested - REGISTRATION_FEE)
    }

    /// Subtract `amount`, leaving the record untouched on failure.
    pub fn debit(&mut self, amount: Points) -> Result<Points, Error> {
        if self.balance < amount {
            return Err(Error::InsufficientFunds {
                balance: self.balance,
                required: amount,
            });
        }
        self.balance -= amount;
        Ok(self.balance)
    }

    /// Add `amount`, leaving the record untouched on overflow.
    pub fn credit(&mut self, amount: Points) -> Result<Points, Error> {
        self.balance = self
            .balance
            .checked_add(amount)
            .ok_or(Error::BalanceOverflow(self.id))?;
        Ok(self.balance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(balance: Points) -> User {
        User {
            id: 1,
            name: "alice".to_string(),
            balance,
        }
    }

    #[test]
    fn registration_deducts_fee() {
        assert_eq!(User::opening_balance("alice", 400), Ok(100));
        assert_eq!(User::opening_balance("alice", 300), Ok(0));
    }

    #[test]
    fn registration_requires_name_and_fee() {
        assert!(matches!(
            User::opening_balance("", 1_000),
            Err(Error::InvalidRegistration(_))
        ));
        assert!(matches!(
            User::opening_balance("   ", 1_000),
            Err(Error::InvalidRegistration(_))
        ));
        assert!(matches!(
            User::opening_balance("b\u{0}b", 1_000),
            Err(Error::InvalidRegistration(_))
        ));
        assert!(matches!(
            User::opening_balance("bob", 299),
            Err(Error::InvalidRegistration(_))
        ));
    }

    #[test]
    fn failed_debit_leaves_balance() {
        let mut u = user(50);
        assert_eq!(
            u.debit(60),
            Err(Error::InsufficientFunds {
                balance: 50,
                required: 60
            })
        );
        assert_eq!(u.balance, 50);
        assert_eq!(u.debit(50), Ok(0));
    }

    #[test]
    fn overflowing_credit_is_rejected() {
        let mut u = user(Points::MAX - 1);
        assert_eq!(u.credit(2), Err(Error::BalanceOverflow(1)));
        assert_eq!(u.balance, Points::MAX - 1);
        assert_eq!(u.credit(1), Ok(Points::MAX));
    }
}
