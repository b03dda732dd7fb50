use arena_types::{
    validate_id, validate_points, Error, Participant, Points, Tournament, TournamentId, User,
    UserId,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::sync::Mutex;
use tracing::{debug, info, warn};

use crate::state::{Store, TournamentTx};

mod handlers;

/// Validation and protocol layer over a [`Store`].
///
/// Every method is safe to call from many threads at once. Inputs are checked
/// before the store is touched, so a rejected call never writes.
pub struct Engine<S: Store> {
    store: S,
    rng: Mutex<StdRng>,
}

impl<S: Store> Engine<S> {
    /// Create an engine drawing winners from an entropy-seeded generator.
    pub fn new(store: S) -> Self {
        Self::with_rng(store, StdRng::from_entropy())
    }

    /// Create an engine with a caller-supplied generator (deterministic draws in tests).
    pub fn with_rng(store: S, rng: StdRng) -> Self {
        Self {
            store,
            rng: Mutex::new(rng),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Pick one participant uniformly at random.
    fn draw(&self, participants: &[Participant]) -> Option<UserId> {
        let mut rng = match self.rng.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("winner rng lock poisoned; recovering");
                poisoned.into_inner()
            }
        };
        participants.choose(&mut *rng).map(|p| p.user_id)
    }

    /// Finish the locked tournament with a random winner, returning the winner.
    fn settle(&self, tx: &mut dyn TournamentTx) -> Result<UserId, Error> {
        let tournament = tx.tournament();
        if !tournament.is_active() {
            return Err(Error::AlreadyFinished(tournament.id));
        }
        let winner = self
            .draw(tournament.participants())
            .ok_or(Error::NoParticipants(tournament.id))?;
        tx.settle(winner)?;
        Ok(winner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{create_engine, register};
    use crate::Memory;
    use arena_types::{ErrorKind, TournamentStatus, REGISTRATION_FEE};
    use proptest::prelude::*;
    use std::collections::HashMap;
    use std::thread;

    #[test]
    fn test_register_take_scenario() {
        let engine = create_engine(1);
        let user = engine.register_user("alice", 400).unwrap();
        assert_eq!(user.balance, 100);

        assert_eq!(engine.take(user.id, 50).unwrap().balance, 50);
        assert_eq!(
            engine.take(user.id, 60),
            Err(Error::InsufficientFunds {
                balance: 50,
                required: 60
            })
        );
        assert_eq!(engine.user(user.id).unwrap().balance, 50);
        assert_eq!(engine.fund(user.id, 25).unwrap().balance, 75);
    }

    #[test]
    fn test_registration_is_validated_before_writing() {
        let engine = create_engine(1);
        assert_eq!(
            engine.register_user("bob", REGISTRATION_FEE - 1).unwrap_err().kind(),
            ErrorKind::InvalidRegistration
        );
        assert_eq!(
            engine.register_user("  ", 1_000).unwrap_err().kind(),
            ErrorKind::InvalidRegistration
        );
        assert_eq!(engine.store().user_count(), 0);

        let user = engine.register_user("bob", REGISTRATION_FEE).unwrap();
        assert_eq!(user.id, 1);
        assert_eq!(user.balance, 0);
    }

    #[test]
    fn test_ids_and_points_are_validated() {
        let engine = create_engine(1);
        assert_eq!(engine.user(0), Err(Error::InvalidId(0)));
        assert_eq!(engine.user(-4), Err(Error::InvalidId(-4)));
        assert_eq!(engine.user(9), Err(Error::UserNotFound(9)));
        assert_eq!(engine.tournament(0), Err(Error::InvalidId(0)));
        assert_eq!(engine.tournament(9), Err(Error::TournamentNotFound(9)));

        let user = register(&engine, "carol", 1_000);
        assert_eq!(engine.take(user.id, 0), Err(Error::InvalidPoints(0)));
        assert_eq!(engine.fund(user.id, -5), Err(Error::InvalidPoints(-5)));
        assert_eq!(engine.take(77, 1), Err(Error::UserNotFound(77)));
        assert_eq!(engine.fund(77, 1), Err(Error::UserNotFound(77)));

        assert_eq!(
            engine.create_tournament("", 10).unwrap_err().kind(),
            ErrorKind::InvalidRegistration
        );
        assert_eq!(
            engine.create_tournament("cup", 0).unwrap_err().kind(),
            ErrorKind::InvalidRegistration
        );
    }

    #[test]
    fn test_tournament_lifecycle_scenario() {
        let engine = create_engine(7);
        let cup = engine.create_tournament("cup", 100).unwrap();
        assert_eq!(cup.prize, 0);
        assert_eq!(cup.status, TournamentStatus::Active);

        let a = engine.register_user("a", 1_000).unwrap();
        assert_eq!(a.balance, 700);
        let joined = engine.join(cup.id, a.id).unwrap();
        assert_eq!(joined.prize, 100);
        assert_eq!(engine.user(a.id).unwrap().balance, 600);

        let b = engine.register_user("b", 1_000).unwrap();
        let joined = engine.join(cup.id, b.id).unwrap();
        assert_eq!(joined.prize, 200);
        let names: Vec<_> = joined.participants().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["a", "b"]);

        let finished = engine.finish(cup.id).unwrap();
        assert_eq!(finished.status, TournamentStatus::Finished);
        assert_eq!(finished.prize, 200);
        let winner = finished.winner_id.unwrap();
        let loser = if winner == a.id { b.id } else { a.id };
        assert_eq!(engine.user(winner).unwrap().balance, 800);
        assert_eq!(engine.user(loser).unwrap().balance, 600);

        // Prize is historical once paid.
        assert_eq!(engine.tournament(cup.id).unwrap().prize, 200);
        assert_eq!(engine.finish(cup.id), Err(Error::AlreadyFinished(cup.id)));
        assert_eq!(engine.user(winner).unwrap().balance, 800);
    }

    #[test]
    fn test_join_validation_order() {
        let engine = create_engine(1);
        let rich = register(&engine, "rich", 1_000);
        let poor = register(&engine, "poor", 350);
        let cup = engine.create_tournament("cup", 100).unwrap();

        assert_eq!(
            engine.join(99, rich.id),
            Err(Error::TournamentNotFound(99))
        );
        assert_eq!(engine.join(cup.id, 99), Err(Error::UserNotFound(99)));
        assert_eq!(
            engine.join(cup.id, poor.id),
            Err(Error::InsufficientFunds {
                balance: 50,
                required: 100
            })
        );
        engine.join(cup.id, rich.id).unwrap();
        assert_eq!(
            engine.join(cup.id, rich.id),
            Err(Error::AlreadyRegistered {
                tournament: cup.id,
                user: rich.id
            })
        );

        // Failed joins leave no trace.
        let record = engine.tournament(cup.id).unwrap();
        assert_eq!(record.prize, 100);
        assert_eq!(record.participants().len(), 1);
        assert_eq!(engine.user(poor.id).unwrap().balance, 50);
        assert_eq!(engine.user(rich.id).unwrap().balance, 600);

        engine.finish(cup.id).unwrap();
        // Finished beats unknown user and duplicate checks.
        assert_eq!(
            engine.join(cup.id, 99),
            Err(Error::TournamentFinished(cup.id))
        );
        assert_eq!(
            engine.join(cup.id, rich.id),
            Err(Error::TournamentFinished(cup.id))
        );
    }

    #[test]
    fn test_finish_without_participants() {
        let engine = create_engine(1);
        let cup = engine.create_tournament("empty", 10).unwrap();
        assert_eq!(engine.finish(cup.id), Err(Error::NoParticipants(cup.id)));
        assert!(engine.tournament(cup.id).unwrap().is_active());
        assert_eq!(engine.finish(42), Err(Error::TournamentNotFound(42)));
    }

    #[test]
    fn test_user_may_join_several_tournaments() {
        let engine = create_engine(1);
        let user = register(&engine, "multi", 1_000);
        let first = engine.create_tournament("first", 100).unwrap();
        let second = engine.create_tournament("second", 200).unwrap();
        engine.join(first.id, user.id).unwrap();
        engine.join(second.id, user.id).unwrap();
        assert_eq!(engine.user(user.id).unwrap().balance, 400);
    }

    #[test]
    fn test_delete_user_rules() {
        let engine = create_engine(3);
        let user = register(&engine, "leaver", 1_000);
        let cup = engine.create_tournament("cup", 100).unwrap();
        engine.join(cup.id, user.id).unwrap();

        assert_eq!(
            engine.delete_user(user.id),
            Err(Error::UserInActiveTournament {
                user: user.id,
                tournament: cup.id
            })
        );
        engine.finish(cup.id).unwrap();
        engine.delete_user(user.id).unwrap();
        assert_eq!(engine.user(user.id), Err(Error::UserNotFound(user.id)));
        assert_eq!(
            engine.delete_user(user.id),
            Err(Error::UserNotFound(user.id))
        );

        // The finished roster survives the account.
        let record = engine.tournament(cup.id).unwrap();
        assert_eq!(record.participants()[0].name, "leaver");
        assert_eq!(record.winner_id, Some(user.id));
    }

    #[test]
    fn test_delete_active_tournament_pays_out() {
        let engine = create_engine(5);
        let a = register(&engine, "a", 1_000);
        let b = register(&engine, "b", 1_000);
        let cup = engine.create_tournament("cup", 150).unwrap();
        engine.join(cup.id, a.id).unwrap();
        engine.join(cup.id, b.id).unwrap();

        let deleted = engine.delete_tournament(cup.id).unwrap();
        assert_eq!(deleted.status, TournamentStatus::Finished);
        let winner = deleted.winner_id.unwrap();
        assert_eq!(engine.user(winner).unwrap().balance, 850);
        assert_eq!(
            engine.tournament(cup.id),
            Err(Error::TournamentNotFound(cup.id))
        );

        // Both users are free again.
        engine.delete_user(a.id).unwrap();
        engine.delete_user(b.id).unwrap();
    }

    #[test]
    fn test_delete_empty_and_finished_tournaments() {
        let engine = create_engine(5);
        let empty = engine.create_tournament("empty", 10).unwrap();
        let deleted = engine.delete_tournament(empty.id).unwrap();
        assert_eq!(deleted.status, TournamentStatus::Active);
        assert_eq!(deleted.winner_id, None);
        assert_eq!(
            engine.delete_tournament(empty.id),
            Err(Error::TournamentNotFound(empty.id))
        );

        let user = register(&engine, "solo", 500);
        let cup = engine.create_tournament("cup", 100).unwrap();
        engine.join(cup.id, user.id).unwrap();
        engine.finish(cup.id).unwrap();
        assert_eq!(engine.user(user.id).unwrap().balance, 200);
        engine.delete_tournament(cup.id).unwrap();
        // No second payout.
        assert_eq!(engine.user(user.id).unwrap().balance, 200);
    }

    #[test]
    fn test_fund_overflow_is_rejected() {
        let engine = create_engine(1);
        let user = register(&engine, "whale", Points::MAX);
        assert_eq!(user.balance, Points::MAX - REGISTRATION_FEE);
        engine.fund(user.id, REGISTRATION_FEE).unwrap();
        assert_eq!(engine.fund(user.id, 1), Err(Error::BalanceOverflow(user.id)));
        assert_eq!(engine.user(user.id).unwrap().balance, Points::MAX);
    }

    #[test]
    fn test_concurrent_take_and_fund() {
        let engine = create_engine(1);
        let user = register(&engine, "busy", 800);
        let start = engine.user(user.id).unwrap().balance;

        thread::scope(|s| {
            for _ in 0..100 {
                s.spawn(|| engine.take(user.id, 1).unwrap());
                s.spawn(|| engine.fund(user.id, 2).unwrap());
            }
        });

        assert_eq!(engine.user(user.id).unwrap().balance, start + 100);
    }

    #[test]
    fn test_concurrent_finish_pays_once() {
        let engine = create_engine(11);
        let cup = engine.create_tournament("cup", 100).unwrap();
        let users: Vec<User> = (0..4)
            .map(|i| register(&engine, &format!("p{i}"), 1_000))
            .collect();
        for user in &users {
            engine.join(cup.id, user.id).unwrap();
        }

        let results: Vec<Result<Tournament, Error>> = thread::scope(|s| {
            let handles: Vec<_> = (0..16).map(|_| s.spawn(|| engine.finish(cup.id))).collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let successes = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1);
        for result in &results {
            if let Err(err) = result {
                assert_eq!(err, &Error::AlreadyFinished(cup.id));
                assert_eq!(err.kind(), ErrorKind::Conflict);
            }
        }

        let total: Points = users
            .iter()
            .map(|u| engine.user(u.id).unwrap().balance)
            .sum();
        assert_eq!(total, 4 * 600 + 400);
    }

    #[test]
    fn test_concurrent_duplicate_joins() {
        let engine = create_engine(1);
        let cup = engine.create_tournament("cup", 10).unwrap();
        let users: Vec<User> = (0..8)
            .map(|i| register(&engine, &format!("p{i}"), 400))
            .collect();

        let cup_id = cup.id;
        let results: Vec<Result<Tournament, Error>> = thread::scope(|s| {
            let handles: Vec<_> = users
                .iter()
                .flat_map(|u| [u.id; 4])
                .map(|id| {
                    let engine = &engine;
                    s.spawn(move || engine.join(cup_id, id))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), users.len());
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, Error::AlreadyRegistered { .. })));

        let record = engine.tournament(cup.id).unwrap();
        assert_eq!(record.participants().len(), users.len());
        assert_eq!(record.prize, 10 * users.len() as Points);
        for user in &users {
            assert_eq!(engine.user(user.id).unwrap().balance, 90);
        }
    }

    #[test]
    fn test_concurrent_joins_never_overdraw() {
        let engine = create_engine(1);
        // 100 points left: enough for exactly two of the five tournaments.
        let user = register(&engine, "thin", 400);
        let cups: Vec<Tournament> = (0..5)
            .map(|i| engine.create_tournament(&format!("c{i}"), 50).unwrap())
            .collect();

        let user_id = user.id;
        thread::scope(|s| {
            for cup in &cups {
                let engine = &engine;
                s.spawn(move || engine.join(cup.id, user_id));
            }
        });

        let joined: Points = cups
            .iter()
            .map(|c| engine.tournament(c.id).unwrap().prize)
            .sum();
        assert_eq!(joined, 100);
        assert_eq!(engine.user(user.id).unwrap().balance, 0);
    }

    #[test]
    fn test_joins_racing_finish_see_whole_states() {
        for seed in 0..32 {
            let engine = create_engine(seed);
            let cup = engine.create_tournament("cup", 30).unwrap();
            let users: Vec<User> = (0..7)
                .map(|i| register(&engine, &format!("p{i}"), 400))
                .collect();
            let start: Points = users.iter().map(|u| u.balance).sum();

            let cup_id = cup.id;
            let (joins, finished) = thread::scope(|s| {
                let joins: Vec<_> = users
                    .iter()
                    .map(|u| {
                        let engine = &engine;
                        let id = u.id;
                        s.spawn(move || engine.join(cup_id, id))
                    })
                    .collect();
                let finished = s.spawn(|| engine.finish(cup_id));
                let joins: Vec<Result<Tournament, Error>> =
                    joins.into_iter().map(|h| h.join().unwrap()).collect();
                (joins, finished.join().unwrap())
            });

            for join in &joins {
                match join {
                    Ok(view) => assert_eq!(view.prize, 30 * view.participants().len() as Points),
                    Err(err) => assert_eq!(err, &Error::TournamentFinished(cup_id)),
                }
            }

            let record = engine.tournament(cup_id).unwrap();
            let joined = joins.iter().filter(|r| r.is_ok()).count();
            assert_eq!(record.participants().len(), joined);
            assert_eq!(record.prize, 30 * joined as Points);

            let balances: Points = users
                .iter()
                .map(|u| engine.user(u.id).unwrap().balance)
                .sum();
            match finished {
                Ok(view) => {
                    assert_eq!(view.status, TournamentStatus::Finished);
                    assert!(record
                        .participants()
                        .iter()
                        .any(|p| Some(p.user_id) == view.winner_id));
                    assert_eq!(balances, start);
                }
                Err(err) => {
                    assert_eq!(err, Error::NoParticipants(cup_id));
                    assert!(record.is_active());
                    assert_eq!(balances + record.prize, start);
                }
            }
        }
    }

    #[test]
    fn test_winner_draw_is_roughly_uniform() {
        let engine = Engine::with_rng(Memory::default(), StdRng::seed_from_u64(42));
        let players: Vec<User> = (0..4)
            .map(|i| register(&engine, &format!("p{i}"), 100_000))
            .collect();

        let mut wins: HashMap<UserId, usize> = HashMap::new();
        for round in 0..400 {
            let cup = engine
                .create_tournament(&format!("round-{round}"), 1)
                .unwrap();
            for player in &players {
                engine.join(cup.id, player.id).unwrap();
            }
            let finished = engine.finish(cup.id).unwrap();
            *wins.entry(finished.winner_id.unwrap()).or_default() += 1;
        }

        for player in &players {
            let count = wins.get(&player.id).copied().unwrap_or(0);
            assert!((50..=150).contains(&count), "{} won {count}", player.name);
        }
    }

    #[test]
    fn test_seeded_engines_draw_identically() {
        let run = |seed| {
            let engine = create_engine(seed);
            let cup = engine.create_tournament("cup", 5).unwrap();
            for i in 0..10 {
                let user = register(&engine, &format!("p{i}"), 400);
                engine.join(cup.id, user.id).unwrap();
            }
            engine.finish(cup.id).unwrap().winner_id
        };
        assert_eq!(run(9), run(9));
    }

    #[derive(Clone, Debug)]
    enum Op {
        Take(usize, Points),
        Fund(usize, Points),
        Join(usize, usize),
        Finish(usize),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0..4usize, 1..300i64).prop_map(|(u, p)| Op::Take(u, p)),
            (0..4usize, 1..300i64).prop_map(|(u, p)| Op::Fund(u, p)),
            (0..3usize, 0..4usize).prop_map(|(t, u)| Op::Join(t, u)),
            (0..3usize).prop_map(Op::Finish),
        ]
    }

    proptest! {
        #[test]
        fn prop_points_are_conserved(ops in proptest::collection::vec(op(), 1..60)) {
            let engine = create_engine(3);
            let users: Vec<User> = (0..4)
                .map(|i| register(&engine, &format!("p{i}"), 700))
                .collect();
            let cups: Vec<Tournament> = [50, 120, 200]
                .iter()
                .map(|&deposit| engine.create_tournament("cup", deposit).unwrap())
                .collect();

            // Points entering or leaving the system through take/fund.
            let mut external: Points = users.iter().map(|u| u.balance).sum();
            for op in ops {
                match op {
                    Op::Take(u, p) => {
                        if engine.take(users[u].id, p).is_ok() {
                            external -= p;
                        }
                    }
                    Op::Fund(u, p) => {
                        engine.fund(users[u].id, p).unwrap();
                        external += p;
                    }
                    Op::Join(t, u) => {
                        let _ = engine.join(cups[t].id, users[u].id);
                    }
                    Op::Finish(t) => {
                        let _ = engine.finish(cups[t].id);
                    }
                }

                let balances: Vec<Points> = users
                    .iter()
                    .map(|u| engine.user(u.id).unwrap().balance)
                    .collect();
                prop_assert!(balances.iter().all(|&b| b >= 0));
                let pooled: Points = cups
                    .iter()
                    .map(|c| engine.tournament(c.id).unwrap())
                    .filter(|c| c.is_active())
                    .map(|c| {
                        prop_assert_eq!(c.prize, c.deposit * c.participants().len() as Points);
                        Ok(c.prize)
                    })
                    .collect::<Result<Vec<_>, TestCaseError>>()?
                    .into_iter()
                    .sum();
                prop_assert_eq!(balances.iter().sum::<Points>() + pooled, external);
            }
        }
    }
}
