//! Arena execution core.
//!
//! This crate owns every mutation of user balances and tournament records. The
//! primary entrypoint is [`Engine`], which layers validation and the join/finish
//! protocols over a [`Store`].
//!
//! ## Atomicity
//! - Balance debits and credits are single check-and-mutate operations on one user.
//! - Join, finish and tournament deletion run inside [`Store::with_tournament`], one
//!   atomic unit per tournament. Every mutating [`TournamentTx`] call is all-or-nothing.
//! - Locks are always taken tournament first, then user. User-only operations never
//!   touch a tournament lock.
//!
//! ## Blocking
//! All calls are synchronous and may block on I/O (Postgres) or on contended locks.
//! Async callers should run them on a blocking thread pool.
//!
//! ## Minimal flow (example)
//! ```rust
//! use arena_execution::{Engine, Memory};
//!
//! let engine = Engine::new(Memory::default());
//! let alice = engine.register_user("alice", 1_000).unwrap();
//! let cup = engine.create_tournament("cup", 100).unwrap();
//! engine.join(cup.id, alice.id).unwrap();
//! let finished = engine.finish(cup.id).unwrap();
//! assert_eq!(finished.winner_id, Some(alice.id));
//! assert_eq!(engine.user(alice.id).unwrap().balance, 700);
//! ```

mod engine;
pub use engine::Engine;

mod memory;
pub use memory::Memory;

mod postgres;
pub use self::postgres::{Postgres, PostgresConfig};

mod state;
pub use state::{Backend, Store, TournamentTx};

#[cfg(any(test, feature = "mocks"))]
pub mod mocks;
