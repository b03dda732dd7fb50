use arena_types::{Points, User};
use rand::{rngs::StdRng, SeedableRng};

use crate::{Backend, Engine, Memory, Store};

/// Creates an in-memory engine whose winner draws are fixed by `seed`
pub fn create_engine(seed: u64) -> Engine<Memory> {
    Engine::with_rng(Memory::default(), StdRng::seed_from_u64(seed))
}

/// Same as [`create_engine`], behind the runtime-selected [`Backend`]
pub fn create_backend_engine(seed: u64) -> Engine<Backend> {
    Engine::with_rng(
        Backend::Memory(Memory::default()),
        StdRng::seed_from_u64(seed),
    )
}

/// Registers a user, panicking on rejection. The registration fee is charged
/// as usual, so the returned balance is `balance - REGISTRATION_FEE`.
pub fn register<S: Store>(engine: &Engine<S>, name: &str, balance: Points) -> User {
    engine
        .register_user(name, balance)
        .unwrap_or_else(|err| panic!("failed to register {name}: {err}"))
}
