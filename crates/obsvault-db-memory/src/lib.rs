//! In-memory backend for the ObsVault Observation store.
//!
//! Two tables behind a single lock: a current-state map keyed by logical id
//! and an append-only history vector. Units of work stage their writes and
//! commit with an optimistic version check, so concurrent editors of the
//! same Observation resolve to exactly one winner.

mod storage;
mod uow;

pub use storage::MemoryStore;
pub use uow::MemoryUow;
