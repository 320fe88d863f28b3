//! Storage abstraction for the ObsVault Observation service.
//!
//! Backends implement [`ObservationStore`], which hands out request-scoped
//! [`ObservationUow`] units of work over two tables: the current-state row
//! per logical id and the append-only version history.

pub mod error;
pub mod traits;

pub use error::{ErrorCategory, Result, StorageError};
pub use traits::{ObservationStore, ObservationUow};
