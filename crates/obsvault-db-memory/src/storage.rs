use crate::uow::MemoryUow;
use obsvault_core::model::{Observation, ObservationRecord};
use obsvault_storage::{ObservationStore, ObservationUow};
use std::collections::HashMap;
use std::sync::atomic::AtomicI64;
use std::sync::Arc;
use tokio::sync::RwLock;

/// The two tables every unit of work operates on. One lock covers both so
/// a commit can check versions and apply row + record writes atomically.
#[derive(Debug, Default)]
pub(crate) struct Tables {
    pub observations: HashMap<i64, Observation>,
    pub records: Vec<ObservationRecord>,
}

/// In-memory Observation store: a current-state row per logical id plus an
/// append-only version history.
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
    next_observation_id: Arc<AtomicI64>,
    next_record_id: Arc<AtomicI64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: Arc::new(RwLock::new(Tables::default())),
            next_observation_id: Arc::new(AtomicI64::new(1)),
            next_record_id: Arc::new(AtomicI64::new(1)),
        }
    }

    /// Number of current-state rows, tombstones included.
    pub async fn resource_count(&self) -> usize {
        self.tables.read().await.observations.len()
    }

    /// Number of history records across all logical ids.
    pub async fn record_count(&self) -> usize {
        self.tables.read().await.records.len()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ObservationStore for MemoryStore {
    fn begin(&self) -> Box<dyn ObservationUow> {
        Box::new(MemoryUow::new(
            Arc::clone(&self.tables),
            Arc::clone(&self.next_observation_id),
            Arc::clone(&self.next_record_id),
        ))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
