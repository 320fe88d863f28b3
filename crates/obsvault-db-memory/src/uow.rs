use crate::storage::Tables;
use async_trait::async_trait;
use obsvault_core::model::{Observation, ObservationRecord, RecordAction};
use obsvault_storage::{ObservationUow, Result, StorageError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// A staged row write. `expected_version` is the committed version this
/// unit of work read before staging; `None` marks a brand-new row.
#[derive(Debug)]
struct StagedRow {
    row: Observation,
    expected_version: Option<i32>,
}

/// Unit of work over the in-memory tables.
///
/// Reads remember the row version they observed; `save` re-checks those
/// versions under the write lock and applies row upserts before record
/// appends. Dropping the unit without saving discards all staged writes.
pub struct MemoryUow {
    tables: Arc<RwLock<Tables>>,
    next_observation_id: Arc<AtomicI64>,
    next_record_id: Arc<AtomicI64>,
    staged_rows: Vec<StagedRow>,
    staged_records: Vec<ObservationRecord>,
    read_versions: HashMap<i64, i32>,
}

impl MemoryUow {
    pub(crate) fn new(
        tables: Arc<RwLock<Tables>>,
        next_observation_id: Arc<AtomicI64>,
        next_record_id: Arc<AtomicI64>,
    ) -> Self {
        Self {
            tables,
            next_observation_id,
            next_record_id,
            staged_rows: Vec::new(),
            staged_records: Vec::new(),
            read_versions: HashMap::new(),
        }
    }

    fn allocate_record_id(&self) -> i64 {
        self.next_record_id.fetch_add(1, Ordering::SeqCst)
    }

    fn stage_record(&mut self, record: ObservationRecord) -> ObservationRecord {
        self.staged_records.push(record.clone());
        record
    }
}

#[async_trait]
impl ObservationUow for MemoryUow {
    async fn get_resource_by_id(&mut self, id: i64) -> Result<Option<Observation>> {
        let tables = self.tables.read().await;
        let row = tables.observations.get(&id).cloned();
        if let Some(row) = &row {
            self.read_versions.insert(id, row.version_id);
        }
        Ok(row)
    }

    async fn resource_exists(&mut self, id: i64) -> Result<bool> {
        let tables = self.tables.read().await;
        match tables.observations.get(&id) {
            Some(row) => {
                self.read_versions.insert(id, row.version_id);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get_latest_record(&mut self, id: i64) -> Result<Option<ObservationRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .records
            .iter()
            .filter(|record| record.observation_id == id)
            .max_by_key(|record| record.version_id)
            .cloned())
    }

    async fn add_resource(&mut self, resource: &mut Observation) -> Result<()> {
        if resource.is_unassigned() {
            resource.observation_id = self.next_observation_id.fetch_add(1, Ordering::SeqCst);
        } else {
            // Keep the allocator ahead of explicitly assigned ids.
            self.next_observation_id
                .fetch_max(resource.observation_id + 1, Ordering::SeqCst);
        }
        resource.version_id = 1;
        resource.is_deleted = false;
        self.staged_rows.push(StagedRow {
            row: resource.clone(),
            expected_version: None,
        });
        Ok(())
    }

    async fn update_resource(&mut self, resource: &mut Observation) -> Result<()> {
        let id = resource.observation_id;
        let expected = self
            .read_versions
            .get(&id)
            .copied()
            .unwrap_or(resource.version_id);
        resource.version_id = expected + 1;
        self.staged_rows.push(StagedRow {
            row: resource.clone(),
            expected_version: Some(expected),
        });
        Ok(())
    }

    async fn delete_resource(&mut self, resource: &mut Observation) -> Result<()> {
        resource.is_deleted = true;
        self.update_resource(resource).await
    }

    async fn add_create_record(&mut self, resource: &Observation) -> Result<ObservationRecord> {
        let record = ObservationRecord::first(self.allocate_record_id(), resource.observation_id);
        Ok(self.stage_record(record))
    }

    async fn add_update_record(
        &mut self,
        _resource: &Observation,
        previous: &ObservationRecord,
    ) -> Result<ObservationRecord> {
        let record =
            ObservationRecord::successor(self.allocate_record_id(), previous, RecordAction::Update);
        Ok(self.stage_record(record))
    }

    async fn add_delete_record(
        &mut self,
        _resource: &Observation,
        previous: &ObservationRecord,
    ) -> Result<ObservationRecord> {
        let record =
            ObservationRecord::successor(self.allocate_record_id(), previous, RecordAction::Delete);
        Ok(self.stage_record(record))
    }

    async fn save(&mut self) -> Result<()> {
        let mut tables = self.tables.write().await;

        // Validate every staged row against committed state before touching
        // anything, so a conflict leaves the tables untouched.
        for staged in &self.staged_rows {
            let id = staged.row.observation_id;
            match staged.expected_version {
                None => {
                    if tables.observations.contains_key(&id) {
                        return Err(StorageError::already_exists(id));
                    }
                }
                Some(expected) => match tables.observations.get(&id) {
                    None => return Err(StorageError::not_found(id)),
                    Some(current) if current.version_id != expected => {
                        return Err(StorageError::version_conflict(
                            id,
                            expected,
                            current.version_id,
                        ));
                    }
                    Some(_) => {}
                },
            }
        }

        // Row upserts first, then the history records they belong to.
        for staged in self.staged_rows.drain(..) {
            let id = staged.row.observation_id;
            self.read_versions.insert(id, staged.row.version_id);
            tables.observations.insert(id, staged.row);
        }
        tables.records.append(&mut self.staged_records);

        tracing::debug!(rows = tables.observations.len(), "unit of work committed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use obsvault_core::model::ObservationStatus;
    use obsvault_storage::ObservationStore;

    /// Creates one committed Observation and returns its logical id.
    async fn seed(store: &MemoryStore) -> i64 {
        let mut uow = store.begin();
        let mut obs = Observation::new();
        obs.status = ObservationStatus::Final;
        uow.add_resource(&mut obs).await.unwrap();
        uow.add_create_record(&obs).await.unwrap();
        uow.save().await.unwrap();
        obs.observation_id
    }

    #[tokio::test]
    async fn create_assigns_id_and_version_one() {
        let store = MemoryStore::new();
        let mut uow = store.begin();
        let mut obs = Observation::new();
        assert!(obs.is_unassigned());

        uow.add_resource(&mut obs).await.unwrap();
        assert_eq!(obs.observation_id, 1);
        assert_eq!(obs.version_id, 1);

        let record = uow.add_create_record(&obs).await.unwrap();
        assert_eq!(record.version_id, 1);
        assert_eq!(record.action, RecordAction::Create);
        uow.save().await.unwrap();

        assert_eq!(store.resource_count().await, 1);
        assert_eq!(store.record_count().await, 1);
    }

    #[tokio::test]
    async fn preset_id_is_honored_and_allocator_skips_past_it() {
        let store = MemoryStore::new();
        let mut uow = store.begin();
        let mut obs = Observation::new();
        obs.observation_id = 500;
        uow.add_resource(&mut obs).await.unwrap();
        assert_eq!(obs.observation_id, 500);
        uow.add_create_record(&obs).await.unwrap();
        uow.save().await.unwrap();

        let mut uow = store.begin();
        let mut next = Observation::new();
        uow.add_resource(&mut next).await.unwrap();
        assert_eq!(next.observation_id, 501);
    }

    #[tokio::test]
    async fn versions_climb_through_update_update_delete() {
        let store = MemoryStore::new();
        let id = seed(&store).await;

        for expected_version in [2, 3] {
            let mut uow = store.begin();
            let mut obs = uow.get_resource_by_id(id).await.unwrap().unwrap();
            obs.status = ObservationStatus::Amended;
            let previous = uow.get_latest_record(id).await.unwrap().unwrap();
            let record = uow.add_update_record(&obs, &previous).await.unwrap();
            uow.update_resource(&mut obs).await.unwrap();
            uow.save().await.unwrap();
            assert_eq!(record.version_id, expected_version);
            assert_eq!(obs.version_id, expected_version);
            assert_eq!(record.action, RecordAction::Update);
        }

        let mut uow = store.begin();
        let mut obs = uow.get_resource_by_id(id).await.unwrap().unwrap();
        let previous = uow.get_latest_record(id).await.unwrap().unwrap();
        uow.delete_resource(&mut obs).await.unwrap();
        let record = uow.add_delete_record(&obs, &previous).await.unwrap();
        uow.save().await.unwrap();

        assert_eq!(record.version_id, 4);
        assert_eq!(record.action, RecordAction::Delete);

        let mut uow = store.begin();
        let latest = uow.get_latest_record(id).await.unwrap().unwrap();
        assert_eq!(latest.version_id, 4);
        assert_eq!(store.record_count().await, 4);
    }

    #[tokio::test]
    async fn soft_delete_keeps_row_and_stays_visible_to_reads() {
        let store = MemoryStore::new();
        let id = seed(&store).await;

        let mut uow = store.begin();
        let mut obs = uow.get_resource_by_id(id).await.unwrap().unwrap();
        let previous = uow.get_latest_record(id).await.unwrap().unwrap();
        uow.delete_resource(&mut obs).await.unwrap();
        uow.add_delete_record(&obs, &previous).await.unwrap();
        uow.save().await.unwrap();

        assert_eq!(store.resource_count().await, 1);
        let mut uow = store.begin();
        let row = uow.get_resource_by_id(id).await.unwrap().unwrap();
        assert!(row.is_deleted);
        assert!(uow.resource_exists(id).await.unwrap());
    }

    #[tokio::test]
    async fn stale_unit_of_work_hits_version_conflict() {
        let store = MemoryStore::new();
        let id = seed(&store).await;

        let mut stale = store.begin();
        let mut stale_row = stale.get_resource_by_id(id).await.unwrap().unwrap();

        // A second unit commits an update in between.
        let mut fresh = store.begin();
        let mut fresh_row = fresh.get_resource_by_id(id).await.unwrap().unwrap();
        fresh_row.status = ObservationStatus::Amended;
        let previous = fresh.get_latest_record(id).await.unwrap().unwrap();
        fresh.add_update_record(&fresh_row, &previous).await.unwrap();
        fresh.update_resource(&mut fresh_row).await.unwrap();
        fresh.save().await.unwrap();

        stale.update_resource(&mut stale_row).await.unwrap();
        match stale.save().await {
            Err(StorageError::VersionConflict {
                id: conflict_id,
                expected,
                actual,
            }) => {
                assert_eq!(conflict_id, id);
                assert_eq!(expected, 1);
                assert_eq!(actual, 2);
            }
            other => panic!("expected VersionConflict, got {other:?}"),
        }

        // The failed save changed nothing.
        let mut check = store.begin();
        let row = check.get_resource_by_id(id).await.unwrap().unwrap();
        assert_eq!(row.version_id, 2);
        assert_eq!(store.record_count().await, 2);
    }

    #[tokio::test]
    async fn dropping_without_save_discards_staged_writes() {
        let store = MemoryStore::new();
        {
            let mut uow = store.begin();
            let mut obs = Observation::new();
            uow.add_resource(&mut obs).await.unwrap();
            uow.add_create_record(&obs).await.unwrap();
            // No save.
        }
        assert_eq!(store.resource_count().await, 0);
        assert_eq!(store.record_count().await, 0);
    }

    #[tokio::test]
    async fn duplicate_insert_is_rejected_at_save() {
        let store = MemoryStore::new();
        let id = seed(&store).await;

        let mut uow = store.begin();
        let mut dupe = Observation::new();
        dupe.observation_id = id;
        uow.add_resource(&mut dupe).await.unwrap();
        assert!(matches!(
            uow.save().await,
            Err(StorageError::AlreadyExists { .. })
        ));
    }

    #[tokio::test]
    async fn latest_record_is_none_for_unknown_id() {
        let store = MemoryStore::new();
        let mut uow = store.begin();
        assert!(uow.get_latest_record(999).await.unwrap().is_none());
        assert!(!uow.resource_exists(999).await.unwrap());
        assert!(uow.get_resource_by_id(999).await.unwrap().is_none());
    }
}
