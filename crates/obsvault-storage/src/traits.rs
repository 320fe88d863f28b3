use crate::error::Result;
use async_trait::async_trait;
use obsvault_core::fhir::{Meta, ObservationResource};
use obsvault_core::model::{Observation, ObservationRecord};

/// A storage backend that hands out request-scoped units of work.
pub trait ObservationStore: Send + Sync {
    /// Starts a unit of work. Nothing the unit stages is visible to other
    /// units until its `save` commits; dropping it without saving discards
    /// everything.
    fn begin(&self) -> Box<dyn ObservationUow>;

    fn backend_name(&self) -> &'static str;
}

/// One unit of work over the Observation tables.
///
/// Reads go against committed state and remember the row versions they saw;
/// writes are staged and only applied by [`save`](Self::save), which
/// re-checks those versions and fails with `VersionConflict` when another
/// unit committed in between.
#[async_trait]
pub trait ObservationUow: Send + Sync {
    /// Fetches the current row, deleted or not. Callers decide how a
    /// tombstone is surfaced.
    async fn get_resource_by_id(&mut self, id: i64) -> Result<Option<Observation>>;

    /// True when the logical id has ever been created, including rows that
    /// are soft-deleted.
    async fn resource_exists(&mut self, id: i64) -> Result<bool>;

    /// Highest-version history record for the logical id.
    async fn get_latest_record(&mut self, id: i64) -> Result<Option<ObservationRecord>>;

    /// Stages a new row. Allocates a logical id if the resource carries 0,
    /// otherwise honors the pre-set id; sets the row version to 1.
    async fn add_resource(&mut self, resource: &mut Observation) -> Result<()>;

    /// Stages a full-row replacement. The logical id never changes.
    async fn update_resource(&mut self, resource: &mut Observation) -> Result<()>;

    /// Stages a soft delete: the row stays, flagged as deleted.
    async fn delete_resource(&mut self, resource: &mut Observation) -> Result<()>;

    /// Stages the first history record (version 1, CREATE) and returns it.
    async fn add_create_record(&mut self, resource: &Observation) -> Result<ObservationRecord>;

    /// Stages the UPDATE record following `previous` and returns it.
    async fn add_update_record(
        &mut self,
        resource: &Observation,
        previous: &ObservationRecord,
    ) -> Result<ObservationRecord>;

    /// Stages the DELETE record following `previous` and returns it.
    async fn add_delete_record(
        &mut self,
        resource: &Observation,
        previous: &ObservationRecord,
    ) -> Result<ObservationRecord>;

    /// Commits everything staged: row upserts first, then history records,
    /// atomically with respect to other units of work.
    async fn save(&mut self) -> Result<()>;

    /// Stamps `id` and `meta` (versionId, lastUpdated) onto the external
    /// form from the row and its history record. Pure enrichment, no I/O.
    fn add_metadata(
        &self,
        resource: &Observation,
        external: &mut ObservationResource,
        record: &ObservationRecord,
    ) {
        external.id = Some(resource.observation_id.to_string());
        external.meta = Some(Meta {
            version_id: Some(record.version_id.to_string()),
            last_updated: Some(record.last_modified.clone()),
        });
    }
}
