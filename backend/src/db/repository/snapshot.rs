//! Snapshot repository trait.

use async_trait::async_trait;

use super::error::{ErrorContext, RepositoryError, RepositoryResult};
use crate::models::{HospitalId, IngestionRow, Snapshot};

#[async_trait]
pub trait SnapshotRepository: Send + Sync {
    /// Store a batch of validated ingestion rows.
    ///
    /// Runs as one transaction: each row's facility is resolved by permit id
    /// (and created when unknown), then the snapshot is inserted unless one
    /// already exists for the same `(hospital_id, snapshot_time)`.
    ///
    /// # Returns
    /// * `Ok(Vec<Snapshot>)` - Only the snapshots that were newly inserted
    /// * `Err(RepositoryError::ValidationError)` - A row carries a negative
    ///   count; nothing from the batch is stored
    /// * `Err(RepositoryError)` - Any other failure; nothing is stored
    async fn ingest_snapshots(&self, rows: &[IngestionRow]) -> RepositoryResult<Vec<Snapshot>>;

    /// Full snapshot history of every facility, in no particular order.
    async fn list_snapshots(&self) -> RepositoryResult<Vec<Snapshot>>;

    /// One facility's history, ordered by `snapshot_time`.
    async fn list_snapshots_for_hospital(
        &self,
        hospital_id: HospitalId,
    ) -> RepositoryResult<Vec<Snapshot>>;
}

/// Reject rows that must not reach storage: negative counters or
/// non-finite stay durations. Checked for the whole batch before any write.
pub(crate) fn validate_ingestion_rows(rows: &[IngestionRow]) -> RepositoryResult<()> {
    for row in rows {
        let context = || {
            ErrorContext::new("ingest_snapshots")
                .with_entity("snapshot")
                .with_entity_id(format!("{}@{}", row.hospital.permit_id, row.snapshot_time))
        };
        if let Some(counter) = row.occupancy.first_negative_counter() {
            return Err(RepositoryError::validation_with_context(
                format!("{} must not be negative", counter),
                context(),
            ));
        }
        let stays = [
            row.occupancy.avg_stay_stretcher.value(),
            row.occupancy.avg_stay_ambulatory.value(),
        ];
        if stays.iter().any(|h| !h.is_finite()) {
            return Err(RepositoryError::validation_with_context(
                "average stay must be finite",
                context(),
            ));
        }
        if row.hospital.permit_id.trim().is_empty() {
            return Err(RepositoryError::validation_with_context(
                "permit id must not be empty",
                context(),
            ));
        }
    }
    Ok(())
}
