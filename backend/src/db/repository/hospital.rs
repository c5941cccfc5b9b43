//! Facility repository trait.

use async_trait::async_trait;

use super::error::RepositoryResult;
use crate::models::{Hospital, HospitalId};

/// Facility lookups.
///
/// Facilities are created implicitly by snapshot ingestion; this trait only
/// reads them.
#[async_trait]
pub trait HospitalRepository: Send + Sync {
    /// Check if the storage backend is reachable.
    ///
    /// # Returns
    /// - `Ok(true)` if the backend is healthy
    /// - `Ok(false)` if it is reachable but reports itself unhealthy
    /// - `Err(RepositoryError)` if the check itself failed
    async fn health_check(&self) -> RepositoryResult<bool>;

    /// All facilities, ordered by id.
    async fn list_hospitals(&self) -> RepositoryResult<Vec<Hospital>>;

    /// # Returns
    /// * `Ok(Hospital)` - The facility
    /// * `Err(RepositoryError::NotFound)` - If no facility has this id
    async fn get_hospital(&self, hospital_id: HospitalId) -> RepositoryResult<Hospital>;

    /// Resolve a facility by its permit number.
    async fn find_hospital_by_permit(&self, permit_id: &str)
        -> RepositoryResult<Option<Hospital>>;
}
