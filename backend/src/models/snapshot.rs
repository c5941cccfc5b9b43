//! Emergency-room occupancy snapshots.

use chrono::{DateTime, Utc};
use qtty::Hours;
use serde::{Deserialize, Serialize};

use super::hospital::{HospitalId, NewHospital};

crate::row_id!(SnapshotId);

/// Occupancy counters reported by a facility at one extraction time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Occupancy {
    pub functional_stretchers: i32,
    pub occupied_stretchers: i32,
    pub patients_total: i32,
    pub patients_waiting_mc: i32,
    pub patients_over_24h: i32,
    pub patients_over_48h: i32,
    /// Mean length of stay on a stretcher.
    pub avg_stay_stretcher: Hours,
    /// Mean length of stay for ambulatory patients.
    pub avg_stay_ambulatory: Hours,
}

impl Occupancy {
    /// Name of the first counter holding a negative value, if any.
    pub fn first_negative_counter(&self) -> Option<&'static str> {
        [
            ("functional_stretchers", self.functional_stretchers),
            ("occupied_stretchers", self.occupied_stretchers),
            ("patients_total", self.patients_total),
            ("patients_waiting_mc", self.patients_waiting_mc),
            ("patients_over_24h", self.patients_over_24h),
            ("patients_over_48h", self.patients_over_48h),
        ]
        .into_iter()
        .find(|(_, v)| *v < 0)
        .map(|(name, _)| name)
    }
}

/// A persisted observation for one facility at one timestamp.
///
/// Unique per `(hospital_id, snapshot_time)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: SnapshotId,
    pub hospital_id: HospitalId,
    #[serde(flatten)]
    pub occupancy: Occupancy,
    pub snapshot_time: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A validated row handed over by the ingestion collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionRow {
    #[serde(flatten)]
    pub hospital: NewHospital,
    #[serde(flatten)]
    pub occupancy: Occupancy,
    pub snapshot_time: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
