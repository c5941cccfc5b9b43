//! Feature engineering over occupancy snapshots.
//!
//! ```text
//! snapshots ──► pressure_score ──► build_features ──► assemble_dataset
//!               (per snapshot)     (lags, calendar)    (target at t+H)
//! ```

pub mod builder;
pub mod dataset;
pub mod pressure;

pub use builder::{build_features, FeatureRow};
pub use dataset::{assemble_dataset, TrainingRow};
pub use pressure::pressure_score;

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::models::HospitalId;

/// A time-stamped pressure observation belonging to one facility.
///
/// Implemented by both [`FeatureRow`] and [`TrainingRow`] so the forecaster
/// can fit on either sequence.
pub trait SeriesPoint: Clone + Send + Sync + 'static {
    fn hospital_id(&self) -> HospitalId;
    fn snapshot_time(&self) -> DateTime<Utc>;
    fn pressure(&self) -> f64;
}

/// Split rows per facility, each group sorted by `snapshot_time`.
pub fn group_by_hospital<R: SeriesPoint>(rows: &[R]) -> BTreeMap<HospitalId, Vec<R>> {
    let mut groups: BTreeMap<HospitalId, Vec<R>> = BTreeMap::new();
    for row in rows {
        groups.entry(row.hospital_id()).or_default().push(row.clone());
    }
    for group in groups.values_mut() {
        group.sort_by_key(|r| r.snapshot_time());
    }
    groups
}
