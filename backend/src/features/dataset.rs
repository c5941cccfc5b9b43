//! Supervised dataset: features joined with a forward-shifted pressure target.
//!
//! The shift is counted in observations of the facility's own ordered
//! sequence, not in wall-clock hours. With an irregular ingestion cadence the
//! `horizon_hours` label therefore only approximates the real lead time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::builder::FeatureRow;
use super::{group_by_hospital, SeriesPoint};
use crate::models::HospitalId;

/// A feature row with complete lag history and its future target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingRow {
    pub hospital_id: HospitalId,
    pub snapshot_time: DateTime<Utc>,
    pub pressure_score: f64,
    pub hour: u32,
    pub day_of_week: u32,
    pub is_weekend: bool,
    pub lag_1: f64,
    pub lag_2: f64,
    pub lag_3: f64,
    pub trend: f64,
    /// Pressure score `horizon` observations later.
    pub target: f64,
    pub horizon: u32,
}

impl SeriesPoint for TrainingRow {
    fn hospital_id(&self) -> HospitalId {
        self.hospital_id
    }

    fn snapshot_time(&self) -> DateTime<Utc> {
        self.snapshot_time
    }

    fn pressure(&self) -> f64 {
        self.pressure_score
    }
}

/// Join each feature row with the pressure score `horizon` steps ahead.
///
/// Rows lacking any lag feature or a future target are dropped; nothing is
/// imputed. A zero horizon yields an empty dataset.
pub fn assemble_dataset(features: &[FeatureRow], horizon: u32) -> Vec<TrainingRow> {
    if horizon == 0 {
        return Vec::new();
    }
    let shift = horizon as usize;

    let mut rows = Vec::new();
    for (_, sequence) in group_by_hospital(features) {
        for (i, row) in sequence.iter().enumerate() {
            let Some(target) = sequence.get(i + shift).map(|r| r.pressure()) else {
                break;
            };
            let (Some(lag_1), Some(lag_2), Some(lag_3), Some(trend)) =
                (row.lag_1, row.lag_2, row.lag_3, row.trend)
            else {
                continue;
            };
            rows.push(TrainingRow {
                hospital_id: row.hospital_id,
                snapshot_time: row.snapshot_time,
                pressure_score: row.pressure_score,
                hour: row.hour,
                day_of_week: row.day_of_week,
                is_weekend: row.is_weekend,
                lag_1,
                lag_2,
                lag_3,
                trend,
                target,
                horizon,
            });
        }
    }
    rows
}
