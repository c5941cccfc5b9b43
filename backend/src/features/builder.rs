//! Per-facility feature sequences.

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::pressure::pressure_score;
use super::SeriesPoint;
use crate::models::{HospitalId, Snapshot};

/// One snapshot augmented with its derived features.
///
/// Lag `k` holds the pressure score `k` observations earlier for the same
/// facility and is `None` for the first `k` observations. `trend` is
/// `lag_1 - lag_3` and shares the availability of `lag_3`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub hospital_id: HospitalId,
    pub snapshot_time: DateTime<Utc>,
    pub pressure_score: f64,
    pub hour: u32,
    /// 0 = Monday .. 6 = Sunday.
    pub day_of_week: u32,
    pub is_weekend: bool,
    pub lag_1: Option<f64>,
    pub lag_2: Option<f64>,
    pub lag_3: Option<f64>,
    pub trend: Option<f64>,
}

impl FeatureRow {
    /// True when every lag and the trend are available.
    pub fn has_full_history(&self) -> bool {
        self.lag_1.is_some() && self.lag_2.is_some() && self.lag_3.is_some() && self.trend.is_some()
    }
}

impl SeriesPoint for FeatureRow {
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

/// Build the feature sequence for an unordered snapshot history.
///
/// The output has one row per input snapshot, grouped by facility in
/// ascending id order and sorted by `snapshot_time` within each facility.
/// Lags never cross facility boundaries.
pub fn build_features(snapshots: &[Snapshot]) -> Vec<FeatureRow> {
    let mut by_hospital: BTreeMap<HospitalId, Vec<&Snapshot>> = BTreeMap::new();
    for snapshot in snapshots {
        by_hospital.entry(snapshot.hospital_id).or_default().push(snapshot);
    }

    let mut rows = Vec::with_capacity(snapshots.len());
    for (_, mut history) in by_hospital {
        history.sort_by_key(|s| (s.snapshot_time, s.id));

        let scores: Vec<f64> = history.iter().map(|s| pressure_score(&s.occupancy)).collect();
        let lag = |i: usize, k: usize| i.checked_sub(k).map(|j| scores[j]);

        for (i, snapshot) in history.iter().enumerate() {
            let (lag_1, lag_2, lag_3) = (lag(i, 1), lag(i, 2), lag(i, 3));
            let day_of_week = snapshot.snapshot_time.weekday().num_days_from_monday();
            rows.push(FeatureRow {
                hospital_id: snapshot.hospital_id,
                snapshot_time: snapshot.snapshot_time,
                pressure_score: scores[i],
                hour: snapshot.snapshot_time.hour(),
                day_of_week,
                is_weekend: day_of_week >= 5,
                lag_1,
                lag_2,
                lag_3,
                trend: lag_1.zip(lag_3).map(|(l1, l3)| l1 - l3),
            });
        }
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Occupancy, SnapshotId};
    use chrono::{Duration, TimeZone};
    use qtty::Hours;

    fn snapshot(id: i64, hospital: i64, hour_offset: i64, occupied: i32) -> Snapshot {
        // 2024-01-13 is a Saturday.
        let time = Utc.with_ymd_and_hms(2024, 1, 13, 0, 0, 0).unwrap() + Duration::hours(hour_offset);
        Snapshot {
            id: SnapshotId(id),
            hospital_id: HospitalId(hospital),
            occupancy: Occupancy {
                functional_stretchers: 10,
                occupied_stretchers: occupied,
                patients_total: 10,
                patients_waiting_mc: 0,
                patients_over_24h: 0,
                patients_over_48h: 0,
                avg_stay_stretcher: Hours::new(10.0),
                avg_stay_ambulatory: Hours::new(2.0),
            },
            snapshot_time: time,
            updated_at: time,
        }
    }

    #[test]
    fn test_orders_by_hospital_then_time() {
        let input = vec![
            snapshot(1, 2, 2, 4),
            snapshot(2, 1, 1, 2),
            snapshot(3, 2, 0, 2),
            snapshot(4, 1, 0, 1),
            snapshot(5, 2, 1, 3),
        ];
        let rows = build_features(&input);
        assert_eq!(rows.len(), input.len());
        let order: Vec<(i64, u32)> = rows.iter().map(|r| (r.hospital_id.0, r.hour)).collect();
        assert_eq!(order, vec![(1, 0), (1, 1), (2, 0), (2, 1), (2, 2)]);
    }

    #[test]
    fn test_lags_and_trend_within_facility() {
        let input: Vec<Snapshot> = (0..5).map(|i| snapshot(i, 7, i, (i + 1) as i32)).collect();
        let rows = build_features(&input);

        assert_eq!(rows[0].lag_1, None);
        assert_eq!(rows[1].lag_1, Some(rows[0].pressure_score));
        assert_eq!(rows[2].lag_2, Some(rows[0].pressure_score));
        assert_eq!(rows[2].lag_3, None);
        assert_eq!(rows[2].trend, None);
        assert!(!rows[2].has_full_history());

        let r = &rows[4];
        assert_eq!(r.lag_1, Some(rows[3].pressure_score));
        assert_eq!(r.lag_3, Some(rows[1].pressure_score));
        assert!((r.trend.unwrap() - (rows[3].pressure_score - rows[1].pressure_score)).abs() < 1e-12);
        assert!(r.has_full_history());
    }

    #[test]
    fn test_lags_do_not_cross_facilities() {
        let input = vec![snapshot(1, 1, 0, 5), snapshot(2, 2, 1, 9)];
        let rows = build_features(&input);
        assert!(rows.iter().all(|r| r.lag_1.is_none()));
    }

    #[test]
    fn test_calendar_features() {
        let rows = build_features(&[snapshot(1, 1, 0, 1), snapshot(2, 1, 50, 1)]);
        // Saturday 00:00
        assert_eq!((rows[0].day_of_week, rows[0].hour, rows[0].is_weekend), (5, 0, true));
        // Monday 02:00
        assert_eq!((rows[1].day_of_week, rows[1].hour, rows[1].is_weekend), (0, 2, false));
    }
}
