#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use er_pressure::models::{IngestionRow, NewHospital, Occupancy};
use parking_lot::{const_mutex, Mutex, MutexGuard};
use qtty::Hours;

static ENV_LOCK: Mutex<()> = const_mutex(());

/// Environment overrides held for the guard's lifetime. Tests touching the
/// process environment are serialized through `ENV_LOCK`.
struct EnvOverride {
    saved: Vec<(String, Option<String>)>,
    _lock: MutexGuard<'static, ()>,
}

fn apply(key: &str, value: Option<&str>) {
    match value {
        Some(v) => std::env::set_var(key, v),
        None => std::env::remove_var(key),
    }
}

impl Drop for EnvOverride {
    fn drop(&mut self) {
        // Restore in reverse so a key listed twice ends at its first saved value.
        for (key, value) in self.saved.iter().rev() {
            apply(key, value.as_deref());
        }
    }
}

/// Run `f` with `changes` applied (`None` unsets the key); the previous
/// values come back afterwards, even if `f` panics.
pub fn with_scoped_env<R>(changes: &[(&str, Option<&str>)], f: impl FnOnce() -> R) -> R {
    let lock = ENV_LOCK.lock();
    let saved = changes
        .iter()
        .map(|(key, _)| (key.to_string(), std::env::var(key).ok()))
        .collect();
    let _guard = EnvOverride { saved, _lock: lock };
    for (key, value) in changes {
        apply(key, *value);
    }
    f()
}

/// Start of every fixture series: Monday 2024-03-04 00:00 UTC.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap()
}

/// Occupancy with `occupied` of 40 stretchers in use and fixed patient
/// counts, so the pressure score moves with `occupied` alone.
pub fn occupancy(occupied: i32) -> Occupancy {
    Occupancy {
        functional_stretchers: 40,
        occupied_stretchers: occupied,
        patients_total: 50,
        patients_waiting_mc: 10,
        patients_over_24h: 5,
        patients_over_48h: 2,
        avg_stay_stretcher: Hours::new(16.0),
        avg_stay_ambulatory: Hours::new(4.5),
    }
}

/// Hourly rows for one facility, one per entry of `occupied`.
pub fn hourly_rows(permit: &str, start_hour: i64, occupied: &[i32]) -> Vec<IngestionRow> {
    occupied
        .iter()
        .enumerate()
        .map(|(i, &occ)| {
            let at = t0() + Duration::hours(start_hour + i as i64);
            IngestionRow {
                hospital: NewHospital::new(permit, format!("Hospital {}", permit))
                    .with_region("Capitale-Nationale"),
                occupancy: occupancy(occ),
                snapshot_time: at,
                updated_at: at,
            }
        })
        .collect()
}

/// A wavy occupancy pattern of `len` points between 15 and 39.
pub fn wavy(len: usize) -> Vec<i32> {
    (0..len)
        .map(|i| 27 + ((i as f64 * 0.7).sin() * 10.0).round() as i32 + (i % 3) as i32)
        .collect()
}
