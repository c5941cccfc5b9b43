//! Pressure score: a scalar congestion signal derived from one snapshot.

use crate::models::{round_to, Occupancy};

/// Weight of stretcher occupancy in the pressure score.
pub const STRETCHER_WEIGHT: f64 = 0.5;
/// Weight of the share of patients waiting for a physician.
pub const WAITING_WEIGHT: f64 = 0.3;
/// Weight of the share of patients on a stretcher for more than 24 hours.
pub const LONG_STAY_WEIGHT: f64 = 0.2;

/// Compute the pressure score of one snapshot, rounded to 3 decimals.
///
/// Denominators are floored at 1 so empty facilities score from their
/// numerators alone instead of dividing by zero.
pub fn pressure_score(occupancy: &Occupancy) -> f64 {
    let stretchers = f64::from(occupancy.functional_stretchers.max(1));
    let total = f64::from(occupancy.patients_total.max(1));

    let stretcher_ratio = f64::from(occupancy.occupied_stretchers) / stretchers;
    let waiting_ratio = f64::from(occupancy.patients_waiting_mc) / total;
    let long_stay_ratio = f64::from(occupancy.patients_over_24h) / total;

    round_to(
        STRETCHER_WEIGHT * stretcher_ratio
            + WAITING_WEIGHT * waiting_ratio
            + LONG_STAY_WEIGHT * long_stay_ratio,
        3,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use qtty::Hours;

    fn occupancy(functional: i32, occupied: i32, total: i32, waiting: i32, over_24h: i32) -> Occupancy {
        Occupancy {
            functional_stretchers: functional,
            occupied_stretchers: occupied,
            patients_total: total,
            patients_waiting_mc: waiting,
            patients_over_24h: over_24h,
            patients_over_48h: 0,
            avg_stay_stretcher: Hours::new(12.0),
            avg_stay_ambulatory: Hours::new(3.0),
        }
    }

    #[test]
    fn test_weighted_formula() {
        // 0.5 * 20/40 + 0.3 * 10/50 + 0.2 * 5/50 = 0.25 + 0.06 + 0.02
        let score = pressure_score(&occupancy(40, 20, 50, 10, 5));
        assert_eq!(score, 0.33);
    }

    #[test]
    fn test_rounds_to_three_decimals() {
        // 0.5 * 1/3 = 0.1666..
        let score = pressure_score(&occupancy(3, 1, 10, 0, 0));
        assert_eq!(score, 0.167);
    }

    #[test]
    fn test_zero_denominators_are_guarded() {
        assert_eq!(pressure_score(&occupancy(0, 0, 0, 0, 0)), 0.0);
        // Occupied stretchers with no functional ones count against a floor of 1.
        assert_eq!(pressure_score(&occupancy(0, 1, 0, 0, 0)), 0.5);
    }

    #[test]
    fn test_full_facility_scores_one() {
        assert_eq!(pressure_score(&occupancy(30, 30, 60, 60, 60)), 1.0);
    }

    proptest! {
        #[test]
        fn prop_score_is_bounded_when_counts_fit_capacity(
            functional in 0i32..200,
            occupied_frac in 0.0f64..=1.0,
            total in 0i32..500,
            waiting_frac in 0.0f64..=1.0,
            long_frac in 0.0f64..=1.0,
        ) {
            let occupied = (f64::from(functional) * occupied_frac).floor() as i32;
            let waiting = (f64::from(total) * waiting_frac).floor() as i32;
            let over_24h = (f64::from(total) * long_frac).floor() as i32;
            let score = pressure_score(&occupancy(functional, occupied, total, waiting, over_24h));
            prop_assert!((0.0..=1.0).contains(&score));
        }
    }
}
