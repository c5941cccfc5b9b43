//! Risk tier classification.

use crate::models::RiskLevel;

/// Lowest pressure classified as [`RiskLevel::Medium`].
pub const MEDIUM_RISK_THRESHOLD: f64 = 0.4;
/// Lowest pressure classified as [`RiskLevel::High`].
pub const HIGH_RISK_THRESHOLD: f64 = 0.7;

/// Map a pressure value to its tier. Absent or NaN values are `Unknown`.
pub fn classify_risk(pressure: Option<f64>) -> RiskLevel {
    match pressure {
        None => RiskLevel::Unknown,
        Some(p) if p.is_nan() => RiskLevel::Unknown,
        Some(p) if p < MEDIUM_RISK_THRESHOLD => RiskLevel::Low,
        Some(p) if p < HIGH_RISK_THRESHOLD => RiskLevel::Medium,
        Some(_) => RiskLevel::High,
    }
}
