//! Repository-agnostic storage operations.
//!
//! These functions hold the logic that must behave the same on every
//! backend: candidate normalization before forecasts are written,
//! ingestion followed by error reconciliation, and accuracy summaries.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  Pipeline / scheduler / er-forecast CLI      │
//! └──────────────────────┬───────────────────────┘
//!                        │
//! ┌──────────────────────▼───────────────────────┐
//! │  Service layer (services.rs)                 │
//! │  - forecast normalization                    │
//! │  - ingestion + reconciliation                │
//! │  - accuracy aggregation                      │
//! └──────────────────────┬───────────────────────┘
//!                        │
//! ┌──────────────────────▼───────────────────────┐
//! │  Repository traits (repository/)             │
//! └──────────┬─────────────────────────┬─────────┘
//!      ┌─────▼─────┐            ┌──────▼──────┐
//!      │ Postgres  │            │ Local       │
//!      │ (Diesel)  │            │ (in-memory) │
//!      └───────────┘            └─────────────┘
//! ```

use log::{info, warn};
use std::sync::Arc;

use super::repository::{FullRepository, RepositoryResult};
use crate::forecasting::{EvaluationSummary, ForecastErrorEvaluator};
use crate::models::{
    Forecast, ForecastAccuracy, ForecastCandidate, HospitalId, IngestionRow, LatestForecast,
    NewForecast, Snapshot,
};

// ==================== Health ====================

pub async fn health_check<R: FullRepository + ?Sized>(repo: &R) -> RepositoryResult<bool> {
    repo.health_check().await
}

// ==================== Forecasts ====================

/// Normalize a batch of candidates and store it atomically.
///
/// Normalization runs on the whole batch before anything is written: a
/// single candidate with a non-finite prediction rejects the batch.
pub async fn store_forecasts<R: FullRepository + ?Sized>(
    repo: &R,
    candidates: &[ForecastCandidate],
) -> RepositoryResult<Vec<Forecast>> {
    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    let rows = candidates
        .iter()
        .map(NewForecast::try_from)
        .collect::<RepositoryResult<Vec<_>>>()?;

    let stored = repo.insert_forecasts(&rows).await?;
    info!("Stored {} forecasts", stored.len());
    Ok(stored)
}

/// Latest forecast per facility for `horizon_hours`.
pub async fn latest_forecasts<R: FullRepository + ?Sized>(
    repo: &R,
    horizon_hours: i32,
) -> RepositoryResult<Vec<LatestForecast>> {
    repo.latest_forecasts(horizon_hours).await
}

// ==================== Ingestion ====================

/// Result of [`ingest_and_evaluate`].
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct IngestionSummary {
    pub received: usize,
    pub inserted: usize,
    pub evaluation: EvaluationSummary,
}

/// Store ingestion rows without evaluating them.
pub async fn ingest<R: FullRepository + ?Sized>(
    repo: &R,
    rows: &[IngestionRow],
) -> RepositoryResult<Vec<Snapshot>> {
    let inserted = repo.ingest_snapshots(rows).await?;
    if inserted.len() < rows.len() {
        info!(
            "Ingested {} of {} rows ({} already stored)",
            inserted.len(),
            rows.len(),
            rows.len() - inserted.len()
        );
    } else {
        info!("Ingested {} rows", inserted.len());
    }
    Ok(inserted)
}

/// Store ingestion rows, then reconcile the newly inserted snapshots
/// against the forecasts made before them.
///
/// Ingestion is atomic; reconciliation runs after the commit, so a
/// reconciliation failure leaves the snapshots stored.
pub async fn ingest_and_evaluate(
    repo: Arc<dyn FullRepository>,
    rows: &[IngestionRow],
) -> RepositoryResult<IngestionSummary> {
    let inserted = ingest(repo.as_ref(), rows).await?;
    let evaluation = ForecastErrorEvaluator::new(repo)
        .evaluate_batch(&inserted)
        .await?;
    Ok(IngestionSummary {
        received: rows.len(),
        inserted: inserted.len(),
        evaluation,
    })
}

// ==================== Accuracy ====================

/// MAE and RMSE over stored forecast errors. `None` without errors.
pub async fn forecast_accuracy<R: FullRepository + ?Sized>(
    repo: &R,
    hospital_id: Option<HospitalId>,
    horizon_hours: Option<i32>,
) -> RepositoryResult<Option<ForecastAccuracy>> {
    let errors = repo.list_forecast_errors(hospital_id, horizon_hours).await?;
    let pairs: Vec<(f64, f64)> = errors
        .iter()
        .map(|e| (e.absolute_error, e.squared_error))
        .filter(|(abs, sq)| abs.is_finite() && sq.is_finite())
        .collect();
    if pairs.len() < errors.len() {
        warn!(
            "Ignored {} forecast errors with non-finite values",
            errors.len() - pairs.len()
        );
    }
    Ok(ForecastAccuracy::from_errors(hospital_id, horizon_hours, &pairs))
}

/// Accuracy per facility, skipping facilities without evaluated forecasts.
pub async fn accuracy_by_hospital<R: FullRepository + ?Sized>(
    repo: &R,
    horizon_hours: Option<i32>,
) -> RepositoryResult<Vec<ForecastAccuracy>> {
    let mut summaries = Vec::new();
    for hospital in repo.list_hospitals().await? {
        if let Some(acc) = forecast_accuracy(repo, Some(hospital.id), horizon_hours).await? {
            summaries.push(acc);
        }
    }
    Ok(summaries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::LocalRepository;
    use crate::db::repository::ForecastRepository;
    use crate::models::{NewForecastError, RiskLevel};
    use chrono::{TimeZone, Utc};

    fn candidate(hospital: i64, pressure: f64) -> ForecastCandidate {
        ForecastCandidate {
            hospital_id: HospitalId(hospital),
            horizon_hours: 2,
            predicted_pressure: pressure,
            lower_bound: Some(pressure - 0.1),
            upper_bound: Some(pressure + 0.1),
            forecast_time: Utc.with_ymd_and_hms(2024, 2, 1, 10, 0, 0).unwrap(),
            risk_level: RiskLevel::Low,
            model: "test".to_string(),
            observations: 10,
        }
    }

    #[tokio::test]
    async fn test_store_forecasts_is_all_or_nothing() {
        let repo = LocalRepository::new();
        let err = store_forecasts(&repo, &[candidate(1, 0.3), candidate(2, f64::NAN)])
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(repo.forecast_count(), 0);

        let stored = store_forecasts(&repo, &[candidate(1, 0.3), candidate(2, 0.5)])
            .await
            .unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].horizon_hours, 2);
    }

    #[tokio::test]
    async fn test_accuracy_summary() {
        let repo = LocalRepository::new();
        let stored = store_forecasts(&repo, &[candidate(1, 0.3), candidate(1, 0.5)])
            .await
            .unwrap();
        // Errors of 0.1 and 0.3: MAE 0.2, RMSE sqrt(0.05).
        repo.insert_forecast_error(&NewForecastError::compare(&stored[0], 0.4))
            .await
            .unwrap();
        repo.insert_forecast_error(&NewForecastError::compare(&stored[1], 0.8))
            .await
            .unwrap();

        let acc = forecast_accuracy(&repo, None, Some(2)).await.unwrap().unwrap();
        assert_eq!(acc.count, 2);
        assert!((acc.mae - 0.2).abs() < 1e-9);
        assert!((acc.rmse - 0.05_f64.sqrt()).abs() < 1e-9);

        assert!(forecast_accuracy(&repo, None, Some(1)).await.unwrap().is_none());
    }
}
