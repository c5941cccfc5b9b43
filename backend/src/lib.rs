//! # ER Pressure
//!
//! Short-horizon forecasting of emergency-room congestion.
//!
//! Occupancy snapshots are reduced to a scalar pressure score, enriched
//! with lag and calendar features, and fed per facility to a time-series
//! model (ARIMA(2,1,2) by default). Forecasts are classified into risk
//! tiers, stored in batches and later compared with what was actually
//! observed.
//!
//! ## Architecture
//!
//! - [`models`]: facility, snapshot and forecast records
//! - [`features`]: pressure score, feature rows and supervised datasets
//! - [`algorithms`]: ARIMA, auto ARIMA, exponential smoothing and naive models
//! - [`forecasting`]: per-facility forecaster, risk tiers, error evaluator
//! - [`db`]: repository traits, in-memory and Postgres backends
//! - [`services`]: forecasting pipeline, scheduler and run tracking

// Allow large error types - RepositoryError contains rich context for debugging
#![allow(clippy::result_large_err)]

pub mod algorithms;
pub mod db;
pub mod features;
pub mod forecasting;
pub mod models;
pub mod services;
