//! Forecasting: per-facility models, risk tiers and error reconciliation.

pub mod config;
pub mod evaluator;
pub mod forecaster;
pub mod risk;

pub use config::{ConfigError, FitSeries, ForecastConfig};
pub use evaluator::{
    Evaluation, EvaluationSummary, ForecastErrorEvaluator, HorizonCounts, HorizonEvaluation,
};
pub use forecaster::{BatchReport, EntityOutcome, ModelFactory, PerEntityForecaster};
pub use risk::{classify_risk, HIGH_RISK_THRESHOLD, MEDIUM_RISK_THRESHOLD};
