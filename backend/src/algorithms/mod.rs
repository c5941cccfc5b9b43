//! Univariate time-series models used to forecast facility pressure.
//!
//! Every model implements [`TimeSeriesModel`]: fit on an ordered series, then
//! produce an N-step forecast. The per-facility forecaster only sees this
//! trait, so the model family is chosen by configuration through
//! [`ModelSpec`].

pub mod arima;
pub mod auto;
pub mod naive;
pub mod optimize;
pub mod smoothing;

pub use arima::{Arima, ArimaOrder};
pub use auto::AutoArima;
pub use naive::NaiveLastValue;
pub use smoothing::ExponentialSmoothing;

use serde::{Deserialize, Serialize};

/// Two-sided 95% standard normal quantile.
pub const Z_95: f64 = 1.959_963_984_540_054;

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors raised while fitting or forecasting.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    #[error("series holds a non-finite value at position {position}")]
    NonFiniteInput { position: usize },

    #[error("{model} needs at least {required} observations, got {actual}")]
    InsufficientData {
        model: String,
        required: usize,
        actual: usize,
    },

    #[error("{model} failed to fit: {reason}")]
    FitFailed { model: String, reason: String },

    #[error("model must be fitted before forecasting")]
    NotFitted,

    #[error("invalid model configuration: {0}")]
    InvalidConfiguration(String),
}

/// One forecast step with an optional 95% prediction interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointForecast {
    pub mean: f64,
    pub lower: Option<f64>,
    pub upper: Option<f64>,
}

impl PointForecast {
    pub fn point(mean: f64) -> Self {
        Self {
            mean,
            lower: None,
            upper: None,
        }
    }

    /// Symmetric normal interval around `mean` for the given variance.
    pub fn with_variance(mean: f64, variance: f64) -> Self {
        let half_width = Z_95 * variance.max(0.0).sqrt();
        Self {
            mean,
            lower: Some(mean - half_width),
            upper: Some(mean + half_width),
        }
    }
}

/// Capability shared by every forecasting model.
pub trait TimeSeriesModel: Send {
    /// Human-readable model name, e.g. `ARIMA(2,1,2)`.
    fn name(&self) -> String;

    /// Fit the model on an ordered series (oldest first).
    fn fit(&mut self, series: &[f64]) -> ModelResult<()>;

    /// Forecast `steps` values past the end of the fitted series.
    fn forecast(&self, steps: usize) -> ModelResult<Vec<PointForecast>>;
}

/// Configuration-level choice of model family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelSpec {
    Arima {
        p: usize,
        d: usize,
        q: usize,
    },
    AutoArima {
        max_p: usize,
        max_d: usize,
        max_q: usize,
    },
    /// ETS; `spec` such as `"ANN"` fixes the components, otherwise
    /// `AutoETS` picks among the non-seasonal models.
    ExponentialSmoothing {
        #[serde(default)]
        spec: Option<String>,
    },
    Naive,
}

impl Default for ModelSpec {
    fn default() -> Self {
        ModelSpec::Arima { p: 2, d: 1, q: 2 }
    }
}

impl ModelSpec {
    pub fn validate(&self) -> ModelResult<()> {
        match self {
            ModelSpec::Arima { d, .. } if *d > 2 => Err(ModelError::InvalidConfiguration(
                format!("differencing order {} is not supported (max 2)", d),
            )),
            ModelSpec::AutoArima { max_d, .. } if *max_d > 2 => {
                Err(ModelError::InvalidConfiguration(format!(
                    "differencing order {} is not supported (max 2)",
                    max_d
                )))
            }
            ModelSpec::ExponentialSmoothing { spec: Some(spec) } => {
                ExponentialSmoothing::check_spec(spec)
            }
            _ => Ok(()),
        }
    }

    /// Build a fresh, unfitted model.
    pub fn build(&self) -> Box<dyn TimeSeriesModel> {
        match self {
            ModelSpec::Arima { p, d, q } => Box::new(Arima::new(ArimaOrder::new(*p, *d, *q))),
            ModelSpec::AutoArima { max_p, max_d, max_q } => {
                Box::new(AutoArima::new(*max_p, *max_d, *max_q))
            }
            ModelSpec::ExponentialSmoothing { spec } => {
                Box::new(ExponentialSmoothing::new(spec.clone()))
            }
            ModelSpec::Naive => Box::new(NaiveLastValue::new()),
        }
    }
}

/// Reject series containing NaN or infinite values.
pub(crate) fn ensure_finite(series: &[f64]) -> ModelResult<()> {
    match series.iter().position(|v| !v.is_finite()) {
        Some(position) => Err(ModelError::NonFiniteInput { position }),
        None => Ok(()),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    /// Deterministic uniform(-0.5, 0.5) noise from a 64-bit LCG.
    pub fn uniform_noise(len: usize, seed: u64) -> Vec<f64> {
        let mut state = seed;
        (0..len)
            .map(|_| {
                state = state
                    .wrapping_mul(6_364_136_223_846_793_005)
                    .wrapping_add(1_442_695_040_888_963_407);
                (state >> 11) as f64 / (1u64 << 53) as f64 - 0.5
            })
            .collect()
    }

    /// `x_t = phi * x_{t-1} + e_t` started at zero.
    pub fn ar1_series(phi: f64, len: usize, seed: u64) -> Vec<f64> {
        uniform_noise(len, seed)
            .into_iter()
            .scan(0.0, |x, e| {
                *x = phi * *x + e;
                Some(*x)
            })
            .collect()
    }
}
