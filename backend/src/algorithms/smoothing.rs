//! Exponential smoothing (ETS) through `augurs`.
//!
//! Without a spec string the model is chosen by `AutoETS` over the
//! non-seasonal family (`ZZN`). A spec such as `ANN` pins the error, trend
//! and season components.

use augurs::ets::{AutoETS, FittedAutoETS};
use augurs::prelude::*;

use super::{ensure_finite, ModelError, ModelResult, PointForecast, TimeSeriesModel};

const MIN_OBSERVATIONS: usize = 4;
const INTERVAL_LEVEL: f64 = 0.95;
const AUTO_SPEC: &str = "ZZN";

pub struct ExponentialSmoothing {
    spec: Option<String>,
    fitted: Option<FittedAutoETS>,
}

impl std::fmt::Debug for ExponentialSmoothing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExponentialSmoothing")
            .field("spec", &self.spec)
            .field("fitted", &self.fitted.is_some())
            .finish()
    }
}

impl ExponentialSmoothing {
    /// `spec` is parsed when the model is fitted.
    pub fn new(spec: Option<String>) -> Self {
        Self { spec, fitted: None }
    }

    /// Automatic selection over the non-seasonal ETS family.
    pub fn auto() -> Self {
        Self::new(None)
    }

    /// Fixed ETS components, e.g. `ANN` for simple exponential smoothing.
    pub fn with_spec(spec: impl Into<String>) -> ModelResult<Self> {
        let spec = spec.into();
        Self::check_spec(&spec)?;
        Ok(Self::new(Some(spec)))
    }

    /// Reject spec strings `AutoETS` cannot parse.
    pub fn check_spec(spec: &str) -> ModelResult<()> {
        AutoETS::new(1, spec)
            .map(|_| ())
            .map_err(|e| ModelError::InvalidConfiguration(format!("ETS spec '{}': {}", spec, e)))
    }

    fn estimator(&self) -> ModelResult<AutoETS> {
        match &self.spec {
            Some(spec) => AutoETS::new(1, spec.as_str()).map_err(|e| {
                ModelError::InvalidConfiguration(format!("ETS spec '{}': {}", spec, e))
            }),
            None => Ok(AutoETS::non_seasonal()),
        }
    }
}

impl TimeSeriesModel for ExponentialSmoothing {
    fn name(&self) -> String {
        format!("ETS({})", self.spec.as_deref().unwrap_or(AUTO_SPEC))
    }

    fn fit(&mut self, series: &[f64]) -> ModelResult<()> {
        ensure_finite(series)?;
        if series.len() < MIN_OBSERVATIONS {
            return Err(ModelError::InsufficientData {
                model: self.name(),
                required: MIN_OBSERVATIONS,
                actual: series.len(),
            });
        }

        let estimator = self.estimator()?;
        let fitted = estimator.fit(series).map_err(|e| ModelError::FitFailed {
            model: self.name(),
            reason: e.to_string(),
        })?;
        self.fitted = Some(fitted);
        Ok(())
    }

    fn forecast(&self, steps: usize) -> ModelResult<Vec<PointForecast>> {
        let fitted = self.fitted.as_ref().ok_or(ModelError::NotFitted)?;
        let forecast = fitted
            .predict(steps, INTERVAL_LEVEL)
            .map_err(|e| ModelError::FitFailed {
                model: self.name(),
                reason: format!("predict: {}", e),
            })?;

        Ok(match forecast.intervals {
            Some(intervals) => forecast
                .point
                .iter()
                .zip(intervals.lower.iter().zip(&intervals.upper))
                .map(|(&mean, (&lower, &upper))| PointForecast {
                    mean,
                    lower: Some(lower),
                    upper: Some(upper),
                })
                .collect(),
            None => forecast.point.into_iter().map(PointForecast::point).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::test_support::uniform_noise;

    fn noisy_level(len: usize) -> Vec<f64> {
        uniform_noise(len, 11)
            .into_iter()
            .map(|e| 0.6 + 0.05 * e)
            .collect()
    }

    #[test]
    fn test_simple_smoothing_forecast_is_flat() {
        let mut ses = ExponentialSmoothing::with_spec("ANN").unwrap();
        ses.fit(&noisy_level(40)).unwrap();
        assert_eq!(ses.name(), "ETS(ANN)");

        let steps = ses.forecast(3).unwrap();
        assert_eq!(steps.len(), 3);
        for step in &steps {
            assert!((step.mean - steps[0].mean).abs() < 1e-9);
            assert!((step.mean - 0.6).abs() < 0.05, "mean = {}", step.mean);
        }
    }

    #[test]
    fn test_auto_selection_brackets_the_point_forecast() {
        let mut ets = ExponentialSmoothing::auto();
        ets.fit(&noisy_level(30)).unwrap();
        for step in ets.forecast(4).unwrap() {
            assert!(step.mean.is_finite());
            let (lower, upper) = (step.lower.unwrap(), step.upper.unwrap());
            assert!(lower <= step.mean && step.mean <= upper);
        }
    }

    #[test]
    fn test_errors() {
        let mut ets = ExponentialSmoothing::auto();
        assert!(matches!(ets.fit(&[0.1, 0.2]), Err(ModelError::InsufficientData { .. })));
        assert!(matches!(ets.forecast(1), Err(ModelError::NotFitted)));
        assert!(matches!(
            ets.fit(&[0.1, f64::INFINITY, 0.2, 0.3]),
            Err(ModelError::NonFiniteInput { position: 1 })
        ));
        assert!(matches!(
            ExponentialSmoothing::with_spec("QQQ"),
            Err(ModelError::InvalidConfiguration(_))
        ));
    }
}
