//! Last-value baseline.

use super::{ensure_finite, ModelError, ModelResult, PointForecast, TimeSeriesModel};

/// Repeats the last observation. The interval treats the series as a random
/// walk whose step variance is estimated from first differences; a single
/// observation yields a point forecast only.
#[derive(Debug, Clone, Default)]
pub struct NaiveLastValue {
    last: Option<f64>,
    step_variance: Option<f64>,
}

impl NaiveLastValue {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TimeSeriesModel for NaiveLastValue {
    fn name(&self) -> String {
        "naive".to_string()
    }

    fn fit(&mut self, series: &[f64]) -> ModelResult<()> {
        ensure_finite(series)?;
        let Some(&last) = series.last() else {
            return Err(ModelError::InsufficientData {
                model: self.name(),
                required: 1,
                actual: 0,
            });
        };
        self.last = Some(last);
        self.step_variance = (series.len() > 1).then(|| {
            let steps = series.len() - 1;
            series.windows(2).map(|w| (w[1] - w[0]).powi(2)).sum::<f64>() / steps as f64
        });
        Ok(())
    }

    fn forecast(&self, steps: usize) -> ModelResult<Vec<PointForecast>> {
        let last = self.last.ok_or(ModelError::NotFitted)?;
        Ok((1..=steps)
            .map(|h| match self.step_variance {
                Some(v) => PointForecast::with_variance(last, v * h as f64),
                None => PointForecast::point(last),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeats_last_value() {
        let mut model = NaiveLastValue::new();
        model.fit(&[0.1, 0.3, 0.2]).unwrap();
        let out = model.forecast(3).unwrap();
        assert!(out.iter().all(|f| f.mean == 0.2));
        assert!(out[2].upper.unwrap() > out[0].upper.unwrap());
    }

    #[test]
    fn test_single_observation_has_no_interval() {
        let mut model = NaiveLastValue::new();
        model.fit(&[0.4]).unwrap();
        assert_eq!(model.forecast(1).unwrap(), vec![PointForecast::point(0.4)]);
    }

    #[test]
    fn test_empty_series() {
        let mut model = NaiveLastValue::new();
        assert!(matches!(model.fit(&[]), Err(ModelError::InsufficientData { .. })));
    }
}
