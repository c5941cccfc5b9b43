//! Order selection for ARIMA by information criterion.

use super::arima::{Arima, ArimaOrder};
use super::{ensure_finite, ModelError, ModelResult, PointForecast, TimeSeriesModel};

/// Fits every ARIMA order within the configured bounds and keeps the one
/// with the lowest AIC. Orders the series is too short for are skipped.
#[derive(Debug, Clone)]
pub struct AutoArima {
    max_p: usize,
    max_d: usize,
    max_q: usize,
    selected: Option<Arima>,
}

impl AutoArima {
    pub fn new(max_p: usize, max_d: usize, max_q: usize) -> Self {
        Self {
            max_p,
            max_d,
            max_q,
            selected: None,
        }
    }

    pub fn selected_order(&self) -> Option<ArimaOrder> {
        self.selected.as_ref().map(Arima::order)
    }

    fn candidates(&self) -> impl Iterator<Item = ArimaOrder> + '_ {
        (0..=self.max_d).flat_map(move |d| {
            (0..=self.max_p)
                .flat_map(move |p| (0..=self.max_q).map(move |q| ArimaOrder::new(p, d, q)))
        })
    }
}

impl TimeSeriesModel for AutoArima {
    fn name(&self) -> String {
        match self.selected_order() {
            Some(order) => format!("auto {}", order),
            None => "auto ARIMA".to_string(),
        }
    }

    fn fit(&mut self, series: &[f64]) -> ModelResult<()> {
        ensure_finite(series)?;
        self.selected = None;

        let mut best: Option<(f64, Arima)> = None;
        let mut smallest_requirement = usize::MAX;
        let mut last_error = None;

        for order in self.candidates() {
            let required = order.min_observations();
            smallest_requirement = smallest_requirement.min(required);
            if series.len() < required {
                continue;
            }
            let mut model = Arima::new(order);
            if let Err(e) = model.fit(series) {
                log::debug!("skipping {}: {}", order, e);
                last_error = Some(e);
                continue;
            }
            let Some(aic) = model.aic() else { continue };
            if best.as_ref().map_or(true, |(best_aic, _)| aic < *best_aic) {
                best = Some((aic, model));
            }
        }

        match best {
            Some((aic, model)) => {
                log::debug!("selected {} (aic = {:.3})", model.order(), aic);
                self.selected = Some(model);
                Ok(())
            }
            None => Err(last_error.unwrap_or(ModelError::InsufficientData {
                model: self.name(),
                required: smallest_requirement,
                actual: series.len(),
            })),
        }
    }

    fn forecast(&self, steps: usize) -> ModelResult<Vec<PointForecast>> {
        self.selected
            .as_ref()
            .ok_or(ModelError::NotFitted)?
            .forecast(steps)
    }
}
