//! ARIMA(p, d, q) fitted by conditional sum of squares.
//!
//! The series is differenced `d` times, demeaned when `d == 0`, and the ARMA
//! coefficients minimizing the conditional residual sum of squares are found
//! with Nelder–Mead. The search starts from a Hannan–Rissanen estimate when
//! the series is long enough and from zeros otherwise. Coefficients outside
//! the stationary/invertible region score `+inf`, so the optimizer never
//! returns an explosive model.
//!
//! Forecasts are produced recursively and integrated back to the original
//! scale. Prediction intervals use the psi-weights of the integrated model.

use std::fmt;

use nalgebra::{DMatrix, DVector};

use super::optimize::NelderMead;
use super::{ensure_finite, ModelError, ModelResult, PointForecast, TimeSeriesModel};

/// Model order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArimaOrder {
    pub p: usize,
    pub d: usize,
    pub q: usize,
}

impl ArimaOrder {
    pub const fn new(p: usize, d: usize, q: usize) -> Self {
        Self { p, d, q }
    }

    /// Shortest series the order can be fitted on: after differencing and
    /// conditioning on `p` values, at least one residual per parameter must
    /// remain.
    pub fn min_observations(&self) -> usize {
        self.d + self.p + self.parameter_count()
    }

    /// ARMA coefficients plus the innovation variance, plus the mean when
    /// the series is not differenced.
    pub fn parameter_count(&self) -> usize {
        self.p + self.q + 1 + usize::from(self.d == 0)
    }
}

impl fmt::Display for ArimaOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ARIMA({},{},{})", self.p, self.d, self.q)
    }
}

#[derive(Debug, Clone)]
struct FittedState {
    ar: Vec<f64>,
    ma: Vec<f64>,
    mean: f64,
    sigma2: f64,
    effective_len: usize,
    /// `levels[k]` is the series differenced `k` times.
    levels: Vec<Vec<f64>>,
    /// Demeaned working series (the last level minus `mean`).
    working: Vec<f64>,
    residuals: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct Arima {
    order: ArimaOrder,
    optimizer: NelderMead,
    state: Option<FittedState>,
}

impl Arima {
    pub fn new(order: ArimaOrder) -> Self {
        Self {
            order,
            optimizer: NelderMead::default(),
            state: None,
        }
    }

    pub fn with_optimizer(mut self, optimizer: NelderMead) -> Self {
        self.optimizer = optimizer;
        self
    }

    pub fn order(&self) -> ArimaOrder {
        self.order
    }

    pub fn ar_coefficients(&self) -> Option<&[f64]> {
        self.state.as_ref().map(|s| s.ar.as_slice())
    }

    pub fn ma_coefficients(&self) -> Option<&[f64]> {
        self.state.as_ref().map(|s| s.ma.as_slice())
    }

    /// Estimated innovation variance.
    pub fn sigma2(&self) -> Option<f64> {
        self.state.as_ref().map(|s| s.sigma2)
    }

    /// Akaike information criterion of the conditional fit.
    pub fn aic(&self) -> Option<f64> {
        self.state.as_ref().map(|s| {
            let n = s.effective_len as f64;
            n * s.sigma2.max(1e-12).ln() + 2.0 * self.order.parameter_count() as f64
        })
    }
}

impl TimeSeriesModel for Arima {
    fn name(&self) -> String {
        self.order.to_string()
    }

    fn fit(&mut self, series: &[f64]) -> ModelResult<()> {
        ensure_finite(series)?;
        let ArimaOrder { p, d, q } = self.order;

        let required = self.order.min_observations();
        if series.len() < required {
            return Err(ModelError::InsufficientData {
                model: self.name(),
                required,
                actual: series.len(),
            });
        }

        let mut levels = vec![series.to_vec()];
        for k in 0..d {
            let next = difference(&levels[k]);
            levels.push(next);
        }
        let last_level = &levels[d];
        let mean = if d == 0 {
            last_level.iter().sum::<f64>() / last_level.len() as f64
        } else {
            0.0
        };
        let working: Vec<f64> = last_level.iter().map(|v| v - mean).collect();

        let objective = |params: &[f64]| {
            let (ar, ma) = params.split_at(p);
            if !is_stationary(ar) || !is_invertible(ma) {
                return f64::INFINITY;
            }
            conditional_sum_of_squares(&working, ar, ma)
        };

        let zeros = vec![0.0; p + q];
        let start = match hannan_rissanen(&working, p, q) {
            Some(estimate) if objective(estimate.as_slice()) <= objective(zeros.as_slice()) => {
                estimate
            }
            _ => zeros,
        };

        let minimum = self.optimizer.minimize(&objective, &start);
        if !minimum.value.is_finite() {
            return Err(ModelError::FitFailed {
                model: self.name(),
                reason: "no stationary and invertible parameters found".to_string(),
            });
        }
        if !minimum.converged {
            log::debug!(
                "{} stopped after {} iterations without converging (css = {:.6})",
                self.name(),
                minimum.iterations,
                minimum.value
            );
        }

        let (ar, ma) = minimum.point.split_at(p);
        let residuals = css_residuals(&working, ar, ma);
        let effective_len = working.len() - p;

        self.state = Some(FittedState {
            ar: ar.to_vec(),
            ma: ma.to_vec(),
            mean,
            sigma2: minimum.value / effective_len as f64,
            effective_len,
            levels,
            working,
            residuals,
        });
        Ok(())
    }

    fn forecast(&self, steps: usize) -> ModelResult<Vec<PointForecast>> {
        let state = self.state.as_ref().ok_or(ModelError::NotFitted)?;
        let d = self.order.d;

        let mut w = state.working.clone();
        let mut e = state.residuals.clone();
        let mut tails: Vec<f64> = state.levels[..d]
            .iter()
            .map(|level| level.last().copied().unwrap_or(0.0))
            .collect();
        let psi = psi_weights(&state.ar, &state.ma, d, steps);

        let mut out = Vec::with_capacity(steps);
        let mut cumulative = 0.0;
        for weight in &psi {
            let t = w.len();
            let mut next = 0.0;
            for (i, phi) in state.ar.iter().enumerate() {
                if let Some(idx) = t.checked_sub(i + 1) {
                    next += phi * w[idx];
                }
            }
            for (j, theta) in state.ma.iter().enumerate() {
                if let Some(idx) = t.checked_sub(j + 1) {
                    next += theta * e[idx];
                }
            }
            w.push(next);
            e.push(0.0);

            let mut value = next + state.mean;
            for k in (0..d).rev() {
                value += tails[k];
                tails[k] = value;
            }

            cumulative += weight * weight;
            out.push(PointForecast::with_variance(value, state.sigma2 * cumulative));
        }
        Ok(out)
    }
}

/// First difference of a series.
pub fn difference(series: &[f64]) -> Vec<f64> {
    series.windows(2).map(|w| w[1] - w[0]).collect()
}

/// Residuals of an ARMA model conditioned on the first `p` observations
/// and on zero pre-sample innovations.
fn css_residuals(w: &[f64], ar: &[f64], ma: &[f64]) -> Vec<f64> {
    let p = ar.len();
    let mut e = vec![0.0; w.len()];
    for t in p..w.len() {
        let mut fitted = 0.0;
        for (i, phi) in ar.iter().enumerate() {
            fitted += phi * w[t - 1 - i];
        }
        for (j, theta) in ma.iter().enumerate() {
            if t > j {
                fitted += theta * e[t - 1 - j];
            }
        }
        e[t] = w[t] - fitted;
    }
    e
}

fn conditional_sum_of_squares(w: &[f64], ar: &[f64], ma: &[f64]) -> f64 {
    css_residuals(w, ar, ma)[ar.len()..]
        .iter()
        .map(|e| e * e)
        .sum()
}

/// True when `1 - a1 z - ... - ap z^p` has all roots outside the unit circle.
///
/// Runs the Levinson–Durbin recursion backwards; the polynomial is stable
/// exactly when every implied partial autocorrelation lies in (-1, 1).
pub fn is_stationary(coefficients: &[f64]) -> bool {
    let mut a = coefficients.to_vec();
    while let Some(&r) = a.last() {
        if !r.is_finite() || r.abs() >= 1.0 {
            return false;
        }
        let m = a.len();
        let denom = 1.0 - r * r;
        a = (0..m - 1).map(|j| (a[j] + r * a[m - 2 - j]) / denom).collect();
    }
    true
}

/// True when `1 + b1 z + ... + bq z^q` has all roots outside the unit circle.
pub fn is_invertible(coefficients: &[f64]) -> bool {
    let negated: Vec<f64> = coefficients.iter().map(|b| -b).collect();
    is_stationary(&negated)
}

/// MA(inf) weights of ARIMA(p, d, q), `count` of them starting at psi_0 = 1.
fn psi_weights(ar: &[f64], ma: &[f64], d: usize, count: usize) -> Vec<f64> {
    // (1 - sum phi_i B^i)(1 - B)^d
    let mut poly = Vec::with_capacity(ar.len() + d + 1);
    poly.push(1.0);
    poly.extend(ar.iter().map(|a| -a));
    for _ in 0..d {
        let mut next = vec![0.0; poly.len() + 1];
        for (i, c) in poly.iter().enumerate() {
            next[i] += c;
            next[i + 1] -= c;
        }
        poly = next;
    }
    let phi: Vec<f64> = poly[1..].iter().map(|c| -c).collect();

    let mut psi = vec![0.0; count];
    for j in 0..count {
        if j == 0 {
            psi[0] = 1.0;
            continue;
        }
        let mut value = ma.get(j - 1).copied().unwrap_or(0.0);
        for i in 1..=phi.len().min(j) {
            value += phi[i - 1] * psi[j - i];
        }
        psi[j] = value;
    }
    psi
}

/// Two-stage regression estimate of ARMA coefficients, `[ar.., ma..]`.
///
/// A long autoregression supplies innovation estimates, then the series is
/// regressed on its own lags and the lagged innovations. Returns `None` when
/// the series is too short or the regression is singular.
fn hannan_rissanen(w: &[f64], p: usize, q: usize) -> Option<Vec<f64>> {
    if p + q == 0 {
        return Some(Vec::new());
    }
    let n = w.len();

    if q == 0 {
        if n < 2 * p + 1 {
            return None;
        }
        let rows: Vec<Vec<f64>> = (p..n).map(|t| (1..=p).map(|i| w[t - i]).collect()).collect();
        return least_squares(&rows, &w[p..]);
    }

    let long_order = p + q + 2;
    let start = long_order + q;
    if n < start + 2 * (p + q) + 1 {
        return None;
    }

    let long_rows: Vec<Vec<f64>> = (long_order..n)
        .map(|t| (1..=long_order).map(|i| w[t - i]).collect())
        .collect();
    let long_ar = least_squares(&long_rows, &w[long_order..])?;

    let mut innovations = vec![0.0; n];
    for t in long_order..n {
        let fitted: f64 = long_ar.iter().enumerate().map(|(i, a)| a * w[t - 1 - i]).sum();
        innovations[t] = w[t] - fitted;
    }

    let rows: Vec<Vec<f64>> = (start..n)
        .map(|t| {
            (1..=p)
                .map(|i| w[t - i])
                .chain((1..=q).map(|j| innovations[t - j]))
                .collect()
        })
        .collect();
    least_squares(&rows, &w[start..])
}

/// Ordinary least squares through the Cholesky factor of `XᵀX`.
///
/// `None` when `XᵀX` is not positive definite.
fn least_squares(rows: &[Vec<f64>], y: &[f64]) -> Option<Vec<f64>> {
    let k = rows.first()?.len();
    let x = DMatrix::from_fn(rows.len(), k, |i, j| rows[i][j]);
    let y = DVector::from_column_slice(&y[..rows.len()]);
    let xt = x.transpose();
    let beta = (&xt * &x).cholesky()?.solve(&(&xt * y));
    beta.iter()
        .all(|v| v.is_finite())
        .then(|| beta.iter().copied().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::test_support::{ar1_series, uniform_noise};

    #[test]
    fn test_name_and_min_observations() {
        let model = Arima::new(ArimaOrder::new(2, 1, 2));
        assert_eq!(model.name(), "ARIMA(2,1,2)");
        assert_eq!(ArimaOrder::new(2, 1, 2).min_observations(), 8);
        assert_eq!(ArimaOrder::new(0, 1, 0).min_observations(), 2);
    }

    #[test]
    fn test_rejects_short_series() {
        let mut model = Arima::new(ArimaOrder::new(2, 1, 2));
        let err = model.fit(&[0.1; 7]).unwrap_err();
        assert_eq!(
            err,
            ModelError::InsufficientData {
                model: "ARIMA(2,1,2)".into(),
                required: 8,
                actual: 7
            }
        );
    }

    #[test]
    fn test_rejects_non_finite_values() {
        let mut series = vec![0.2; 20];
        series[4] = f64::NAN;
        let err = Arima::new(ArimaOrder::new(1, 1, 1)).fit(&series).unwrap_err();
        assert_eq!(err, ModelError::NonFiniteInput { position: 4 });
    }

    #[test]
    fn test_forecast_requires_fit() {
        let model = Arima::new(ArimaOrder::new(1, 0, 0));
        assert_eq!(model.forecast(3).unwrap_err(), ModelError::NotFitted);
    }

    #[test]
    fn test_recovers_ar1_coefficient() {
        let series = ar1_series(0.6, 1_000, 7);
        let mut model = Arima::new(ArimaOrder::new(1, 0, 0));
        model.fit(&series).unwrap();
        let phi = model.ar_coefficients().unwrap()[0];
        assert!((phi - 0.6).abs() < 0.1, "phi = {}", phi);
        // Uniform(-0.5, 0.5) innovations have variance 1/12.
        let sigma2 = model.sigma2().unwrap();
        assert!((sigma2 - 1.0 / 12.0).abs() < 0.02, "sigma2 = {}", sigma2);
    }

    #[test]
    fn test_constant_series_forecasts_constant() {
        let mut model = Arima::new(ArimaOrder::new(2, 1, 2));
        model.fit(&[0.42; 12]).unwrap();
        for step in model.forecast(4).unwrap() {
            assert!((step.mean - 0.42).abs() < 1e-9);
            assert!((step.upper.unwrap() - step.lower.unwrap()).abs() < 1e-6);
        }
    }

    #[test]
    fn test_linear_trend_keeps_rising() {
        let series: Vec<f64> = (0..20).map(|t| 0.1 + 0.02 * t as f64).collect();
        let last = *series.last().unwrap();
        let mut model = Arima::new(ArimaOrder::new(2, 1, 2));
        model.fit(&series).unwrap();
        let next = model.forecast(1).unwrap()[0].mean;
        assert!(next > last, "next = {}, last = {}", next, last);
        assert!(next < last + 0.05, "next = {}, last = {}", next, last);
    }

    #[test]
    fn test_intervals_widen_with_horizon() {
        let noise = uniform_noise(60, 3);
        let series: Vec<f64> = noise
            .iter()
            .scan(0.5, |level, e| {
                *level += 0.05 * e;
                Some(*level)
            })
            .collect();
        let mut model = Arima::new(ArimaOrder::new(1, 1, 0));
        model.fit(&series).unwrap();
        let steps = model.forecast(6).unwrap();
        let widths: Vec<f64> = steps.iter().map(|s| s.upper.unwrap() - s.lower.unwrap()).collect();
        for pair in widths.windows(2) {
            assert!(pair[1] >= pair[0] - 1e-12);
        }
        for s in &steps {
            assert!(s.lower.unwrap() <= s.mean && s.mean <= s.upper.unwrap());
        }
    }

    #[test]
    fn test_stationarity_check() {
        assert!(is_stationary(&[]));
        assert!(is_stationary(&[0.5]));
        assert!(!is_stationary(&[1.0]));
        assert!(is_stationary(&[0.5, 0.3]));
        // phi1 + phi2 > 1
        assert!(!is_stationary(&[1.2, -0.1]));
        // phi2 - phi1 > 1
        assert!(!is_stationary(&[-0.5, 0.6]));
        assert!(is_invertible(&[0.4, 0.2]));
        assert!(!is_invertible(&[-1.5]));
    }

    #[test]
    fn test_psi_weights_random_walk() {
        // ARIMA(0,1,0): every psi weight is 1.
        assert_eq!(psi_weights(&[], &[], 1, 4), vec![1.0; 4]);
        // AR(1): psi_j = phi^j
        let psi = psi_weights(&[0.5], &[], 0, 4);
        assert_eq!(psi, vec![1.0, 0.5, 0.25, 0.125]);
    }

    #[test]
    fn test_least_squares_recovers_exact_coefficients() {
        let rows: Vec<Vec<f64>> = (0..6).map(|t| vec![t as f64, (t * t) as f64 % 5.0]).collect();
        let y: Vec<f64> = rows.iter().map(|r| 2.0 * r[0] - 0.5 * r[1]).collect();
        let beta = least_squares(&rows, &y).unwrap();
        assert!((beta[0] - 2.0).abs() < 1e-9);
        assert!((beta[1] + 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_least_squares_rejects_collinear_columns() {
        let rows = vec![vec![0.0, 0.0]; 5];
        assert_eq!(least_squares(&rows, &[1.0; 5]), None);
    }

    #[test]
    fn test_difference() {
        assert_eq!(difference(&[1.0, 3.0, 6.0]), vec![2.0, 3.0]);
        assert!(difference(&[1.0]).is_empty());
    }
}
