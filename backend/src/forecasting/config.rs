//! Forecasting configuration.
//!
//! Settings are read from the `[forecasting]` table of `forecasting.toml`
//! and may be overridden with environment variables:
//!
//! - `FORECAST_HORIZONS`: comma-separated horizons in hours (e.g. `1,4,8`)
//! - `FORECAST_MIN_HISTORY`: minimum observations per facility
//! - `FORECAST_MODEL`: `arima:p,d,q`, `auto:max_p,max_d,max_q`, `ses`,
//!   `ses:ANN` or `naive`
//! - `FORECAST_WORKERS`: number of concurrent model fits
//! - `FORECAST_FIT_ON`: `observations` or `training_rows`
//! - `FORECAST_INTERVAL_SECS`: scheduler period

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::algorithms::ModelSpec;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value {value:?} for {key}")]
    InvalidEnv { key: String, value: String },

    #[error("invalid forecasting configuration: {0}")]
    Invalid(String),
}

/// Which per-facility sequence the model is fitted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitSeries {
    /// Every observed snapshot's pressure score.
    #[default]
    Observations,
    /// Only rows with full lag history and a future target.
    TrainingRows,
}

impl FromStr for FitSeries {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "observations" | "features" => Ok(Self::Observations),
            "training_rows" | "training" | "dataset" => Ok(Self::TrainingRows),
            other => Err(format!("Unknown fit series: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    /// Horizons to forecast, in hours. One batch per horizon.
    pub horizons: Vec<u32>,
    /// Facilities with fewer rows are skipped.
    pub min_history: usize,
    pub model: ModelSpec,
    /// Concurrent model fits; defaults to the available parallelism.
    pub workers: Option<usize>,
    pub fit_on: FitSeries,
    pub schedule_interval_secs: u64,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            horizons: vec![1],
            min_history: 10,
            model: ModelSpec::default(),
            workers: None,
            fit_on: FitSeries::default(),
            schedule_interval_secs: 3600,
        }
    }
}

#[derive(Deserialize)]
struct ForecastingFile {
    #[serde(default)]
    forecasting: ForecastConfig,
}

impl ForecastConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let file: ForecastingFile = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(file.forecasting)
    }

    /// Look for `forecasting.toml` in the current, `backend/` and parent
    /// directories.
    pub fn from_default_location() -> Result<Option<Self>, ConfigError> {
        let search_paths = [
            PathBuf::from("forecasting.toml"),
            PathBuf::from("backend/forecasting.toml"),
            PathBuf::from("../forecasting.toml"),
        ];
        for path in search_paths {
            if path.exists() {
                return Self::from_file(&path).map(Some);
            }
        }
        Ok(None)
    }

    /// Defaults, then the config file if one is found, then `FORECAST_*`
    /// environment overrides. The result is validated.
    pub fn load() -> Result<Self, ConfigError> {
        let base = Self::from_default_location()?.unwrap_or_default();
        let config = base.with_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a key lookup (normally the process environment).
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parsed<T: FromStr>(key: &str, value: String) -> Result<T, ConfigError> {
            value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                key: key.to_string(),
                value,
            })
        }

        if let Some(v) = lookup("FORECAST_HORIZONS") {
            self.horizons = v
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .map(|s| parsed("FORECAST_HORIZONS", s.to_string()))
                .collect::<Result<_, _>>()?;
        }
        if let Some(v) = lookup("FORECAST_MIN_HISTORY") {
            self.min_history = parsed("FORECAST_MIN_HISTORY", v)?;
        }
        if let Some(v) = lookup("FORECAST_MODEL") {
            self.model = parse_model(&v).ok_or(ConfigError::InvalidEnv {
                key: "FORECAST_MODEL".to_string(),
                value: v,
            })?;
        }
        if let Some(v) = lookup("FORECAST_WORKERS") {
            self.workers = Some(parsed("FORECAST_WORKERS", v)?);
        }
        if let Some(v) = lookup("FORECAST_FIT_ON") {
            self.fit_on = parsed("FORECAST_FIT_ON", v)?;
        }
        if let Some(v) = lookup("FORECAST_INTERVAL_SECS") {
            self.schedule_interval_secs = parsed("FORECAST_INTERVAL_SECS", v)?;
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.horizons.is_empty() {
            return Err(ConfigError::Invalid("at least one horizon is required".into()));
        }
        if self.horizons.contains(&0) {
            return Err(ConfigError::Invalid("horizons must be positive".into()));
        }
        if self.min_history == 0 {
            return Err(ConfigError::Invalid("min_history must be positive".into()));
        }
        if self.workers == Some(0) {
            return Err(ConfigError::Invalid("workers must be positive".into()));
        }
        if self.schedule_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "schedule_interval_secs must be positive".into(),
            ));
        }
        self.model
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }

    pub fn schedule_interval(&self) -> Duration {
        Duration::from_secs(self.schedule_interval_secs)
    }
}

/// Parse the compact model notation used by `FORECAST_MODEL`.
fn parse_model(s: &str) -> Option<ModelSpec> {
    let s = s.trim().to_lowercase();
    let (kind, args) = match s.split_once(':') {
        Some((k, a)) => (k, Some(a)),
        None => (s.as_str(), None),
    };
    let triple = |a: &str| -> Option<(usize, usize, usize)> {
        let parts: Vec<usize> = a
            .split(',')
            .map(|x| x.trim().parse().ok())
            .collect::<Option<_>>()?;
        match parts.as_slice() {
            [a, b, c] => Some((*a, *b, *c)),
            _ => None,
        }
    };
    match (kind, args) {
        ("naive", None) => Some(ModelSpec::Naive),
        ("ses", None) => Some(ModelSpec::ExponentialSmoothing { spec: None }),
        ("ses", Some(spec)) => Some(ModelSpec::ExponentialSmoothing {
            spec: Some(spec.trim().to_ascii_uppercase()),
        }),
        ("arima", None) => Some(ModelSpec::default()),
        ("arima", Some(a)) => triple(a).map(|(p, d, q)| ModelSpec::Arima { p, d, q }),
        ("auto", None) => Some(ModelSpec::AutoArima {
            max_p: 2,
            max_d: 1,
            max_q: 2,
        }),
        ("auto", Some(a)) => triple(a).map(|(max_p, max_d, max_q)| ModelSpec::AutoArima {
            max_p,
            max_d,
            max_q,
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ForecastConfig::default();
        assert_eq!(config.horizons, vec![1]);
        assert_eq!(config.min_history, 10);
        assert_eq!(config.model, ModelSpec::Arima { p: 2, d: 1, q: 2 });
        assert_eq!(config.fit_on, FitSeries::Observations);
        assert!(config.validate().is_ok());
        assert!(config.worker_count() >= 1);
    }

    #[test]
    fn test_parse_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[forecasting]
horizons = [1, 4]
min_history = 12
workers = 2
fit_on = "training_rows"

[forecasting.model]
kind = "auto_arima"
max_p = 1
max_d = 1
max_q = 1
"#
        )
        .unwrap();

        let config = ForecastConfig::from_file(file.path()).unwrap();
        assert_eq!(config.horizons, vec![1, 4]);
        assert_eq!(config.min_history, 12);
        assert_eq!(config.worker_count(), 2);
        assert_eq!(config.fit_on, FitSeries::TrainingRows);
        assert_eq!(
            config.model,
            ModelSpec::AutoArima {
                max_p: 1,
                max_d: 1,
                max_q: 1
            }
        );
        // Unspecified keys keep their defaults.
        assert_eq!(config.schedule_interval_secs, 3600);
    }

    #[test]
    fn test_missing_and_malformed_files() {
        assert!(matches!(
            ForecastConfig::from_file("/nonexistent/forecasting.toml"),
            Err(ConfigError::Read { .. })
        ));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[forecasting]\nhorizons = \"soon\"").unwrap();
        assert!(matches!(
            ForecastConfig::from_file(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_env_overrides() {
        let config = ForecastConfig::default()
            .with_overrides(lookup(&[
                ("FORECAST_HORIZONS", "1, 2,8"),
                ("FORECAST_MODEL", "ses:ann"),
                ("FORECAST_FIT_ON", "training_rows"),
                ("FORECAST_INTERVAL_SECS", "60"),
            ]))
            .unwrap();
        assert_eq!(config.horizons, vec![1, 2, 8]);
        assert_eq!(
            config.model,
            ModelSpec::ExponentialSmoothing {
                spec: Some("ANN".into())
            }
        );
        assert_eq!(config.fit_on, FitSeries::TrainingRows);
        assert_eq!(config.schedule_interval(), Duration::from_secs(60));
    }

    #[test]
    fn test_bad_env_value_is_reported() {
        let err = ForecastConfig::default()
            .with_overrides(lookup(&[("FORECAST_MIN_HISTORY", "many")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { ref key, .. } if key == "FORECAST_MIN_HISTORY"));

        let err = ForecastConfig::default()
            .with_overrides(lookup(&[("FORECAST_MODEL", "prophet")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { .. }));
    }

    #[test]
    fn test_validation() {
        let zero_horizon = ForecastConfig {
            horizons: vec![1, 0],
            ..Default::default()
        };
        assert!(zero_horizon.validate().is_err());

        let no_horizon = ForecastConfig {
            horizons: vec![],
            ..Default::default()
        };
        assert!(no_horizon.validate().is_err());

        let zero_workers = ForecastConfig {
            workers: Some(0),
            ..Default::default()
        };
        assert!(zero_workers.validate().is_err());
    }

    #[test]
    fn test_model_notation() {
        assert_eq!(parse_model("naive"), Some(ModelSpec::Naive));
        assert_eq!(
            parse_model("ARIMA:1,1,0"),
            Some(ModelSpec::Arima { p: 1, d: 1, q: 0 })
        );
        assert_eq!(parse_model("arima"), Some(ModelSpec::default()));
        assert_eq!(parse_model("arima:1,1"), None);
        assert_eq!(
            parse_model("ses"),
            Some(ModelSpec::ExponentialSmoothing { spec: None })
        );
    }
}
