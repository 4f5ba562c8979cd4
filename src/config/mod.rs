//! Pipeline configuration.
//!
//! One explicit structure passed into each component at construction,
//! instead of ambient process-wide settings. This keeps parallel backtests
//! with different parameters trivially possible and makes every tunable an
//! input: the Kalman noise levels and the sizing rule in particular carry
//! no baked-in defaults, since they are empirical tuning choices.

use crate::backtest::{BacktestConfig, BacktestConfigError};
use crate::cointegration::GatePolicy;
use crate::filter::KalmanConfig;
use crate::signal::{SignalConfig, SignalConfigError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors while loading or validating a pipeline configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error reading config: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Signal(#[from] SignalConfigError),

    #[error(transparent)]
    Backtest(#[from] BacktestConfigError),
}

/// Full configuration for one pipeline run, loaded from a JSON file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Hedge-ratio estimator parameters. `process_noise` and
    /// `observation_noise` are required fields.
    pub kalman: KalmanConfig,
    /// Z-score thresholds.
    #[serde(default)]
    pub signals: SignalConfig,
    /// Costs, capital, and sizing.
    pub backtest: BacktestConfig,
    /// Behavior when the cointegration verdict is negative.
    #[serde(default)]
    pub gate_policy: GatePolicy,
}

impl PipelineConfig {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the signal and backtest sections. The Kalman section is
    /// validated separately at estimator construction, where an invalid
    /// covariance surfaces as an `InitializationError`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.signals.validate()?;
        self.backtest.validate()?;
        Ok(())
    }
}
