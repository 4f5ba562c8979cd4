//! Z-score signal generation over the filtered spread.
//!
//! Converts the filter output into discrete position signals using entry and
//! exit thresholds on the normalized spread:
//!
//! ```text
//! z(t) = filtered_spread(t) / sqrt(spread_variance(t))
//! ```
//!
//! A wide positive z means leg A is rich relative to the hedge, so the
//! strategy shorts the spread; a wide negative z goes long. Positions are
//! always closed through flat: there is no direct long/short flip, which
//! would double-pay transaction costs on an implicit reversal.

use crate::filter::FilterOutput;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Discrete position state of the strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionState {
    /// No exposure.
    Flat,
    /// Long leg A, short beta units of leg B.
    LongSpread,
    /// Short leg A, long beta units of leg B.
    ShortSpread,
}

/// One timestamped signal, aligned to the filter output index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signal {
    pub timestamp: DateTime<Utc>,
    pub state: PositionState,
}

/// Threshold configuration for signal generation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalConfig {
    /// |z| at or beyond which a position is entered.
    #[serde(default = "default_entry_threshold")]
    pub entry_threshold: f64,
    /// |z| at or below which an open position is closed.
    #[serde(default = "default_exit_threshold")]
    pub exit_threshold: f64,
}

fn default_entry_threshold() -> f64 {
    2.0
}

fn default_exit_threshold() -> f64 {
    0.5
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            entry_threshold: default_entry_threshold(),
            exit_threshold: default_exit_threshold(),
        }
    }
}

/// Invalid threshold combinations, caught before any signal is produced.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SignalConfigError {
    #[error("entry threshold must be positive and finite, got {0}")]
    InvalidEntryThreshold(f64),

    #[error("exit threshold must be non-negative and finite, got {0}")]
    InvalidExitThreshold(f64),

    #[error("exit threshold {exit} must be below entry threshold {entry}")]
    ExitNotBelowEntry { entry: f64, exit: f64 },
}

impl SignalConfig {
    pub fn validate(&self) -> Result<(), SignalConfigError> {
        if !self.entry_threshold.is_finite() || self.entry_threshold <= 0.0 {
            return Err(SignalConfigError::InvalidEntryThreshold(
                self.entry_threshold,
            ));
        }
        if !self.exit_threshold.is_finite() || self.exit_threshold < 0.0 {
            return Err(SignalConfigError::InvalidExitThreshold(self.exit_threshold));
        }
        if self.exit_threshold >= self.entry_threshold {
            return Err(SignalConfigError::ExitNotBelowEntry {
                entry: self.entry_threshold,
                exit: self.exit_threshold,
            });
        }
        Ok(())
    }
}

/// The threshold state machine, one z-score at a time.
///
/// Transitions:
/// - Flat -> ShortSpread when z >= entry
/// - Flat -> LongSpread when z <= -entry
/// - ShortSpread -> Flat when z <= exit
/// - LongSpread -> Flat when z >= -exit
///
/// Long and short never connect directly; a reversal takes two steps.
#[derive(Debug, Clone)]
pub struct SignalStateMachine {
    config: SignalConfig,
    state: PositionState,
}

impl SignalStateMachine {
    pub fn new(config: SignalConfig) -> Result<Self, SignalConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            state: PositionState::Flat,
        })
    }

    /// Advance the machine with the next z-score and return the new state.
    pub fn on_zscore(&mut self, z: f64) -> PositionState {
        self.state = match self.state {
            PositionState::Flat => {
                if z >= self.config.entry_threshold {
                    PositionState::ShortSpread
                } else if z <= -self.config.entry_threshold {
                    PositionState::LongSpread
                } else {
                    PositionState::Flat
                }
            }
            PositionState::ShortSpread => {
                if z <= self.config.exit_threshold {
                    PositionState::Flat
                } else {
                    PositionState::ShortSpread
                }
            }
            PositionState::LongSpread => {
                if z >= -self.config.exit_threshold {
                    PositionState::Flat
                } else {
                    PositionState::LongSpread
                }
            }
        };
        self.state
    }

    /// Current position state.
    pub fn state(&self) -> PositionState {
        self.state
    }
}

/// Generate one signal per filter point.
///
/// The first signal is always flat: there is no prior state to compare on
/// the first observation, so no entry is allowed there.
pub fn generate_signals(
    output: &FilterOutput,
    config: SignalConfig,
) -> Result<Vec<Signal>, SignalConfigError> {
    let mut machine = SignalStateMachine::new(config)?;
    let mut signals = Vec::with_capacity(output.points.len());

    for (index, point) in output.points.iter().enumerate() {
        let state = if index == 0 {
            PositionState::Flat
        } else {
            let z = point.filtered_spread / point.spread_variance.sqrt();
            let state = machine.on_zscore(z);
            debug!(index, z, state = ?state, "Signal step");
            state
        };

        signals.push(Signal {
            timestamp: point.timestamp,
            state,
        });
    }

    Ok(signals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterPoint;
    use chrono::TimeZone;

    fn machine(entry: f64, exit: f64) -> SignalStateMachine {
        SignalStateMachine::new(SignalConfig {
            entry_threshold: entry,
            exit_threshold: exit,
        })
        .unwrap()
    }

    #[test]
    fn test_config_defaults_are_valid() {
        assert!(SignalConfig::default().validate().is_ok());
    }

    #[test]
    fn test_exit_above_entry_rejected() {
        let config = SignalConfig {
            entry_threshold: 1.0,
            exit_threshold: 1.5,
        };
        assert!(matches!(
            config.validate(),
            Err(SignalConfigError::ExitNotBelowEntry { .. })
        ));
    }

    #[test]
    fn test_entry_and_exit_short_side() {
        let mut machine = machine(2.0, 0.5);
        assert_eq!(machine.on_zscore(1.9), PositionState::Flat);
        assert_eq!(machine.on_zscore(2.0), PositionState::ShortSpread);
        assert_eq!(machine.on_zscore(1.0), PositionState::ShortSpread);
        assert_eq!(machine.on_zscore(0.5), PositionState::Flat);
    }

    #[test]
    fn test_entry_and_exit_long_side() {
        let mut machine = machine(2.0, 0.5);
        assert_eq!(machine.on_zscore(-2.5), PositionState::LongSpread);
        assert_eq!(machine.on_zscore(-1.0), PositionState::LongSpread);
        assert_eq!(machine.on_zscore(-0.4), PositionState::Flat);
    }

    #[test]
    fn test_no_direct_flip_between_sides() {
        let mut machine = machine(2.0, 0.5);
        assert_eq!(machine.on_zscore(3.0), PositionState::ShortSpread);
        // A violent swing to the other side must pass through flat.
        assert_eq!(machine.on_zscore(-3.0), PositionState::Flat);
        assert_eq!(machine.on_zscore(-3.0), PositionState::LongSpread);
    }

    #[test]
    fn test_first_signal_is_flat() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let output = FilterOutput {
            points: vec![FilterPoint {
                timestamp: ts,
                hedge_ratio: 1.0,
                // z-score of 10, far beyond any entry threshold.
                filtered_spread: 10.0,
                spread_variance: 1.0,
            }],
            degeneracies: vec![],
        };

        let signals = generate_signals(&output, SignalConfig::default()).unwrap();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].state, PositionState::Flat);
    }

    #[test]
    fn test_signals_aligned_to_filter_index() {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let points: Vec<FilterPoint> = (0..5)
            .map(|i| FilterPoint {
                timestamp: base + chrono::Duration::days(i),
                hedge_ratio: 1.0,
                filtered_spread: if i == 2 { 3.0 } else { 0.0 },
                spread_variance: 1.0,
            })
            .collect();
        let output = FilterOutput {
            points,
            degeneracies: vec![],
        };

        let signals = generate_signals(&output, SignalConfig::default()).unwrap();
        assert_eq!(signals.len(), 5);
        assert_eq!(signals[2].state, PositionState::ShortSpread);
        // z back at 0 closes the short at the next step.
        assert_eq!(signals[3].state, PositionState::Flat);
        for (signal, point) in signals.iter().zip(output.points.iter()) {
            assert_eq!(signal.timestamp, point.timestamp);
        }
    }
}
