//! Kalman Filter for dynamic hedge ratio estimation.
//!
//! Tracks the regression of leg A on leg B through time, so the strategy can
//! adapt to a drifting cointegration relationship without a fixed lookback
//! window.
//!
//! # Mathematical Model
//!
//! **State equation** (random walk, no dynamics):
//! ```text
//! [alpha, beta][t] = [alpha, beta][t-1] + w,  where w ~ N(0, q * I)
//! ```
//!
//! **Observation equation**:
//! ```text
//! price_a[t] = alpha[t] + beta[t] * price_b[t] + v,  where v ~ N(0, r)
//! ```
//!
//! Where:
//! - `beta[t]` is the hedge ratio we're estimating
//! - `alpha[t]` is the regression intercept
//! - `q` is process noise (how fast the relationship drifts)
//! - `r` is observation noise (measurement uncertainty)
//!
//! Each update emits the innovation `e[t] = price_a - (alpha + beta * price_b)`
//! as the filtered spread, and the innovation variance `S[t]` used downstream
//! for z-score normalization. Both fall out of the update step, so the whole
//! filter is O(1) per observation with a single 2x2 covariance as state.

use crate::data::PriceSeriesPair;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Errors raised at estimator construction. The filter itself never fails
/// once constructed; numeric degeneracy at runtime is recoverable and
/// reported via [`DegeneracyEvent`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InitializationError {
    #[error("process noise q must be positive and finite, got {0}")]
    InvalidProcessNoise(f64),

    #[error("observation noise r must be positive and finite, got {0}")]
    InvalidObservationNoise(f64),

    #[error("initial covariance is not symmetric positive-definite: {0:?}")]
    CovarianceNotPositiveDefinite([[f64; 2]; 2]),

    #[error("degeneracy epsilon must be positive and finite, got {0}")]
    InvalidEpsilon(f64),

    #[error("initial state is not finite: intercept {intercept}, hedge ratio {hedge_ratio}")]
    NonFiniteInitialState { intercept: f64, hedge_ratio: f64 },
}

/// Policy for handling a near-zero innovation variance, which would otherwise
/// make the Kalman gain blow up (e.g. leg B constant to machine precision).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegeneracyPolicy {
    /// Floor the innovation variance at epsilon and run the update anyway.
    FloorEpsilon,
    /// Skip the update for that step and hold the prior estimate.
    HoldPrevious,
}

/// Estimator configuration.
///
/// `process_noise` and `observation_noise` are empirical tuning parameters
/// with no universally correct value, so they carry no defaults: callers
/// must choose them explicitly (e.g. from an offline calibration).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KalmanConfig {
    /// Process noise q, applied as q * I to the state covariance each step.
    /// Higher q = faster adaptation but noisier estimates.
    pub process_noise: f64,
    /// Observation noise r. Higher r = smoother but slower estimates.
    pub observation_noise: f64,
    /// Starting hedge ratio, typically from an offline static regression.
    pub initial_hedge_ratio: f64,
    /// Starting intercept of the regression of A on B.
    #[serde(default)]
    pub initial_intercept: f64,
    /// Initial state covariance, row-major `[[p00, p01], [p10, p11]]`.
    /// A large diagonal expresses high initial uncertainty.
    pub initial_covariance: [[f64; 2]; 2],
    /// What to do when the innovation variance degenerates.
    #[serde(default = "default_degeneracy_policy")]
    pub degeneracy_policy: DegeneracyPolicy,
    /// Threshold below which the innovation variance counts as degenerate.
    #[serde(default = "default_variance_epsilon")]
    pub variance_epsilon: f64,
}

fn default_degeneracy_policy() -> DegeneracyPolicy {
    DegeneracyPolicy::FloorEpsilon
}

fn default_variance_epsilon() -> f64 {
    1e-12
}

/// Per-step estimate, without the timestamp binding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterEstimate {
    /// Posterior hedge ratio beta(t|t).
    pub hedge_ratio: f64,
    /// Innovation e(t): the model's best estimate of the current spread
    /// deviation, already centered by the filtered mean relationship.
    pub filtered_spread: f64,
    /// Innovation variance S(t), after any epsilon floor.
    pub spread_variance: f64,
}

/// One timestamped row of filter output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterPoint {
    pub timestamp: DateTime<Utc>,
    pub hedge_ratio: f64,
    pub filtered_spread: f64,
    pub spread_variance: f64,
}

/// A recoverable numeric degeneracy encountered mid-run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DegeneracyEvent {
    /// Timestep index into the input series.
    pub index: usize,
    /// The raw innovation variance that tripped the guard.
    pub raw_variance: f64,
    /// The policy that was applied.
    pub policy: DegeneracyPolicy,
}

/// Complete filter output for one pass over a pair series.
///
/// Immutable once produced; consumed by the signal generator. One point per
/// input observation, on the same timestamp index.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterOutput {
    pub points: Vec<FilterPoint>,
    pub degeneracies: Vec<DegeneracyEvent>,
}

/// Recursive estimator of the dynamic hedge ratio between two legs.
///
/// Processes observations strictly in timestamp order, one at a time, with
/// no lookahead. O(1) state: the two-element mean and its 2x2 covariance.
#[derive(Debug, Clone)]
pub struct HedgeRatioEstimator {
    intercept: f64,
    beta: f64,
    // Symmetric 2x2 covariance; p01 stores both off-diagonal entries.
    p00: f64,
    p01: f64,
    p11: f64,
    process_noise: f64,
    obs_noise: f64,
    policy: DegeneracyPolicy,
    epsilon: f64,
    step: usize,
    degeneracies: Vec<DegeneracyEvent>,
}

impl HedgeRatioEstimator {
    /// Construct an estimator, validating the configuration.
    ///
    /// Fails fast if q or r are non-positive, the initial covariance is not
    /// symmetric positive-definite, or the initial state is non-finite.
    pub fn new(config: &KalmanConfig) -> Result<Self, InitializationError> {
        if !config.process_noise.is_finite() || config.process_noise <= 0.0 {
            return Err(InitializationError::InvalidProcessNoise(
                config.process_noise,
            ));
        }
        if !config.observation_noise.is_finite() || config.observation_noise <= 0.0 {
            return Err(InitializationError::InvalidObservationNoise(
                config.observation_noise,
            ));
        }
        if !config.variance_epsilon.is_finite() || config.variance_epsilon <= 0.0 {
            return Err(InitializationError::InvalidEpsilon(config.variance_epsilon));
        }
        if !config.initial_intercept.is_finite() || !config.initial_hedge_ratio.is_finite() {
            return Err(InitializationError::NonFiniteInitialState {
                intercept: config.initial_intercept,
                hedge_ratio: config.initial_hedge_ratio,
            });
        }

        let p = config.initial_covariance;
        // Symmetric PD check for a 2x2: symmetric, positive diagonal,
        // positive determinant (Sylvester's criterion).
        let symmetric = (p[0][1] - p[1][0]).abs() <= 1e-12 * (1.0 + p[0][1].abs());
        let determinant = p[0][0] * p[1][1] - p[0][1] * p[1][0];
        let finite = p.iter().flatten().all(|v| v.is_finite());
        if !finite || !symmetric || p[0][0] <= 0.0 || determinant <= 0.0 {
            return Err(InitializationError::CovarianceNotPositiveDefinite(p));
        }

        Ok(Self {
            intercept: config.initial_intercept,
            beta: config.initial_hedge_ratio,
            p00: p[0][0],
            p01: p[0][1],
            p11: p[1][1],
            process_noise: config.process_noise,
            obs_noise: config.observation_noise,
            policy: config.degeneracy_policy,
            epsilon: config.variance_epsilon,
            step: 0,
            degeneracies: Vec::new(),
        })
    }

    /// Run one predict-update cycle for a joint observation.
    ///
    /// The observation matrix is `H = [1, price_b]`, regressing A on B.
    pub fn update(&mut self, price_a: f64, price_b: f64) -> FilterEstimate {
        let index = self.step;
        self.step += 1;

        // === PREDICT ===
        // Random-walk transition: the state prediction is the prior mean;
        // only the covariance inflates, by q on each diagonal entry.
        let p00 = self.p00 + self.process_noise;
        let p01 = self.p01;
        let p11 = self.p11 + self.process_noise;

        // === UPDATE ===
        let b = price_b;
        // H * P (row vector), reused for the gain and the covariance update.
        let hp0 = p00 + b * p01;
        let hp1 = p01 + b * p11;
        // Innovation variance: S = H * P * H' + r.
        let raw_variance = hp0 + b * hp1 + self.obs_noise;
        let innovation = price_a - self.intercept - self.beta * b;

        if raw_variance < self.epsilon {
            warn!(
                index,
                raw_variance,
                policy = ?self.policy,
                "Degenerate innovation variance in hedge ratio filter"
            );
            self.degeneracies.push(DegeneracyEvent {
                index,
                raw_variance,
                policy: self.policy,
            });

            if self.policy == DegeneracyPolicy::HoldPrevious {
                // Hold the prior estimate; the inflated covariance is kept so
                // uncertainty still grows while updates are skipped.
                self.p00 = p00;
                self.p01 = p01;
                self.p11 = p11;
                return FilterEstimate {
                    hedge_ratio: self.beta,
                    filtered_spread: innovation,
                    spread_variance: self.epsilon,
                };
            }
        }

        let variance = raw_variance.max(self.epsilon);

        // Kalman gain: K = P * H' / S.
        let k0 = hp0 / variance;
        let k1 = hp1 / variance;

        self.intercept += k0 * innovation;
        self.beta += k1 * innovation;

        // Covariance update: P = (I - K * H) * P = P - K * (H * P).
        // Written against H*P this stays symmetric by construction.
        self.p00 = p00 - k0 * hp0;
        self.p01 = p01 - k0 * hp1;
        self.p11 = p11 - k1 * hp1;

        FilterEstimate {
            hedge_ratio: self.beta,
            filtered_spread: innovation,
            spread_variance: variance,
        }
    }

    /// Run the filter over a whole validated pair series.
    pub fn run(config: &KalmanConfig, pair: &PriceSeriesPair) -> Result<FilterOutput, InitializationError> {
        let mut estimator = Self::new(config)?;
        let mut points = Vec::with_capacity(pair.len());

        for observation in pair.points() {
            let estimate = estimator.update(observation.price_a, observation.price_b);
            points.push(FilterPoint {
                timestamp: observation.timestamp,
                hedge_ratio: estimate.hedge_ratio,
                filtered_spread: estimate.filtered_spread,
                spread_variance: estimate.spread_variance,
            });
        }

        Ok(FilterOutput {
            points,
            degeneracies: estimator.degeneracies,
        })
    }

    /// Current hedge ratio estimate.
    #[inline]
    pub fn hedge_ratio(&self) -> f64 {
        self.beta
    }

    /// Current intercept estimate.
    #[inline]
    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    /// Current state covariance, row-major.
    #[inline]
    pub fn covariance(&self) -> [[f64; 2]; 2] {
        [[self.p00, self.p01], [self.p01, self.p11]]
    }

    /// Degeneracy events recorded so far.
    pub fn degeneracies(&self) -> &[DegeneracyEvent] {
        &self.degeneracies
    }
}
