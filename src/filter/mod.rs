//! State-space estimation for dynamic hedge ratios.

pub mod kalman;

pub use kalman::{
    DegeneracyEvent, DegeneracyPolicy, FilterEstimate, FilterOutput, FilterPoint,
    HedgeRatioEstimator, InitializationError, KalmanConfig,
};
