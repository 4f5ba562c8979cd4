//! PairLab: a research pipeline for pairs-trading statistical arbitrage.
//!
//! The pipeline runs as a single-threaded batch over one historical pair of
//! price series:
//!
//! ```text
//! PriceSeriesPair -> cointegration gate -> HedgeRatioEstimator (Kalman)
//!                 -> SignalGenerator -> Backtester -> MetricsReporter
//! ```
//!
//! Each stage owns its output sequence and hands it, read-only, to the next.
//! All sequences share the timestamp index established once at ingestion.

pub mod backtest;
pub mod cointegration;
pub mod config;
pub mod data;
pub mod filter;
pub mod metrics;
pub mod pipeline;
pub mod signal;
