//! End-to-end orchestration of one research run.
//!
//! Gate -> Kalman filter -> signals -> backtest -> metrics, as a single
//! deterministic batch pass. Each stage consumes the previous stage's output
//! read-only; nothing here holds state across runs, so the same input and
//! configuration always produce the same equity curve.

use crate::backtest::{self, BacktestError, BacktestRun};
use crate::cointegration::{apply_gate, CointegrationReport, GateFailure};
use crate::config::{ConfigError, PipelineConfig};
use crate::data::{InputError, PriceSeriesPair};
use crate::filter::{HedgeRatioEstimator, InitializationError};
use crate::metrics::{self, PerformanceSummary};
use crate::signal::{self, SignalConfigError};
use thiserror::Error;
use tracing::{info, warn};

/// Anything that can stop a pipeline run.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("cointegration gate failure: {0}")]
    Gate(#[from] GateFailure),

    #[error("estimator initialization failed: {0}")]
    Initialization(#[from] InitializationError),

    #[error(transparent)]
    Signal(#[from] SignalConfigError),

    #[error(transparent)]
    Backtest(#[from] BacktestError),
}

/// Everything a caller needs from one run.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    /// The simulated run: equity curve, holdings ledger, trade count.
    pub run: BacktestRun,
    /// Aggregate performance metrics.
    pub summary: PerformanceSummary,
    /// Final hedge ratio estimate at the end of the series.
    pub final_hedge_ratio: f64,
    /// Number of recoverable numeric degeneracies hit by the filter.
    pub degenerate_steps: usize,
}

/// Run the full pipeline over a validated pair.
pub fn run_pipeline(
    pair: &PriceSeriesPair,
    report: &CointegrationReport,
    config: &PipelineConfig,
) -> Result<PipelineReport, PipelineError> {
    config.validate()?;
    apply_gate(report, config.gate_policy)?;

    let filter_output = HedgeRatioEstimator::run(&config.kalman, pair)?;
    if !filter_output.degeneracies.is_empty() {
        warn!(
            count = filter_output.degeneracies.len(),
            "Filter reported numeric degeneracies during the run"
        );
    }

    let signals = signal::generate_signals(&filter_output, config.signals)?;
    let run = backtest::run(pair, &filter_output, &signals, &config.backtest)?;
    let summary = metrics::analyze(&run);

    let final_hedge_ratio = filter_output
        .points
        .last()
        .map(|point| point.hedge_ratio)
        .unwrap_or(config.kalman.initial_hedge_ratio);

    info!(
        points = pair.len(),
        trades = run.trades,
        sharpe = summary.sharpe_ratio,
        total_return = summary.total_return,
        max_drawdown = summary.max_drawdown,
        "Pipeline run complete"
    );

    Ok(PipelineReport {
        summary,
        final_hedge_ratio,
        degenerate_steps: filter_output.degeneracies.len(),
        run,
    })
}
