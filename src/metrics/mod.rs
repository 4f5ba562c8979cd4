//! Performance metrics over an equity curve.
//!
//! Pure aggregation: Sharpe, Sortino, total return, and max drawdown from
//! the simulated portfolio values. Degenerate inputs (fewer than two points,
//! zero return variance) report zeros rather than NaN so downstream
//! consumers never have to special-case them.

use crate::backtest::{equity_values, BacktestRun};
use serde::Serialize;

/// Trading days per year for annualization.
const ANNUALIZATION_FACTOR: f64 = 252.0;

/// Read-only summary handed back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PerformanceSummary {
    /// Annualized Sharpe ratio of simple per-step returns.
    pub sharpe_ratio: f64,
    /// Annualized Sortino ratio (downside deviation in the denominator).
    pub sortino_ratio: f64,
    /// Total return over the run: last / first - 1.
    pub total_return: f64,
    /// Maximum fractional peak-to-trough decline.
    pub max_drawdown: f64,
}

/// Compute the summary for one backtest run.
pub fn analyze(run: &BacktestRun) -> PerformanceSummary {
    analyze_values(&equity_values(run))
}

/// Compute the summary from raw portfolio values.
pub fn analyze_values(values: &[f64]) -> PerformanceSummary {
    if values.len() < 2 || values[0] == 0.0 {
        return PerformanceSummary {
            sharpe_ratio: 0.0,
            sortino_ratio: 0.0,
            total_return: 0.0,
            max_drawdown: max_drawdown(values),
        };
    }

    let returns: Vec<f64> = values
        .windows(2)
        .filter(|w| w[0] != 0.0)
        .map(|w| w[1] / w[0] - 1.0)
        .collect();

    let total_return = values[values.len() - 1] / values[0] - 1.0;

    PerformanceSummary {
        sharpe_ratio: annualized_ratio(&returns, |_| true),
        sortino_ratio: annualized_ratio(&returns, |r| r < 0.0),
        total_return,
        max_drawdown: max_drawdown(values),
    }
}

/// Mean return over the deviation of the subset selected by `downside`,
/// annualized by sqrt(252). Sample variance (n-1 denominator).
fn annualized_ratio(returns: &[f64], downside: impl Fn(f64) -> bool) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }

    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;

    let selected: Vec<f64> = returns.iter().copied().filter(|&r| downside(r)).collect();
    if selected.len() < 2 {
        return 0.0;
    }

    let m = selected.len() as f64;
    let selected_mean = selected.iter().sum::<f64>() / m;
    let variance = selected
        .iter()
        .map(|r| (r - selected_mean).powi(2))
        .sum::<f64>()
        / (m - 1.0);
    let std_dev = variance.sqrt();

    if std_dev.abs() < f64::EPSILON {
        return 0.0;
    }

    (mean / std_dev) * ANNUALIZATION_FACTOR.sqrt()
}

/// Largest fractional decline from a running peak.
fn max_drawdown(values: &[f64]) -> f64 {
    let mut peak = f64::MIN;
    let mut worst: f64 = 0.0;

    for &value in values {
        if value > peak {
            peak = value;
        }
        if peak > 0.0 {
            worst = worst.max((peak - value) / peak);
        }
    }

    worst
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_equity_reports_zeros() {
        let summary = analyze_values(&[100.0, 100.0, 100.0, 100.0]);
        assert_eq!(summary.sharpe_ratio, 0.0);
        assert_eq!(summary.sortino_ratio, 0.0);
        assert_eq!(summary.total_return, 0.0);
        assert_eq!(summary.max_drawdown, 0.0);
    }

    #[test]
    fn test_total_return() {
        let summary = analyze_values(&[100.0, 105.0, 110.0]);
        assert!((summary.total_return - 0.10).abs() < 1e-12);
    }

    #[test]
    fn test_monotonic_rise_has_no_drawdown() {
        let summary = analyze_values(&[100.0, 101.0, 103.0, 107.0]);
        assert_eq!(summary.max_drawdown, 0.0);
        assert!(summary.sharpe_ratio > 0.0);
    }

    #[test]
    fn test_known_drawdown() {
        // Peak 120, trough 90 -> drawdown 25%.
        let summary = analyze_values(&[100.0, 120.0, 90.0, 110.0]);
        assert!((summary.max_drawdown - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_sortino_penalizes_downside_more_than_sharpe() {
        // Returns: -10%, +10%, -20%. The downside deviation is smaller than
        // the full deviation, so the (negative) sortino sits further from zero.
        let summary = analyze_values(&[100.0, 90.0, 99.0, 79.2]);
        assert!(summary.sharpe_ratio < 0.0);
        assert!(summary.sortino_ratio < summary.sharpe_ratio);
    }

    #[test]
    fn test_single_point_is_degenerate() {
        let summary = analyze_values(&[100.0]);
        assert_eq!(summary.total_return, 0.0);
        assert_eq!(summary.sharpe_ratio, 0.0);
    }
}
