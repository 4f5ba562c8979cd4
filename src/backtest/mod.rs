//! Backtesting engine for the pairs strategy.
//!
//! Simulates day-by-day position changes from the signal sequence, with
//! transaction costs on traded notional and a daily borrow charge on short
//! notional. All cash accounting runs in `Decimal`; hedge ratios and prices
//! arrive as `f64` from the filter and are converted once per step.
//!
//! Accounting invariant, checked by tests at every step:
//!
//! ```text
//! portfolio_value(t) = cash(t) + shares_a(t) * price_a(t) + shares_b(t) * price_b(t)
//! ```
//!
//! Cash may go negative (the deficit shows up in portfolio value); margin
//! calls are out of scope.

use crate::data::PriceSeriesPair;
use crate::filter::FilterOutput;
use crate::signal::{PositionState, Signal};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Trading days per year, used for daily borrow accrual.
const TRADING_DAYS_PER_YEAR: Decimal = dec!(252);

/// How target shares are computed on entry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "rule")]
pub enum PositionSizing {
    /// A fixed gross notional on leg A per entry; leg B scales by the
    /// current hedge ratio.
    FixedNotional { notional_per_leg: Decimal },
    /// A fraction of current portfolio value as gross notional on leg A.
    CapitalFraction { fraction: Decimal },
}

/// Backtest cost and capital configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestConfig {
    /// Starting cash.
    pub initial_capital: Decimal,
    /// Per-trade cost in basis points, applied to notional traded.
    #[serde(default)]
    pub transaction_cost_bps: Decimal,
    /// Annual borrow rate on short notional, accrued as rate/252 per step.
    #[serde(default)]
    pub borrow_rate_annual: Decimal,
    /// Sizing rule for entries.
    pub sizing: PositionSizing,
}

/// Invalid backtest configuration, caught before the simulation starts.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BacktestConfigError {
    #[error("initial capital must be positive, got {0}")]
    NonPositiveCapital(Decimal),

    #[error("transaction cost must be non-negative, got {0} bps")]
    NegativeTransactionCost(Decimal),

    #[error("borrow rate must be non-negative, got {0}")]
    NegativeBorrowRate(Decimal),

    #[error("sizing notional must be positive, got {0}")]
    NonPositiveNotional(Decimal),

    #[error("sizing fraction must be in (0, 1], got {0}")]
    FractionOutOfRange(Decimal),
}

impl BacktestConfig {
    pub fn validate(&self) -> Result<(), BacktestConfigError> {
        if self.initial_capital <= Decimal::ZERO {
            return Err(BacktestConfigError::NonPositiveCapital(
                self.initial_capital,
            ));
        }
        if self.transaction_cost_bps < Decimal::ZERO {
            return Err(BacktestConfigError::NegativeTransactionCost(
                self.transaction_cost_bps,
            ));
        }
        if self.borrow_rate_annual < Decimal::ZERO {
            return Err(BacktestConfigError::NegativeBorrowRate(
                self.borrow_rate_annual,
            ));
        }
        match self.sizing {
            PositionSizing::FixedNotional { notional_per_leg } => {
                if notional_per_leg <= Decimal::ZERO {
                    return Err(BacktestConfigError::NonPositiveNotional(notional_per_leg));
                }
            }
            PositionSizing::CapitalFraction { fraction } => {
                if fraction <= Decimal::ZERO || fraction > Decimal::ONE {
                    return Err(BacktestConfigError::FractionOutOfRange(fraction));
                }
            }
        }
        Ok(())
    }
}

/// Runtime failures inside the simulation loop.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BacktestError {
    #[error("invalid configuration: {0}")]
    Config(#[from] BacktestConfigError),

    #[error("length mismatch: {what} has {actual} entries, prices have {expected}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("value not representable as decimal at index {index}: {value}")]
    NonRepresentable { index: usize, value: f64 },
}

/// Holdings snapshot after the timestep's transition, one per input step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionSnapshot {
    pub timestamp: DateTime<Utc>,
    pub shares_a: Decimal,
    pub shares_b: Decimal,
    pub cash: Decimal,
}

/// One point of the mark-to-market equity curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub portfolio_value: Decimal,
}

/// Complete simulation output.
#[derive(Debug, Clone, PartialEq)]
pub struct BacktestRun {
    /// Mark-to-market portfolio value, one entry per input timestep.
    pub equity: Vec<EquityPoint>,
    /// Holdings ledger on the same index, for diagnostics and invariants.
    pub ledger: Vec<PositionSnapshot>,
    /// Number of rebalancing trades executed.
    pub trades: u32,
}

fn to_decimal(index: usize, value: f64) -> Result<Decimal, BacktestError> {
    Decimal::from_f64(value).ok_or(BacktestError::NonRepresentable { index, value })
}

/// Simulate the strategy over one aligned run of prices, hedge ratios, and
/// signals.
///
/// Decisions at step t use only the signal and prices at t (the signal
/// itself was produced from data up to t); there is no lookahead. Trades
/// execute at the step's prices, borrow accrues on the post-trade short
/// notional, and the step closes with a mark-to-market.
pub fn run(
    pair: &PriceSeriesPair,
    filter: &FilterOutput,
    signals: &[Signal],
    config: &BacktestConfig,
) -> Result<BacktestRun, BacktestError> {
    config.validate()?;

    let n = pair.len();
    if filter.points.len() != n {
        return Err(BacktestError::LengthMismatch {
            what: "filter output",
            expected: n,
            actual: filter.points.len(),
        });
    }
    if signals.len() != n {
        return Err(BacktestError::LengthMismatch {
            what: "signals",
            expected: n,
            actual: signals.len(),
        });
    }

    let cost_rate = config.transaction_cost_bps / dec!(10_000);
    let daily_borrow = config.borrow_rate_annual / TRADING_DAYS_PER_YEAR;

    let mut cash = config.initial_capital;
    let mut shares_a = Decimal::ZERO;
    let mut shares_b = Decimal::ZERO;
    let mut current_state = PositionState::Flat;
    let mut trades = 0u32;

    let mut equity = Vec::with_capacity(n);
    let mut ledger = Vec::with_capacity(n);

    for (index, point) in pair.points().iter().enumerate() {
        let price_a = to_decimal(index, point.price_a)?;
        let price_b = to_decimal(index, point.price_b)?;
        let signal = signals[index].state;

        if signal != current_state {
            let hedge_ratio = to_decimal(index, filter.points[index].hedge_ratio)?;
            let direction = match signal {
                PositionState::Flat => Decimal::ZERO,
                PositionState::LongSpread => Decimal::ONE,
                PositionState::ShortSpread => -Decimal::ONE,
            };

            let gross = match config.sizing {
                PositionSizing::FixedNotional { notional_per_leg } => notional_per_leg,
                PositionSizing::CapitalFraction { fraction } => {
                    // Pre-trade mark-to-market at this step's prices.
                    (cash + shares_a * price_a + shares_b * price_b) * fraction
                }
            };

            // Long spread: long leg A, short beta units of B per share of A.
            let target_a = direction * gross / price_a;
            let target_b = -target_a * hedge_ratio;

            let delta_a = target_a - shares_a;
            let delta_b = target_b - shares_b;
            let notional_traded = delta_a.abs() * price_a + delta_b.abs() * price_b;

            if notional_traded > Decimal::ZERO {
                let fee = notional_traded * cost_rate;
                cash -= delta_a * price_a + delta_b * price_b + fee;
                shares_a = target_a;
                shares_b = target_b;
                trades += 1;
                debug!(
                    index,
                    ?signal,
                    %notional_traded,
                    %fee,
                    "Rebalanced position"
                );
            }
            current_state = signal;
        }

        // Borrow accrues every step a short leg exists, trade or not.
        let short_notional = short_side(shares_a, price_a) + short_side(shares_b, price_b);
        if short_notional > Decimal::ZERO {
            cash -= short_notional * daily_borrow;
        }

        let portfolio_value = cash + shares_a * price_a + shares_b * price_b;
        equity.push(EquityPoint {
            timestamp: point.timestamp,
            portfolio_value,
        });
        ledger.push(PositionSnapshot {
            timestamp: point.timestamp,
            shares_a,
            shares_b,
            cash,
        });
    }

    Ok(BacktestRun {
        equity,
        ledger,
        trades,
    })
}

fn short_side(shares: Decimal, price: Decimal) -> Decimal {
    if shares < Decimal::ZERO {
        -shares * price
    } else {
        Decimal::ZERO
    }
}

/// Convert an equity curve to plain `f64` values, for metrics.
pub fn equity_values(run: &BacktestRun) -> Vec<f64> {
    run.equity
        .iter()
        .filter_map(|point| point.portfolio_value.to_f64())
        .collect()
}
