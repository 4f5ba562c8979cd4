//! Cointegration gate for the pipeline.
//!
//! The statistical tests themselves (Engle-Granger/ADF, Johansen) live
//! outside this crate: any external tool that can score the pair produces a
//! [`CointegrationReport`], and the pipeline only decides whether to trade
//! on it. The gate policy is explicit configuration so a failed verdict can
//! either abort the run (strict, the production default) or proceed with a
//! warning (exploratory research).

use crate::data::PriceSeriesPair;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

/// Verdict from an external cointegration test.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CointegrationReport {
    /// Raw test statistic (e.g. the ADF t-statistic).
    pub test_statistic: f64,
    /// P-value of the test.
    pub p_value: f64,
    /// The collaborator's boolean verdict.
    pub is_cointegrated: bool,
}

/// Source of cointegration verdicts for a pair.
pub trait CointegrationCheck {
    fn check(&self, pair: &PriceSeriesPair) -> CointegrationReport;
}

/// A pre-computed verdict, e.g. produced offline by a statistics package
/// and fed in through configuration or CLI flags.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StaticReport(pub CointegrationReport);

impl CointegrationCheck for StaticReport {
    fn check(&self, _pair: &PriceSeriesPair) -> CointegrationReport {
        self.0
    }
}

/// What to do when the pair is not cointegrated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatePolicy {
    /// Abort the run. The production-style default.
    #[default]
    Strict,
    /// Log a warning and run anyway.
    Exploratory,
}

/// The gate rejected the pair under strict policy.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
#[error("pair is not cointegrated (statistic {statistic}, p-value {p_value})")]
pub struct GateFailure {
    pub statistic: f64,
    pub p_value: f64,
}

/// Apply the gate policy to a verdict.
pub fn apply_gate(report: &CointegrationReport, policy: GatePolicy) -> Result<(), GateFailure> {
    if report.is_cointegrated {
        info!(
            statistic = report.test_statistic,
            p_value = report.p_value,
            "Cointegration gate passed"
        );
        return Ok(());
    }

    match policy {
        GatePolicy::Strict => Err(GateFailure {
            statistic: report.test_statistic,
            p_value: report.p_value,
        }),
        GatePolicy::Exploratory => {
            warn!(
                statistic = report.test_statistic,
                p_value = report.p_value,
                "Pair is not cointegrated; proceeding under exploratory policy"
            );
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed_report() -> CointegrationReport {
        CointegrationReport {
            test_statistic: -1.2,
            p_value: 0.4,
            is_cointegrated: false,
        }
    }

    #[test]
    fn test_cointegrated_pair_passes_any_policy() {
        let report = CointegrationReport {
            test_statistic: -3.5,
            p_value: 0.01,
            is_cointegrated: true,
        };
        assert!(apply_gate(&report, GatePolicy::Strict).is_ok());
        assert!(apply_gate(&report, GatePolicy::Exploratory).is_ok());
    }

    #[test]
    fn test_strict_gate_aborts() {
        let err = apply_gate(&failed_report(), GatePolicy::Strict).unwrap_err();
        assert_eq!(err.statistic, -1.2);
        assert_eq!(err.p_value, 0.4);
    }

    #[test]
    fn test_exploratory_gate_proceeds_with_warning() {
        assert!(apply_gate(&failed_report(), GatePolicy::Exploratory).is_ok());
    }

    #[test]
    fn test_default_policy_is_strict() {
        assert_eq!(GatePolicy::default(), GatePolicy::Strict);
    }

    #[test]
    fn test_static_report_returns_its_verdict_for_any_pair() {
        use crate::data::PricePoint;
        use chrono::TimeZone;

        let pair = crate::data::PriceSeriesPair::new(vec![PricePoint {
            timestamp: chrono::Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            price_a: 100.0,
            price_b: 50.0,
        }])
        .unwrap();

        let check = StaticReport(failed_report());
        let report = check.check(&pair);
        assert_eq!(report, failed_report());
        assert!(apply_gate(&report, GatePolicy::Strict).is_err());
    }
}
