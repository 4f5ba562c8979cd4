//! Aligned price series for a trading pair.
//!
//! The rest of the pipeline assumes a clean, validated input: strictly
//! increasing timestamps and finite, positive prices on both legs. That
//! contract is enforced once here, at ingestion, so downstream stages never
//! re-check it.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::io::Read;
use std::path::Path;
use thiserror::Error;
use tracing::info;

/// One joint observation of the pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricePoint {
    /// Observation timestamp (UTC).
    pub timestamp: DateTime<Utc>,
    /// Price of leg A (the dependent leg in the spread A - beta * B).
    pub price_a: f64,
    /// Price of leg B (the hedging leg).
    pub price_b: f64,
}

/// Errors raised while building or loading a [`PriceSeriesPair`].
///
/// Every variant carries enough context (index, offending values) to
/// reproduce the failure from the raw input.
#[derive(Error, Debug)]
pub enum InputError {
    /// The input contained no observations.
    #[error("price series is empty")]
    Empty,

    /// Timestamps must be strictly increasing.
    #[error("non-monotonic timestamp at index {index}: {current} does not follow {previous}")]
    NonMonotonicTimestamp {
        index: usize,
        previous: DateTime<Utc>,
        current: DateTime<Utc>,
    },

    /// Prices must be finite and strictly positive.
    #[error("invalid price for leg {leg} at index {index}: {value}")]
    InvalidPrice {
        index: usize,
        leg: char,
        value: f64,
    },

    /// The two legs had different lengths when zipped together.
    #[error("misaligned series: leg A has {len_a} points, leg B has {len_b}")]
    MisalignedSeries { len_a: usize, len_b: usize },

    /// I/O failure while reading the data file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV parsing failure.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Validated, timestamp-aligned price history for the pair.
///
/// Invariants (checked at construction, relied upon everywhere else):
/// - at least one observation,
/// - strictly increasing timestamps,
/// - finite, strictly positive prices on both legs.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSeriesPair {
    points: Vec<PricePoint>,
}

impl PriceSeriesPair {
    /// Build a validated pair series from raw points.
    pub fn new(points: Vec<PricePoint>) -> Result<Self, InputError> {
        if points.is_empty() {
            return Err(InputError::Empty);
        }

        for (index, point) in points.iter().enumerate() {
            validate_price(index, 'A', point.price_a)?;
            validate_price(index, 'B', point.price_b)?;

            if index > 0 {
                let previous = points[index - 1].timestamp;
                if point.timestamp <= previous {
                    return Err(InputError::NonMonotonicTimestamp {
                        index,
                        previous,
                        current: point.timestamp,
                    });
                }
            }
        }

        Ok(Self { points })
    }

    /// Build a pair series from two separate legs sharing one timestamp index.
    pub fn from_legs(
        timestamps: Vec<DateTime<Utc>>,
        prices_a: Vec<f64>,
        prices_b: Vec<f64>,
    ) -> Result<Self, InputError> {
        if prices_a.len() != prices_b.len() || timestamps.len() != prices_a.len() {
            return Err(InputError::MisalignedSeries {
                len_a: prices_a.len(),
                len_b: prices_b.len(),
            });
        }

        let points = timestamps
            .into_iter()
            .zip(prices_a)
            .zip(prices_b)
            .map(|((timestamp, price_a), price_b)| PricePoint {
                timestamp,
                price_a,
                price_b,
            })
            .collect();

        Self::new(points)
    }

    /// The validated observations, in timestamp order.
    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    /// Number of observations.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Always false: an empty series cannot be constructed.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

fn validate_price(index: usize, leg: char, value: f64) -> Result<(), InputError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(InputError::InvalidPrice { index, leg, value });
    }
    Ok(())
}

/// Raw CSV row: `timestamp,price_a,price_b` with RFC 3339 timestamps.
#[derive(Debug, Deserialize)]
struct PairCsvRow {
    timestamp: DateTime<Utc>,
    price_a: f64,
    price_b: f64,
}

/// Load a pair series from any CSV reader.
pub fn load_pair_csv_from_reader<R: Read>(reader: R) -> Result<PriceSeriesPair, InputError> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let mut points = Vec::new();

    for row in csv_reader.deserialize() {
        let row: PairCsvRow = row?;
        points.push(PricePoint {
            timestamp: row.timestamp,
            price_a: row.price_a,
            price_b: row.price_b,
        });
    }

    PriceSeriesPair::new(points)
}

/// Load a pair series from a CSV file on disk.
pub fn load_pair_csv(path: &Path) -> Result<PriceSeriesPair, InputError> {
    let file = std::fs::File::open(path)?;
    let pair = load_pair_csv_from_reader(file)?;
    info!(path = %path.display(), points = pair.len(), "Pair data loaded");
    Ok(pair)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(offset_days: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::days(offset_days)
    }

    fn point(day: i64, a: f64, b: f64) -> PricePoint {
        PricePoint {
            timestamp: ts(day),
            price_a: a,
            price_b: b,
        }
    }

    #[test]
    fn test_valid_series_accepted() {
        let pair = PriceSeriesPair::new(vec![
            point(0, 100.0, 50.0),
            point(1, 101.0, 50.5),
            point(2, 99.0, 49.5),
        ])
        .unwrap();
        assert_eq!(pair.len(), 3);
    }

    #[test]
    fn test_empty_series_rejected() {
        assert!(matches!(
            PriceSeriesPair::new(vec![]),
            Err(InputError::Empty)
        ));
    }

    #[test]
    fn test_non_monotonic_timestamps_rejected() {
        let result = PriceSeriesPair::new(vec![
            point(0, 100.0, 50.0),
            point(2, 101.0, 50.5),
            point(1, 99.0, 49.5),
        ]);
        match result {
            Err(InputError::NonMonotonicTimestamp { index, .. }) => assert_eq!(index, 2),
            other => panic!("expected NonMonotonicTimestamp, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_timestamps_rejected() {
        let result = PriceSeriesPair::new(vec![point(0, 100.0, 50.0), point(0, 101.0, 50.5)]);
        assert!(matches!(
            result,
            Err(InputError::NonMonotonicTimestamp { index: 1, .. })
        ));
    }

    #[test]
    fn test_non_positive_price_rejected() {
        let result = PriceSeriesPair::new(vec![point(0, 100.0, 0.0)]);
        match result {
            Err(InputError::InvalidPrice { index, leg, value }) => {
                assert_eq!(index, 0);
                assert_eq!(leg, 'B');
                assert_eq!(value, 0.0);
            }
            other => panic!("expected InvalidPrice, got {:?}", other),
        }
    }

    #[test]
    fn test_non_finite_price_rejected() {
        let result = PriceSeriesPair::new(vec![point(0, f64::NAN, 50.0)]);
        assert!(matches!(result, Err(InputError::InvalidPrice { leg: 'A', .. })));
    }

    #[test]
    fn test_from_legs_length_mismatch() {
        let result = PriceSeriesPair::from_legs(
            vec![ts(0), ts(1)],
            vec![100.0, 101.0],
            vec![50.0],
        );
        assert!(matches!(
            result,
            Err(InputError::MisalignedSeries { len_a: 2, len_b: 1 })
        ));
    }

    #[test]
    fn test_csv_round_trip() {
        let csv = "timestamp,price_a,price_b\n\
                   2024-01-01T00:00:00Z,100.0,50.0\n\
                   2024-01-02T00:00:00Z,101.0,50.5\n";
        let pair = load_pair_csv_from_reader(csv.as_bytes()).unwrap();
        assert_eq!(pair.len(), 2);
        assert_eq!(pair.points()[1].price_a, 101.0);
        assert_eq!(pair.points()[1].price_b, 50.5);
    }

    #[test]
    fn test_csv_bad_price_rejected() {
        let csv = "timestamp,price_a,price_b\n\
                   2024-01-01T00:00:00Z,100.0,-1.0\n";
        assert!(load_pair_csv_from_reader(csv.as_bytes()).is_err());
    }
}
