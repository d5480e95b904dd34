//! Income grid and finite-difference gradients

use serde::Serialize;

use crate::error::{CalcError, Result};

/// Relative tolerance when checking that grid steps are equal
const SPACING_TOLERANCE: f64 = 1e-9;

/// Evenly spaced, strictly increasing income grid
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IncomeAxis {
    values: Vec<f64>,
    step: f64,
}

impl IncomeAxis {
    /// Validate an explicit grid
    pub fn new(values: Vec<f64>) -> Result<Self> {
        if values.len() < 2 {
            return Err(CalcError::GridTooSmall(values.len()));
        }

        let step = values[1] - values[0];
        if step == 0.0 {
            return Err(CalcError::ZeroGridSpacing);
        }

        for (i, pair) in values.windows(2).enumerate() {
            let diff = pair[1] - pair[0];
            if !(diff > 0.0) {
                return Err(CalcError::NonMonotonicGrid { index: i + 1 });
            }
            if (diff - step).abs() > SPACING_TOLERANCE * step.abs() {
                return Err(CalcError::NonUniformGrid {
                    index: i + 1,
                    step: diff,
                    expected: step,
                });
            }
        }

        Ok(Self { values, step })
    }

    /// `count` evenly spaced points from `min` to `max` inclusive
    pub fn linspace(min: f64, max: f64, count: usize) -> Result<Self> {
        if count < 2 {
            return Err(CalcError::GridTooSmall(count));
        }
        let step = (max - min) / (count - 1) as f64;
        Self::new((0..count).map(|i| min + step * i as f64).collect())
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn step(&self) -> f64 {
        self.step
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn min(&self) -> f64 {
        self.values[0]
    }

    pub fn max(&self) -> f64 {
        self.values[self.values.len() - 1]
    }

    /// Marginal rate of `series` with respect to income
    pub fn gradient(&self, name: &'static str, series: &[f64]) -> Result<Vec<f64>> {
        if series.len() != self.values.len() {
            return Err(CalcError::SeriesLengthMismatch {
                series: name,
                expected: self.values.len(),
                actual: series.len(),
            });
        }
        gradient(series, self.step)
    }
}

/// Central differences inside, one-sided differences at the two ends
pub fn gradient(series: &[f64], step: f64) -> Result<Vec<f64>> {
    let n = series.len();
    if n < 2 {
        return Err(CalcError::GridTooSmall(n));
    }
    if step == 0.0 {
        return Err(CalcError::ZeroGridSpacing);
    }
    Ok((0..n)
        .map(|i| {
            if i == 0 {
                (series[1] - series[0]) / step
            } else if i == n - 1 {
                (series[n - 1] - series[n - 2]) / step
            } else {
                (series[i + 1] - series[i - 1]) / (2.0 * step)
            }
        })
        .collect())
}
