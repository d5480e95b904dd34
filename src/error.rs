//! Error type shared by the projection, parameter and decomposition layers

use thiserror::Error;

/// Errors raised by the calculator
///
/// Variants fall into three families: input validation (rejected before any
/// simulation step runs), upstream failures (parameter or series lookups) and
/// numeric preconditions (grids and trajectories that cannot be computed on).
#[derive(Debug, Error)]
pub enum CalcError {
    // ---- Input validation ----
    #[error("{field} must be non-negative, got {value}")]
    NegativeAmount { field: &'static str, value: f64 },

    #[error("{field} must be within [{min}, {max}], got {value}")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("unknown student loan plan: {0}")]
    UnknownPlan(String),

    #[error("tax year {year} is outside the supported range {min}..={max}")]
    UnsupportedYear { year: i32, min: i32, max: i32 },

    #[error("income grid is not strictly increasing at index {index}")]
    NonMonotonicGrid { index: usize },

    #[error("income grid is not evenly spaced at index {index}: step {step}, expected {expected}")]
    NonUniformGrid {
        index: usize,
        step: f64,
        expected: f64,
    },

    #[error("series `{series}` has {actual} points, expected {expected}")]
    SeriesLengthMismatch {
        series: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("income {income} is outside the grid range [{min}, {max}]")]
    IncomeOutsideGrid { income: f64, min: f64, max: f64 },

    #[error("invalid freeze window: start {start} is after end {end}")]
    InvalidFreezeWindow { start: i32, end: i32 },

    // ---- Upstream dependencies ----
    #[error("no tax parameters available for {year}")]
    ParametersUnavailable { year: i32 },

    #[error("no parameters for plan {plan} in {year}")]
    PlanUnavailable { plan: String, year: i32 },

    #[error("simulation provider failed: {0}")]
    Provider(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // ---- Numeric preconditions ----
    #[error("income grid needs at least 2 points, got {0}")]
    GridTooSmall(usize),

    #[error("income grid has zero spacing")]
    ZeroGridSpacing,

    #[error("trajectory is empty")]
    EmptyTrajectory,
}

impl CalcError {
    /// Whether the error was caused by caller input rather than a dependency
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            CalcError::NegativeAmount { .. }
                | CalcError::OutOfRange { .. }
                | CalcError::UnknownPlan(_)
                | CalcError::UnsupportedYear { .. }
                | CalcError::NonMonotonicGrid { .. }
                | CalcError::NonUniformGrid { .. }
                | CalcError::SeriesLengthMismatch { .. }
                | CalcError::IncomeOutsideGrid { .. }
                | CalcError::InvalidFreezeWindow { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, CalcError>;

/// Reject negative amounts
pub(crate) fn ensure_non_negative(field: &'static str, value: f64) -> Result<()> {
    if value < 0.0 || value.is_nan() {
        return Err(CalcError::NegativeAmount { field, value });
    }
    Ok(())
}

/// Reject values outside a closed range
pub(crate) fn ensure_in_range(field: &'static str, value: f64, min: f64, max: f64) -> Result<()> {
    if !(min..=max).contains(&value) {
        return Err(CalcError::OutOfRange { field, value, min, max });
    }
    Ok(())
}
