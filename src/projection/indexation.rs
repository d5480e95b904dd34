//! Threshold indexation policies

use serde::{Deserialize, Serialize};

use crate::error::{CalcError, Result};
use crate::parameters::InflationForecastTable;

/// Calendar years `[start, end)` during which a threshold is not uprated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreezeWindow {
    pub start: i32,
    pub end: i32,
}

impl FreezeWindow {
    pub fn new(start: i32, end: i32) -> Result<Self> {
        if start > end {
            return Err(CalcError::InvalidFreezeWindow { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, year: i32) -> bool {
        year >= self.start && year < self.end
    }
}

impl Default for FreezeWindow {
    /// Plan 2 threshold freeze announced for 2027-2029
    fn default() -> Self {
        Self { start: 2027, end: 2030 }
    }
}

/// How a repayment threshold moves across calendar years
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IndexationPolicy {
    /// Plan threshold held flat
    Constant,

    /// Explicit threshold held flat
    Fixed(f64),

    /// Uprated by forecast inflation each year after `base_year`,
    /// except during the optional freeze window
    Indexed {
        base_year: i32,
        freeze: Option<FreezeWindow>,
        inflation: InflationForecastTable,
    },
}

impl IndexationPolicy {
    /// Uprated every year from `base_year`
    pub fn indexed(base_year: i32, inflation: InflationForecastTable) -> Self {
        IndexationPolicy::Indexed {
            base_year,
            freeze: None,
            inflation,
        }
    }

    /// Frozen over `window`, uprated outside it
    pub fn frozen(base_year: i32, window: FreezeWindow, inflation: InflationForecastTable) -> Self {
        IndexationPolicy::Indexed {
            base_year,
            freeze: Some(window),
            inflation,
        }
    }

    /// Threshold in a calendar year given the plan threshold for the base year
    pub fn threshold_for(&self, base_threshold: f64, calendar_year: i32) -> f64 {
        match self {
            IndexationPolicy::Constant => base_threshold,
            IndexationPolicy::Fixed(threshold) => *threshold,
            IndexationPolicy::Indexed { base_year, freeze, inflation } => {
                ((*base_year + 1)..=calendar_year)
                    .filter(|year| !freeze.is_some_and(|w| w.contains(*year)))
                    .fold(base_threshold, |threshold, year| threshold * (1.0 + inflation.rate(year)))
            }
        }
    }
}

impl Default for IndexationPolicy {
    fn default() -> Self {
        IndexationPolicy::Constant
    }
}
