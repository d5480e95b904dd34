//! Inflation forecast used to uprate repayment thresholds

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Year-by-year inflation forecast with a long-term fallback
///
/// Lookups never fail: years outside the explicit horizon get the long-term rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InflationForecastTable {
    rates: BTreeMap<i32, f64>,
    long_term_rate: f64,
}

impl InflationForecastTable {
    pub fn new(rates: BTreeMap<i32, f64>, long_term_rate: f64) -> Self {
        Self { rates, long_term_rate }
    }

    /// A table with no explicit years
    pub fn flat(rate: f64) -> Self {
        Self::new(BTreeMap::new(), rate)
    }

    /// RPI forecast used for threshold uprating
    pub fn default_forecast() -> Self {
        let rates = [
            (2025, 0.043),
            (2026, 0.037),
            (2027, 0.031),
            (2028, 0.029),
            (2029, 0.029),
            (2030, 0.029),
        ];
        Self::new(rates.into_iter().collect(), 0.03)
    }

    /// Inflation rate for a calendar year
    pub fn rate(&self, year: i32) -> f64 {
        self.rates.get(&year).copied().unwrap_or(self.long_term_rate)
    }

    pub fn long_term_rate(&self) -> f64 {
        self.long_term_rate
    }

    /// Last year with an explicit forecast
    pub fn horizon(&self) -> Option<i32> {
        self.rates.keys().next_back().copied()
    }
}

impl Default for InflationForecastTable {
    fn default() -> Self {
        Self::default_forecast()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_and_fallback_rates() {
        let table = InflationForecastTable::default_forecast();
        assert_eq!(table.rate(2027), 0.031);
        assert_eq!(table.rate(2045), 0.03);
        assert_eq!(table.rate(1990), 0.03);
        assert_eq!(table.horizon(), Some(2030));
    }

    #[test]
    fn test_flat_table() {
        let table = InflationForecastTable::flat(0.02);
        assert_eq!(table.rate(2026), 0.02);
        assert_eq!(table.horizon(), None);
    }
}
