//! Yearly tax and student loan parameters
//!
//! Parameters are looked up by tax year through [`TaxParameterProvider`]. The
//! built-in table covers 2025-2030; [`CsvParameterProvider`] reads the same
//! layout from `data/parameters/`, and [`CachedParameters`] wraps either one
//! in a bounded per-year cache.

mod inflation;
mod cache;
pub mod loader;

pub use inflation::InflationForecastTable;
pub use cache::{CachedParameters, CacheStats, DEFAULT_CACHE_CAPACITY};
pub use loader::CsvParameterProvider;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{CalcError, Result};

/// Earliest tax year with shipped parameters
pub const MIN_TAX_YEAR: i32 = 2025;

/// Latest tax year with shipped parameters
pub const MAX_TAX_YEAR: i32 = 2030;

/// Longest write-off term of any plan, in years
pub const MAX_WRITEOFF_TERM: u32 = 40;

/// Student loan repayment plan
///
/// Serialized with the calculator identifiers (`plan1`, ..., `postgrad`);
/// the upper-case `PLAN_2` style is accepted on input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Plan {
    Plan1,
    Plan2,
    Plan4,
    Plan5,
    Postgraduate,
}

impl Plan {
    pub const ALL: [Plan; 5] = [Plan::Plan1, Plan::Plan2, Plan::Plan4, Plan::Plan5, Plan::Postgraduate];

    /// Identifier used by the calculator API (`plan2`, `postgrad`, ...)
    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Plan1 => "plan1",
            Plan::Plan2 => "plan2",
            Plan::Plan4 => "plan4",
            Plan::Plan5 => "plan5",
            Plan::Postgraduate => "postgrad",
        }
    }

    /// Parse an identifier that may also be `none`
    pub fn parse_optional(s: &str) -> Result<Option<Plan>> {
        match s {
            "none" | "NONE" => Ok(None),
            other => other.parse().map(Some),
        }
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Plan {
    type Err = CalcError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "plan1" | "PLAN_1" => Ok(Plan::Plan1),
            "plan2" | "PLAN_2" => Ok(Plan::Plan2),
            "plan4" | "PLAN_4" => Ok(Plan::Plan4),
            "plan5" | "PLAN_5" => Ok(Plan::Plan5),
            "postgrad" | "postgraduate" | "POSTGRADUATE" => Ok(Plan::Postgraduate),
            other => Err(CalcError::UnknownPlan(other.to_string())),
        }
    }
}

impl TryFrom<String> for Plan {
    type Error = CalcError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Plan> for String {
    fn from(plan: Plan) -> Self {
        plan.as_str().to_string()
    }
}

/// Serde helper for optional plans that may be spelled `none`
pub fn deserialize_optional_plan<'de, D>(deserializer: D) -> std::result::Result<Option<Plan>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(s) => Plan::parse_optional(&s).map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}

/// Repayment terms for one plan in one tax year
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlanParameters {
    /// Annual income above which repayment begins
    pub threshold: f64,

    /// Fraction of income above the threshold that is repaid
    pub repayment_rate: f64,

    /// Annual interest rate charged on the balance
    pub interest_rate: f64,

    /// Years after which any remaining balance is written off
    pub writeoff_term: u32,
}

impl PlanParameters {
    /// Same terms with a different interest rate
    pub fn with_interest_rate(self, interest_rate: f64) -> Self {
        Self { interest_rate, ..self }
    }
}

/// Income tax band table
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandTable {
    pub personal_allowance: f64,
    /// Income at which the higher rate starts
    pub basic_rate_limit: f64,
    /// Income above which the additional rate applies
    pub additional_rate_threshold: f64,
    pub basic_rate: f64,
    pub higher_rate: f64,
    pub additional_rate: f64,
    /// Adjusted net income above which the personal allowance is withdrawn
    pub taper_threshold: f64,
    /// Allowance withdrawn per pound above the taper threshold
    pub taper_rate: f64,
}

impl BandTable {
    /// Statutory band rate at an income level
    ///
    /// Band edges are inclusive on the lower band: income exactly at the
    /// basic-rate limit still pays the basic rate.
    pub fn band_rate(&self, income: f64) -> f64 {
        if income <= self.personal_allowance {
            0.0
        } else if income <= self.basic_rate_limit {
            self.basic_rate
        } else if income <= self.additional_rate_threshold {
            self.higher_rate
        } else {
            self.additional_rate
        }
    }

    /// Income at which the personal allowance is fully withdrawn
    pub fn taper_end(&self) -> f64 {
        if self.taper_rate <= 0.0 {
            self.taper_threshold
        } else {
            self.taper_threshold + self.personal_allowance / self.taper_rate
        }
    }

    /// Whether the allowance taper applies at an income level
    pub fn in_taper_window(&self, income: f64) -> bool {
        income > self.taper_threshold && income <= self.taper_end()
    }
}

/// Postgraduate loan repayment terms
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PostgradParameters {
    pub threshold: f64,
    pub repayment_rate: f64,
}

impl PostgradParameters {
    /// Marginal repayment rate at an income level
    pub fn marginal_rate(&self, income: f64) -> f64 {
        if income > self.threshold {
            self.repayment_rate
        } else {
            0.0
        }
    }

    /// Annual repayment at an income level
    pub fn repayment(&self, income: f64) -> f64 {
        ((income - self.threshold) * self.repayment_rate).max(0.0)
    }
}

/// All parameters for one tax year
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxParameters {
    /// Tax year (the calendar year in which it starts)
    pub year: i32,

    /// First day of the tax year
    pub effective_from: NaiveDate,

    /// Repayment terms by plan
    pub plans: BTreeMap<Plan, PlanParameters>,

    /// Income tax bands
    pub bands: BandTable,

    /// Postgraduate loan terms
    pub postgrad: PostgradParameters,
}

impl TaxParameters {
    /// Repayment terms for a plan
    pub fn plan(&self, plan: Plan) -> Result<PlanParameters> {
        self.plans.get(&plan).copied().ok_or_else(|| CalcError::PlanUnavailable {
            plan: plan.to_string(),
            year: self.year,
        })
    }
}

/// Source of yearly parameters
pub trait TaxParameterProvider: Send + Sync {
    /// Parameters for a tax year, or [`CalcError::ParametersUnavailable`]
    fn get(&self, year: i32) -> Result<TaxParameters>;
}

impl<P: TaxParameterProvider + ?Sized> TaxParameterProvider for &P {
    fn get(&self, year: i32) -> Result<TaxParameters> {
        (**self).get(year)
    }
}

impl<P: TaxParameterProvider + ?Sized> TaxParameterProvider for std::sync::Arc<P> {
    fn get(&self, year: i32) -> Result<TaxParameters> {
        (**self).get(year)
    }
}

/// Reject tax years without shipped parameters
pub fn validate_tax_year(year: i32) -> Result<()> {
    if !(MIN_TAX_YEAR..=MAX_TAX_YEAR).contains(&year) {
        return Err(CalcError::UnsupportedYear {
            year,
            min: MIN_TAX_YEAR,
            max: MAX_TAX_YEAR,
        });
    }
    Ok(())
}

/// UK tax years start on 6 April
pub fn tax_year_start(year: i32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, 4, 6)
}

/// One row of the built-in plan table
struct PlanRow {
    plan: Plan,
    threshold: f64,
    repayment_rate: f64,
    interest_min: f64,
    interest_max: f64,
    writeoff_term: u32,
}

impl PlanRow {
    /// Plan 2 interest varies with income between min and max; the midpoint is used
    fn to_parameters(&self) -> PlanParameters {
        PlanParameters {
            threshold: self.threshold,
            repayment_rate: self.repayment_rate,
            interest_rate: (self.interest_min + self.interest_max) / 2.0,
            writeoff_term: self.writeoff_term,
        }
    }
}

/// Built-in parameter table for 2025-2030
#[derive(Debug, Clone, Default)]
pub struct BuiltinParameters;

impl BuiltinParameters {
    pub fn new() -> Self {
        Self
    }

    /// Thresholds by year: plan 1, plan 2, plan 4, plan 5, postgraduate, RPI
    const THRESHOLDS: [(i32, [f64; 5], f64); 6] = [
        (2025, [26_065.0, 28_470.0, 32_745.0, 25_000.0, 21_000.0], 0.032),
        (2026, [26_900.0, 29_385.0, 33_795.0, 25_000.0, 21_000.0], 0.032),
        (2027, [27_710.0, 29_385.0, 34_810.0, 25_750.0, 21_000.0], 0.031),
        (2028, [28_540.0, 29_385.0, 35_855.0, 26_520.0, 21_000.0], 0.029),
        (2029, [29_370.0, 29_385.0, 36_895.0, 27_290.0, 21_000.0], 0.029),
        (2030, [30_220.0, 30_240.0, 37_965.0, 28_080.0, 21_000.0], 0.029),
    ];

    /// Income tax bands, frozen across the whole table
    pub fn bands() -> BandTable {
        BandTable {
            personal_allowance: 12_570.0,
            basic_rate_limit: 50_270.0,
            additional_rate_threshold: 125_140.0,
            basic_rate: 0.20,
            higher_rate: 0.40,
            additional_rate: 0.45,
            taper_threshold: 100_000.0,
            taper_rate: 0.5,
        }
    }

    fn plan_rows(thresholds: &[f64; 5], rpi: f64) -> [PlanRow; 5] {
        [
            PlanRow { plan: Plan::Plan1, threshold: thresholds[0], repayment_rate: 0.09, interest_min: rpi, interest_max: rpi, writeoff_term: 25 },
            PlanRow { plan: Plan::Plan2, threshold: thresholds[1], repayment_rate: 0.09, interest_min: rpi, interest_max: rpi + 0.03, writeoff_term: 30 },
            PlanRow { plan: Plan::Plan4, threshold: thresholds[2], repayment_rate: 0.09, interest_min: rpi, interest_max: rpi, writeoff_term: 30 },
            PlanRow { plan: Plan::Plan5, threshold: thresholds[3], repayment_rate: 0.09, interest_min: rpi, interest_max: rpi, writeoff_term: 40 },
            PlanRow { plan: Plan::Postgraduate, threshold: thresholds[4], repayment_rate: 0.06, interest_min: rpi + 0.03, interest_max: rpi + 0.03, writeoff_term: 30 },
        ]
    }
}

impl TaxParameterProvider for BuiltinParameters {
    fn get(&self, year: i32) -> Result<TaxParameters> {
        let (_, thresholds, rpi) = Self::THRESHOLDS
            .iter()
            .find(|(y, _, _)| *y == year)
            .ok_or(CalcError::ParametersUnavailable { year })?;

        let plans: BTreeMap<Plan, PlanParameters> = Self::plan_rows(thresholds, *rpi)
            .iter()
            .map(|row| (row.plan, row.to_parameters()))
            .collect();

        let pg = *plans.get(&Plan::Postgraduate).ok_or(CalcError::PlanUnavailable {
            plan: Plan::Postgraduate.to_string(),
            year,
        })?;

        Ok(TaxParameters {
            year,
            effective_from: tax_year_start(year).ok_or(CalcError::ParametersUnavailable { year })?,
            plans,
            bands: Self::bands(),
            postgrad: PostgradParameters {
                threshold: pg.threshold,
                repayment_rate: pg.repayment_rate,
            },
        })
    }
}
