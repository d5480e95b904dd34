//! Marginal deduction rate decomposition
//!
//! Breaks the total rate at which extra earnings are lost into income tax,
//! national insurance, student loan, postgraduate loan, child benefit charge,
//! allowance taper and universal credit components. The total comes straight
//! from the net income series and is authoritative; the components are an
//! approximation and need not sum to it.

use log::debug;
use serde::{Deserialize, Serialize};

use super::gradient::IncomeAxis;
use super::simulation::{HouseholdDescription, SimulationProvider, SimulationSeries};
use crate::error::{CalcError, Result};
use crate::parameters::{BandTable, PostgradParameters, TaxParameters};

/// Universal credit rates above this count as an active taper
pub const UC_TAPER_CUTOFF: f64 = 0.01;

/// Incomes closer than this are the same grid point
const INCOME_TOLERANCE: f64 = 1e-6;

/// Rates and levels at one income
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MarginalRateRow {
    pub employment_income: f64,

    // Levels
    pub income_tax: f64,
    pub national_insurance: f64,
    pub student_loan_repayment: f64,
    pub postgrad_repayment: f64,
    pub universal_credit: f64,
    pub child_benefit: f64,
    pub hicbc_charge: f64,
    pub household_net_income: f64,

    // Marginal rates
    pub income_tax_marginal_rate: f64,
    pub ni_marginal_rate: f64,
    pub student_loan_marginal_rate: f64,
    pub postgrad_marginal_rate: f64,
    pub hicbc_marginal_rate: f64,
    pub pa_taper_marginal_rate: f64,
    pub uc_marginal_rate: f64,
    pub total_marginal_rate: f64,

    /// Added by an exact-income query between two grid points
    #[serde(default)]
    pub interpolated: bool,
}

impl MarginalRateRow {
    /// Levels interpolated between two rows, rates copied from `nearest`
    fn between(lower: &Self, upper: &Self, nearest: &Self, income: f64) -> Self {
        let weight = (income - lower.employment_income) / (upper.employment_income - lower.employment_income);
        let lerp = |a: f64, b: f64| a + (b - a) * weight;

        Self {
            employment_income: income,
            income_tax: lerp(lower.income_tax, upper.income_tax),
            national_insurance: lerp(lower.national_insurance, upper.national_insurance),
            student_loan_repayment: lerp(lower.student_loan_repayment, upper.student_loan_repayment),
            postgrad_repayment: lerp(lower.postgrad_repayment, upper.postgrad_repayment),
            universal_credit: lerp(lower.universal_credit, upper.universal_credit),
            child_benefit: lerp(lower.child_benefit, upper.child_benefit),
            hicbc_charge: lerp(lower.hicbc_charge, upper.hicbc_charge),
            household_net_income: lerp(lower.household_net_income, upper.household_net_income),
            interpolated: true,
            ..*nearest
        }
    }
}

/// Decomposed rows in increasing income order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarginalRateTable {
    pub rows: Vec<MarginalRateRow>,
}

impl MarginalRateTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row for an income inside the grid range
    ///
    /// A grid income returns its own row. Any other income gets a new row,
    /// inserted in order, whose levels are interpolated between the two
    /// neighbouring points and whose rates are those of the nearer point
    /// (the lower one on a tie).
    pub fn insert_exact_income(&mut self, income: f64) -> Result<&MarginalRateRow> {
        let (min, max) = match (self.rows.first(), self.rows.last()) {
            (Some(first), Some(last)) => (first.employment_income, last.employment_income),
            _ => return Err(CalcError::GridTooSmall(0)),
        };
        if !(income >= min - INCOME_TOLERANCE && income <= max + INCOME_TOLERANCE) {
            return Err(CalcError::IncomeOutsideGrid { income, min, max });
        }

        let pos = self
            .rows
            .partition_point(|row| row.employment_income < income - INCOME_TOLERANCE);
        if pos < self.rows.len() && (self.rows[pos].employment_income - income).abs() <= INCOME_TOLERANCE {
            return Ok(&self.rows[pos]);
        }

        let lower = &self.rows[pos - 1];
        let upper = &self.rows[pos];
        let nearest = if income - lower.employment_income <= upper.employment_income - income {
            lower
        } else {
            upper
        };
        let row = MarginalRateRow::between(lower, upper, nearest, income);

        self.rows.insert(pos, row);
        Ok(&self.rows[pos])
    }

    /// Headline figures for the table
    pub fn summary(&self) -> Result<MarginalRateSummary> {
        let first = self.rows.first().ok_or(CalcError::GridTooSmall(0))?;

        let mut max = first;
        for row in &self.rows[1..] {
            if row.total_marginal_rate > max.total_marginal_rate {
                max = row;
            }
        }

        let mut uc_active = self.rows.iter().filter(|row| row.uc_marginal_rate > UC_TAPER_CUTOFF);
        let uc_taper_starts = uc_active.next().map(|row| row.employment_income);
        let uc_taper_ends = uc_active.last().map(|row| row.employment_income).or(uc_taper_starts);

        Ok(MarginalRateSummary {
            max_marginal_rate: max.total_marginal_rate,
            max_marginal_rate_income: max.employment_income,
            uc_taper_starts,
            uc_taper_ends,
            has_uc_taper: uc_taper_starts.is_some(),
        })
    }
}

/// Headline figures from a decomposition
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarginalRateSummary {
    pub max_marginal_rate: f64,
    /// First income at which the maximum is reached
    pub max_marginal_rate_income: f64,
    pub uc_taper_starts: Option<f64>,
    pub uc_taper_ends: Option<f64>,
    pub has_uc_taper: bool,
}

/// Splits simulated series into marginal rate components
#[derive(Debug, Clone, Copy)]
pub struct MarginalRateDecomposer {
    bands: BandTable,
    postgrad: PostgradParameters,
}

impl MarginalRateDecomposer {
    pub fn new(bands: BandTable, postgrad: PostgradParameters) -> Self {
        Self { bands, postgrad }
    }

    /// Decomposer for one tax year
    pub fn from_parameters(parameters: &TaxParameters) -> Self {
        Self::new(parameters.bands, parameters.postgrad)
    }

    /// Sweep `household` with `provider` and decompose the result
    pub fn decompose<P>(
        &self,
        axis: &IncomeAxis,
        household: &HouseholdDescription,
        provider: &P,
    ) -> Result<MarginalRateTable>
    where
        P: SimulationProvider + ?Sized,
    {
        household.validate()?;
        let series = provider.sweep(household, axis)?;
        self.decompose_series(axis, household, &series)
    }

    /// Decompose series already aligned to `axis`
    pub fn decompose_series(
        &self,
        axis: &IncomeAxis,
        household: &HouseholdDescription,
        series: &SimulationSeries,
    ) -> Result<MarginalRateTable> {
        series.validate_len(axis.len())?;

        let clawback = series.clawback();
        let d_income_tax = axis.gradient("income_tax", &series.income_tax)?;
        let d_ni = axis.gradient("national_insurance", &series.national_insurance)?;
        let d_student_loan = axis.gradient("student_loan_repayment", &series.student_loan_repayment)?;
        let d_uc = axis.gradient("universal_credit", &series.universal_credit)?;
        let d_clawback = axis.gradient("clawback", &clawback)?;
        let d_net = axis.gradient("household_net_income", &series.household_net_income)?;

        let secondary_postgrad = household.repays_secondary_postgrad();

        let rows: Vec<MarginalRateRow> = axis
            .values()
            .iter()
            .enumerate()
            .map(|(i, &income)| {
                let (postgrad_repayment, postgrad_marginal_rate) = if secondary_postgrad {
                    (self.postgrad.repayment(income), self.postgrad.marginal_rate(income))
                } else {
                    (0.0, 0.0)
                };

                let hicbc_marginal_rate = d_clawback[i].clamp(0.0, 1.0);
                let pa_taper_marginal_rate = if self.bands.in_taper_window(income) {
                    (d_income_tax[i] - hicbc_marginal_rate - self.bands.band_rate(income)).max(0.0)
                } else {
                    0.0
                };

                MarginalRateRow {
                    employment_income: income,
                    income_tax: series.income_tax[i],
                    national_insurance: series.national_insurance[i],
                    student_loan_repayment: series.student_loan_repayment[i],
                    postgrad_repayment,
                    universal_credit: series.universal_credit[i],
                    child_benefit: series.child_benefit[i],
                    hicbc_charge: clawback[i],
                    household_net_income: series.household_net_income[i] - postgrad_repayment,
                    income_tax_marginal_rate: self.bands.band_rate(income),
                    ni_marginal_rate: d_ni[i],
                    student_loan_marginal_rate: d_student_loan[i],
                    postgrad_marginal_rate,
                    hicbc_marginal_rate,
                    pa_taper_marginal_rate,
                    uc_marginal_rate: (-d_uc[i]).clamp(0.0, 1.0),
                    total_marginal_rate: (1.0 - d_net[i] + postgrad_marginal_rate).clamp(0.0, 1.0),
                    interpolated: false,
                }
            })
            .collect();

        debug!(
            "decomposed {} points from {:.0} to {:.0}",
            rows.len(),
            axis.min(),
            axis.max()
        );

        Ok(MarginalRateTable { rows })
    }
}
