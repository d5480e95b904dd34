//! Side-by-side scenario comparisons
//!
//! Both comparators advance two independently owned [`LoanState`] values with
//! the same [`AmortizationEngine::step`], so the sides never share state.

use log::debug;
use serde::{Deserialize, Serialize};

use super::engine::{AmortizationEngine, LoanInputs, ProjectionConfig};
use super::indexation::{FreezeWindow, IndexationPolicy};
use super::state::LoanState;
use super::trajectory::{ScenarioTrajectory, TrajectoryRow};
use crate::error::{CalcError, Result};
use crate::parameters::{InflationForecastTable, PlanParameters};

/// One year of a frozen vs indexed threshold comparison
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PolicyComparisonRow {
    pub year: u32,
    pub calendar_year: i32,
    pub salary: f64,
    pub threshold_frozen: f64,
    pub threshold_indexed: f64,
    pub repayment_frozen: f64,
    pub repayment_indexed: f64,
    pub balance_frozen: f64,
    pub balance_indexed: f64,
    /// Extra repaid this year because of the freeze
    pub annual_impact: f64,
    /// Running total of `annual_impact`
    pub cumulative_impact: f64,
}

impl PolicyComparisonRow {
    fn new(frozen: &TrajectoryRow, indexed: &TrajectoryRow, cumulative_impact: f64) -> Self {
        Self {
            year: frozen.year,
            calendar_year: frozen.calendar_year,
            salary: frozen.salary,
            threshold_frozen: frozen.threshold,
            threshold_indexed: indexed.threshold,
            repayment_frozen: frozen.repayment,
            repayment_indexed: indexed.repayment,
            balance_frozen: frozen.balance,
            balance_indexed: indexed.balance,
            annual_impact: frozen.repayment - indexed.repayment,
            cumulative_impact,
        }
    }
}

/// Result of a [`ScenarioComparator`] run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyComparison {
    pub rows: Vec<PolicyComparisonRow>,
}

impl PolicyComparison {
    fn last(&self) -> Result<&PolicyComparisonRow> {
        self.rows.last().ok_or(CalcError::EmptyTrajectory)
    }

    /// Total extra repaid under the freeze
    pub fn extra_repaid(&self) -> Result<f64> {
        Ok(self.last()?.cumulative_impact)
    }

    /// Threshold in the final year had it stayed linked to inflation
    pub fn final_indexed_threshold(&self) -> Result<f64> {
        Ok(self.last()?.threshold_indexed)
    }
}

/// Compares a frozen-threshold scenario against a fully indexed one
#[derive(Debug, Clone)]
pub struct ScenarioComparator {
    frozen: AmortizationEngine,
    indexed: AmortizationEngine,
}

impl ScenarioComparator {
    /// Freeze over `window`, otherwise index both sides from `tax_year`
    pub fn new(
        plan: PlanParameters,
        tax_year: i32,
        window: FreezeWindow,
        inflation: InflationForecastTable,
        interest_rate_override: Option<f64>,
    ) -> Self {
        let frozen = ProjectionConfig::new(tax_year, IndexationPolicy::frozen(tax_year, window, inflation.clone()))
            .with_interest_rate(interest_rate_override);
        let indexed = ProjectionConfig::new(tax_year, IndexationPolicy::indexed(tax_year, inflation))
            .with_interest_rate(interest_rate_override);
        Self::with_configs(plan, frozen, indexed)
    }

    /// Compare two arbitrary configurations of the same plan
    pub fn with_configs(plan: PlanParameters, frozen: ProjectionConfig, indexed: ProjectionConfig) -> Self {
        Self {
            frozen: AmortizationEngine::new(plan, frozen),
            indexed: AmortizationEngine::new(plan, indexed),
        }
    }

    /// Step both scenarios in lockstep
    ///
    /// A side that has been repaid keeps advancing with zero repayment so the
    /// rows stay aligned; the run ends once both are repaid or the term ends.
    pub fn compare(&self, inputs: &LoanInputs) -> Result<PolicyComparison> {
        self.frozen.validate(inputs)?;
        self.indexed.validate(inputs)?;

        let (mut frozen, frozen_row) = self.frozen.baseline(inputs);
        let (mut indexed, indexed_row) = self.indexed.baseline(inputs);

        let mut cumulative_impact = 0.0;
        let mut rows = vec![PolicyComparisonRow::new(&frozen_row, &indexed_row, cumulative_impact)];

        let mut salary = inputs.starting_salary;
        let term = self.frozen.plan().writeoff_term;
        while frozen.year_index < term && !(frozen.is_repaid() && indexed.is_repaid()) {
            let (next_frozen, frozen_row) = self.frozen.step(&frozen, salary);
            let (next_indexed, indexed_row) = self.indexed.step(&indexed, salary);

            cumulative_impact += frozen_row.repayment - indexed_row.repayment;
            rows.push(PolicyComparisonRow::new(&frozen_row, &indexed_row, cumulative_impact));

            frozen = next_frozen;
            indexed = next_indexed;

            if frozen_row.balance_after_repayment <= 0.0 && indexed_row.balance_after_repayment <= 0.0 {
                break;
            }
            salary *= 1.0 + inputs.salary_growth_rate;
        }

        debug!("policy comparison over {} years: impact {:.2}", frozen.year_index, cumulative_impact);
        Ok(PolicyComparison { rows })
    }
}

/// One year of a with/without interest comparison
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InterestComparisonRow {
    pub year: u32,
    pub calendar_year: i32,
    pub salary: f64,
    pub balance_with_interest: f64,
    pub balance_without_interest: f64,
    pub repayment_with_interest: f64,
    pub repayment_without_interest: f64,
    pub interest_charge: f64,
    pub total_interest_paid: f64,
    pub total_repaid_with_interest: f64,
    pub total_repaid_without_interest: f64,
}

/// Result of an [`InterestImpactComparator`] run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterestComparison {
    pub with_interest: ScenarioTrajectory,
    pub without_interest: ScenarioTrajectory,
    /// Merged table running to the longer trajectory
    pub rows: Vec<InterestComparisonRow>,
}

impl InterestComparison {
    /// Total interest charged on the interest-bearing side
    pub fn total_interest(&self) -> Result<f64> {
        Ok(self.with_interest.last()?.total_interest)
    }
}

/// Compares the configured interest rate against an interest-free loan
#[derive(Debug, Clone)]
pub struct InterestImpactComparator {
    with_interest: AmortizationEngine,
    without_interest: AmortizationEngine,
}

impl InterestImpactComparator {
    pub fn new(plan: PlanParameters, config: ProjectionConfig) -> Self {
        let interest_free = config.clone().with_interest_rate(Some(0.0));
        Self {
            with_interest: AmortizationEngine::new(plan, config),
            without_interest: AmortizationEngine::new(plan, interest_free),
        }
    }

    /// Run both sides; each stops independently when repaid
    pub fn compare(&self, inputs: &LoanInputs) -> Result<InterestComparison> {
        self.with_interest.validate(inputs)?;

        let with_interest = self.with_interest.project(inputs)?;
        let without_interest = self.without_interest.project(inputs)?;

        let len = with_interest.len().max(without_interest.len());
        let mut rows = Vec::with_capacity(len);
        for i in 0..len {
            let with = row_or_settled(&with_interest, i)?;
            let without = row_or_settled(&without_interest, i)?;
            let salary = with_interest
                .rows
                .get(i)
                .or_else(|| without_interest.rows.get(i))
                .map_or(with.salary, |r| r.salary);

            rows.push(InterestComparisonRow {
                year: i as u32,
                calendar_year: self.with_interest.calendar_year(i as u32),
                salary,
                balance_with_interest: with.balance,
                balance_without_interest: without.balance,
                repayment_with_interest: with.repayment,
                repayment_without_interest: without.repayment,
                interest_charge: with.interest_charge,
                total_interest_paid: with.total_interest,
                total_repaid_with_interest: with.total_repaid,
                total_repaid_without_interest: without.total_repaid,
            });
        }

        Ok(InterestComparison {
            with_interest,
            without_interest,
            rows,
        })
    }
}

/// Row `i`, or the settled final state once the trajectory has ended
fn row_or_settled(trajectory: &ScenarioTrajectory, i: usize) -> Result<TrajectoryRow> {
    if let Some(row) = trajectory.rows.get(i) {
        return Ok(*row);
    }
    let last = trajectory.last()?;
    let settled = LoanState {
        year_index: i as u32,
        balance: last.balance,
        cumulative_repaid: last.total_repaid,
        cumulative_interest: last.total_interest,
        current_threshold: last.threshold,
    };
    Ok(TrajectoryRow::baseline(&settled, last.calendar_year, last.salary))
}
