//! Core amortization engine for yearly student loan projections

use log::debug;
use serde::{Deserialize, Serialize};

use super::indexation::IndexationPolicy;
use super::state::LoanState;
use super::trajectory::{ScenarioTrajectory, TrajectoryRow};
use crate::error::{ensure_in_range, ensure_non_negative, Result};
use crate::parameters::PlanParameters;

/// Upper bound on salary growth and interest overrides
pub const MAX_RATE: f64 = 0.2;

/// Borrower inputs shared by every scenario
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoanInputs {
    /// Opening balance
    pub loan_amount: f64,

    /// Salary in the first repayment year
    pub starting_salary: f64,

    /// Annual salary growth
    pub salary_growth_rate: f64,
}

impl LoanInputs {
    /// Reject negative amounts and out-of-range growth
    pub fn validate(&self) -> Result<()> {
        ensure_non_negative("loan_amount", self.loan_amount)?;
        ensure_non_negative("starting_salary", self.starting_salary)?;
        ensure_in_range("salary_growth_rate", self.salary_growth_rate, 0.0, MAX_RATE)?;
        Ok(())
    }
}

/// Configuration for a projection run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionConfig {
    /// Tax year of the baseline (year 0)
    pub tax_year: i32,

    /// How the repayment threshold moves after the baseline
    pub indexation: IndexationPolicy,

    /// Replace the plan's interest rate
    pub interest_rate_override: Option<f64>,
}

impl ProjectionConfig {
    pub fn new(tax_year: i32, indexation: IndexationPolicy) -> Self {
        Self {
            tax_year,
            indexation,
            interest_rate_override: None,
        }
    }

    /// Same configuration with an interest override
    pub fn with_interest_rate(mut self, rate: Option<f64>) -> Self {
        self.interest_rate_override = rate;
        self
    }
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self::new(2026, IndexationPolicy::Constant)
    }
}

/// Main amortization engine
#[derive(Debug, Clone)]
pub struct AmortizationEngine {
    plan: PlanParameters,
    config: ProjectionConfig,
}

impl AmortizationEngine {
    /// Create an engine for one plan; any interest override is applied here
    pub fn new(plan: PlanParameters, config: ProjectionConfig) -> Self {
        let plan = match config.interest_rate_override {
            Some(rate) => plan.with_interest_rate(rate),
            None => plan,
        };
        Self { plan, config }
    }

    /// Plan terms the engine runs with
    pub fn plan(&self) -> &PlanParameters {
        &self.plan
    }

    pub fn config(&self) -> &ProjectionConfig {
        &self.config
    }

    /// Validate borrower inputs and the interest override
    pub fn validate(&self, inputs: &LoanInputs) -> Result<()> {
        inputs.validate()?;
        if let Some(rate) = self.config.interest_rate_override {
            ensure_in_range("interest_rate", rate, 0.0, MAX_RATE)?;
        }
        Ok(())
    }

    /// Threshold `year_index` years after the baseline
    pub fn threshold_at(&self, year_index: u32) -> f64 {
        self.config
            .indexation
            .threshold_for(self.plan.threshold, self.calendar_year(year_index))
    }

    pub fn calendar_year(&self, year_index: u32) -> i32 {
        self.config.tax_year + year_index as i32
    }

    /// Opening state and its baseline row
    pub fn baseline(&self, inputs: &LoanInputs) -> (LoanState, TrajectoryRow) {
        let state = LoanState::new(inputs.loan_amount, self.threshold_at(0));
        let row = TrajectoryRow::baseline(&state, self.calendar_year(0), inputs.starting_salary);
        (state, row)
    }

    /// Advance `state` by one year at `salary`
    ///
    /// In the final year of the write-off term any remaining balance is
    /// recorded as written off.
    pub fn step(&self, state: &LoanState, salary: f64) -> (LoanState, TrajectoryRow) {
        let year_index = state.year_index + 1;
        let threshold = self.threshold_at(year_index);
        let step = state.advance(salary, threshold, &self.plan);

        let mut row = TrajectoryRow::from_step(&step, self.calendar_year(year_index), salary);
        if year_index >= self.plan.writeoff_term && step.balance_after_repayment > 0.0 {
            row.written_off = step.state.balance;
        }

        (step.state, row)
    }

    /// Run the projection until the loan is repaid or written off
    pub fn project(&self, inputs: &LoanInputs) -> Result<ScenarioTrajectory> {
        self.validate(inputs)?;

        let mut trajectory = ScenarioTrajectory::new(inputs.loan_amount, self.plan.interest_rate);
        let (mut state, baseline) = self.baseline(inputs);
        trajectory.add_row(baseline);

        if state.is_repaid() {
            return Ok(trajectory);
        }

        let mut salary = inputs.starting_salary;
        for _year in 1..=self.plan.writeoff_term {
            let (next, row) = self.step(&state, salary);
            trajectory.add_row(row);
            state = next;

            // Repaid this year: no interest was charged and nothing follows
            if row.balance_after_repayment <= 0.0 {
                break;
            }

            salary *= 1.0 + inputs.salary_growth_rate;
        }

        // Term of zero years: the opening balance is forgiven immediately
        if self.plan.writeoff_term == 0 {
            if let Some(row) = trajectory.rows.last_mut() {
                row.written_off = row.balance;
            }
        }

        debug!(
            "projected {} years: repaid {:.2}, interest {:.2}, final balance {:.2}",
            state.year_index, state.cumulative_repaid, state.cumulative_interest, state.balance
        );

        Ok(trajectory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CalcError;
    use crate::parameters::InflationForecastTable;
    use crate::projection::FreezeWindow;
    use approx::assert_relative_eq;

    fn plan(threshold: f64, repayment_rate: f64, interest_rate: f64, writeoff_term: u32) -> PlanParameters {
        PlanParameters {
            threshold,
            repayment_rate,
            interest_rate,
            writeoff_term,
        }
    }

    fn inputs(loan_amount: f64, starting_salary: f64, salary_growth_rate: f64) -> LoanInputs {
        LoanInputs {
            loan_amount,
            starting_salary,
            salary_growth_rate,
        }
    }

    #[test]
    fn test_repayment_applied_before_interest() {
        let engine = AmortizationEngine::new(plan(0.0, 1.0, 0.1, 30), ProjectionConfig::default());
        let trajectory = engine.project(&inputs(1000.0, 500.0, 0.0)).unwrap();

        let year1 = &trajectory.rows[1];
        assert_relative_eq!(year1.repayment, 500.0);
        assert_relative_eq!(year1.balance_after_repayment, 500.0);
        assert_relative_eq!(year1.interest_charge, 50.0);
        assert_relative_eq!(year1.balance, 550.0);
    }

    #[test]
    fn test_below_threshold_compounds_freely() {
        let engine = AmortizationEngine::new(plan(30_000.0, 0.09, 0.05, 30), ProjectionConfig::default());
        let trajectory = engine.project(&inputs(40_000.0, 20_000.0, 0.0)).unwrap();

        assert_eq!(trajectory.len(), 31);
        for row in &trajectory.rows {
            assert_eq!(row.repayment, 0.0);
            assert_relative_eq!(
                row.balance,
                40_000.0 * 1.05_f64.powi(row.year as i32),
                max_relative = 1e-12
            );
        }

        // Balance grew past the original loan and was written off at the end of the term
        let last = trajectory.last().unwrap();
        assert!(last.balance > 40_000.0);
        assert_eq!(last.written_off, last.balance);
    }

    #[test]
    fn test_early_termination() {
        // 1000 balance, 600/year repayment, no interest: repaid in year 2
        let engine = AmortizationEngine::new(plan(0.0, 1.0, 0.0, 30), ProjectionConfig::default());
        let trajectory = engine.project(&inputs(1000.0, 600.0, 0.0)).unwrap();

        assert_eq!(trajectory.len(), 3);
        let last = trajectory.last().unwrap();
        assert_eq!(last.year, 2);
        assert_relative_eq!(last.repayment, 400.0);
        assert_eq!(last.interest_charge, 0.0);
        assert_eq!(last.balance, 0.0);
        assert_eq!(last.written_off, 0.0);
    }

    #[test]
    fn test_no_interest_in_payoff_year() {
        let engine = AmortizationEngine::new(plan(0.0, 1.0, 0.1, 30), ProjectionConfig::default());
        // Year 1: 1000 - 600 = 400, +40 interest = 440; year 2 repays 440
        let trajectory = engine.project(&inputs(1000.0, 600.0, 0.0)).unwrap();

        assert_eq!(trajectory.len(), 3);
        assert_relative_eq!(trajectory.rows[2].repayment, 440.0);
        assert_eq!(trajectory.rows[2].interest_charge, 0.0);
        assert_relative_eq!(trajectory.summary().unwrap().total_interest, 40.0);
    }

    #[test]
    fn test_zero_loan_has_only_baseline() {
        let engine = AmortizationEngine::new(plan(25_000.0, 0.09, 0.05, 30), ProjectionConfig::default());
        let trajectory = engine.project(&inputs(0.0, 50_000.0, 0.03)).unwrap();

        assert_eq!(trajectory.len(), 1);
        assert_eq!(trajectory.rows[0].balance, 0.0);
    }

    #[test]
    fn test_salary_grows_geometrically() {
        let engine = AmortizationEngine::new(plan(1e9, 0.09, 0.0, 5), ProjectionConfig::default());
        let trajectory = engine.project(&inputs(1000.0, 30_000.0, 0.1)).unwrap();

        assert_eq!(trajectory.rows[0].salary, 30_000.0);
        assert_eq!(trajectory.rows[1].salary, 30_000.0);
        assert_relative_eq!(trajectory.rows[2].salary, 33_000.0, max_relative = 1e-12);
        assert_relative_eq!(trajectory.rows[5].salary, 30_000.0 * 1.1_f64.powi(4), max_relative = 1e-12);
    }

    #[test]
    fn test_indexation_moves_threshold() {
        let config = ProjectionConfig::new(
            2026,
            IndexationPolicy::frozen(2026, FreezeWindow::new(2027, 2029).unwrap(), InflationForecastTable::flat(0.1)),
        );
        let engine = AmortizationEngine::new(plan(1000.0, 0.09, 0.0, 5), config);
        let trajectory = engine.project(&inputs(1e6, 0.0, 0.0)).unwrap();

        let thresholds: Vec<f64> = trajectory.rows.iter().map(|r| r.threshold).collect();
        assert_eq!(thresholds[0], 1000.0);
        assert_eq!(thresholds[1], 1000.0); // 2027 frozen
        assert_eq!(thresholds[2], 1000.0); // 2028 frozen
        assert_relative_eq!(thresholds[3], 1100.0); // 2029
        assert_eq!(trajectory.rows[3].calendar_year, 2029);
    }

    #[test]
    fn test_interest_override() {
        let config = ProjectionConfig::default().with_interest_rate(Some(0.0));
        let engine = AmortizationEngine::new(plan(0.0, 0.0, 0.07, 3), config);
        let trajectory = engine.project(&inputs(1000.0, 0.0, 0.0)).unwrap();

        assert_eq!(trajectory.interest_rate, 0.0);
        assert_eq!(trajectory.last().unwrap().balance, 1000.0);
    }

    #[test]
    fn test_input_validation() {
        let engine = AmortizationEngine::new(plan(0.0, 0.09, 0.05, 30), ProjectionConfig::default());

        assert!(matches!(
            engine.project(&inputs(-1.0, 30_000.0, 0.03)),
            Err(CalcError::NegativeAmount { field: "loan_amount", .. })
        ));
        assert!(matches!(
            engine.project(&inputs(1000.0, 30_000.0, 0.25)),
            Err(CalcError::OutOfRange { field: "salary_growth_rate", .. })
        ));

        let bad_override = AmortizationEngine::new(
            plan(0.0, 0.09, 0.05, 30),
            ProjectionConfig::default().with_interest_rate(Some(0.5)),
        );
        assert!(bad_override.project(&inputs(1000.0, 30_000.0, 0.03)).is_err());
    }
}
