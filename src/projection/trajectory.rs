//! Trajectory output structures for projections

use serde::{Deserialize, Serialize};

use super::state::{LoanState, YearStep};
use crate::error::{CalcError, Result};

/// A single year of projection output
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryRow {
    // Timing
    pub year: u32,
    pub calendar_year: i32,

    // Income
    pub salary: f64,
    pub threshold: f64,

    // Flows for the year
    pub repayment: f64,
    pub balance_after_repayment: f64,
    pub interest_charge: f64,

    // Balances
    pub balance: f64,
    pub total_repaid: f64,
    pub total_interest: f64,

    /// Balance forgiven at the end of the write-off term
    pub written_off: f64,
}

impl TrajectoryRow {
    /// Baseline row: no repayment, no interest
    pub fn baseline(state: &LoanState, calendar_year: i32, salary: f64) -> Self {
        Self {
            year: state.year_index,
            calendar_year,
            salary,
            threshold: state.current_threshold,
            repayment: 0.0,
            balance_after_repayment: state.balance,
            interest_charge: 0.0,
            balance: state.balance,
            total_repaid: state.cumulative_repaid,
            total_interest: state.cumulative_interest,
            written_off: 0.0,
        }
    }

    /// Row recording one advanced year
    pub fn from_step(step: &YearStep, calendar_year: i32, salary: f64) -> Self {
        Self {
            year: step.state.year_index,
            calendar_year,
            salary,
            threshold: step.state.current_threshold,
            repayment: step.repayment,
            balance_after_repayment: step.balance_after_repayment,
            interest_charge: step.interest_charge,
            balance: step.state.balance,
            total_repaid: step.state.cumulative_repaid,
            total_interest: step.state.cumulative_interest,
            written_off: 0.0,
        }
    }
}

/// Complete single-scenario projection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioTrajectory {
    /// Opening balance
    pub loan_amount: f64,

    /// Interest rate the projection ran with
    pub interest_rate: f64,

    /// Yearly rows, year 0 first
    pub rows: Vec<TrajectoryRow>,
}

impl ScenarioTrajectory {
    pub fn new(loan_amount: f64, interest_rate: f64) -> Self {
        Self {
            loan_amount,
            interest_rate,
            rows: Vec::new(),
        }
    }

    /// Add a row
    pub fn add_row(&mut self, row: TrajectoryRow) {
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Final row
    pub fn last(&self) -> Result<&TrajectoryRow> {
        self.rows.last().ok_or(CalcError::EmptyTrajectory)
    }

    /// Summary statistics
    pub fn summary(&self) -> Result<TrajectorySummary> {
        let last = self.last()?;

        Ok(TrajectorySummary {
            original_loan: self.loan_amount,
            interest_rate: self.interest_rate,
            years: last.year,
            total_repaid: last.total_repaid,
            total_interest: last.total_interest,
            written_off: last.written_off,
            final_balance: last.balance,
            paid_off: last.balance <= 0.0,
        })
    }
}

/// Summary statistics for a trajectory
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrajectorySummary {
    pub original_loan: f64,
    pub interest_rate: f64,
    /// Index of the final year (years to repay when paid off)
    pub years: u32,
    pub total_repaid: f64,
    pub total_interest: f64,
    pub written_off: f64,
    pub final_balance: f64,
    pub paid_off: bool,
}
