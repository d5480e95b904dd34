//! Loan state tracking for a single scenario

use serde::{Deserialize, Serialize};

use crate::parameters::PlanParameters;

/// State of a loan at the end of a projection year
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoanState {
    /// Years since the baseline (0 = baseline)
    pub year_index: u32,

    /// Outstanding balance after interest
    pub balance: f64,

    /// Total repaid so far
    pub cumulative_repaid: f64,

    /// Total interest charged so far
    pub cumulative_interest: f64,

    /// Repayment threshold used this year
    pub current_threshold: f64,
}

/// Result of advancing a loan by one year
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YearStep {
    pub state: LoanState,
    pub repayment: f64,
    pub balance_after_repayment: f64,
    pub interest_charge: f64,
}

impl LoanState {
    /// Baseline state before any repayment or interest
    pub fn new(loan_amount: f64, threshold: f64) -> Self {
        Self {
            year_index: 0,
            balance: loan_amount,
            cumulative_repaid: 0.0,
            cumulative_interest: 0.0,
            current_threshold: threshold,
        }
    }

    /// Whether nothing remains to repay
    pub fn is_repaid(&self) -> bool {
        self.balance <= 0.0
    }

    /// Advance one year: repay first, then charge interest on what is left
    ///
    /// Repayment is capped at the balance, so a repaid loan keeps advancing
    /// with zero repayment and zero interest.
    pub fn advance(&self, salary: f64, threshold: f64, plan: &PlanParameters) -> YearStep {
        let due = ((salary - threshold) * plan.repayment_rate).max(0.0);
        let repayment = due.min(self.balance.max(0.0));

        let balance_after_repayment = (self.balance - repayment).max(0.0);
        let interest_charge = balance_after_repayment * plan.interest_rate;

        YearStep {
            state: LoanState {
                year_index: self.year_index + 1,
                balance: balance_after_repayment + interest_charge,
                cumulative_repaid: self.cumulative_repaid + repayment,
                cumulative_interest: self.cumulative_interest + interest_charge,
                current_threshold: threshold,
            },
            repayment,
            balance_after_repayment,
            interest_charge,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn plan(repayment_rate: f64, interest_rate: f64) -> PlanParameters {
        PlanParameters {
            threshold: 0.0,
            repayment_rate,
            interest_rate,
            writeoff_term: 30,
        }
    }

    #[test]
    fn test_repayment_before_interest() {
        let state = LoanState::new(1000.0, 0.0);
        let step = state.advance(500.0, 0.0, &plan(1.0, 0.1));

        assert_relative_eq!(step.repayment, 500.0);
        assert_relative_eq!(step.balance_after_repayment, 500.0);
        assert_relative_eq!(step.interest_charge, 50.0);
        assert_relative_eq!(step.state.balance, 550.0);
        assert_eq!(step.state.year_index, 1);
    }

    #[test]
    fn test_repayment_capped_at_balance() {
        let state = LoanState::new(300.0, 0.0);
        let step = state.advance(10_000.0, 0.0, &plan(0.09, 0.05));

        assert_eq!(step.repayment, 300.0);
        assert_eq!(step.balance_after_repayment, 0.0);
        assert_eq!(step.interest_charge, 0.0);
        assert!(step.state.is_repaid());
    }

    #[test]
    fn test_below_threshold_compounds() {
        let state = LoanState::new(1000.0, 25_000.0);
        let step = state.advance(20_000.0, 25_000.0, &plan(0.09, 0.05));

        assert_eq!(step.repayment, 0.0);
        assert_relative_eq!(step.state.balance, 1050.0);
        assert_relative_eq!(step.state.cumulative_interest, 50.0);
    }

    #[test]
    fn test_repaid_loan_stays_repaid() {
        let state = LoanState::new(0.0, 0.0);
        let step = state.advance(50_000.0, 10_000.0, &plan(0.09, 0.05));

        assert_eq!(step.repayment, 0.0);
        assert_eq!(step.state.balance, 0.0);
        assert_eq!(step.state.current_threshold, 10_000.0);
    }
}
