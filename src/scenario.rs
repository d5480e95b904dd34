//! Scenario runner for calculator and marginal rate requests
//!
//! Looks the year's parameters up once per request, then runs the
//! independent projections of a calculation in parallel.

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{ensure_in_range, ensure_non_negative, Result};
use crate::marginal::{
    HouseholdDescription, IncomeAxis, MarginalRateDecomposer, MarginalRateRow, MarginalRateSummary,
    SimulationProvider,
};
use crate::parameters::{validate_tax_year, InflationForecastTable, Plan, TaxParameterProvider};
use crate::projection::{
    AmortizationEngine, FreezeWindow, IndexationPolicy, InterestComparison, InterestImpactComparator, LoanInputs,
    PolicyComparison, ProjectionConfig, ScenarioComparator, ScenarioTrajectory, MAX_RATE,
};

/// Points on the marginal rate income grid
pub const MTR_GRID_POINTS: usize = 81;

pub const MIN_INCOME_MAX: f64 = 20_000.0;
pub const MAX_INCOME_MAX: f64 = 200_000.0;

/// Inputs to a loan calculation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculatorRequest {
    #[serde(default = "default_starting_salary")]
    pub starting_salary: f64,

    #[serde(default = "default_loan_amount")]
    pub loan_amount: f64,

    #[serde(default = "default_plan")]
    pub plan: Plan,

    #[serde(default = "default_salary_growth_rate")]
    pub salary_growth_rate: f64,

    /// Tax year of the first projection year
    #[serde(default = "default_year")]
    pub year: i32,

    #[serde(default)]
    pub has_postgrad: bool,

    /// Postgraduate balance; a separate projection runs when positive
    #[serde(default)]
    pub postgrad_balance: f64,

    /// Replaces the plan's interest rate
    #[serde(default)]
    pub interest_rate: Option<f64>,
}

fn default_starting_salary() -> f64 { 30_000.0 }
fn default_loan_amount() -> f64 { 45_000.0 }
fn default_plan() -> Plan { Plan::Plan2 }
fn default_salary_growth_rate() -> f64 { 0.03 }
fn default_year() -> i32 { 2026 }
fn default_income_max() -> f64 { 150_000.0 }

impl Default for CalculatorRequest {
    fn default() -> Self {
        Self {
            starting_salary: default_starting_salary(),
            loan_amount: default_loan_amount(),
            plan: default_plan(),
            salary_growth_rate: default_salary_growth_rate(),
            year: default_year(),
            has_postgrad: false,
            postgrad_balance: 0.0,
            interest_rate: None,
        }
    }
}

impl CalculatorRequest {
    pub fn inputs(&self) -> LoanInputs {
        LoanInputs {
            loan_amount: self.loan_amount,
            starting_salary: self.starting_salary,
            salary_growth_rate: self.salary_growth_rate,
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_tax_year(self.year)?;
        self.inputs().validate()?;
        ensure_non_negative("postgrad_balance", self.postgrad_balance)?;
        if let Some(rate) = self.interest_rate {
            ensure_in_range("interest_rate", rate, 0.0, MAX_RATE)?;
        }
        Ok(())
    }
}

/// Headline figures of a calculation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalculationSummary {
    pub total_repaid: f64,
    pub written_off: f64,
    /// Final projection year, whether repaid or written off
    pub years_to_repay: u32,
    pub original_loan: f64,
    pub total_interest: f64,
    pub interest_rate: f64,
    /// Extra repaid because of the threshold freeze
    pub extra_from_freeze: f64,
    /// Plan threshold in the request year
    pub threshold: f64,
    /// Final-year threshold had it stayed linked to inflation
    pub threshold_if_linked: f64,
}

/// Everything a calculation produces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationResult {
    pub lifetime: ScenarioTrajectory,
    pub interest_comparison: InterestComparison,
    pub policy_comparison: PolicyComparison,
    pub postgrad_lifetime: Option<ScenarioTrajectory>,
    pub summary: CalculationSummary,
}

/// Inputs to a marginal rate decomposition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MtrRequest {
    #[serde(default = "default_year")]
    pub year: i32,

    #[serde(flatten)]
    pub household: HouseholdDescription,

    /// Top of the income grid, which always starts at zero
    #[serde(default = "default_income_max")]
    pub income_max: f64,

    /// Also report the row for this income
    #[serde(default)]
    pub exact_income: Option<f64>,
}

impl Default for MtrRequest {
    fn default() -> Self {
        Self {
            year: default_year(),
            household: HouseholdDescription::default(),
            income_max: default_income_max(),
            exact_income: None,
        }
    }
}

impl MtrRequest {
    pub fn validate(&self) -> Result<()> {
        validate_tax_year(self.year)?;
        self.household.validate()?;
        ensure_in_range("income_max", self.income_max, MIN_INCOME_MAX, MAX_INCOME_MAX)?;
        if let Some(income) = self.exact_income {
            ensure_in_range("exact_income", income, 0.0, MAX_INCOME_MAX)?;
        }
        Ok(())
    }

    /// Income grid from zero to `income_max`
    pub fn axis(&self) -> Result<IncomeAxis> {
        IncomeAxis::linspace(0.0, self.income_max, MTR_GRID_POINTS)
    }
}

/// Everything a marginal rate decomposition produces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MtrResult {
    pub rows: Vec<MarginalRateRow>,
    pub summary: MarginalRateSummary,
    pub exact: Option<MarginalRateRow>,
    pub household: HouseholdDescription,
}

/// Runs calculations against one parameter source
///
/// # Example
/// ```ignore
/// let runner = ScenarioRunner::new(CachedParameters::new(BuiltinParameters::new()));
/// let result = runner.calculate(&CalculatorRequest::default())?;
/// println!("{:.2}", result.summary.total_repaid);
/// ```
#[derive(Debug, Clone)]
pub struct ScenarioRunner<P> {
    parameters: P,
    inflation: InflationForecastTable,
    freeze: FreezeWindow,
}

impl<P: TaxParameterProvider> ScenarioRunner<P> {
    /// Runner with the default inflation forecast and freeze window
    pub fn new(parameters: P) -> Self {
        Self {
            parameters,
            inflation: InflationForecastTable::default_forecast(),
            freeze: FreezeWindow::default(),
        }
    }

    pub fn with_inflation(mut self, inflation: InflationForecastTable) -> Self {
        self.inflation = inflation;
        self
    }

    pub fn with_freeze_window(mut self, freeze: FreezeWindow) -> Self {
        self.freeze = freeze;
        self
    }

    pub fn parameters(&self) -> &P {
        &self.parameters
    }

    /// Projection configuration: threshold frozen over the window, then indexed
    pub fn projection_config(&self, year: i32, interest_rate: Option<f64>) -> ProjectionConfig {
        ProjectionConfig::new(
            year,
            IndexationPolicy::frozen(year, self.freeze, self.inflation.clone()),
        )
        .with_interest_rate(interest_rate)
    }

    /// Lifetime projection for one plan
    pub fn lifetime(
        &self,
        plan: Plan,
        year: i32,
        inputs: &LoanInputs,
        interest_rate: Option<f64>,
    ) -> Result<ScenarioTrajectory> {
        validate_tax_year(year)?;
        let plan_parameters = self.parameters.get(year)?.plan(plan)?;
        AmortizationEngine::new(plan_parameters, self.projection_config(year, interest_rate)).project(inputs)
    }

    /// Lifetime projection, interest comparison, freeze comparison and
    /// optional postgraduate projection for one request
    pub fn calculate(&self, request: &CalculatorRequest) -> Result<CalculationResult> {
        request.validate()?;

        let parameters = self.parameters.get(request.year)?;
        let plan = parameters.plan(request.plan)?;
        let inputs = request.inputs();
        let config = self.projection_config(request.year, request.interest_rate);

        let lifetime_engine = AmortizationEngine::new(plan, config.clone());
        let interest = InterestImpactComparator::new(plan, config);
        let freeze = ScenarioComparator::new(
            plan,
            request.year,
            self.freeze,
            self.inflation.clone(),
            request.interest_rate,
        );

        let postgrad_engine = if request.postgrad_balance > 0.0 {
            let postgrad = parameters.plan(Plan::Postgraduate)?;
            Some(AmortizationEngine::new(postgrad, self.projection_config(request.year, None)))
        } else {
            None
        };
        let postgrad_inputs = LoanInputs {
            loan_amount: request.postgrad_balance,
            ..inputs
        };

        let ((lifetime, interest_comparison), (policy_comparison, postgrad_lifetime)) = rayon::join(
            || rayon::join(|| lifetime_engine.project(&inputs), || interest.compare(&inputs)),
            || {
                rayon::join(
                    || freeze.compare(&inputs),
                    || postgrad_engine.as_ref().map(|engine| engine.project(&postgrad_inputs)).transpose(),
                )
            },
        );
        let lifetime = lifetime?;
        let interest_comparison = interest_comparison?;
        let policy_comparison = policy_comparison?;
        let postgrad_lifetime = postgrad_lifetime?;

        let totals = lifetime.summary()?;
        let summary = CalculationSummary {
            total_repaid: totals.total_repaid,
            written_off: totals.written_off,
            years_to_repay: totals.years,
            original_loan: request.loan_amount,
            total_interest: interest_comparison.total_interest()?,
            interest_rate: totals.interest_rate,
            extra_from_freeze: policy_comparison.extra_repaid()?,
            threshold: plan.threshold,
            threshold_if_linked: policy_comparison.final_indexed_threshold()?,
        };

        info!(
            "{} calculation for {}: repaid {:.2} over {} years, written off {:.2}",
            request.plan, request.year, summary.total_repaid, summary.years_to_repay, summary.written_off
        );

        Ok(CalculationResult {
            lifetime,
            interest_comparison,
            policy_comparison,
            postgrad_lifetime,
            summary,
        })
    }

    /// Decompose marginal rates over the request's income grid
    pub fn marginal_rates<S>(&self, request: &MtrRequest, provider: &S) -> Result<MtrResult>
    where
        S: SimulationProvider + ?Sized,
    {
        request.validate()?;

        let parameters = self.parameters.get(request.year)?;
        let axis = request.axis()?;
        let mut table = MarginalRateDecomposer::from_parameters(&parameters).decompose(
            &axis,
            &request.household,
            provider,
        )?;

        let exact = match request.exact_income {
            Some(income) => Some(*table.insert_exact_income(income)?),
            None => None,
        };
        let summary = table.summary()?;

        info!(
            "marginal rates for {}: max {:.3} at {:.0}",
            request.year, summary.max_marginal_rate, summary.max_marginal_rate_income
        );

        Ok(MtrResult {
            rows: table.rows,
            summary,
            exact,
            household: request.household.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CalcError;
    use crate::marginal::{SimulationSeries, SuppliedSeries};
    use crate::parameters::{BuiltinParameters, CachedParameters};
    use approx::assert_relative_eq;

    fn runner() -> ScenarioRunner<CachedParameters<BuiltinParameters>> {
        ScenarioRunner::new(CachedParameters::new(BuiltinParameters::new()))
    }

    #[test]
    fn test_request_defaults() {
        let request: CalculatorRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(request, CalculatorRequest::default());
        assert_eq!(request.plan, Plan::Plan2);
        assert_eq!(request.loan_amount, 45_000.0);

        let request: CalculatorRequest = serde_json::from_str(r#"{"plan": "postgrad", "year": 2027}"#).unwrap();
        assert_eq!(request.plan, Plan::Postgraduate);
        assert_eq!(request.year, 2027);
    }

    #[test]
    fn test_calculate_default_request() {
        let result = runner().calculate(&CalculatorRequest::default()).unwrap();

        let summary = result.summary;
        assert_eq!(summary.original_loan, 45_000.0);
        assert_eq!(summary.threshold, 29_385.0);
        assert_relative_eq!(summary.interest_rate, 0.047, epsilon = 1e-12);
        assert!(summary.total_repaid > 0.0);
        assert!(summary.years_to_repay <= 30);
        assert!(summary.extra_from_freeze >= 0.0);
        assert!(summary.threshold_if_linked > summary.threshold);
        assert!(result.postgrad_lifetime.is_none());

        assert_eq!(result.lifetime.rows[0].calendar_year, 2026);
        assert_eq!(result.interest_comparison.without_interest.interest_rate, 0.0);
    }

    #[test]
    fn test_calculate_with_postgrad_balance() {
        let request = CalculatorRequest {
            postgrad_balance: 12_000.0,
            ..Default::default()
        };
        let result = runner().calculate(&request).unwrap();

        let postgrad = result.postgrad_lifetime.unwrap();
        assert_eq!(postgrad.loan_amount, 12_000.0);
        assert_relative_eq!(postgrad.interest_rate, 0.062, epsilon = 1e-12);
    }

    #[test]
    fn test_interest_override_used() {
        let request = CalculatorRequest {
            interest_rate: Some(0.0),
            ..Default::default()
        };
        let result = runner().calculate(&request).unwrap();
        assert_eq!(result.summary.interest_rate, 0.0);
        assert_eq!(result.summary.total_interest, 0.0);
    }

    #[test]
    fn test_calculate_validation() {
        let runner = runner();

        let bad_year = CalculatorRequest {
            year: 2031,
            ..Default::default()
        };
        assert!(matches!(runner.calculate(&bad_year), Err(CalcError::UnsupportedYear { .. })));

        let bad_rate = CalculatorRequest {
            interest_rate: Some(0.3),
            ..Default::default()
        };
        assert!(runner.calculate(&bad_rate).unwrap_err().is_validation());

        let negative = CalculatorRequest {
            postgrad_balance: -5.0,
            ..Default::default()
        };
        assert!(runner.calculate(&negative).unwrap_err().is_validation());
    }

    #[test]
    fn test_parameters_looked_up_once_per_year() {
        let runner = runner();
        runner.calculate(&CalculatorRequest::default()).unwrap();
        runner.calculate(&CalculatorRequest::default()).unwrap();

        let stats = runner.parameters().stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
    }

    #[test]
    fn test_lifetime_for_each_plan() {
        let runner = runner();
        let inputs = CalculatorRequest::default().inputs();
        for plan in Plan::ALL {
            let trajectory = runner.lifetime(plan, 2026, &inputs, None).unwrap();
            assert!(!trajectory.is_empty());
        }
    }

    #[test]
    fn test_mtr_request_from_json() {
        let request: MtrRequest =
            serde_json::from_str(r#"{"student_loan_plan": "PLAN_1", "num_children": 2, "exact_income": 31000}"#)
                .unwrap();
        assert_eq!(request.year, 2026);
        assert_eq!(request.income_max, 150_000.0);
        assert_eq!(request.household.student_loan_plan, Some(Plan::Plan1));
        assert_eq!(request.household.num_children, 2);
        assert_eq!(request.exact_income, Some(31_000.0));
    }

    #[test]
    fn test_marginal_rates_with_supplied_series() {
        let request = MtrRequest {
            income_max: 80_000.0,
            exact_income: Some(30_500.0),
            ..Default::default()
        };
        let axis = request.axis().unwrap();
        assert_eq!(axis.len(), MTR_GRID_POINTS);

        // Flat 30% deduction on every pound
        let mut series = SimulationSeries::zeros(axis.len());
        series.household_net_income = axis.values().iter().map(|y| 0.7 * y).collect();
        let provider = SuppliedSeries::new(axis.values().to_vec(), series).unwrap();

        let result = runner().marginal_rates(&request, &provider).unwrap();

        assert_eq!(result.rows.len(), MTR_GRID_POINTS + 1);
        let exact = result.exact.unwrap();
        assert!(exact.interpolated);
        assert_relative_eq!(exact.household_net_income, 0.7 * 30_500.0, max_relative = 1e-12);
        assert_relative_eq!(result.summary.max_marginal_rate, 0.3, epsilon = 1e-9);
        assert!(!result.summary.has_uc_taper);
    }

    #[test]
    fn test_marginal_rates_validation() {
        let runner = runner();
        let provider = SuppliedSeries::new(vec![0.0, 1.0], SimulationSeries::zeros(2)).unwrap();

        let low_max = MtrRequest {
            income_max: 10_000.0,
            ..Default::default()
        };
        assert!(matches!(
            runner.marginal_rates(&low_max, &provider),
            Err(CalcError::OutOfRange { field: "income_max", .. })
        ));

        // Series computed on a different grid
        let err = runner.marginal_rates(&MtrRequest::default(), &provider).unwrap_err();
        assert!(matches!(err, CalcError::Provider(_)));
        assert!(!err.is_validation());
    }
}
