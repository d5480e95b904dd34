//! Household simulation inputs and supplied series
//!
//! The decomposer never computes taxes or benefits itself. A
//! [`SimulationProvider`] sweeps a household across an income grid and
//! returns one value per grid point for each series.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use super::gradient::IncomeAxis;
use crate::error::{ensure_in_range, CalcError, Result};
use crate::parameters::{deserialize_optional_plan, Plan};

pub const MAX_CHILDREN: u32 = 10;
pub const MAX_MONTHLY_RENT: f64 = 5_000.0;
pub const MAX_PARTNER_INCOME: f64 = 200_000.0;

/// Household swept across the income grid
///
/// Missing fields take the [`Default`] values: a single plan 2 borrower with
/// no children and no housing costs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HouseholdDescription {
    /// Main plan, `None` when the earner has no student loan
    #[serde(deserialize_with = "deserialize_optional_plan")]
    pub student_loan_plan: Option<Plan>,

    pub num_children: u32,

    /// Monthly rent in pounds
    pub monthly_rent: f64,

    pub is_couple: bool,

    pub partner_income: f64,

    /// Also repaying a postgraduate loan
    pub has_postgrad: bool,
}

impl HouseholdDescription {
    pub fn validate(&self) -> Result<()> {
        ensure_in_range("num_children", self.num_children as f64, 0.0, MAX_CHILDREN as f64)?;
        ensure_in_range("monthly_rent", self.monthly_rent, 0.0, MAX_MONTHLY_RENT)?;
        ensure_in_range("partner_income", self.partner_income, 0.0, MAX_PARTNER_INCOME)?;
        Ok(())
    }

    /// Postgraduate repayments on top of whatever the provider simulated
    ///
    /// A household whose main plan is already the postgraduate plan has those
    /// repayments inside the student-loan series.
    pub fn repays_secondary_postgrad(&self) -> bool {
        self.has_postgrad && self.student_loan_plan != Some(Plan::Postgraduate)
    }
}

impl Default for HouseholdDescription {
    fn default() -> Self {
        Self {
            student_loan_plan: Some(Plan::Plan2),
            num_children: 0,
            monthly_rent: 0.0,
            is_couple: false,
            partner_income: 0.0,
            has_postgrad: false,
        }
    }
}

/// Simulated series aligned to an income grid
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationSeries {
    pub income_tax: Vec<f64>,
    pub national_insurance: Vec<f64>,
    pub student_loan_repayment: Vec<f64>,
    pub universal_credit: Vec<f64>,
    /// Child benefit before the high income charge
    pub child_benefit: Vec<f64>,
    /// Child benefit net of the high income charge
    pub child_benefit_after_clawback: Vec<f64>,
    pub household_net_income: Vec<f64>,
}

impl SimulationSeries {
    /// All-zero series of length `len`
    pub fn zeros(len: usize) -> Self {
        Self {
            income_tax: vec![0.0; len],
            national_insurance: vec![0.0; len],
            student_loan_repayment: vec![0.0; len],
            universal_credit: vec![0.0; len],
            child_benefit: vec![0.0; len],
            child_benefit_after_clawback: vec![0.0; len],
            household_net_income: vec![0.0; len],
        }
    }

    fn named(&self) -> [(&'static str, &[f64]); 7] {
        [
            ("income_tax", self.income_tax.as_slice()),
            ("national_insurance", self.national_insurance.as_slice()),
            ("student_loan_repayment", self.student_loan_repayment.as_slice()),
            ("universal_credit", self.universal_credit.as_slice()),
            ("child_benefit", self.child_benefit.as_slice()),
            ("child_benefit_after_clawback", self.child_benefit_after_clawback.as_slice()),
            ("household_net_income", self.household_net_income.as_slice()),
        ]
    }

    /// Check every series has `expected` points
    pub fn validate_len(&self, expected: usize) -> Result<()> {
        for (series, values) in self.named() {
            if values.len() != expected {
                return Err(CalcError::SeriesLengthMismatch {
                    series,
                    expected,
                    actual: values.len(),
                });
            }
        }
        Ok(())
    }

    /// High income child benefit charge at each point
    pub fn clawback(&self) -> Vec<f64> {
        self.child_benefit
            .iter()
            .zip(&self.child_benefit_after_clawback)
            .map(|(before, after)| before - after)
            .collect()
    }
}

/// Source of simulated household series
pub trait SimulationProvider: Send + Sync {
    /// Sweep `household` over every point of `axis`
    fn sweep(&self, household: &HouseholdDescription, axis: &IncomeAxis) -> Result<SimulationSeries>;
}

impl<P: SimulationProvider + ?Sized> SimulationProvider for &P {
    fn sweep(&self, household: &HouseholdDescription, axis: &IncomeAxis) -> Result<SimulationSeries> {
        (**self).sweep(household, axis)
    }
}

/// One row of a series file
#[derive(Debug, Deserialize)]
struct SeriesRow {
    employment_income: f64,
    income_tax: f64,
    national_insurance: f64,
    student_loan_repayment: f64,
    #[serde(default)]
    universal_credit: f64,
    #[serde(default)]
    child_benefit: f64,
    #[serde(default)]
    child_benefit_after_clawback: f64,
    household_net_income: f64,
}

/// Series computed elsewhere and handed over as-is
///
/// Answers only for the income grid it was built on. Household fields are
/// ignored: the series already describe one household.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuppliedSeries {
    incomes: Vec<f64>,
    series: SimulationSeries,
}

impl SuppliedSeries {
    pub fn new(incomes: Vec<f64>, series: SimulationSeries) -> Result<Self> {
        series.validate_len(incomes.len())?;
        Ok(Self { incomes, series })
    }

    /// Load from a CSV file with an `employment_income` column
    pub fn from_csv_path(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let supplied = Self::from_reader(file)?;
        info!("Loaded {} series points from {}", supplied.incomes.len(), path.display());
        Ok(supplied)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut reader = csv::Reader::from_reader(reader);

        let mut incomes = Vec::new();
        let mut series = SimulationSeries::default();
        for result in reader.deserialize() {
            let row: SeriesRow = result?;
            incomes.push(row.employment_income);
            series.income_tax.push(row.income_tax);
            series.national_insurance.push(row.national_insurance);
            series.student_loan_repayment.push(row.student_loan_repayment);
            series.universal_credit.push(row.universal_credit);
            series.child_benefit.push(row.child_benefit);
            series.child_benefit_after_clawback.push(row.child_benefit_after_clawback);
            series.household_net_income.push(row.household_net_income);
        }

        Self::new(incomes, series)
    }

    /// Grid the series were computed on
    pub fn axis(&self) -> Result<IncomeAxis> {
        IncomeAxis::new(self.incomes.clone())
    }

    pub fn incomes(&self) -> &[f64] {
        &self.incomes
    }

    pub fn series(&self) -> &SimulationSeries {
        &self.series
    }
}

impl SimulationProvider for SuppliedSeries {
    fn sweep(&self, _household: &HouseholdDescription, axis: &IncomeAxis) -> Result<SimulationSeries> {
        let tolerance = 1e-9 * axis.step().abs();
        let aligned = self.incomes.len() == axis.len()
            && self
                .incomes
                .iter()
                .zip(axis.values())
                .all(|(a, b)| (a - b).abs() <= tolerance);

        if !aligned {
            return Err(CalcError::Provider(format!(
                "supplied series cover {} points, requested grid {:.0}..{:.0} with {} points",
                self.incomes.len(),
                axis.min(),
                axis.max(),
                axis.len()
            )));
        }

        Ok(self.series.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture_path() -> std::path::PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("data/series/single_plan2.csv")
    }

    #[test]
    fn test_household_validation() {
        assert!(HouseholdDescription::default().validate().is_ok());

        let too_many_children = HouseholdDescription {
            num_children: 11,
            ..Default::default()
        };
        assert!(matches!(
            too_many_children.validate(),
            Err(CalcError::OutOfRange { field: "num_children", .. })
        ));

        let negative_rent = HouseholdDescription {
            monthly_rent: -1.0,
            ..Default::default()
        };
        assert!(negative_rent.validate().is_err());
    }

    #[test]
    fn test_household_from_json() {
        let household: HouseholdDescription =
            serde_json::from_str(r#"{"student_loan_plan": "NONE", "num_children": 2}"#).unwrap();
        assert_eq!(household.student_loan_plan, None);
        assert_eq!(household.num_children, 2);

        let defaults: HouseholdDescription = serde_json::from_str("{}").unwrap();
        assert_eq!(defaults, HouseholdDescription::default());

        let plan4: HouseholdDescription = serde_json::from_str(r#"{"student_loan_plan": "PLAN_4"}"#).unwrap();
        assert_eq!(plan4.student_loan_plan, Some(Plan::Plan4));
    }

    #[test]
    fn test_secondary_postgrad() {
        let both = HouseholdDescription {
            has_postgrad: true,
            ..Default::default()
        };
        assert!(both.repays_secondary_postgrad());

        let postgrad_only = HouseholdDescription {
            student_loan_plan: Some(Plan::Postgraduate),
            has_postgrad: true,
            ..Default::default()
        };
        assert!(!postgrad_only.repays_secondary_postgrad());
    }

    #[test]
    fn test_supplied_series_length_checked() {
        let mut series = SimulationSeries::zeros(3);
        series.universal_credit.pop();
        assert!(matches!(
            SuppliedSeries::new(vec![0.0, 1.0, 2.0], series),
            Err(CalcError::SeriesLengthMismatch { series: "universal_credit", expected: 3, actual: 2 })
        ));
    }

    #[test]
    fn test_supplied_series_rejects_other_grid() {
        let supplied = SuppliedSeries::new(vec![0.0, 10.0, 20.0], SimulationSeries::zeros(3)).unwrap();
        let household = HouseholdDescription::default();

        assert!(supplied.sweep(&household, &supplied.axis().unwrap()).is_ok());

        let other = IncomeAxis::linspace(0.0, 40.0, 3).unwrap();
        assert!(matches!(supplied.sweep(&household, &other), Err(CalcError::Provider(_))));
    }

    #[test]
    fn test_from_reader_defaults_missing_benefit_columns() {
        let data = "\
employment_income,income_tax,national_insurance,student_loan_repayment,household_net_income
0,0,0,0,0
1000,0,0,0,1000
";
        let supplied = SuppliedSeries::from_reader(data.as_bytes()).unwrap();
        assert_eq!(supplied.incomes(), &[0.0, 1000.0]);
        assert_eq!(supplied.series().universal_credit, vec![0.0, 0.0]);
    }

    #[test]
    fn test_load_fixture() {
        let supplied = SuppliedSeries::from_csv_path(&fixture_path()).unwrap();
        let axis = supplied.axis().unwrap();

        assert_eq!(axis.len(), 25);
        assert_eq!(axis.step(), 5000.0);
        supplied.series().validate_len(axis.len()).unwrap();
    }

    #[test]
    fn test_missing_file() {
        let result = SuppliedSeries::from_csv_path(Path::new("does/not/exist.csv"));
        assert!(matches!(result, Err(CalcError::Io(_))));
    }
}
