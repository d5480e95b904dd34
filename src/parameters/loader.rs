//! CSV-based parameter loader
//!
//! Loads yearly parameters from CSV files in data/parameters/:
//! - `tax_parameters.csv`: one row per year with the band table
//! - `plan_parameters.csv`: one row per (year, plan)

use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

use chrono::NaiveDate;
use log::info;
use serde::Deserialize;

use super::{
    BandTable, Plan, PlanParameters, PostgradParameters, TaxParameterProvider, TaxParameters, MAX_WRITEOFF_TERM,
};
use crate::error::{ensure_in_range, ensure_non_negative, CalcError, Result};

/// Default path to the parameters directory
pub const DEFAULT_PARAMETERS_PATH: &str = "data/parameters";

/// Raw row of tax_parameters.csv
#[derive(Debug, Deserialize)]
struct TaxRow {
    year: i32,
    effective_from: NaiveDate,
    personal_allowance: f64,
    basic_rate_limit: f64,
    additional_rate_threshold: f64,
    basic_rate: f64,
    higher_rate: f64,
    additional_rate: f64,
    taper_threshold: f64,
    taper_rate: f64,
}

impl TaxRow {
    fn bands(&self) -> BandTable {
        BandTable {
            personal_allowance: self.personal_allowance,
            basic_rate_limit: self.basic_rate_limit,
            additional_rate_threshold: self.additional_rate_threshold,
            basic_rate: self.basic_rate,
            higher_rate: self.higher_rate,
            additional_rate: self.additional_rate,
            taper_threshold: self.taper_threshold,
            taper_rate: self.taper_rate,
        }
    }
}

/// Raw row of plan_parameters.csv
#[derive(Debug, Deserialize)]
struct PlanRow {
    year: i32,
    plan: String,
    threshold: f64,
    repayment_rate: f64,
    interest_rate_min: f64,
    interest_rate_max: f64,
    writeoff_term: u32,
}

impl PlanRow {
    fn to_parameters(&self) -> Result<(Plan, PlanParameters)> {
        let plan: Plan = self.plan.parse()?;

        ensure_non_negative("threshold", self.threshold)?;
        ensure_in_range("repayment_rate", self.repayment_rate, 0.0, 1.0)?;
        ensure_in_range("interest_rate_min", self.interest_rate_min, 0.0, 1.0)?;
        ensure_in_range("interest_rate_max", self.interest_rate_max, self.interest_rate_min, 1.0)?;
        ensure_in_range("writeoff_term", self.writeoff_term as f64, 0.0, MAX_WRITEOFF_TERM as f64)?;

        Ok((
            plan,
            PlanParameters {
                threshold: self.threshold,
                repayment_rate: self.repayment_rate,
                // Rate varies with income between min and max; use the midpoint
                interest_rate: (self.interest_rate_min + self.interest_rate_max) / 2.0,
                writeoff_term: self.writeoff_term,
            },
        ))
    }
}

fn read_rows<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Vec<T>> {
    let file = File::open(path)?;
    let mut reader = csv::Reader::from_reader(file);
    let mut rows = Vec::new();
    for result in reader.deserialize() {
        rows.push(result?);
    }
    Ok(rows)
}

/// Parameters loaded from CSV files, keyed by year
#[derive(Debug, Clone)]
pub struct CsvParameterProvider {
    years: BTreeMap<i32, TaxParameters>,
}

impl CsvParameterProvider {
    /// Load from the default path
    pub fn load_default() -> Result<Self> {
        Self::load_from(Path::new(DEFAULT_PARAMETERS_PATH))
    }

    /// Load from a specific directory
    ///
    /// Every year in tax_parameters.csv must have a postgraduate plan row.
    pub fn load_from(dir: &Path) -> Result<Self> {
        let tax_rows: Vec<TaxRow> = read_rows(&dir.join("tax_parameters.csv"))?;
        let plan_rows: Vec<PlanRow> = read_rows(&dir.join("plan_parameters.csv"))?;

        let mut plans_by_year: BTreeMap<i32, BTreeMap<Plan, PlanParameters>> = BTreeMap::new();
        for row in &plan_rows {
            let (plan, params) = row.to_parameters()?;
            plans_by_year.entry(row.year).or_default().insert(plan, params);
        }

        let mut years = BTreeMap::new();
        for row in tax_rows {
            let plans = plans_by_year.remove(&row.year).unwrap_or_default();
            let pg = plans.get(&Plan::Postgraduate).ok_or_else(|| CalcError::PlanUnavailable {
                plan: Plan::Postgraduate.to_string(),
                year: row.year,
            })?;
            let postgrad = PostgradParameters {
                threshold: pg.threshold,
                repayment_rate: pg.repayment_rate,
            };

            years.insert(
                row.year,
                TaxParameters {
                    year: row.year,
                    effective_from: row.effective_from,
                    bands: row.bands(),
                    plans,
                    postgrad,
                },
            );
        }

        info!("loaded parameters for {} years from {}", years.len(), dir.display());
        Ok(Self { years })
    }

    /// Years available
    pub fn years(&self) -> impl Iterator<Item = i32> + '_ {
        self.years.keys().copied()
    }
}

impl TaxParameterProvider for CsvParameterProvider {
    fn get(&self, year: i32) -> Result<TaxParameters> {
        self.years
            .get(&year)
            .cloned()
            .ok_or(CalcError::ParametersUnavailable { year })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::BuiltinParameters;
    use std::path::PathBuf;

    fn fixture_dir() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join(DEFAULT_PARAMETERS_PATH)
    }

    #[test]
    fn test_load_shipped_parameters() {
        let result = CsvParameterProvider::load_from(&fixture_dir());
        assert!(result.is_ok(), "Failed to load parameters: {:?}", result.err());

        let provider = result.unwrap();
        assert_eq!(provider.years().collect::<Vec<_>>(), (2025..=2030).collect::<Vec<_>>());
    }

    #[test]
    fn test_csv_matches_builtin_table() {
        let csv = CsvParameterProvider::load_from(&fixture_dir()).unwrap();
        let builtin = BuiltinParameters::new();

        for year in csv.years() {
            let from_csv = csv.get(year).unwrap();
            let from_table = builtin.get(year).unwrap();

            assert_eq!(from_csv.effective_from, from_table.effective_from);
            assert_eq!(from_csv.bands, from_table.bands);
            assert_eq!(from_csv.postgrad, from_table.postgrad);
            for plan in Plan::ALL {
                let a = from_csv.plan(plan).unwrap();
                let b = from_table.plan(plan).unwrap();
                assert_eq!(a.threshold, b.threshold, "{} {}", plan, year);
                assert_eq!(a.writeoff_term, b.writeoff_term);
                approx::assert_abs_diff_eq!(a.interest_rate, b.interest_rate, epsilon = 1e-12);
                approx::assert_abs_diff_eq!(a.repayment_rate, b.repayment_rate, epsilon = 1e-12);
            }
        }
    }

    fn plan_row(threshold: f64, repayment_rate: f64, writeoff_term: u32) -> PlanRow {
        PlanRow {
            year: 2026,
            plan: "plan2".to_string(),
            threshold,
            repayment_rate,
            interest_rate_min: 0.032,
            interest_rate_max: 0.062,
            writeoff_term,
        }
    }

    #[test]
    fn test_plan_row_bounds() {
        let (plan, params) = plan_row(29_385.0, 0.09, 30).to_parameters().unwrap();
        assert_eq!(plan, Plan::Plan2);
        approx::assert_abs_diff_eq!(params.interest_rate, 0.047, epsilon = 1e-12);
        assert!(plan_row(29_385.0, 0.09, MAX_WRITEOFF_TERM).to_parameters().is_ok());

        assert!(matches!(
            plan_row(29_385.0, 0.09, 41).to_parameters(),
            Err(CalcError::OutOfRange { field: "writeoff_term", .. })
        ));
        assert!(matches!(
            plan_row(-1.0, 0.09, 30).to_parameters(),
            Err(CalcError::NegativeAmount { field: "threshold", .. })
        ));
        assert!(matches!(
            plan_row(29_385.0, -0.09, 30).to_parameters(),
            Err(CalcError::OutOfRange { field: "repayment_rate", .. })
        ));

        let mut inverted = plan_row(29_385.0, 0.09, 30);
        inverted.interest_rate_max = 0.01;
        assert!(matches!(
            inverted.to_parameters(),
            Err(CalcError::OutOfRange { field: "interest_rate_max", .. })
        ));
    }

    #[test]
    fn test_missing_directory() {
        let err = CsvParameterProvider::load_from(Path::new("does/not/exist")).unwrap_err();
        assert!(matches!(err, CalcError::Io(_)));
    }

    #[test]
    fn test_missing_year() {
        let provider = CsvParameterProvider::load_from(&fixture_dir()).unwrap();
        assert!(matches!(provider.get(2031), Err(CalcError::ParametersUnavailable { year: 2031 })));
    }
}
