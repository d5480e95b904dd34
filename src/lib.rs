//! Student Loan Calculator - Loan balance projections and marginal deduction rates
//!
//! This library provides:
//! - Year-by-year student loan projections with threshold freezes and indexation
//! - Frozen vs indexed and with vs without interest scenario comparisons
//! - Yearly tax and plan parameters (built-in, CSV, cached)
//! - Marginal deduction rate decomposition over a household income sweep
//! - A scenario runner that assembles full calculator responses

pub mod error;
pub mod parameters;
pub mod projection;
pub mod marginal;
pub mod scenario;

// Re-export commonly used types
pub use error::{CalcError, Result};
pub use parameters::{BuiltinParameters, CachedParameters, CsvParameterProvider, Plan, TaxParameterProvider, TaxParameters};
pub use projection::{AmortizationEngine, LoanInputs, ProjectionConfig, ScenarioTrajectory};
pub use marginal::{HouseholdDescription, IncomeAxis, MarginalRateDecomposer, SimulationProvider, SuppliedSeries};
pub use scenario::{CalculatorRequest, MtrRequest, ScenarioRunner};
