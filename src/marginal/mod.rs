//! Marginal deduction rates across an income grid

mod decomposer;
mod gradient;
mod simulation;

pub use decomposer::{
    MarginalRateDecomposer, MarginalRateRow, MarginalRateSummary, MarginalRateTable, UC_TAPER_CUTOFF,
};
pub use gradient::{gradient, IncomeAxis};
pub use simulation::{
    HouseholdDescription, SimulationProvider, SimulationSeries, SuppliedSeries, MAX_CHILDREN,
    MAX_MONTHLY_RENT, MAX_PARTNER_INCOME,
};
