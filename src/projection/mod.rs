//! Year-by-year student loan projections and scenario comparisons

mod state;
mod indexation;
mod engine;
mod trajectory;
mod comparison;

pub use state::{LoanState, YearStep};
pub use indexation::{FreezeWindow, IndexationPolicy};
pub use engine::{AmortizationEngine, LoanInputs, ProjectionConfig, MAX_RATE};
pub use trajectory::{ScenarioTrajectory, TrajectoryRow, TrajectorySummary};
pub use comparison::{
    InterestComparison, InterestComparisonRow, InterestImpactComparator, PolicyComparison,
    PolicyComparisonRow, ScenarioComparator,
};
