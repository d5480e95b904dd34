//! Student Loan Calculator CLI
//!
//! Command-line interface for loan projections and marginal rate decomposition

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use rayon::prelude::*;
use serde::Serialize;

use student_loan_calculator::marginal::{HouseholdDescription, MarginalRateDecomposer, MarginalRateTable, SuppliedSeries};
use student_loan_calculator::parameters::loader::DEFAULT_PARAMETERS_PATH;
use student_loan_calculator::projection::{LoanInputs, TrajectorySummary};
use student_loan_calculator::{
    BuiltinParameters, CachedParameters, CalculatorRequest, CsvParameterProvider, Plan, ScenarioRunner,
    TaxParameterProvider,
};

/// Top-level CLI
#[derive(Debug, Parser)]
#[command(name = "student_loan_calculator", version, about = "Student loan projections and marginal deduction rates")]
struct Cli {
    /// Directory holding tax_parameters.csv and plan_parameters.csv
    #[arg(long, global = true, default_value = DEFAULT_PARAMETERS_PATH)]
    parameters_dir: PathBuf,

    /// Use the built-in parameter table instead of the CSV files
    #[arg(long, global = true)]
    builtin: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Project one plan year by year and print the trajectory
    Project(ProjectArgs),
    /// Run a full calculation and print it as JSON
    Calculate {
        /// JSON request file; defaults are used for missing fields
        #[arg(long)]
        request: Option<PathBuf>,
    },
    /// Lifetime summary for every plan, computed in parallel
    ComparePlans(LoanArgs),
    /// Decompose marginal rates from a CSV series file
    Mtr(MtrArgs),
    /// Print a year's parameters as JSON
    Parameters {
        #[arg(long, default_value_t = 2026)]
        year: i32,
    },
}

/// Borrower options shared by the projection commands
#[derive(Debug, Args, Clone)]
struct LoanArgs {
    #[arg(long, default_value_t = 30_000.0)]
    salary: f64,

    #[arg(long, default_value_t = 45_000.0)]
    loan: f64,

    /// Annual salary growth
    #[arg(long, default_value_t = 0.03)]
    growth: f64,

    #[arg(long, default_value_t = 2026)]
    year: i32,

    /// Replace the plan interest rate
    #[arg(long)]
    interest_rate: Option<f64>,
}

impl LoanArgs {
    fn inputs(&self) -> LoanInputs {
        LoanInputs {
            loan_amount: self.loan,
            starting_salary: self.salary,
            salary_growth_rate: self.growth,
        }
    }
}

#[derive(Debug, Args)]
struct ProjectArgs {
    #[command(flatten)]
    loan: LoanArgs,

    #[arg(long, default_value = "plan2")]
    plan: Plan,

    /// Write the trajectory to a CSV file
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Print JSON instead of a table
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
struct MtrArgs {
    /// CSV with an employment_income column and one column per series
    #[arg(long)]
    series: PathBuf,

    #[arg(long, default_value_t = 2026)]
    year: i32,

    /// Main plan, or `none`
    #[arg(long, default_value = "plan2")]
    plan: String,

    #[arg(long, default_value_t = 0)]
    children: u32,

    /// Monthly rent
    #[arg(long, default_value_t = 0.0)]
    rent: f64,

    #[arg(long)]
    couple: bool,

    #[arg(long, default_value_t = 0.0)]
    partner_income: f64,

    /// Also repaying a postgraduate loan
    #[arg(long)]
    postgrad: bool,

    /// Report the row for this income
    #[arg(long)]
    exact_income: Option<f64>,

    /// Write the decomposition to a CSV file
    #[arg(long)]
    csv: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let parameters = load_parameters(&cli)?;
    let runner = ScenarioRunner::new(CachedParameters::new(parameters));

    match cli.command {
        Command::Project(args) => project(&runner, &args),
        Command::Calculate { request } => calculate(&runner, request.as_deref()),
        Command::ComparePlans(args) => compare_plans(&runner, &args),
        Command::Mtr(args) => mtr(&runner, &args),
        Command::Parameters { year } => {
            let parameters = runner.parameters().get(year)?;
            println!("{}", serde_json::to_string_pretty(&parameters)?);
            Ok(())
        }
    }
}

type Runner = ScenarioRunner<CachedParameters<Arc<dyn TaxParameterProvider>>>;

fn load_parameters(cli: &Cli) -> Result<Arc<dyn TaxParameterProvider>> {
    if cli.builtin {
        return Ok(Arc::new(BuiltinParameters::new()));
    }
    let provider = CsvParameterProvider::load_from(&cli.parameters_dir)
        .with_context(|| format!("Failed to load parameters from {}", cli.parameters_dir.display()))?;
    Ok(Arc::new(provider))
}

fn project(runner: &Runner, args: &ProjectArgs) -> Result<()> {
    let trajectory = runner.lifetime(args.plan, args.loan.year, &args.loan.inputs(), args.loan.interest_rate)?;

    if let Some(path) = &args.csv {
        write_csv(path, &trajectory.rows)?;
        eprintln!("Trajectory written to: {}", path.display());
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&trajectory)?);
        return Ok(());
    }

    println!("Student Loan Projection ({}, {})", args.plan, args.loan.year);
    println!("==================================\n");
    println!("{:>4} {:>6} {:>12} {:>10} {:>10} {:>10} {:>12} {:>12} {:>12}",
        "Year", "Cal", "Salary", "Threshold", "Repaid", "Interest", "Balance", "TotRepaid", "WrittenOff");
    println!("{}", "-".repeat(98));

    for row in &trajectory.rows {
        println!("{:>4} {:>6} {:>12.2} {:>10.2} {:>10.2} {:>10.2} {:>12.2} {:>12.2} {:>12.2}",
            row.year,
            row.calendar_year,
            row.salary,
            row.threshold,
            row.repayment,
            row.interest_charge,
            row.balance,
            row.total_repaid,
            row.written_off,
        );
    }

    print_summary(&trajectory.summary()?);
    Ok(())
}

fn print_summary(summary: &TrajectorySummary) {
    println!("\nSummary:");
    println!("  Original Loan: £{:.2}", summary.original_loan);
    println!("  Interest Rate: {:.2}%", summary.interest_rate * 100.0);
    println!("  Years: {}", summary.years);
    println!("  Total Repaid: £{:.2}", summary.total_repaid);
    println!("  Total Interest: £{:.2}", summary.total_interest);
    println!("  Written Off: £{:.2}", summary.written_off);
    println!("  Paid Off: {}", summary.paid_off);
}

fn calculate(runner: &Runner, request: Option<&Path>) -> Result<()> {
    let request: CalculatorRequest = match request {
        Some(path) => {
            let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
            serde_json::from_reader(file).with_context(|| format!("Invalid request in {}", path.display()))?
        }
        None => CalculatorRequest::default(),
    };

    let result = runner.calculate(&request)?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn compare_plans(runner: &Runner, args: &LoanArgs) -> Result<()> {
    let inputs = args.inputs();

    let summaries: Vec<(Plan, TrajectorySummary)> = Plan::ALL
        .par_iter()
        .map(|&plan| -> student_loan_calculator::Result<(Plan, TrajectorySummary)> {
            let trajectory = runner.lifetime(plan, args.year, &inputs, args.interest_rate)?;
            Ok((plan, trajectory.summary()?))
        })
        .collect::<student_loan_calculator::Result<_>>()?;

    println!("Plan Comparison ({}, salary £{:.0}, loan £{:.0})", args.year, args.salary, args.loan);
    println!("{:>9} {:>8} {:>6} {:>12} {:>12} {:>12}",
        "Plan", "Rate", "Years", "TotRepaid", "Interest", "WrittenOff");
    println!("{}", "-".repeat(64));
    for (plan, summary) in &summaries {
        println!("{:>9} {:>7.2}% {:>6} {:>12.2} {:>12.2} {:>12.2}",
            plan.as_str(),
            summary.interest_rate * 100.0,
            summary.years,
            summary.total_repaid,
            summary.total_interest,
            summary.written_off,
        );
    }
    Ok(())
}

fn mtr(runner: &Runner, args: &MtrArgs) -> Result<()> {
    let household = HouseholdDescription {
        student_loan_plan: Plan::parse_optional(&args.plan)?,
        num_children: args.children,
        monthly_rent: args.rent,
        is_couple: args.couple,
        partner_income: args.partner_income,
        has_postgrad: args.postgrad,
    };

    let supplied = SuppliedSeries::from_csv_path(&args.series)
        .with_context(|| format!("Failed to load series from {}", args.series.display()))?;
    let axis = supplied.axis()?;

    let parameters = runner.parameters().get(args.year)?;
    let mut table = MarginalRateDecomposer::from_parameters(&parameters).decompose(&axis, &household, &supplied)?;

    let exact = match args.exact_income {
        Some(income) => Some(*table.insert_exact_income(income)?),
        None => None,
    };

    if let Some(path) = &args.csv {
        write_csv(path, &table.rows)?;
        eprintln!("Decomposition written to: {}", path.display());
    }

    print_rates(&table);

    let summary = table.summary()?;
    println!("\nSummary:");
    println!("  Max Marginal Rate: {:.1}% at £{:.0}", summary.max_marginal_rate * 100.0, summary.max_marginal_rate_income);
    match (summary.uc_taper_starts, summary.uc_taper_ends) {
        (Some(start), Some(end)) => println!("  UC Taper: £{:.0} to £{:.0}", start, end),
        _ => println!("  UC Taper: none"),
    }
    if let Some(row) = exact {
        println!("  At £{:.0}: total {:.1}%, net income £{:.2}",
            row.employment_income, row.total_marginal_rate * 100.0, row.household_net_income);
    }
    Ok(())
}

fn print_rates(table: &MarginalRateTable) {
    println!("{:>10} {:>7} {:>7} {:>7} {:>7} {:>7} {:>7} {:>7} {:>7}",
        "Income", "Tax", "NI", "SL", "PG", "HICBC", "Taper", "UC", "Total");
    println!("{}", "-".repeat(76));
    for row in &table.rows {
        println!("{:>10.0} {:>7.3} {:>7.3} {:>7.3} {:>7.3} {:>7.3} {:>7.3} {:>7.3} {:>7.3}",
            row.employment_income,
            row.income_tax_marginal_rate,
            row.ni_marginal_rate,
            row.student_loan_marginal_rate,
            row.postgrad_marginal_rate,
            row.hicbc_marginal_rate,
            row.pa_taper_marginal_rate,
            row.uc_marginal_rate,
            row.total_marginal_rate,
        );
    }
}

fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).with_context(|| format!("Unable to create {}", path.display()))?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}
