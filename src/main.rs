//! IFRS9 ECL CLI
//!
//! - `ifrs9_ecl run` - full ECL run, optional scenario weighting, CSV/JSON export
//! - `ifrs9_ecl check` - template, portfolio, segmentation and PD mapping checks only

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use ifrs9_ecl::{
    load_table, write_table, EclEngine, EngineConfig, OperationStatus, OperationType, ScenarioWeights, Template,
};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "ifrs9_ecl")]
#[command(author, version, about = "IFRS9 expected credit loss engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Inputs {
    /// Portfolio CSV file
    #[arg(short, long)]
    portfolio: PathBuf,

    /// Directory holding one CSV per template sheet
    #[arg(short, long)]
    template: PathBuf,

    /// Engine configuration (JSON); built-in Non Retail defaults otherwise
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Operation type (non-retail, retail)
    #[arg(long, default_value = "non-retail")]
    operation_type: OperationType,

    /// Operation status (performing, defaulted)
    #[arg(long, default_value = "performing")]
    operation_status: OperationStatus,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the ECL calculation
    Run {
        #[command(flatten)]
        inputs: Inputs,

        /// Scenario weight as NAME=WEIGHT (repeat for each scenario)
        #[arg(short, long = "weight", value_parser = ScenarioWeights::parse_pair)]
        weights: Vec<(String, f64)>,

        /// Output CSV for the augmented portfolio
        #[arg(short, long, default_value = "ecl_output.csv")]
        output: PathBuf,

        /// Run summary as JSON
        #[arg(short, long)]
        summary: Option<PathBuf>,

        /// Also export PD/LGD/CCF/EAD/DF step columns
        #[arg(long)]
        with_terms: bool,
    },

    /// Validate inputs without computing ECL
    Check {
        #[command(flatten)]
        inputs: Inputs,
    },
}

fn build_engine(inputs: &Inputs) -> Result<EclEngine> {
    let config = match &inputs.config {
        Some(path) => EngineConfig::from_json_path(path)
            .with_context(|| format!("Unable to read configuration {}", path.display()))?,
        None => EngineConfig::default(),
    };
    let op = config.get(inputs.operation_type, inputs.operation_status)?;
    let template = Template::load_dir_for(&inputs.template, op)
        .with_context(|| format!("Unable to load template from {}", inputs.template.display()))?;
    let engine = EclEngine::from_engine_config(template, &config, inputs.operation_type, inputs.operation_status)?;
    Ok(engine)
}

fn load_portfolio(path: &Path, engine: &EclEngine) -> Result<ifrs9_ecl::Table> {
    let text_columns = engine.config().portfolio_text_columns();
    load_table(path, &text_columns).with_context(|| format!("Unable to load portfolio {}", path.display()))
}

fn run(
    inputs: &Inputs,
    weights: &[(String, f64)],
    output: &Path,
    summary_path: Option<&Path>,
    with_terms: bool,
) -> Result<()> {
    let engine = build_engine(inputs)?;
    let portfolio = load_portfolio(&inputs.portfolio, &engine)?;
    println!("Loaded {} exposures from {}", portfolio.n_rows(), inputs.portfolio.display());

    let mut result = engine.run(portfolio)?;
    if !weights.is_empty() {
        result.apply_weights(&ScenarioWeights::from_pairs(weights))?;
    }
    if with_terms {
        result.write_term_columns()?;
    }

    let summary = result.summary();
    println!("\nScenarios: {}", summary.scenarios.join(", "));
    println!("Step ladder (months): {:?}", summary.step_months);
    println!("\n{:<16} {:>18} {:>18}", "Scenario", "ECL 1Y", "ECL Lifetime");
    println!("{}", "-".repeat(54));
    for t in &summary.totals {
        println!("{:<16} {:>18.2} {:>18.2}", t.scenario, t.ecl_1y, t.ecl_lt);
    }
    if let Some(w) = &summary.weighted {
        println!("{:<16} {:>18.2} {:>18.2}", "WEIGHTED", w.ecl_1y, w.ecl_lt);
    }
    for report in &summary.pd_reports {
        for e in &report.errors {
            println!("  [{}] ERROR: {}", report.scenario, e);
        }
        for w in &report.warnings {
            println!("  [{}] WARNING: {}", report.scenario, w);
        }
    }

    write_table(output, &result.portfolio).with_context(|| format!("Unable to write {}", output.display()))?;
    println!("\nPortfolio written to: {}", output.display());

    if let Some(path) = summary_path {
        let json = serde_json::to_string_pretty(&summary)?;
        fs::write(path, json).with_context(|| format!("Unable to write {}", path.display()))?;
        println!("Summary written to: {}", path.display());
    }
    Ok(())
}

fn check(inputs: &Inputs) -> Result<()> {
    let engine = build_engine(inputs)?;
    let portfolio = load_portfolio(&inputs.portfolio, &engine)?;
    let report = engine.check(portfolio)?;

    println!("Exposures: {}", report.rows);
    println!("Renamed fields: {}", report.renamed_fields);
    println!("Rows without dates: {}", report.rows_without_dates);
    println!("Scenarios: {}", report.scenarios.join(", "));
    println!("Step ladder (months): {:?}", report.step_months);

    for s in &report.segmentation {
        println!(
            "\nSegmentation {} -> {}: {} declared, {} matched, {} unmatched row(s), {} multi-match row(s)",
            s.type_model.map(|m| m.to_string()).unwrap_or_default(),
            s.target_column,
            s.declared.len(),
            s.matched.len(),
            s.unmatched_rows,
            s.multi_match_rows
        );
        if !s.dead.is_empty() {
            println!("  Dead segments: {}", s.dead.join(", "));
        }
        if !s.multi_matched.is_empty() {
            println!("  Multi-matched: {}", s.multi_matched.join(", "));
        }
    }

    for r in &report.pd_reports {
        println!("\nPD mapping [{}]: {}/{} row(s) unmapped", r.scenario, r.unmapped_rows, r.total_rows);
        for e in &r.errors {
            println!("  ERROR: {}", e);
        }
        for w in &r.warnings {
            println!("  WARNING: {}", w);
        }
        for i in &r.info {
            println!("  {}", i);
        }
    }

    if !report.is_valid() {
        bail!("PD mapping has errors");
    }
    println!("\nChecks passed");
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            inputs,
            weights,
            output,
            summary,
            with_terms,
        } => run(&inputs, &weights, &output, summary.as_deref(), with_terms),
        Commands::Check { inputs } => check(&inputs),
    }
}
