use clap::Args;
use serde_json::Value;

use portfolio_engine_core::monte_carlo::{self, SimulationInput};

use crate::input;

/// Arguments for Monte Carlo simulation
#[derive(Args)]
pub struct SimulateArgs {
    /// Path to JSON or YAML input file
    #[arg(long)]
    pub input: Option<String>,

    /// Number of paths
    #[arg(long)]
    pub paths: Option<usize>,

    /// Random seed for reproducible paths
    #[arg(long)]
    pub seed: Option<u64>,

    /// Omit the full value paths and print only terminal statistics
    #[arg(long)]
    pub summary_only: bool,
}

pub fn run_simulate(args: SimulateArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut request: SimulationInput = input::load(args.input.as_deref(), "Monte Carlo simulation")?;
    if let Some(paths) = args.paths {
        request.paths = paths;
    }
    if args.seed.is_some() {
        request.seed = args.seed;
    }
    if args.summary_only {
        request.include_paths = false;
    }
    let result = monte_carlo::simulate(&request)?;
    Ok(serde_json::to_value(result)?)
}
