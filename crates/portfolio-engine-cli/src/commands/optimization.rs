use clap::Args;
use serde_json::Value;

use portfolio_engine_core::frontier::{self, FrontierInput};
use portfolio_engine_core::optimization::{self, OptimizationInput};

use crate::input;

/// Arguments for a single optimization
#[derive(Args)]
pub struct OptimizeArgs {
    /// Path to JSON or YAML input file
    #[arg(long)]
    pub input: Option<String>,

    /// Risk-free rate per period (overrides params.risk_free_rate)
    #[arg(long)]
    pub risk_free_rate: Option<f64>,

    /// Fail instead of returning a partially converged risk-parity result
    #[arg(long)]
    pub require_convergence: bool,
}

/// Arguments for efficient frontier generation
#[derive(Args)]
pub struct FrontierArgs {
    /// Path to JSON or YAML input file
    #[arg(long)]
    pub input: Option<String>,

    /// Number of frontier points
    #[arg(long)]
    pub points: Option<usize>,
}

pub fn run_optimize(args: OptimizeArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut request: OptimizationInput = input::load(args.input.as_deref(), "optimization")?;
    if let Some(rf) = args.risk_free_rate {
        request.params.risk_free_rate = rf;
    }
    if args.require_convergence {
        request.params.require_convergence = true;
    }
    let result = optimization::optimize(&request)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_frontier(args: FrontierArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut request: FrontierInput = input::load(args.input.as_deref(), "efficient frontier")?;
    if let Some(points) = args.points {
        request.point_count = points;
    }
    let result = frontier::efficient_frontier(&request)?;
    Ok(serde_json::to_value(result)?)
}
