use clap::Args;
use serde_json::Value;

use portfolio_engine_core::estimation::{self, EstimationInput};

use crate::input;

/// Arguments for return-matrix estimation
#[derive(Args)]
pub struct EstimateArgs {
    /// Path to JSON or YAML input file
    #[arg(long)]
    pub input: Option<String>,

    /// Shrinkage intensity toward the diagonal, in [0, 1]
    #[arg(long)]
    pub shrinkage: Option<f64>,
}

pub fn run_estimate(args: EstimateArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut request: EstimationInput = input::load(args.input.as_deref(), "estimation")?;
    if args.shrinkage.is_some() {
        request.config.shrinkage = args.shrinkage;
    }
    let result = estimation::estimate(&request)?;
    Ok(serde_json::to_value(result)?)
}
