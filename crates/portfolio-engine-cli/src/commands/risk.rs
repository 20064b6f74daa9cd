use clap::Args;
use serde_json::Value;

use portfolio_engine_core::risk::{self, AttributionInput, RiskInput};

use crate::input;

/// Arguments for portfolio risk analysis
#[derive(Args)]
pub struct RiskArgs {
    /// Path to JSON or YAML input file
    #[arg(long)]
    pub input: Option<String>,

    /// VaR/CVaR confidence level, e.g. 0.99
    #[arg(long)]
    pub confidence: Option<f64>,

    /// Parametric VaR horizon in periods
    #[arg(long)]
    pub horizon: Option<f64>,
}

/// Arguments for Brinson attribution
#[derive(Args)]
pub struct AttributionArgs {
    /// Path to JSON or YAML input file
    #[arg(long)]
    pub input: Option<String>,
}

pub fn run_risk(args: RiskArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut request: RiskInput = input::load(args.input.as_deref(), "risk analysis")?;
    if let Some(c) = args.confidence {
        request.confidence_level = c;
    }
    if let Some(h) = args.horizon {
        request.horizon_periods = h;
    }
    let result = risk::analyze_risk(&request)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_attribution(args: AttributionArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let request: AttributionInput = input::load(args.input.as_deref(), "Brinson attribution")?;
    let result = risk::brinson_attribution(&request)?;
    Ok(serde_json::to_value(result)?)
}
