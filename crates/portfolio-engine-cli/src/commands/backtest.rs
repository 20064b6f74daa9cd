use clap::Args;
use serde::Serialize;
use serde_json::Value;

use portfolio_engine_core::backtest::{self, BacktestInput};
use portfolio_engine_core::EngineError;

use crate::input;

/// Arguments for walk-forward backtesting
#[derive(Args)]
pub struct BacktestArgs {
    /// Path to JSON or YAML input file: one request, or an array of requests run in parallel
    #[arg(long)]
    pub input: Option<String>,

    /// Lookback window in periods
    #[arg(long)]
    pub lookback: Option<usize>,

    /// Periods between rebalances
    #[arg(long)]
    pub rebalance_interval: Option<usize>,
}

pub fn run_backtest(args: BacktestArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let raw: Value = input::load(args.input.as_deref(), "backtest")?;
    let batch = raw.is_array();
    let mut requests: Vec<BacktestInput> = if batch {
        serde_json::from_value(raw)?
    } else {
        vec![serde_json::from_value(raw)?]
    };
    for request in requests.iter_mut() {
        if let Some(lookback) = args.lookback {
            request.lookback = lookback;
        }
        if let Some(interval) = args.rebalance_interval {
            request.rebalance_interval = interval;
        }
    }

    if !batch {
        let result = backtest::backtest(&requests[0])?;
        return Ok(serde_json::to_value(result)?);
    }

    let results = backtest::backtest_many(&requests)
        .into_iter()
        .map(batch_entry)
        .collect::<Result<Vec<Value>, _>>()?;
    Ok(serde_json::json!({ "results": results }))
}

/// One slot of a batch: the envelope, or `{ "error": ... }` for a failed run.
fn batch_entry<T: Serialize>(
    run: Result<T, EngineError>,
) -> Result<Value, serde_json::Error> {
    match run {
        Ok(out) => serde_json::to_value(out),
        Err(e) => Ok(serde_json::json!({ "error": e.to_string() })),
    }
}
