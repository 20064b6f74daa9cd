use napi::Result as NapiResult;
use napi_derive::napi;

use portfolio_engine_core as engine;

/// Convert any Display error into a napi::Error.
fn to_napi_error(e: impl std::fmt::Display) -> napi::Error {
    napi::Error::from_reason(e.to_string())
}

// ---------------------------------------------------------------------------
// Estimation
// ---------------------------------------------------------------------------

#[napi]
pub fn estimate(input_json: String) -> NapiResult<String> {
    let input: engine::estimation::EstimationInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = engine::estimation::estimate(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Optimization
// ---------------------------------------------------------------------------

#[napi]
pub fn optimize(input_json: String) -> NapiResult<String> {
    let input: engine::optimization::OptimizationInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = engine::optimization::optimize(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn efficient_frontier(input_json: String) -> NapiResult<String> {
    let input: engine::frontier::FrontierInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = engine::frontier::efficient_frontier(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Risk
// ---------------------------------------------------------------------------

#[napi]
pub fn analyze_risk(input_json: String) -> NapiResult<String> {
    let input: engine::risk::RiskInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = engine::risk::analyze_risk(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn brinson_attribution(input_json: String) -> NapiResult<String> {
    let input: engine::risk::AttributionInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = engine::risk::brinson_attribution(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Simulation
// ---------------------------------------------------------------------------

#[napi]
pub fn simulate(input_json: String) -> NapiResult<String> {
    let input: engine::monte_carlo::SimulationInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = engine::monte_carlo::simulate(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Backtest
// ---------------------------------------------------------------------------

#[napi]
pub fn backtest(input_json: String) -> NapiResult<String> {
    let input: engine::backtest::BacktestInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = engine::backtest::backtest(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

/// Runs every request in parallel; a failed run yields `{ "error": ... }`
/// in its slot instead of failing the batch.
#[napi]
pub fn backtest_many(input_json: String) -> NapiResult<String> {
    let inputs: Vec<engine::backtest::BacktestInput> =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let results = engine::backtest::backtest_many(&inputs)
        .into_iter()
        .map(|r| match r {
            Ok(out) => serde_json::to_value(out),
            Err(e) => Ok(serde_json::json!({ "error": e.to_string() })),
        })
        .collect::<Result<Vec<serde_json::Value>, _>>()
        .map_err(to_napi_error)?;
    serde_json::to_string(&results).map_err(to_napi_error)
}
