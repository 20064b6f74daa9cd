use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use statrs::distribution::Normal;
use std::time::Instant;
use tracing::debug;

use crate::error::EngineError;
use crate::linalg::{dot, quad_form};
use crate::risk::var::{historical_cvar, historical_var, validate_confidence};
use crate::stats::{mean, percentile_sorted, sample_std, sorted_copy};
use crate::types::{with_metadata, ComputationOutput, Matrix};
use crate::validation::{validate_covariance, validate_vector};
use crate::EngineResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

fn default_paths() -> usize {
    10_000
}

fn default_one() -> f64 {
    1.0
}

fn default_confidence() -> f64 {
    0.95
}

fn default_include_paths() -> bool {
    true
}

/// Forward simulation of portfolio value as geometric Brownian motion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationInput {
    #[serde(default)]
    pub asset_names: Option<Vec<String>>,
    /// Per-period expected returns.
    pub expected_returns: Vec<f64>,
    /// Per-period covariance.
    pub covariance_matrix: Matrix,
    pub weights: Vec<f64>,
    /// Number of steps per path.
    pub horizon: usize,
    #[serde(default = "default_paths")]
    pub paths: usize,
    /// Fixed seed for reproducible paths. A random seed is drawn (and
    /// reported) when absent.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Step length in periods.
    #[serde(default = "default_one")]
    pub dt: f64,
    #[serde(default = "default_one")]
    pub initial_value: f64,
    /// Added to the portfolio drift per period, for stress scenarios.
    #[serde(default)]
    pub drift_adjustment: f64,
    /// Scales portfolio volatility, for stress scenarios.
    #[serde(default = "default_one")]
    pub volatility_multiplier: f64,
    #[serde(default = "default_confidence")]
    pub confidence_level: f64,
    /// Return the full value paths, not just the terminal statistics.
    #[serde(default = "default_include_paths")]
    pub include_paths: bool,
}

/// Percentile summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McPercentiles {
    pub p5: f64,
    pub p10: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
    pub p95: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationOutput {
    pub seed: u64,
    pub path_count: usize,
    pub horizon: usize,
    /// Drift and volatility per period after stress overlays.
    pub portfolio_drift: f64,
    pub portfolio_volatility: f64,
    /// `path_count` rows of `horizon + 1` values, starting at `initial_value`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paths: Option<Vec<Vec<f64>>>,
    pub terminal_values: McPercentiles,
    pub mean_terminal_value: f64,
    pub std_terminal_value: f64,
    /// V0 * exp(mu_p * horizon * dt).
    pub expected_terminal_value: f64,
    pub probability_of_loss: f64,
    /// Loss of the terminal return at `confidence_level`, positive.
    pub var: f64,
    pub cvar: f64,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Simulate portfolio value paths. Each path draws its shocks from its own
/// generator seeded with `seed + path_index`, so results are identical across
/// runs and thread counts.
pub fn simulate(input: &SimulationInput) -> EngineResult<ComputationOutput<SimulationOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();
    validate_input(input, &mut warnings)?;

    let mu_p = dot(&input.weights, &input.expected_returns) + input.drift_adjustment;
    let sigma_p = quad_form(&input.weights, &input.covariance_matrix).max(0.0).sqrt()
        * input.volatility_multiplier;
    let seed = input.seed.unwrap_or_else(rand::random::<u64>);
    if input.seed.is_none() {
        warnings.push(format!("No seed supplied; drew seed {}", seed));
    }

    let shock = Normal::new(0.0, 1.0).map_err(|e| EngineError::invalid("normal", e.to_string()))?;
    let step_drift = (mu_p - 0.5 * sigma_p * sigma_p) * input.dt;
    let step_vol = sigma_p * input.dt.sqrt();
    debug!(
        paths = input.paths,
        horizon = input.horizon,
        mu_p,
        sigma_p,
        seed,
        "monte carlo: simulating"
    );

    let paths: Vec<Vec<f64>> = (0..input.paths)
        .into_par_iter()
        .map(|i| {
            let mut rng = StdRng::seed_from_u64(seed.wrapping_add(i as u64));
            let mut path = Vec::with_capacity(input.horizon + 1);
            let mut value = input.initial_value;
            path.push(value);
            for _ in 0..input.horizon {
                let z: f64 = rng.sample(shock);
                value *= (step_drift + step_vol * z).exp();
                path.push(value);
            }
            path
        })
        .collect();

    let terminal: Vec<f64> = paths
        .iter()
        .map(|p| p.last().copied().unwrap_or(input.initial_value))
        .collect();
    let terminal_returns: Vec<f64> = terminal
        .iter()
        .map(|v| v / input.initial_value - 1.0)
        .collect();
    let sorted = sorted_copy(&terminal);
    let losses = terminal_returns.iter().filter(|r| **r < 0.0).count();

    let output = SimulationOutput {
        seed,
        path_count: input.paths,
        horizon: input.horizon,
        portfolio_drift: mu_p,
        portfolio_volatility: sigma_p,
        terminal_values: McPercentiles {
            p5: percentile_sorted(&sorted, 5.0),
            p10: percentile_sorted(&sorted, 10.0),
            p25: percentile_sorted(&sorted, 25.0),
            p50: percentile_sorted(&sorted, 50.0),
            p75: percentile_sorted(&sorted, 75.0),
            p90: percentile_sorted(&sorted, 90.0),
            p95: percentile_sorted(&sorted, 95.0),
        },
        mean_terminal_value: mean(&terminal),
        std_terminal_value: sample_std(&terminal),
        expected_terminal_value: input.initial_value
            * (mu_p * input.horizon as f64 * input.dt).exp(),
        probability_of_loss: losses as f64 / input.paths as f64,
        var: historical_var(&terminal_returns, input.confidence_level),
        cvar: historical_cvar(&terminal_returns, input.confidence_level),
        paths: input.include_paths.then_some(paths),
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Monte Carlo geometric Brownian motion of portfolio value",
        &serde_json::json!({
            "paths": input.paths,
            "horizon": input.horizon,
            "seed": seed,
            "dt": input.dt,
            "drift_adjustment": input.drift_adjustment,
            "volatility_multiplier": input.volatility_multiplier,
        }),
        warnings,
        elapsed,
        output,
    ))
}

fn validate_input(input: &SimulationInput, warnings: &mut Vec<String>) -> EngineResult<()> {
    let n = input.expected_returns.len();
    if n == 0 {
        return Err(EngineError::invalid(
            "expected_returns",
            "At least one asset is required",
        ));
    }
    if let Some(ref names) = input.asset_names {
        if names.len() != n {
            return Err(EngineError::invalid(
                "asset_names",
                format!("Expected {} names but got {}", n, names.len()),
            ));
        }
    }
    validate_vector("expected_returns", &input.expected_returns, n)?;
    validate_covariance("covariance_matrix", &input.covariance_matrix, n)?;
    validate_vector("weights", &input.weights, n)?;
    validate_confidence(input.confidence_level)?;

    if input.horizon == 0 {
        return Err(EngineError::invalid("horizon", "Horizon must be at least 1 period"));
    }
    if input.paths == 0 {
        return Err(EngineError::invalid("paths", "At least one path is required"));
    }
    if input.dt.is_nan() || input.dt <= 0.0 {
        return Err(EngineError::invalid("dt", "Step length must be positive"));
    }
    if input.initial_value.is_nan() || input.initial_value <= 0.0 {
        return Err(EngineError::invalid(
            "initial_value",
            "Initial value must be positive",
        ));
    }
    if !input.drift_adjustment.is_finite() {
        return Err(EngineError::invalid(
            "drift_adjustment",
            "Drift adjustment must be finite",
        ));
    }
    if input.volatility_multiplier.is_nan() || input.volatility_multiplier < 0.0 {
        return Err(EngineError::invalid(
            "volatility_multiplier",
            "Volatility multiplier must be non-negative",
        ));
    }
    if input.paths < 100 {
        warnings.push(format!(
            "Only {} paths; percentile and tail estimates are noisy",
            input.paths
        ));
    }
    Ok(())
}
