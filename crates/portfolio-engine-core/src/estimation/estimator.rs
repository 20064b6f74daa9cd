use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::debug;

use super::covariance::{
    correlation_from_covariance, sample_covariance, sample_mean, shrink_to_diagonal, volatilities,
};
use crate::error::EngineError;
use crate::linalg;
use crate::types::{with_metadata, ComputationOutput, Matrix, ReturnFrequency, ReturnMatrix};
use crate::EngineResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

fn default_regularization_epsilon() -> f64 {
    1e-8
}

fn default_singularity_tolerance() -> f64 {
    1e-10
}

/// Tunables for the statistics estimator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimatorConfig {
    /// Ridge added to the diagonal, as a multiple of the mean asset variance.
    #[serde(default = "default_regularization_epsilon")]
    pub regularization_epsilon: f64,
    /// Shrinkage intensity toward the diagonal target, in [0, 1].
    #[serde(default)]
    pub shrinkage: Option<f64>,
    /// Smallest acceptable relative Cholesky pivot of the correlation matrix.
    #[serde(default = "default_singularity_tolerance")]
    pub singularity_tolerance: f64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        EstimatorConfig {
            regularization_epsilon: default_regularization_epsilon(),
            shrinkage: None,
            singularity_tolerance: default_singularity_tolerance(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimationInput {
    pub returns: ReturnMatrix,
    #[serde(default)]
    pub config: EstimatorConfig,
}

/// Per-period expected returns and regularized covariance, with diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketEstimate {
    pub asset_names: Vec<String>,
    /// Sample mean per asset (per period).
    pub expected_returns: Vec<f64>,
    /// Regularized covariance matrix (per period).
    pub covariance_matrix: Matrix,
    pub volatilities: Vec<f64>,
    pub correlation_matrix: Matrix,
    pub observations: usize,
    pub frequency: ReturnFrequency,
    /// Absolute amount added to every diagonal entry.
    pub regularization_added: f64,
    pub shrinkage_intensity: f64,
    /// Smallest relative Cholesky pivot before regularization (1 = orthogonal assets).
    pub min_relative_pivot: f64,
    pub annualized_returns: Vec<f64>,
    pub annualized_volatilities: Vec<f64>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Estimate expected returns and a regularized covariance matrix from a
/// T x N return matrix.
pub fn estimate(input: &EstimationInput) -> EngineResult<ComputationOutput<MarketEstimate>> {
    let start = Instant::now();
    let (estimate, warnings) = estimate_market(&input.returns, &input.config)?;

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Sample mean and bias-corrected sample covariance with ridge regularization",
        &serde_json::json!({
            "n_assets": estimate.asset_names.len(),
            "observations": estimate.observations,
            "covariance_denominator": "T - 1",
            "regularization_epsilon": input.config.regularization_epsilon,
            "shrinkage": input.config.shrinkage,
            "singularity_tolerance": input.config.singularity_tolerance,
            "frequency": estimate.frequency,
        }),
        warnings,
        elapsed,
        estimate,
    ))
}

/// Envelope-free estimator used directly by the backtester.
pub fn estimate_market(
    returns: &ReturnMatrix,
    config: &EstimatorConfig,
) -> EngineResult<(MarketEstimate, Vec<String>)> {
    returns.validate()?;
    validate_config(config)?;

    let mut warnings: Vec<String> = Vec::new();
    let n = returns.n_assets();
    let t = returns.n_periods();

    if t < 2 * n {
        warnings.push(format!(
            "Only {} observations for {} assets; covariance estimate is noisy, consider shrinkage",
            t, n
        ));
    }

    let mu = sample_mean(&returns.returns);
    let sample = sample_covariance(&returns.returns, &mu);

    // Constant columns carry no risk information and make Σ singular.
    let max_var = (0..n).map(|i| sample[i][i]).fold(0.0_f64, f64::max);
    for i in 0..n {
        if sample[i][i] <= max_var * 1e-14 {
            return Err(EngineError::SingularCovariance {
                reason: format!(
                    "asset '{}' has zero variance over the sample",
                    returns.asset_names[i]
                ),
                asset_index: Some(i),
                min_pivot: 0.0,
            });
        }
    }

    let shrinkage_intensity = config.shrinkage.unwrap_or(0.0);
    let shrunk = if shrinkage_intensity > 0.0 {
        shrink_to_diagonal(&sample, shrinkage_intensity)
    } else {
        sample
    };

    // Judge rank on the scale-free correlation matrix, before the ridge hides it.
    let corr = correlation_from_covariance(&shrunk);
    let factor = linalg::cholesky(&corr, config.singularity_tolerance).map_err(|e| match e {
        EngineError::SingularCovariance {
            asset_index,
            min_pivot,
            ..
        } => {
            let name = asset_index
                .and_then(|i| returns.asset_names.get(i))
                .cloned()
                .unwrap_or_default();
            let reason = if t <= n {
                format!(
                    "{} observations cannot identify a covariance matrix for {} assets",
                    t, n
                )
            } else {
                format!(
                    "asset '{}' is (nearly) a linear combination of the preceding assets",
                    name
                )
            };
            EngineError::SingularCovariance {
                reason,
                asset_index,
                min_pivot,
            }
        }
        other => other,
    })?;

    let mean_var = (0..n).map(|i| shrunk[i][i]).sum::<f64>() / n as f64;
    let regularization_added = config.regularization_epsilon * mean_var;
    let mut cov = shrunk;
    for (i, row) in cov.iter_mut().enumerate() {
        row[i] += regularization_added;
    }

    debug!(
        assets = n,
        observations = t,
        min_pivot = factor.min_relative_pivot,
        ridge = regularization_added,
        "covariance estimated"
    );

    let vols = volatilities(&cov);
    let correlation_matrix = correlation_from_covariance(&cov);
    let ppy = returns.frequency.periods_per_year();
    let annualized_returns = mu.iter().map(|m| m * ppy).collect();
    let annualized_volatilities = vols.iter().map(|v| v * ppy.sqrt()).collect();

    Ok((
        MarketEstimate {
            asset_names: returns.asset_names.clone(),
            expected_returns: mu,
            covariance_matrix: cov,
            volatilities: vols,
            correlation_matrix,
            observations: t,
            frequency: returns.frequency,
            regularization_added,
            shrinkage_intensity,
            min_relative_pivot: factor.min_relative_pivot,
            annualized_returns,
            annualized_volatilities,
        },
        warnings,
    ))
}

fn validate_config(config: &EstimatorConfig) -> EngineResult<()> {
    if let Some(delta) = config.shrinkage {
        if !(0.0..=1.0).contains(&delta) {
            return Err(EngineError::invalid(
                "config.shrinkage",
                format!("Shrinkage intensity must be in [0, 1], got {}", delta),
            ));
        }
    }
    if config.regularization_epsilon < 0.0 || !config.regularization_epsilon.is_finite() {
        return Err(EngineError::invalid(
            "config.regularization_epsilon",
            "Must be a non-negative finite number",
        ));
    }
    if !(config.singularity_tolerance > 0.0 && config.singularity_tolerance < 1.0) {
        return Err(EngineError::invalid(
            "config.singularity_tolerance",
            "Must lie in (0, 1)",
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
