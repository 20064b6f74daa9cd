use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::linalg::{dot, inverse, mat_add, mat_scale, mat_vec, quad_form};
use crate::types::Matrix;
use crate::EngineResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

pub(crate) fn default_risk_aversion() -> f64 {
    2.5
}

fn default_tau() -> f64 {
    0.05
}

/// One investor view: a linear combination of asset returns and its expected value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct View {
    #[serde(default)]
    pub label: Option<String>,
    /// Pick-matrix row, one entry per asset. Absolute view on asset 0: [1, 0, ...].
    /// Relative view "0 beats 1": [1, -1, 0, ...].
    pub weights: Vec<f64>,
    /// Expected return of the combination (Q).
    pub expected_return: f64,
    /// View variance ω. Defaults to τ p'Σp.
    #[serde(default)]
    pub uncertainty: Option<f64>,
}

/// Black-Litterman inputs for the posterior mean-variance step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlackLittermanConfig {
    /// Equilibrium prior π. Takes precedence over `market_weights`.
    #[serde(default)]
    pub prior_returns: Option<Vec<f64>>,
    /// Market-cap weights implying π = δ Σ w_mkt.
    #[serde(default)]
    pub market_weights: Option<Vec<f64>>,
    /// δ, used both for the implied prior and the mean-variance step.
    #[serde(default = "default_risk_aversion")]
    pub risk_aversion: f64,
    /// Prior confidence scalar.
    #[serde(default = "default_tau")]
    pub tau: f64,
    #[serde(default)]
    pub views: Vec<View>,
    /// Optimize against Σ + M⁻¹ instead of Σ.
    #[serde(default)]
    pub use_posterior_covariance: bool,
}

impl Default for BlackLittermanConfig {
    fn default() -> Self {
        BlackLittermanConfig {
            prior_returns: None,
            market_weights: None,
            risk_aversion: default_risk_aversion(),
            tau: default_tau(),
            views: Vec::new(),
            use_posterior_covariance: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlackLittermanPosterior {
    pub prior_returns: Vec<f64>,
    pub posterior_returns: Vec<f64>,
    /// Σ + [(τΣ)⁻¹ + P'Ω⁻¹P]⁻¹, present when requested.
    pub posterior_covariance: Option<Matrix>,
    /// Diagonal of Ω actually used.
    pub view_uncertainties: Vec<f64>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Implied equilibrium returns: π = δ Σ w_mkt.
pub fn implied_equilibrium_returns(cov: &[Vec<f64>], market_weights: &[f64], delta: f64) -> Vec<f64> {
    mat_vec(cov, market_weights)
        .iter()
        .map(|v| delta * v)
        .collect()
}

/// Posterior mean
/// μ = [(τΣ)⁻¹ + P'Ω⁻¹P]⁻¹ [(τΣ)⁻¹π + P'Ω⁻¹Q] for diagonal Ω.
///
/// With no views the prior is returned unchanged.
pub fn posterior_returns(
    prior: &[f64],
    cov: &[Vec<f64>],
    pick: &[Vec<f64>],
    view_returns: &[f64],
    omega: &[f64],
    tau: f64,
) -> EngineResult<Vec<f64>> {
    if pick.is_empty() {
        return Ok(prior.to_vec());
    }
    let (m_inv, tau_sigma_inv) = posterior_precision_inverse(cov, pick, omega, tau)?;

    // Right: (τΣ)⁻¹π + P'Ω⁻¹Q
    let mut right = mat_vec(&tau_sigma_inv, prior);
    for (k, row) in pick.iter().enumerate() {
        let scale = view_returns[k] / omega[k];
        for (r, p) in right.iter_mut().zip(row.iter()) {
            *r += p * scale;
        }
    }
    Ok(mat_vec(&m_inv, &right))
}

/// Resolve the prior, default the view uncertainties and compute the posterior.
///
/// `fallback_prior` is used when the config supplies neither a prior nor market weights.
pub fn black_litterman_posterior(
    bl: &BlackLittermanConfig,
    fallback_prior: &[f64],
    cov: &[Vec<f64>],
) -> EngineResult<BlackLittermanPosterior> {
    let n = cov.len();
    validate_config(bl, n)?;

    let prior = if let Some(ref pi) = bl.prior_returns {
        pi.clone()
    } else if let Some(ref w) = bl.market_weights {
        implied_equilibrium_returns(cov, w, bl.risk_aversion)
    } else {
        fallback_prior.to_vec()
    };

    let pick: Matrix = bl.views.iter().map(|v| v.weights.clone()).collect();
    let view_returns: Vec<f64> = bl.views.iter().map(|v| v.expected_return).collect();
    let mut omega = Vec::with_capacity(bl.views.len());
    for (k, view) in bl.views.iter().enumerate() {
        let w = match view.uncertainty {
            Some(u) => u,
            None => bl.tau * quad_form(&view.weights, cov),
        };
        if w.is_nan() || w <= 0.0 {
            return Err(EngineError::invalid(
                format!("views[{}]", k),
                "View has zero variance; give it non-zero asset weights or an explicit uncertainty",
            ));
        }
        omega.push(w);
    }

    let posterior = posterior_returns(&prior, cov, &pick, &view_returns, &omega, bl.tau)?;

    let posterior_covariance = if bl.use_posterior_covariance {
        if pick.is_empty() {
            Some(mat_add(cov, &mat_scale(cov, bl.tau)))
        } else {
            let (m_inv, _) = posterior_precision_inverse(cov, &pick, &omega, bl.tau)?;
            Some(mat_add(cov, &m_inv))
        }
    } else {
        None
    };

    Ok(BlackLittermanPosterior {
        prior_returns: prior,
        posterior_returns: posterior,
        posterior_covariance,
        view_uncertainties: omega,
    })
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Returns ([(τΣ)⁻¹ + P'Ω⁻¹P]⁻¹, (τΣ)⁻¹).
fn posterior_precision_inverse(
    cov: &[Vec<f64>],
    pick: &[Vec<f64>],
    omega: &[f64],
    tau: f64,
) -> EngineResult<(Matrix, Matrix)> {
    let n = cov.len();
    let tau_sigma_inv = inverse(&mat_scale(cov, tau))?;
    let mut m = tau_sigma_inv.clone();
    for (row, &w) in pick.iter().zip(omega.iter()) {
        for i in 0..n {
            if row[i] == 0.0 {
                continue;
            }
            for j in 0..n {
                m[i][j] += row[i] * row[j] / w;
            }
        }
    }
    Ok((inverse(&m)?, tau_sigma_inv))
}

fn validate_config(bl: &BlackLittermanConfig, n: usize) -> EngineResult<()> {
    if bl.tau.is_nan() || bl.tau <= 0.0 {
        return Err(EngineError::invalid("tau", "tau must be positive"));
    }
    if bl.risk_aversion.is_nan() || bl.risk_aversion <= 0.0 {
        return Err(EngineError::invalid(
            "risk_aversion",
            "Risk aversion must be positive",
        ));
    }
    if let Some(ref pi) = bl.prior_returns {
        crate::validation::validate_vector("prior_returns", pi, n)?;
    }
    if let Some(ref w) = bl.market_weights {
        crate::validation::validate_vector("market_weights", w, n)?;
        let total: f64 = w.iter().sum();
        if (total - 1.0).abs() > 1e-6 {
            return Err(EngineError::invalid(
                "market_weights",
                format!("Market weights must sum to 1, got {:.6}", total),
            ));
        }
    }
    for (k, view) in bl.views.iter().enumerate() {
        crate::validation::validate_vector(&format!("views[{}].weights", k), &view.weights, n)?;
        if !view.expected_return.is_finite() {
            return Err(EngineError::invalid(
                format!("views[{}].expected_return", k),
                "Must be finite",
            ));
        }
        if dot(&view.weights, &view.weights) == 0.0 {
            return Err(EngineError::invalid(
                format!("views[{}].weights", k),
                "View must reference at least one asset",
            ));
        }
    }
    Ok(())
}
