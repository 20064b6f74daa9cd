use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::constraints::ConstraintSet;
use super::qp::{solve_qp, QpProblem, SolverSettings};
use crate::linalg::{identity, mat_vec};
use crate::EngineResult;

/// Largest accepted |RC_i - mean RC| for a result tagged converged.
pub const CONTRIBUTION_TOLERANCE: f64 = 1e-4;

fn default_tolerance() -> f64 {
    1e-6
}

fn default_max_iterations() -> u32 {
    1000
}

/// Stopping rule for the equal-risk-contribution fixed point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskParitySettings {
    /// Stop once max |w_new - w_old| falls below this.
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
}

impl Default for RiskParitySettings {
    fn default() -> Self {
        RiskParitySettings {
            tolerance: default_tolerance(),
            max_iterations: default_max_iterations(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RiskParityOutcome {
    pub weights: Vec<f64>,
    pub converged: bool,
    pub iterations: u32,
    /// Max weight change in the final iteration.
    pub last_delta: f64,
    /// The equal-risk weights broke a bound or sector limit and were projected.
    pub projected: bool,
}

/// Absolute risk contributions RC_i = w_i (Σw)_i. They sum to w'Σw.
pub fn risk_contributions(weights: &[f64], cov: &[Vec<f64>]) -> Vec<f64> {
    let sw = mat_vec(cov, weights);
    weights.iter().zip(sw.iter()).map(|(w, s)| w * s).collect()
}

/// Max |RC_i - mean RC| over assets.
pub fn max_contribution_deviation(weights: &[f64], cov: &[Vec<f64>]) -> f64 {
    let rc = risk_contributions(weights, cov);
    if rc.is_empty() {
        return 0.0;
    }
    let mean = rc.iter().sum::<f64>() / rc.len() as f64;
    rc.iter().fold(0.0_f64, |acc, c| acc.max((c - mean).abs()))
}

/// Inverse-volatility weights summing to one.
pub fn inverse_vol_weights(cov: &[Vec<f64>]) -> Vec<f64> {
    let inv: Vec<f64> = (0..cov.len()).map(|i| 1.0 / cov[i][i].sqrt()).collect();
    let total: f64 = inv.iter().sum();
    inv.iter().map(|v| v / total).collect()
}

/// Fixed-point iteration for equal risk contributions on the unit simplex.
///
/// Each step rescales w_i by sqrt(target / RC_i) with target = w'Σw / N and
/// renormalises. Returns `(weights, converged, iterations, last_delta)`; on
/// hitting the cap the last iterate is returned with `converged = false`.
pub fn equal_risk_weights(
    cov: &[Vec<f64>],
    settings: &RiskParitySettings,
) -> (Vec<f64>, bool, u32, f64) {
    let n = cov.len();
    let mut w = inverse_vol_weights(cov);
    let mut last_delta = f64::INFINITY;

    for iter in 1..=settings.max_iterations {
        let rc = risk_contributions(&w, cov);
        let variance: f64 = rc.iter().sum();
        if variance <= 0.0 {
            return (w, false, iter, last_delta);
        }
        let target = variance / n as f64;

        let mut next: Vec<f64> = w
            .iter()
            .zip(rc.iter())
            .map(|(&wi, &rci)| if rci > 0.0 { wi * (target / rci).sqrt() } else { wi })
            .collect();
        let total: f64 = next.iter().sum();
        for v in next.iter_mut() {
            *v /= total;
        }

        last_delta = next
            .iter()
            .zip(w.iter())
            .fold(0.0_f64, |acc, (a, b)| acc.max((a - b).abs()));
        w = next;

        if last_delta < settings.tolerance {
            debug!(iterations = iter, delta = last_delta, "risk parity converged");
            return (w, true, iter, last_delta);
        }
    }

    warn!(
        iterations = settings.max_iterations,
        delta = last_delta,
        "risk parity hit its iteration cap"
    );
    (w, false, settings.max_iterations, last_delta)
}

/// Equal-risk weights scaled to the budget, projected onto the constraint set
/// (nearest point in Euclidean norm) when they violate a bound or sector limit.
///
/// `converged` holds only if the returned weights, projected or not, have
/// every risk contribution within `CONTRIBUTION_TOLERANCE` of the mean.
pub fn risk_parity(
    names: &[String],
    cov: &[Vec<f64>],
    constraints: &ConstraintSet,
    settings: &RiskParitySettings,
    solver: &SolverSettings,
) -> EngineResult<RiskParityOutcome> {
    let (unit, converged, iterations, last_delta) = equal_risk_weights(cov, settings);
    let weights: Vec<f64> = unit.iter().map(|w| w * constraints.budget).collect();

    if constraints.is_satisfied(&weights, 1e-9) {
        let deviation = max_contribution_deviation(&weights, cov);
        return Ok(RiskParityOutcome {
            converged: converged && deviation < CONTRIBUTION_TOLERANCE,
            weights,
            iterations,
            last_delta,
            projected: false,
        });
    }

    let n = names.len();
    let problem = QpProblem {
        p: identity(n),
        q: weights.iter().map(|w| -w).collect(),
        constraints: constraints.linear_rows(names),
    };
    let solution = solve_qp(&problem, solver)?;
    let mut projected = solution.x;
    constraints.snap_to_bounds(&mut projected);
    let deviation = max_contribution_deviation(&projected, cov);
    debug!(deviation, "risk parity weights projected onto the constraint set");

    Ok(RiskParityOutcome {
        converged: converged && deviation < CONTRIBUTION_TOLERANCE,
        weights: projected,
        iterations,
        last_delta,
        projected: true,
    })
}
