use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::debug;

use crate::error::EngineError;
use crate::linalg::{dot, max_abs, norm_inf, quad_form};
use crate::optimization::constraints::ConstraintSet;
use crate::optimization::methods::{
    min_variance_for_target_qp, min_volatility, validate_market, TwoFund,
};
use crate::optimization::qp::{solve_qp, QpProblem, SolverSettings};
use crate::types::{with_metadata, ComputationOutput, Matrix};
use crate::EngineResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

fn default_point_count() -> usize {
    50
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontierInput {
    #[serde(default)]
    pub asset_names: Option<Vec<String>>,
    pub expected_returns: Vec<f64>,
    pub covariance_matrix: Matrix,
    #[serde(default)]
    pub constraints: ConstraintSet,
    /// Number of targets, at least 1. A single point is the
    /// minimum-volatility portfolio.
    #[serde(default = "default_point_count")]
    pub point_count: usize,
    #[serde(default)]
    pub risk_free_rate: f64,
    #[serde(default)]
    pub solver: SolverSettings,
}

/// A single point on the efficient frontier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontierPoint {
    pub target_return: f64,
    pub risk: f64,
    pub sharpe_ratio: f64,
    pub weights: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontierOutput {
    /// Ordered by increasing target return.
    pub points: Vec<FrontierPoint>,
    pub min_return: f64,
    pub max_return: f64,
    pub min_volatility_index: usize,
    pub max_sharpe_index: usize,
    /// Points come from the two-fund closed form rather than per-point QPs.
    pub closed_form: bool,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Sweep target returns from the minimum-volatility portfolio up to the
/// highest attainable return, solving minimum variance at each target.
pub fn efficient_frontier(input: &FrontierInput) -> EngineResult<ComputationOutput<FrontierOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();
    let names = validate_market(
        input.asset_names.as_deref(),
        &input.expected_returns,
        &input.covariance_matrix,
        &input.constraints,
    )?;
    if input.point_count == 0 {
        return Err(EngineError::invalid(
            "point_count",
            "Frontier needs at least one point",
        ));
    }
    let mu = &input.expected_returns;
    let cov = &input.covariance_matrix;
    let cs = &input.constraints;
    let closed_form = cs.is_unconstrained();

    let weights: Vec<Vec<f64>> = if closed_form {
        let two_fund = TwoFund::new(mu, cov)?;
        let lo = two_fund.min_variance_return(cs.budget);
        let hi = mu.iter().copied().fold(f64::NEG_INFINITY, f64::max) * cs.budget;
        let targets = sweep(lo, hi, input.point_count, &mut warnings);
        debug!(lo, hi, points = targets.len(), "frontier: closed form");
        targets
            .iter()
            .map(|&t| two_fund.weights(t, cs.budget))
            .collect::<EngineResult<_>>()?
    } else {
        let low = min_volatility(&names, cov, cs, &input.solver)?.weights;
        let high = max_return_weights(&names, mu, cov, cs, &input.solver)?;
        let (lo, hi) = (dot(&low, mu), dot(&high, mu));
        let targets = sweep(lo, hi, input.point_count, &mut warnings);
        debug!(lo, hi, points = targets.len(), "frontier: constrained sweep");
        solve_targets(&names, mu, cov, cs, &targets, low, high, &input.solver)?
    };

    let points: Vec<FrontierPoint> = weights
        .into_iter()
        .map(|w| {
            let ret = dot(&w, mu);
            let risk = quad_form(&w, cov).max(0.0).sqrt();
            FrontierPoint {
                target_return: ret,
                risk,
                sharpe_ratio: if risk > 0.0 {
                    (ret - input.risk_free_rate) / risk
                } else {
                    0.0
                },
                weights: w,
            }
        })
        .collect();

    let min_volatility_index = argmax_by(&points, |p| -p.risk);
    let max_sharpe_index = argmax_by(&points, |p| p.sharpe_ratio);
    let output = FrontierOutput {
        min_return: points.first().map(|p| p.target_return).unwrap_or(0.0),
        max_return: points.last().map(|p| p.target_return).unwrap_or(0.0),
        points,
        min_volatility_index,
        max_sharpe_index,
        closed_form,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        if closed_form {
            "Efficient frontier via two-fund closed form"
        } else {
            "Efficient frontier via minimum-variance QP per target return"
        },
        &serde_json::json!({
            "n_assets": names.len(),
            "point_count": input.point_count,
            "risk_free_rate": input.risk_free_rate,
            "long_only": cs.long_only,
        }),
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Evenly spaced targets from `lo` to `hi` inclusive.
fn sweep(lo: f64, hi: f64, count: usize, warnings: &mut Vec<String>) -> Vec<f64> {
    if count <= 1 {
        return vec![lo];
    }
    if hi - lo <= 1e-12 * lo.abs().max(1e-12) {
        warnings.push(
            "Attainable return range is degenerate; frontier collapses to the minimum-volatility portfolio"
                .to_string(),
        );
        return vec![lo];
    }
    let step = (hi - lo) / (count - 1) as f64;
    (0..count)
        .map(|k| if k == count - 1 { hi } else { lo + step * k as f64 })
        .collect()
}

/// Highest-return feasible portfolio, breaking ties toward lower variance with a
/// vanishing quadratic term.
fn max_return_weights(
    names: &[String],
    mu: &[f64],
    cov: &[Vec<f64>],
    cs: &ConstraintSet,
    solver: &SolverSettings,
) -> EngineResult<Vec<f64>> {
    let scale = 1e-6 * norm_inf(mu).max(1e-12) / max_abs(cov).max(1e-300);
    let problem = QpProblem {
        p: cov
            .iter()
            .map(|row| row.iter().map(|v| v * scale).collect())
            .collect(),
        q: mu.iter().map(|m| -m).collect(),
        constraints: cs.linear_rows(names),
    };
    let mut w = solve_qp(&problem, solver)?.x;
    cs.snap_to_bounds(&mut w);
    Ok(w)
}

/// One QP per interior target, in parallel; the end points are the
/// minimum-volatility and maximum-return portfolios themselves.
#[allow(clippy::too_many_arguments)]
fn solve_targets(
    names: &[String],
    mu: &[f64],
    cov: &[Vec<f64>],
    cs: &ConstraintSet,
    targets: &[f64],
    low: Vec<f64>,
    high: Vec<f64>,
    solver: &SolverSettings,
) -> EngineResult<Vec<Vec<f64>>> {
    if targets.len() == 1 {
        return Ok(vec![low]);
    }
    let last = targets.len() - 1;
    let interior: Vec<Vec<f64>> = targets[1..last]
        .par_iter()
        .map(|&t| min_variance_for_target_qp(names, mu, cov, cs, t, solver).map(|s| s.weights))
        .collect::<EngineResult<_>>()?;

    let mut all = Vec::with_capacity(targets.len());
    all.push(low);
    all.extend(interior);
    all.push(high);
    Ok(all)
}

fn argmax_by(points: &[FrontierPoint], key: impl Fn(&FrontierPoint) -> f64) -> usize {
    points
        .iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |(bi, bv), (i, p)| {
            let v = key(p);
            if v > bv {
                (i, v)
            } else {
                (bi, bv)
            }
        })
        .0
}
