use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, warn};

use super::black_litterman::{
    black_litterman_posterior, default_risk_aversion, BlackLittermanConfig,
};
use super::constraints::{ConstraintSet, LinearConstraints};
use super::qp::{solve_qp, QpProblem, SolverSettings};
use super::risk_parity::{risk_parity, RiskParitySettings};
use crate::error::EngineError;
use crate::linalg::{dot, inverse, mat_vec, quad_form};
use crate::types::{with_metadata, ComputationOutput, Matrix};
use crate::validation::{asset_labels, validate_covariance, validate_vector};
use crate::EngineResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Objective to optimize. Serialized with a `method` tag, e.g.
/// `{"method": "mean_variance", "risk_aversion": 3.0}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum OptimizationMethod {
    /// min w'Σw
    MinVolatility,
    /// min (δ/2) w'Σw - μ'w, or min w'Σw subject to μ'w = target when a
    /// target return is given.
    MeanVariance {
        #[serde(default = "default_risk_aversion")]
        risk_aversion: f64,
        #[serde(default)]
        target_return: Option<f64>,
    },
    /// max (μ'w - r_f) / sqrt(w'Σw)
    MaxSharpe,
    /// Equal risk contributions.
    RiskParity,
    /// Mean-variance on Black-Litterman posterior returns.
    BlackLitterman(BlackLittermanConfig),
}

impl OptimizationMethod {
    pub fn kind(&self) -> MethodKind {
        match self {
            OptimizationMethod::MinVolatility => MethodKind::MinVolatility,
            OptimizationMethod::MeanVariance { .. } => MethodKind::MeanVariance,
            OptimizationMethod::MaxSharpe => MethodKind::MaxSharpe,
            OptimizationMethod::RiskParity => MethodKind::RiskParity,
            OptimizationMethod::BlackLitterman(_) => MethodKind::BlackLitterman,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodKind {
    MinVolatility,
    MeanVariance,
    MaxSharpe,
    RiskParity,
    BlackLitterman,
}

impl MethodKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MethodKind::MinVolatility => "min_volatility",
            MethodKind::MeanVariance => "mean_variance",
            MethodKind::MaxSharpe => "max_sharpe",
            MethodKind::RiskParity => "risk_parity",
            MethodKind::BlackLitterman => "black_litterman",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvergenceStatus {
    Converged,
    PartialConvergence,
}

/// Method-independent parameters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OptimizationParams {
    /// Risk-free rate per period, in the units of μ.
    #[serde(default)]
    pub risk_free_rate: f64,
    /// Turn partial convergence into a `ConvergenceFailure` error.
    #[serde(default)]
    pub require_convergence: bool,
    #[serde(default)]
    pub risk_parity: RiskParitySettings,
    #[serde(default)]
    pub solver: SolverSettings,
}

/// Input to `optimize`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationInput {
    #[serde(default)]
    pub asset_names: Option<Vec<String>>,
    pub expected_returns: Vec<f64>,
    pub covariance_matrix: Matrix,
    #[serde(default)]
    pub constraints: ConstraintSet,
    #[serde(flatten)]
    pub method: OptimizationMethod,
    #[serde(default)]
    pub params: OptimizationParams,
}

/// A single asset weight with risk/return contribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetAllocation {
    pub name: String,
    pub weight: f64,
    /// w_i (Σw)_i / σ_p. Sums to portfolio volatility.
    pub risk_contribution: f64,
    /// w_i μ_i. Sums to portfolio expected return.
    pub return_contribution: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub method: MethodKind,
    pub weights: Vec<f64>,
    pub allocations: Vec<AssetAllocation>,
    pub expected_return: f64,
    pub volatility: f64,
    pub sharpe_ratio: f64,
    pub status: ConvergenceStatus,
    /// Solver or fixed-point iterations; 0 for closed forms.
    pub iterations: u32,
    /// Weighted average asset volatility / portfolio volatility.
    pub diversification_ratio: f64,
    /// Herfindahl-Hirschman index of weights.
    pub hhi_concentration: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prior_returns: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub posterior_returns: Option<Vec<f64>>,
}

/// Weights from one solve plus how they were reached.
#[derive(Debug, Clone)]
pub(crate) struct SolvedWeights {
    pub weights: Vec<f64>,
    pub iterations: u32,
    pub converged: bool,
}

impl SolvedWeights {
    fn closed_form(weights: Vec<f64>) -> Self {
        SolvedWeights {
            weights,
            iterations: 0,
            converged: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Solve for portfolio weights with the requested method.
pub fn optimize(input: &OptimizationInput) -> EngineResult<ComputationOutput<OptimizationResult>> {
    let start = Instant::now();
    let names = validate_market(
        input.asset_names.as_deref(),
        &input.expected_returns,
        &input.covariance_matrix,
        &input.constraints,
    )?;

    let (result, warnings) = optimize_weights(
        &names,
        &input.expected_returns,
        &input.covariance_matrix,
        &input.constraints,
        &input.method,
        &input.params,
    )?;

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        methodology(&input.method, &input.constraints),
        &serde_json::json!({
            "n_assets": names.len(),
            "method": result.method.as_str(),
            "risk_free_rate": input.params.risk_free_rate,
            "long_only": input.constraints.long_only,
            "budget": input.constraints.budget,
            "sectors": input.constraints.sectors.len(),
        }),
        warnings,
        elapsed,
        result,
    ))
}

/// Envelope-free optimization on already validated inputs.
pub fn optimize_weights(
    names: &[String],
    mu: &[f64],
    cov: &[Vec<f64>],
    constraints: &ConstraintSet,
    method: &OptimizationMethod,
    params: &OptimizationParams,
) -> EngineResult<(OptimizationResult, Vec<String>)> {
    let mut warnings: Vec<String> = Vec::new();
    let solver = &params.solver;
    let rf = params.risk_free_rate;
    let kind = method.kind();

    let mut prior_returns = None;
    let mut posterior_returns = None;
    let mut effective_mu: Vec<f64> = mu.to_vec();
    let mut effective_cov: Option<Matrix> = None;
    let mut last_delta = 0.0;

    let solved = match method {
        OptimizationMethod::MinVolatility => min_volatility(names, cov, constraints, solver)?,
        OptimizationMethod::MeanVariance {
            risk_aversion,
            target_return,
        } => match target_return {
            Some(target) => min_variance_for_target(names, mu, cov, constraints, *target, solver)?,
            None => mean_variance(names, mu, cov, constraints, *risk_aversion, solver)?,
        },
        OptimizationMethod::MaxSharpe => {
            max_sharpe(names, mu, cov, constraints, rf, solver, &mut warnings)?
        }
        OptimizationMethod::RiskParity => {
            let rp = risk_parity(names, cov, constraints, &params.risk_parity, solver)?;
            if rp.projected {
                warnings.push(
                    "Equal-risk weights violated the constraint set and were projected onto it; \
                     risk contributions are no longer equal"
                        .to_string(),
                );
            }
            last_delta = rp.last_delta;
            SolvedWeights {
                weights: rp.weights,
                iterations: rp.iterations,
                converged: rp.converged,
            }
        }
        OptimizationMethod::BlackLitterman(bl) => {
            let posterior = black_litterman_posterior(bl, mu, cov)?;
            let sigma = posterior
                .posterior_covariance
                .clone()
                .unwrap_or_else(|| cov.to_vec());
            let solved = mean_variance(
                names,
                &posterior.posterior_returns,
                &sigma,
                constraints,
                bl.risk_aversion,
                solver,
            )?;
            effective_mu = posterior.posterior_returns.clone();
            if posterior.posterior_covariance.is_some() {
                effective_cov = Some(sigma);
            }
            prior_returns = Some(posterior.prior_returns);
            posterior_returns = Some(posterior.posterior_returns);
            solved
        }
    };

    if !solved.converged {
        if params.require_convergence {
            return Err(EngineError::ConvergenceFailure {
                method: kind.as_str().to_string(),
                iterations: solved.iterations,
                last_delta,
            });
        }
        warn!(method = kind.as_str(), iterations = solved.iterations, "partial convergence");
        warnings.push(format!(
            "{} did not meet its convergence tolerance ({} iterations); result is the best point found",
            kind.as_str(),
            solved.iterations
        ));
    }

    let sigma = effective_cov.as_deref().unwrap_or(cov);
    let mut result = build_result(kind, names, &solved.weights, &effective_mu, sigma, rf);
    result.status = if solved.converged {
        ConvergenceStatus::Converged
    } else {
        ConvergenceStatus::PartialConvergence
    };
    result.iterations = solved.iterations;
    result.prior_returns = prior_returns;
    result.posterior_returns = posterior_returns;

    concentration_warnings(&result, &mut warnings);
    debug!(
        method = kind.as_str(),
        expected_return = result.expected_return,
        volatility = result.volatility,
        "optimization finished"
    );
    Ok((result, warnings))
}

// ---------------------------------------------------------------------------
// Methods
// ---------------------------------------------------------------------------

/// Global minimum-variance weights.
/// Unconstrained: w* = b Σ⁻¹1 / (1'Σ⁻¹1). Constrained: QP.
pub(crate) fn min_volatility(
    names: &[String],
    cov: &[Vec<f64>],
    constraints: &ConstraintSet,
    solver: &SolverSettings,
) -> EngineResult<SolvedWeights> {
    let n = cov.len();
    if constraints.is_unconstrained() {
        let inv_ones = mat_vec(&inverse(cov)?, &vec![1.0; n]);
        let c: f64 = inv_ones.iter().sum();
        if c <= 0.0 {
            return Err(singular("1'Σ⁻¹1 is not positive"));
        }
        let w = inv_ones.iter().map(|v| constraints.budget * v / c).collect();
        return Ok(SolvedWeights::closed_form(w));
    }
    solve_constrained(cov.to_vec(), vec![0.0; n], constraints.linear_rows(names), constraints, solver)
}

/// Markowitz utility: min (δ/2) w'Σw - μ'w.
/// Unconstrained: w* = Σ⁻¹(μ - γ1)/δ with γ chosen so that 1'w = b.
pub(crate) fn mean_variance(
    names: &[String],
    mu: &[f64],
    cov: &[Vec<f64>],
    constraints: &ConstraintSet,
    risk_aversion: f64,
    solver: &SolverSettings,
) -> EngineResult<SolvedWeights> {
    if risk_aversion.is_nan() || risk_aversion <= 0.0 {
        return Err(EngineError::invalid(
            "risk_aversion",
            "Risk aversion must be positive",
        ));
    }
    let n = cov.len();
    if constraints.is_unconstrained() {
        let inv = inverse(cov)?;
        let inv_ones = mat_vec(&inv, &vec![1.0; n]);
        let inv_mu = mat_vec(&inv, mu);
        let c: f64 = inv_ones.iter().sum();
        let a: f64 = inv_mu.iter().sum();
        if c <= 0.0 {
            return Err(singular("1'Σ⁻¹1 is not positive"));
        }
        let gamma = (a - risk_aversion * constraints.budget) / c;
        let w = (0..n)
            .map(|i| (inv_mu[i] - gamma * inv_ones[i]) / risk_aversion)
            .collect();
        return Ok(SolvedWeights::closed_form(w));
    }
    let p = cov
        .iter()
        .map(|row| row.iter().map(|v| risk_aversion * v).collect())
        .collect();
    let q = mu.iter().map(|m| -m).collect();
    solve_constrained(p, q, constraints.linear_rows(names), constraints, solver)
}

/// Minimum variance subject to μ'w = target.
///
/// Unconstrained inputs use the two-fund closed form
/// w = λ₁Σ⁻¹1 + λ₂Σ⁻¹μ with λ₁ = (bB - tA)/D and λ₂ = (tC - bA)/D.
pub(crate) fn min_variance_for_target(
    names: &[String],
    mu: &[f64],
    cov: &[Vec<f64>],
    constraints: &ConstraintSet,
    target: f64,
    solver: &SolverSettings,
) -> EngineResult<SolvedWeights> {
    if !target.is_finite() {
        return Err(EngineError::invalid("target_return", "Must be finite"));
    }
    if constraints.is_unconstrained() {
        let two_fund = TwoFund::new(mu, cov)?;
        return two_fund.weights(target, constraints.budget).map(SolvedWeights::closed_form);
    }
    min_variance_for_target_qp(names, mu, cov, constraints, target, solver)
}

/// QP path of `min_variance_for_target`, regardless of which constraints bind.
pub(crate) fn min_variance_for_target_qp(
    names: &[String],
    mu: &[f64],
    cov: &[Vec<f64>],
    constraints: &ConstraintSet,
    target: f64,
    solver: &SolverSettings,
) -> EngineResult<SolvedWeights> {
    let mut rows = constraints.linear_rows(names);
    rows.push("target_return".to_string(), mu.to_vec(), target, target);
    solve_constrained(cov.to_vec(), vec![0.0; cov.len()], rows, constraints, solver)
}

/// Maximum Sharpe ratio.
///
/// Unconstrained: w ∝ Σ⁻¹(μ - r_f 1). Constrained: homogenise with w = y/κ and solve
/// min y'Σy s.t. (μ - r_f)'y = s, 1'y = bκ, lκ <= y <= uκ, sector rows scaled by κ, κ >= 0.
pub(crate) fn max_sharpe(
    names: &[String],
    mu: &[f64],
    cov: &[Vec<f64>],
    constraints: &ConstraintSet,
    rf: f64,
    solver: &SolverSettings,
    warnings: &mut Vec<String>,
) -> EngineResult<SolvedWeights> {
    let n = cov.len();
    let excess: Vec<f64> = mu.iter().map(|m| m - rf).collect();
    let best_excess = excess.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    if best_excess <= 0.0 {
        warn!("max sharpe: no asset earns more than the risk-free rate");
        warnings.push(
            "No asset has a positive excess return; returning the minimum-volatility portfolio"
                .to_string(),
        );
        return min_volatility(names, cov, constraints, solver);
    }

    if constraints.is_unconstrained() {
        let s = mat_vec(&inverse(cov)?, &excess);
        let denom: f64 = s.iter().sum();
        if denom <= 1e-14 * s.iter().fold(0.0_f64, |a, v| a.max(v.abs())) {
            warnings.push(
                "Tangency portfolio does not exist for this input (1'Σ⁻¹(μ - r_f) <= 0); \
                 returning the minimum-volatility portfolio"
                    .to_string(),
            );
            return min_volatility(names, cov, constraints, solver);
        }
        let w = s.iter().map(|v| constraints.budget * v / denom).collect();
        return Ok(SolvedWeights::closed_form(w));
    }

    // Homogenised problem in (y, κ).
    let dim = n + 1;
    let mut p = vec![vec![0.0; dim]; dim];
    for i in 0..n {
        p[i][..n].copy_from_slice(&cov[i]);
    }
    let mut rows = LinearConstraints::default();
    let mut budget_row = vec![1.0; dim];
    budget_row[n] = -constraints.budget;
    rows.push("budget".into(), budget_row, 0.0, 0.0);
    let mut norm_row = excess.clone();
    norm_row.push(0.0);
    rows.push(
        "max_sharpe_normalization".into(),
        norm_row,
        best_excess,
        best_excess,
    );
    for (i, name) in names.iter().enumerate() {
        let (lo, hi) = (constraints.lower(i), constraints.upper(i));
        if lo.is_finite() {
            let mut r = vec![0.0; dim];
            r[i] = 1.0;
            r[n] = -lo;
            rows.push(format!("bounds:{}", name), r, 0.0, f64::INFINITY);
        }
        if hi.is_finite() {
            let mut r = vec![0.0; dim];
            r[i] = 1.0;
            r[n] = -hi;
            rows.push(format!("bounds:{}", name), r, f64::NEG_INFINITY, 0.0);
        }
    }
    for sc in &constraints.sectors {
        let mut member = vec![0.0; dim];
        for &i in &sc.asset_indices {
            member[i] = 1.0;
        }
        let mut lower_row = member.clone();
        lower_row[n] = -sc.min_weight;
        rows.push(format!("sector:{}", sc.name), lower_row, 0.0, f64::INFINITY);
        let mut upper_row = member;
        upper_row[n] = -sc.max_weight;
        rows.push(format!("sector:{}", sc.name), upper_row, f64::NEG_INFINITY, 0.0);
    }
    let mut kappa_row = vec![0.0; dim];
    kappa_row[n] = 1.0;
    rows.push("kappa".into(), kappa_row, 0.0, f64::INFINITY);

    let problem = QpProblem {
        p,
        q: vec![0.0; dim],
        constraints: rows,
    };
    let solution = match solve_qp(&problem, solver) {
        Ok(s) => s,
        Err(EngineError::InfeasibleConstraints { .. }) => {
            // Either the constraint set itself is infeasible (min-vol reports it by
            // name) or no feasible portfolio beats the risk-free rate.
            let fallback = min_volatility(names, cov, constraints, solver)?;
            warnings.push(
                "No feasible portfolio has a positive excess return; returning the minimum-volatility portfolio"
                    .to_string(),
            );
            return Ok(fallback);
        }
        Err(e) => return Err(e),
    };

    let kappa = solution.x[n];
    if kappa <= 1e-12 {
        return Err(EngineError::infeasible(
            "max_sharpe",
            "the Sharpe ratio is unbounded over this constraint set",
        ));
    }
    let mut w: Vec<f64> = solution.x[..n].iter().map(|y| y / kappa).collect();
    constraints.snap_to_bounds(&mut w);
    debug!(kappa, iterations = solution.iterations, "max sharpe: homogenised QP solved");
    Ok(SolvedWeights {
        weights: w,
        iterations: solution.iterations,
        converged: solution.converged,
    })
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Scalars of the unconstrained frontier: A = 1'Σ⁻¹μ, B = μ'Σ⁻¹μ, C = 1'Σ⁻¹1, D = BC - A².
#[derive(Debug, Clone)]
pub(crate) struct TwoFund {
    pub inv_ones: Vec<f64>,
    pub inv_mu: Vec<f64>,
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
}

impl TwoFund {
    pub fn new(mu: &[f64], cov: &[Vec<f64>]) -> EngineResult<Self> {
        let n = cov.len();
        let inv = inverse(cov)?;
        let inv_ones = mat_vec(&inv, &vec![1.0; n]);
        let inv_mu = mat_vec(&inv, mu);
        let a: f64 = inv_mu.iter().sum();
        let b = dot(mu, &inv_mu);
        let c: f64 = inv_ones.iter().sum();
        if c <= 0.0 {
            return Err(singular("1'Σ⁻¹1 is not positive"));
        }
        Ok(TwoFund {
            d: b * c - a * a,
            inv_ones,
            inv_mu,
            a,
            b,
            c,
        })
    }

    /// Expected return of the global minimum-variance portfolio with budget `budget`.
    pub fn min_variance_return(&self, budget: f64) -> f64 {
        self.a * budget / self.c
    }

    pub fn weights(&self, target: f64, budget: f64) -> EngineResult<Vec<f64>> {
        if self.d <= 1e-14 * self.b.abs().max(1e-300) * self.c {
            // All expected returns equal: only the GMV return is attainable.
            if (target - self.min_variance_return(budget)).abs() <= 1e-12 {
                return Ok(self.inv_ones.iter().map(|v| budget * v / self.c).collect());
            }
            return Err(EngineError::infeasible(
                "target_return",
                "all assets have the same expected return, so no other target is attainable",
            ));
        }
        let l1 = (budget * self.b - target * self.a) / self.d;
        let l2 = (target * self.c - budget * self.a) / self.d;
        Ok(self
            .inv_ones
            .iter()
            .zip(self.inv_mu.iter())
            .map(|(o, m)| l1 * o + l2 * m)
            .collect())
    }
}

fn solve_constrained(
    p: Matrix,
    q: Vec<f64>,
    rows: LinearConstraints,
    constraints: &ConstraintSet,
    solver: &SolverSettings,
) -> EngineResult<SolvedWeights> {
    let solution = solve_qp(&QpProblem { p, q, constraints: rows }, solver)?;
    let mut w = solution.x;
    constraints.snap_to_bounds(&mut w);
    Ok(SolvedWeights {
        weights: w,
        iterations: solution.iterations,
        converged: solution.converged,
    })
}

fn singular(reason: &str) -> EngineError {
    EngineError::SingularCovariance {
        reason: reason.to_string(),
        asset_index: None,
        min_pivot: 0.0,
    }
}

/// Validate μ, Σ and the constraint set; returns the asset labels.
pub(crate) fn validate_market(
    asset_names: Option<&[String]>,
    mu: &[f64],
    cov: &[Vec<f64>],
    constraints: &ConstraintSet,
) -> EngineResult<Vec<String>> {
    let n = mu.len();
    if n < 2 {
        return Err(EngineError::invalid(
            "expected_returns",
            format!("At least 2 assets required, got {}", n),
        ));
    }
    validate_vector("expected_returns", mu, n)?;
    validate_covariance("covariance_matrix", cov, n)?;
    if let Some(names) = asset_names {
        if names.len() != n {
            return Err(EngineError::invalid(
                "asset_names",
                format!("Expected {} names but got {}", n, names.len()),
            ));
        }
    }
    constraints.validate(n)?;
    let names = asset_labels(asset_names, n);
    constraints.check_feasibility(&names)?;
    Ok(names)
}

/// Portfolio statistics and per-asset contributions for fixed weights.
pub fn build_result(
    method: MethodKind,
    names: &[String],
    weights: &[f64],
    mu: &[f64],
    cov: &[Vec<f64>],
    rf: f64,
) -> OptimizationResult {
    let expected_return = dot(weights, mu);
    let volatility = quad_form(weights, cov).max(0.0).sqrt();
    let sharpe_ratio = if volatility > 0.0 {
        (expected_return - rf) / volatility
    } else {
        0.0
    };
    let sigma_w = mat_vec(cov, weights);
    let allocations = names
        .iter()
        .enumerate()
        .map(|(i, name)| AssetAllocation {
            name: name.clone(),
            weight: weights[i],
            risk_contribution: if volatility > 0.0 {
                weights[i] * sigma_w[i] / volatility
            } else {
                0.0
            },
            return_contribution: weights[i] * mu[i],
        })
        .collect();
    let weighted_vol: f64 = (0..weights.len())
        .map(|i| weights[i].abs() * cov[i][i].sqrt())
        .sum();
    let diversification_ratio = if volatility > 0.0 {
        weighted_vol / volatility
    } else {
        1.0
    };
    let hhi_concentration = weights.iter().map(|w| w * w).sum();

    OptimizationResult {
        method,
        weights: weights.to_vec(),
        allocations,
        expected_return,
        volatility,
        sharpe_ratio,
        status: ConvergenceStatus::Converged,
        iterations: 0,
        diversification_ratio,
        hhi_concentration,
        prior_returns: None,
        posterior_returns: None,
    }
}

fn concentration_warnings(result: &OptimizationResult, warnings: &mut Vec<String>) {
    for a in &result.allocations {
        if a.weight > 0.40 {
            warnings.push(format!(
                "Concentrated position: {} has weight {:.4}",
                a.name, a.weight
            ));
        }
        if a.weight < -0.10 {
            warnings.push(format!("Short position: {} has weight {:.4}", a.name, a.weight));
        }
    }
    if result.hhi_concentration > 0.5 {
        warnings.push(format!(
            "High concentration: HHI = {:.4}",
            result.hhi_concentration
        ));
    }
}

fn methodology(method: &OptimizationMethod, constraints: &ConstraintSet) -> &'static str {
    let closed = constraints.is_unconstrained();
    match method {
        OptimizationMethod::MinVolatility if closed => "Global minimum variance (closed form)",
        OptimizationMethod::MinVolatility => "Minimum variance quadratic program (ADMM with active-set polish)",
        OptimizationMethod::MeanVariance { target_return: Some(_), .. } => {
            "Minimum variance at a target return"
        }
        OptimizationMethod::MeanVariance { .. } => "Markowitz mean-variance utility maximisation",
        OptimizationMethod::MaxSharpe if closed => "Tangency portfolio (closed form)",
        OptimizationMethod::MaxSharpe => "Maximum Sharpe ratio via homogenised quadratic program",
        OptimizationMethod::RiskParity => "Equal risk contribution fixed-point iteration",
        OptimizationMethod::BlackLitterman(_) => {
            "Black-Litterman posterior returns with mean-variance optimization"
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
