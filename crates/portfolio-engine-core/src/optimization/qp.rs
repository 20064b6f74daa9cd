//! Dense convex QP solver.
//!
//! Solves
//!
//! ```text
//! minimize    ½ x'Px + q'x
//! subject to  l <= A x <= u
//! ```
//!
//! with the operator-splitting (ADMM) iteration popularised by OSQP: one
//! Cholesky factorisation of `P + σI + A'diag(ρ)A`, cheap projections onto
//! the box `[l, u]`, adaptive ρ, and a final active-set polish that solves the
//! KKT system exactly so weights land on their bounds to machine precision.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::constraints::LinearConstraints;
use crate::error::EngineError;
use crate::linalg::{self, dot, mat_t_vec, mat_vec, max_abs, norm_inf};
use crate::types::Matrix;
use crate::EngineResult;

const RHO_MIN: f64 = 1e-6;
const RHO_MAX: f64 = 1e6;
const RHO_EQ_SCALE: f64 = 1e3;
const CHECK_EVERY: u32 = 10;
const ADAPT_EVERY: u32 = 100;
/// Largest constraint violation still reported as a feasible solution.
const FEASIBILITY_TOLERANCE: f64 = 1e-6;

fn default_rho() -> f64 {
    0.1
}
fn default_sigma() -> f64 {
    1e-6
}
fn default_alpha() -> f64 {
    1.6
}
fn default_eps() -> f64 {
    1e-9
}
fn default_max_iterations() -> u32 {
    20_000
}
fn default_polish() -> bool {
    true
}

/// ADMM solver settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverSettings {
    #[serde(default = "default_rho")]
    pub rho: f64,
    #[serde(default = "default_sigma")]
    pub sigma: f64,
    /// Over-relaxation factor in (0, 2).
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    #[serde(default = "default_eps")]
    pub eps_abs: f64,
    #[serde(default = "default_eps")]
    pub eps_rel: f64,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "default_polish")]
    pub polish: bool,
}

impl Default for SolverSettings {
    fn default() -> Self {
        SolverSettings {
            rho: default_rho(),
            sigma: default_sigma(),
            alpha: default_alpha(),
            eps_abs: default_eps(),
            eps_rel: default_eps(),
            max_iterations: default_max_iterations(),
            polish: default_polish(),
        }
    }
}

impl SolverSettings {
    pub fn validate(&self) -> EngineResult<()> {
        if !(self.rho > 0.0 && self.sigma > 0.0) {
            return Err(EngineError::invalid(
                "params.solver",
                "rho and sigma must be positive",
            ));
        }
        if !(self.alpha > 0.0 && self.alpha < 2.0) {
            return Err(EngineError::invalid(
                "params.solver.alpha",
                "Relaxation must lie in (0, 2)",
            ));
        }
        if self.max_iterations == 0 {
            return Err(EngineError::invalid(
                "params.solver.max_iterations",
                "Must be at least 1",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct QpProblem {
    pub p: Matrix,
    pub q: Vec<f64>,
    pub constraints: LinearConstraints,
}

#[derive(Debug, Clone)]
pub struct QpSolution {
    pub x: Vec<f64>,
    /// Constraint multipliers, one per row of `A`.
    pub y: Vec<f64>,
    pub objective: f64,
    pub iterations: u32,
    /// ADMM residuals met their tolerances.
    pub converged: bool,
    /// The returned point comes from the active-set polish.
    pub polished: bool,
    pub max_violation: f64,
}

/// Solve a convex QP.
///
/// Returns `InfeasibleConstraints` naming the most violated row when the
/// final point is more than 1e-6 outside the constraint set.
pub fn solve_qp(problem: &QpProblem, settings: &SolverSettings) -> EngineResult<QpSolution> {
    settings.validate()?;
    let n = problem.q.len();
    let rows = &problem.constraints;
    let m = rows.len();
    if problem.p.len() != n || rows.a.iter().any(|r| r.len() != n) {
        return Err(EngineError::invalid(
            "qp",
            "Dimensions of P, q and A do not agree",
        ));
    }

    // Cost scaling keeps the tolerances meaningful for monthly and annual units alike.
    let cost_scale = {
        let s = max_abs(&problem.p).max(norm_inf(&problem.q));
        if s > 0.0 && s.is_finite() {
            1.0 / s
        } else {
            1.0
        }
    };
    let p = linalg::mat_scale(&problem.p, cost_scale);
    let q: Vec<f64> = problem.q.iter().map(|v| v * cost_scale).collect();
    let a = &rows.a;
    let (l, u) = (&rows.lower, &rows.upper);

    let is_eq: Vec<bool> = (0..m)
        .map(|i| (u[i] - l[i]).abs() <= 1e-12 * l[i].abs().max(1.0))
        .collect();
    let row_rho = |rho: f64, i: usize| -> f64 {
        if l[i].is_infinite() && u[i].is_infinite() {
            RHO_MIN
        } else if is_eq[i] {
            (rho * RHO_EQ_SCALE).min(RHO_MAX)
        } else {
            rho
        }
    };

    let mut rho = settings.rho;
    let mut rho_vec: Vec<f64> = (0..m).map(|i| row_rho(rho, i)).collect();
    let mut factor = factor_kkt(&p, a, &rho_vec, settings.sigma)?;

    let mut x = vec![0.0; n];
    let mut z: Vec<f64> = (0..m).map(|i| 0.0_f64.clamp(l[i], u[i])).collect();
    let mut y = vec![0.0; m];
    let mut iterations = 0;
    let mut converged = false;
    let (alpha, sigma) = (settings.alpha, settings.sigma);

    for iter in 1..=settings.max_iterations {
        iterations = iter;

        let w: Vec<f64> = (0..m).map(|i| rho_vec[i] * z[i] - y[i]).collect();
        let at_w = mat_t_vec(a, &w);
        let rhs: Vec<f64> = (0..n).map(|j| sigma * x[j] - q[j] + at_w[j]).collect();
        let x_tilde = linalg::cholesky_solve(&factor, &rhs);
        let z_tilde = mat_vec(a, &x_tilde);

        for j in 0..n {
            x[j] = alpha * x_tilde[j] + (1.0 - alpha) * x[j];
        }
        for i in 0..m {
            let z_relax = alpha * z_tilde[i] + (1.0 - alpha) * z[i];
            let z_new = (z_relax + y[i] / rho_vec[i]).clamp(l[i], u[i]);
            y[i] += rho_vec[i] * (z_relax - z_new);
            z[i] = z_new;
        }

        if x.iter().any(|v| !v.is_finite()) {
            return Err(EngineError::ConvergenceFailure {
                method: "qp_admm".into(),
                iterations: iter,
                last_delta: f64::NAN,
            });
        }

        let check = iter % CHECK_EVERY == 0 || iter == settings.max_iterations;
        let adapt = iter % ADAPT_EVERY == 0;
        if !(check || adapt) {
            continue;
        }

        let r = residuals(&p, &q, a, &x, &z, &y);
        if check {
            let eps_prim = settings.eps_abs + settings.eps_rel * r.ax_norm.max(r.z_norm);
            let eps_dual = settings.eps_abs
                + settings.eps_rel * r.px_norm.max(r.aty_norm).max(norm_inf(&q));
            if r.primal <= eps_prim && r.dual <= eps_dual {
                converged = true;
                break;
            }
        }

        if adapt {
            let prim_rel = r.primal / r.ax_norm.max(r.z_norm).max(1e-30);
            let dual_rel = r.dual / r.px_norm.max(r.aty_norm).max(norm_inf(&q)).max(1e-30);
            if prim_rel > 0.0 && dual_rel > 0.0 {
                let new_rho = (rho * (prim_rel / dual_rel).sqrt()).clamp(RHO_MIN, RHO_MAX);
                if new_rho > 5.0 * rho || new_rho < 0.2 * rho {
                    debug!(iter, old = rho, new = new_rho, "qp: updating rho");
                    rho = new_rho;
                    rho_vec = (0..m).map(|i| row_rho(rho, i)).collect();
                    factor = factor_kkt(&p, a, &rho_vec, sigma)?;
                }
            }
        }
    }

    let admm_objective = objective(&p, &q, &x);
    let admm_violation = max_violation(a, l, u, &x).0;
    debug!(
        iterations,
        converged,
        violation = admm_violation,
        "qp: admm finished"
    );

    let mut solution_x = x;
    let mut solution_y = y;
    let mut polished = false;
    if settings.polish && m > 0 {
        if let Some((px, py)) = polish(&p, &q, a, l, u, &is_eq, &z, &solution_y) {
            let (pviol, _) = max_violation(a, l, u, &px);
            let pobj = objective(&p, &q, &px);
            let obj_ok = pobj <= admm_objective + 1e-7 * (1.0 + admm_objective.abs());
            if pviol <= admm_violation.max(1e-9) && obj_ok {
                solution_x = px;
                solution_y = py;
                polished = true;
            } else {
                debug!(pviol, pobj, admm_objective, "qp: polish rejected");
            }
        }
    }

    let (violation, worst_row) = max_violation(a, l, u, &solution_x);
    if violation > FEASIBILITY_TOLERANCE {
        let label = worst_row
            .and_then(|i| rows.labels.get(i))
            .cloned()
            .unwrap_or_else(|| "constraints".to_string());
        return Err(EngineError::infeasible(
            label,
            format!(
                "no weights satisfy this constraint together with the others (violation {:.2e})",
                violation
            ),
        ));
    }
    if !converged && !polished {
        warn!(iterations, "qp: iteration limit reached before tolerances were met");
    }

    let objective_value = objective(&problem.p, &problem.q, &solution_x);
    Ok(QpSolution {
        x: solution_x,
        y: solution_y.iter().map(|v| v / cost_scale).collect(),
        objective: objective_value,
        iterations,
        converged: converged || polished,
        polished,
        max_violation: violation,
    })
}

struct Residuals {
    primal: f64,
    dual: f64,
    ax_norm: f64,
    z_norm: f64,
    px_norm: f64,
    aty_norm: f64,
}

fn residuals(p: &[Vec<f64>], q: &[f64], a: &[Vec<f64>], x: &[f64], z: &[f64], y: &[f64]) -> Residuals {
    let ax = mat_vec(a, x);
    let px = mat_vec(p, x);
    let aty = mat_t_vec(a, y);
    let primal = ax
        .iter()
        .zip(z.iter())
        .fold(0.0_f64, |acc, (s, t)| acc.max((s - t).abs()));
    let dual = (0..x.len()).fold(0.0_f64, |acc, j| acc.max((px[j] + q[j] + aty[j]).abs()));
    Residuals {
        primal,
        dual,
        ax_norm: norm_inf(&ax),
        z_norm: norm_inf(z),
        px_norm: norm_inf(&px),
        aty_norm: norm_inf(&aty),
    }
}

fn objective(p: &[Vec<f64>], q: &[f64], x: &[f64]) -> f64 {
    0.5 * linalg::quad_form(x, p) + dot(q, x)
}

/// Largest violation of l <= Ax <= u and the row where it occurs.
fn max_violation(a: &[Vec<f64>], l: &[f64], u: &[f64], x: &[f64]) -> (f64, Option<usize>) {
    let ax = mat_vec(a, x);
    let mut worst = 0.0;
    let mut row = None;
    for i in 0..ax.len() {
        let v = (l[i] - ax[i]).max(ax[i] - u[i]).max(0.0);
        if v > worst {
            worst = v;
            row = Some(i);
        }
    }
    (worst, row)
}

/// Lower Cholesky factor of P + σI + A' diag(ρ) A.
#[allow(clippy::needless_range_loop)]
fn factor_kkt(p: &[Vec<f64>], a: &[Vec<f64>], rho: &[f64], sigma: f64) -> EngineResult<Matrix> {
    let n = p.len();
    let mut k = p.to_vec();
    for j in 0..n {
        k[j][j] += sigma;
    }
    for (row, &r) in a.iter().zip(rho.iter()) {
        for i in 0..n {
            if row[i] == 0.0 {
                continue;
            }
            for j in 0..n {
                k[i][j] += r * row[i] * row[j];
            }
        }
    }
    linalg::cholesky(&k, 0.0).map(|f| f.lower)
}

/// Guess the active set from the ADMM iterate and solve the equality-constrained
/// KKT system exactly, with iterative refinement around a small regularisation.
#[allow(clippy::too_many_arguments)]
fn polish(
    p: &[Vec<f64>],
    q: &[f64],
    a: &[Vec<f64>],
    l: &[f64],
    u: &[f64],
    is_eq: &[bool],
    z: &[f64],
    y: &[f64],
) -> Option<(Vec<f64>, Vec<f64>)> {
    let n = q.len();
    let m = a.len();

    // (row, target value, sign of a correct multiplier: -1 lower, +1 upper, 0 equality)
    let mut active: Vec<(usize, f64, i8)> = Vec::new();
    for i in 0..m {
        if is_eq[i] {
            active.push((i, l[i], 0));
        } else if l[i].is_finite() && z[i] - l[i] < -y[i] {
            active.push((i, l[i], -1));
        } else if u[i].is_finite() && u[i] - z[i] < y[i] {
            active.push((i, u[i], 1));
        }
    }
    let k = active.len();
    let dim = n + k;
    let delta = 1e-9;

    let mut kkt = vec![vec![0.0; dim]; dim];
    let mut reg = vec![vec![0.0; dim]; dim];
    for i in 0..n {
        for j in 0..n {
            kkt[i][j] = p[i][j];
        }
    }
    for (r, &(row, _, _)) in active.iter().enumerate() {
        for j in 0..n {
            kkt[n + r][j] = a[row][j];
            kkt[j][n + r] = a[row][j];
        }
    }
    for (i, kr) in kkt.iter().enumerate() {
        reg[i].clone_from(kr);
        reg[i][i] += if i < n { delta } else { -delta };
    }

    let mut rhs = vec![0.0; dim];
    for j in 0..n {
        rhs[j] = -q[j];
    }
    for (r, &(_, b, _)) in active.iter().enumerate() {
        rhs[n + r] = b;
    }

    let mut sol = linalg::solve(&reg, &rhs)?;
    for _ in 0..10 {
        let resid: Vec<f64> = mat_vec(&kkt, &sol)
            .iter()
            .zip(rhs.iter())
            .map(|(ks, r)| r - ks)
            .collect();
        if norm_inf(&resid) < 1e-15 {
            break;
        }
        let d = linalg::solve(&reg, &resid)?;
        for (s, di) in sol.iter_mut().zip(d.iter()) {
            *s += di;
        }
    }

    let x = sol[..n].to_vec();
    let mut y_full = vec![0.0; m];
    for (r, &(row, _, sign)) in active.iter().enumerate() {
        let yr = sol[n + r];
        if (sign < 0 && yr > 1e-8) || (sign > 0 && yr < -1e-8) {
            return None;
        }
        y_full[row] = yr;
    }
    if x.iter().all(|v| v.is_finite()) {
        Some((x, y_full))
    } else {
        None
    }
}
