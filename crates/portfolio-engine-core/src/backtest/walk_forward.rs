use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, warn};

use crate::error::EngineError;
use crate::estimation::{estimate_market, EstimatorConfig};
use crate::optimization::constraints::ConstraintSet;
use crate::optimization::methods::{
    optimize_weights, ConvergenceStatus, OptimizationMethod, OptimizationParams,
};
use crate::risk::performance::{performance_summary, PerformanceSummary};
use crate::types::{with_metadata, ComputationOutput, ReturnMatrix};
use crate::EngineResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

fn default_lookback() -> usize {
    36
}

fn default_rebalance_interval() -> usize {
    1
}

fn default_initial_value() -> f64 {
    1.0
}

/// Walk-forward backtest of one optimization method.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestInput {
    #[serde(default)]
    pub label: Option<String>,
    pub returns: ReturnMatrix,
    /// Periods of history used to fit μ and Σ at each rebalance.
    #[serde(default = "default_lookback")]
    pub lookback: usize,
    /// Periods between rebalances.
    #[serde(default = "default_rebalance_interval")]
    pub rebalance_interval: usize,
    #[serde(default)]
    pub constraints: ConstraintSet,
    #[serde(flatten)]
    pub method: OptimizationMethod,
    #[serde(default)]
    pub params: OptimizationParams,
    #[serde(default)]
    pub estimator: EstimatorConfig,
    /// Proportional cost per unit of turnover, in basis points.
    #[serde(default)]
    pub transaction_cost_bps: f64,
    #[serde(default = "default_initial_value")]
    pub initial_value: f64,
}

/// Portfolio value at the end of one out-of-sample period.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestPoint {
    /// Row of the return matrix.
    pub period: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    pub value: f64,
    /// Net of any transaction cost charged at the start of the period.
    pub period_return: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebalanceEvent {
    /// First out-of-sample row the new weights apply to.
    pub period: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    pub weights: Vec<f64>,
    /// Sum of absolute weight changes from the drifted holdings.
    pub turnover: f64,
    pub transaction_cost: f64,
    pub status: ConvergenceStatus,
    pub iterations: u32,
    /// Re-estimation or optimization failed and the drifted holdings were kept.
    pub held_previous: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub asset_names: Vec<String>,
    pub points: Vec<BacktestPoint>,
    pub rebalances: Vec<RebalanceEvent>,
    pub final_value: f64,
    pub total_turnover: f64,
    pub total_transaction_costs: f64,
    pub failed_rebalances: usize,
    /// Period in which the portfolio lost its entire value; no later
    /// periods are simulated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exhausted_at: Option<usize>,
    pub summary: PerformanceSummary,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Fit on `returns[t - lookback .. t]`, hold the optimized weights over the
/// next `rebalance_interval` periods, then advance. Weights never see the
/// returns they are evaluated on.
pub fn backtest(input: &BacktestInput) -> EngineResult<ComputationOutput<BacktestResult>> {
    let start = Instant::now();
    let (result, warnings) = run(input)?;
    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Walk-forward backtest: rolling estimation, out-of-sample buy-and-hold between rebalances",
        &serde_json::json!({
            "method": input.method.kind(),
            "lookback": input.lookback,
            "rebalance_interval": input.rebalance_interval,
            "transaction_cost_bps": input.transaction_cost_bps,
            "periods": input.returns.n_periods(),
            "frequency": input.returns.frequency,
        }),
        warnings,
        elapsed,
        result,
    ))
}

/// Independent backtests in parallel, results in input order.
pub fn backtest_many(inputs: &[BacktestInput]) -> Vec<EngineResult<ComputationOutput<BacktestResult>>> {
    inputs.par_iter().map(backtest).collect()
}

// ---------------------------------------------------------------------------
// Walk-forward loop
// ---------------------------------------------------------------------------

fn run(input: &BacktestInput) -> EngineResult<(BacktestResult, Vec<String>)> {
    validate_input(input)?;
    let returns = &input.returns;
    let names = &returns.asset_names;
    let n = returns.n_assets();
    let t_total = returns.n_periods();
    let cost_rate = input.transaction_cost_bps / 10_000.0;

    let mut warnings: Vec<String> = Vec::new();
    let mut value = input.initial_value;
    let mut holdings = vec![0.0; n];
    let mut points = Vec::with_capacity(t_total - input.lookback);
    let mut rebalances: Vec<RebalanceEvent> = Vec::new();
    let mut failed = 0usize;
    let mut exhausted_at: Option<usize> = None;

    let mut t = input.lookback;
    while t < t_total {
        let window = returns.window(t - input.lookback, t);
        let fitted = estimate_market(&window, &input.estimator).and_then(|(est, _)| {
            optimize_weights(
                names,
                &est.expected_returns,
                &est.covariance_matrix,
                &input.constraints,
                &input.method,
                &input.params,
            )
        });

        let (target, status, iterations, held_previous) = match fitted {
            Ok((opt, _)) => (opt.weights, opt.status, opt.iterations, false),
            Err(e) if rebalances.is_empty() => return Err(e),
            Err(e) => {
                warn!(period = t, error = %e, "backtest: rebalance failed, holding previous weights");
                warnings.push(format!(
                    "Rebalance at period {} failed ({}); holding previous weights",
                    t, e
                ));
                failed += 1;
                (holdings.clone(), ConvergenceStatus::Converged, 0, true)
            }
        };
        if status == ConvergenceStatus::PartialConvergence {
            warnings.push(format!("Rebalance at period {} reached only partial convergence", t));
        }

        let turnover: f64 = target
            .iter()
            .zip(holdings.iter())
            .map(|(a, b)| (a - b).abs())
            .sum();
        let transaction_cost = value * turnover * cost_rate;
        debug!(period = t, turnover, transaction_cost, "backtest: rebalance");

        let mut period_start_value = value;
        value -= transaction_cost;
        holdings = target;
        rebalances.push(RebalanceEvent {
            period: t,
            date: returns.date(t),
            weights: holdings.clone(),
            turnover,
            transaction_cost,
            status,
            iterations,
            held_previous,
        });

        let end = (t + input.rebalance_interval).min(t_total);
        for s in t..end {
            let row = &returns.returns[s];
            let r_p: f64 = holdings.iter().zip(row.iter()).map(|(w, r)| w * r).sum();
            // Losses are capped at the whole portfolio.
            value = (value * (1.0 + r_p)).max(0.0);
            if 1.0 + r_p > 0.0 {
                for (w, r) in holdings.iter_mut().zip(row.iter()) {
                    *w *= (1.0 + r) / (1.0 + r_p);
                }
            }
            points.push(BacktestPoint {
                period: s,
                date: returns.date(s),
                value,
                period_return: if period_start_value > 0.0 {
                    value / period_start_value - 1.0
                } else {
                    -1.0
                },
            });
            period_start_value = value;
            if value <= 0.0 {
                warn!(period = s, "backtest: portfolio value exhausted, stopping walk");
                warnings.push(format!(
                    "Portfolio value reached zero at period {}; the walk stopped there",
                    s
                ));
                exhausted_at = Some(s);
                break;
            }
        }
        if exhausted_at.is_some() {
            break;
        }
        t = end;
    }

    let period_returns: Vec<f64> = points.iter().map(|p| p.period_return).collect();
    let summary = performance_summary(
        &period_returns,
        returns.frequency,
        input.params.risk_free_rate,
    );

    Ok((
        BacktestResult {
            label: input.label.clone(),
            asset_names: names.clone(),
            final_value: value,
            total_turnover: rebalances.iter().map(|r| r.turnover).sum(),
            total_transaction_costs: rebalances.iter().map(|r| r.transaction_cost).sum(),
            failed_rebalances: failed,
            exhausted_at,
            points,
            rebalances,
            summary,
        },
        warnings,
    ))
}

fn validate_input(input: &BacktestInput) -> EngineResult<()> {
    let returns = &input.returns;
    returns.validate()?;
    let n = returns.n_assets();
    let t = returns.n_periods();

    if input.lookback <= n {
        return Err(EngineError::DataInsufficiency(format!(
            "Lookback of {} periods must exceed the {} assets for a non-singular covariance",
            input.lookback, n
        )));
    }
    if t <= input.lookback {
        return Err(EngineError::DataInsufficiency(format!(
            "{} periods of history leave no out-of-sample periods after a {}-period lookback",
            t, input.lookback
        )));
    }
    if input.rebalance_interval == 0 {
        return Err(EngineError::invalid(
            "rebalance_interval",
            "Rebalance interval must be at least 1 period",
        ));
    }
    if input.transaction_cost_bps.is_nan() || input.transaction_cost_bps < 0.0 {
        return Err(EngineError::invalid(
            "transaction_cost_bps",
            "Transaction cost must be non-negative",
        ));
    }
    if input.initial_value.is_nan() || input.initial_value <= 0.0 {
        return Err(EngineError::invalid(
            "initial_value",
            "Initial value must be positive",
        ));
    }
    input.constraints.validate(n)?;
    input.constraints.check_feasibility(&returns.asset_names)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ReturnFrequency;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_returns(periods: usize, seed: u64) -> ReturnMatrix {
        let mut rng = StdRng::seed_from_u64(seed);
        let rows = (0..periods)
            .map(|_| {
                vec![
                    0.008 + rng.gen_range(-0.06..0.06),
                    0.004 + rng.gen_range(-0.02..0.02),
                    0.006 + rng.gen_range(-0.04..0.04),
                ]
            })
            .collect();
        let mut m = ReturnMatrix::new(vec!["Equity".into(), "Bonds".into(), "Gold".into()], rows);
        m.frequency = ReturnFrequency::Monthly;
        m
    }

    fn input(periods: usize) -> BacktestInput {
        BacktestInput {
            label: Some("min-vol".into()),
            returns: random_returns(periods, 7),
            lookback: 24,
            rebalance_interval: 3,
            constraints: ConstraintSet::long_only(),
            method: OptimizationMethod::MinVolatility,
            params: OptimizationParams::default(),
            estimator: EstimatorConfig::default(),
            transaction_cost_bps: 0.0,
            initial_value: 1.0,
        }
    }

    // ------------------------------------------------------------------
    // 1. Walk-forward structure
    // ------------------------------------------------------------------
    #[test]
    fn test_schedule_and_points() {
        let (r, warnings) = run(&input(60)).unwrap();
        assert!(warnings.is_empty(), "warnings: {:?}", warnings);
        assert_eq!(r.points.len(), 36, "one point per out-of-sample period");
        assert_eq!(r.points[0].period, 24);
        assert_eq!(r.rebalances.len(), 12);
        assert_eq!(r.rebalances[1].period, 27);
        for rb in &r.rebalances {
            let sum: f64 = rb.weights.iter().sum();
            assert!((sum - 1.0).abs() < 1e-6, "weights sum {}", sum);
            assert!(rb.weights.iter().all(|w| *w >= -1e-9));
        }
    }

    // ------------------------------------------------------------------
    // 2. Value path compounds the period returns
    // ------------------------------------------------------------------
    #[test]
    fn test_value_path_consistent() {
        let (r, _) = run(&input(60)).unwrap();
        let compounded = r
            .points
            .iter()
            .fold(1.0, |acc, p| acc * (1.0 + p.period_return));
        assert!((compounded - r.final_value).abs() < 1e-12);
        assert!((r.summary.total_return - (r.final_value - 1.0)).abs() < 1e-12);
    }

    // ------------------------------------------------------------------
    // 3. Out of sample: first weights come only from the first window
    // ------------------------------------------------------------------
    #[test]
    fn test_first_weights_ignore_future_rows() {
        let full = input(60);
        let mut truncated = input(60);
        // Perturb everything after the first window; the first rebalance must not change.
        for row in truncated.returns.returns[24..].iter_mut() {
            row[0] -= 0.05;
        }
        let (a, _) = run(&full).unwrap();
        let (b, _) = run(&truncated).unwrap();
        assert_eq!(a.rebalances[0].weights, b.rebalances[0].weights);
    }

    // ------------------------------------------------------------------
    // 4. Transaction costs
    // ------------------------------------------------------------------
    #[test]
    fn test_costs_reduce_value() {
        let (free, _) = run(&input(60)).unwrap();
        let mut costly = input(60);
        costly.transaction_cost_bps = 50.0;
        let (paid, _) = run(&costly).unwrap();
        assert!(paid.total_transaction_costs > 0.0);
        assert!(paid.final_value < free.final_value);
        // Initial allocation from cash counts as full turnover.
        assert!((paid.rebalances[0].turnover - 1.0).abs() < 1e-6);
    }

    // ------------------------------------------------------------------
    // 5. Data sufficiency
    // ------------------------------------------------------------------
    #[test]
    fn test_insufficient_history() {
        let mut inp = input(24);
        assert!(matches!(run(&inp).unwrap_err(), EngineError::DataInsufficiency(_)));
        inp = input(60);
        inp.lookback = 3;
        assert!(matches!(run(&inp).unwrap_err(), EngineError::DataInsufficiency(_)));
    }

    // ------------------------------------------------------------------
    // 6. Failed re-estimation holds previous weights
    // ------------------------------------------------------------------
    #[test]
    fn test_singular_window_holds_previous() {
        let mut inp = input(60);
        // From row 30 on, Gold = Equity + Bonds, so every window starting at 30+ is singular.
        for row in inp.returns.returns[30..].iter_mut() {
            row[2] = row[0] + row[1];
        }
        let (r, warnings) = run(&inp).unwrap();
        assert!(r.failed_rebalances > 0);
        assert!(warnings.iter().any(|w| w.contains("holding previous weights")));
        let held = r.rebalances.iter().find(|rb| rb.held_previous).unwrap();
        assert!(held.turnover.abs() < 1e-12, "holding costs nothing");
    }

    #[test]
    fn test_singular_first_window_is_error() {
        let mut inp = input(60);
        for row in inp.returns.returns.iter_mut() {
            row[2] = row[0] + row[1];
        }
        assert!(matches!(
            run(&inp).unwrap_err(),
            EngineError::SingularCovariance { .. }
        ));
    }

    // ------------------------------------------------------------------
    // 7. Parallel runs match sequential ones
    // ------------------------------------------------------------------
    #[test]
    fn test_backtest_many_preserves_order() {
        let mut second = input(60);
        second.method = OptimizationMethod::RiskParity;
        second.label = Some("risk-parity".into());
        let inputs = vec![input(60), second];
        let results = backtest_many(&inputs);
        assert_eq!(results.len(), 2);
        let first = results[0].as_ref().unwrap();
        let sequential = backtest(&inputs[0]).unwrap();
        assert_eq!(first.result.final_value, sequential.result.final_value);
        assert_eq!(
            results[1].as_ref().unwrap().result.label.as_deref(),
            Some("risk-parity")
        );
    }

    // ------------------------------------------------------------------
    // 8. Total loss ends the walk without NaN
    // ------------------------------------------------------------------
    #[test]
    fn test_total_loss_stops_walk() {
        let mut inp = input(60);
        inp.returns.returns[40] = vec![-1.0, -1.0, -1.0];
        let (r, warnings) = run(&inp).unwrap();

        assert_eq!(r.exhausted_at, Some(40));
        assert_eq!(r.points.len(), 17, "points 24..=40 only");
        assert_eq!(r.final_value, 0.0);
        let last = r.points.last().unwrap();
        assert_eq!(last.period, 40);
        assert_eq!(last.period_return, -1.0);
        assert!(r.points.iter().all(|p| p.period_return.is_finite()));
        assert!(warnings.iter().any(|w| w.contains("reached zero")));

        let s = &r.summary;
        assert_eq!(s.total_return, -1.0);
        assert_eq!(s.max_drawdown, -1.0);
        assert!(s.sharpe_ratio.is_finite() && s.annualized_volatility.is_finite());
    }
}
