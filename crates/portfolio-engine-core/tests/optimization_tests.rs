use approx::assert_abs_diff_eq;
use portfolio_engine_core::frontier::{efficient_frontier, FrontierInput};
use portfolio_engine_core::linalg::quad_form;
use portfolio_engine_core::optimization::risk_parity::risk_contributions;
use portfolio_engine_core::optimization::{
    optimize, BlackLittermanConfig, ConstraintSet, ConvergenceStatus, OptimizationInput,
    OptimizationMethod, OptimizationParams, SectorConstraint, SolverSettings, View,
};
use portfolio_engine_core::EngineError;
use pretty_assertions::assert_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

// ===========================================================================
// Optimization engine: the five methods through the public `optimize` entry
// ===========================================================================

fn four_asset_market() -> (Vec<f64>, Vec<Vec<f64>>) {
    let vols = [0.18, 0.07, 0.22, 0.12];
    let corr = [
        [1.00, 0.20, 0.65, 0.40],
        [0.20, 1.00, 0.10, 0.15],
        [0.65, 0.10, 1.00, 0.35],
        [0.40, 0.15, 0.35, 1.00],
    ];
    let cov = (0..4)
        .map(|i| (0..4).map(|j| corr[i][j] * vols[i] * vols[j]).collect())
        .collect();
    (vec![0.085, 0.035, 0.10, 0.06], cov)
}

fn input(method: OptimizationMethod, constraints: ConstraintSet) -> OptimizationInput {
    let (mu, cov) = four_asset_market();
    OptimizationInput {
        asset_names: Some(vec![
            "US Equity".into(),
            "Treasuries".into(),
            "EM Equity".into(),
            "Real Estate".into(),
        ]),
        expected_returns: mu,
        covariance_matrix: cov,
        constraints,
        method,
        params: OptimizationParams {
            risk_free_rate: 0.02,
            ..OptimizationParams::default()
        },
    }
}

// ---------------------------------------------------------------------------
// 1. Every method returns weights that satisfy the constraint set
// ---------------------------------------------------------------------------

#[test]
fn test_all_methods_respect_budget_and_bounds() {
    let cs = ConstraintSet {
        max_weights: Some(vec![0.45; 4]),
        ..ConstraintSet::default()
    };
    let methods = vec![
        OptimizationMethod::MinVolatility,
        OptimizationMethod::MeanVariance {
            risk_aversion: 3.0,
            target_return: None,
        },
        OptimizationMethod::MaxSharpe,
        OptimizationMethod::RiskParity,
        OptimizationMethod::BlackLitterman(BlackLittermanConfig {
            market_weights: Some(vec![0.4, 0.3, 0.1, 0.2]),
            ..BlackLittermanConfig::default()
        }),
    ];
    for method in methods {
        let label = format!("{:?}", method.kind());
        let out = optimize(&input(method, cs.clone())).unwrap().result;
        let sum: f64 = out.weights.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6, "{}: weights sum to {}", label, sum);
        assert!(
            cs.is_satisfied(&out.weights, 1e-6),
            "{}: weights {:?} violate constraints",
            label,
            out.weights
        );
    }
}

// ---------------------------------------------------------------------------
// 2. Minimum volatility beats random feasible portfolios
// ---------------------------------------------------------------------------

#[test]
fn test_min_volatility_dominates_random_portfolios() {
    let out = optimize(&input(OptimizationMethod::MinVolatility, ConstraintSet::long_only()))
        .unwrap()
        .result;
    let (_, cov) = four_asset_market();
    let best = quad_form(&out.weights, &cov);

    let mut rng = StdRng::seed_from_u64(2024);
    for _ in 0..10_000 {
        let raw: Vec<f64> = (0..4).map(|_| rng.gen::<f64>()).collect();
        let total: f64 = raw.iter().sum();
        let w: Vec<f64> = raw.iter().map(|x| x / total).collect();
        assert!(
            quad_form(&w, &cov) >= best - 1e-10,
            "random portfolio {:?} has lower variance than the optimum",
            w
        );
    }
}

// ---------------------------------------------------------------------------
// 3. Conflicting minimums are rejected before solving
// ---------------------------------------------------------------------------

#[test]
fn test_conflicting_minimums_are_infeasible() {
    let (_, cov) = four_asset_market();
    let inp = OptimizationInput {
        asset_names: Some(vec!["Alpha".into(), "Beta".into(), "Gamma".into()]),
        expected_returns: vec![0.08, 0.05, 0.06],
        covariance_matrix: cov[..3].iter().map(|r| r[..3].to_vec()).collect(),
        constraints: ConstraintSet {
            min_weights: Some(vec![0.5, 0.5, 0.1]),
            ..ConstraintSet::default()
        },
        method: OptimizationMethod::MinVolatility,
        params: OptimizationParams::default(),
    };
    match optimize(&inp).unwrap_err() {
        EngineError::InfeasibleConstraints { constraint, reason } => {
            assert_eq!(constraint, "min_weights");
            assert!(reason.contains("Alpha (50%)"), "reason: {}", reason);
            assert!(reason.contains("Gamma (10%)"), "reason: {}", reason);
        }
        other => panic!("expected InfeasibleConstraints, got {:?}", other),
    }
}

#[test]
fn test_sector_cap_below_member_minimums_is_infeasible() {
    let cs = ConstraintSet {
        min_weights: Some(vec![0.2, 0.0, 0.2, 0.0]),
        sectors: vec![SectorConstraint {
            name: "Equity".into(),
            asset_indices: vec![0, 2],
            min_weight: 0.0,
            max_weight: 0.3,
        }],
        ..ConstraintSet::default()
    };
    let err = optimize(&input(OptimizationMethod::MinVolatility, cs)).unwrap_err();
    assert!(
        matches!(err, EngineError::InfeasibleConstraints { ref constraint, .. } if constraint == "sector:Equity"),
        "got {:?}",
        err
    );
}

// ---------------------------------------------------------------------------
// 4. Maximum Sharpe closed form on two uncorrelated assets
// ---------------------------------------------------------------------------

#[test]
fn test_max_sharpe_two_uncorrelated_assets() {
    // Σ⁻¹(μ - r_f·1) = [0.08 / 0.04, 0.04 / 0.01] = [2, 4], normalised to [1/3, 2/3].
    let inp = OptimizationInput {
        asset_names: None,
        expected_returns: vec![0.10, 0.06],
        covariance_matrix: vec![vec![0.04, 0.0], vec![0.0, 0.01]],
        constraints: ConstraintSet::unconstrained(),
        method: OptimizationMethod::MaxSharpe,
        params: OptimizationParams {
            risk_free_rate: 0.02,
            ..OptimizationParams::default()
        },
    };
    let out = optimize(&inp).unwrap().result;
    assert_abs_diff_eq!(out.weights[0], 1.0 / 3.0, epsilon = 1e-12);
    assert_abs_diff_eq!(out.weights[1], 2.0 / 3.0, epsilon = 1e-12);
}

#[test]
fn test_max_sharpe_beats_other_methods() {
    let cs = ConstraintSet::long_only();
    let sharpe = optimize(&input(OptimizationMethod::MaxSharpe, cs.clone()))
        .unwrap()
        .result
        .sharpe_ratio;
    for method in [OptimizationMethod::MinVolatility, OptimizationMethod::RiskParity] {
        let other = optimize(&input(method, cs.clone())).unwrap().result;
        assert!(
            sharpe >= other.sharpe_ratio - 1e-7,
            "max Sharpe {} < {:?} Sharpe {}",
            sharpe,
            other.method,
            other.sharpe_ratio
        );
    }
}

// ---------------------------------------------------------------------------
// 5. Risk parity equalises contributions or says it did not
// ---------------------------------------------------------------------------

#[test]
fn test_risk_parity_contributions_equal_or_partial() {
    let out = optimize(&input(OptimizationMethod::RiskParity, ConstraintSet::long_only()))
        .unwrap()
        .result;
    let (_, cov) = four_asset_market();
    let rc = risk_contributions(&out.weights, &cov);
    let mean = rc.iter().sum::<f64>() / rc.len() as f64;
    let max_dev = rc.iter().map(|c| (c - mean).abs()).fold(0.0, f64::max);
    assert!(
        max_dev < 1e-4 || out.status == ConvergenceStatus::PartialConvergence,
        "max deviation {} with status {:?}",
        max_dev,
        out.status
    );
}

#[test]
fn test_capped_risk_parity_reports_partial_convergence() {
    let cs = ConstraintSet {
        max_weights: Some(vec![1.0, 0.25, 1.0, 1.0]),
        ..ConstraintSet::long_only()
    };
    let out = optimize(&input(OptimizationMethod::RiskParity, cs)).unwrap();
    let (_, cov) = four_asset_market();
    let rc = risk_contributions(&out.result.weights, &cov);
    let mean = rc.iter().sum::<f64>() / rc.len() as f64;
    let max_dev = rc.iter().map(|c| (c - mean).abs()).fold(0.0, f64::max);

    assert!(out.result.weights[1] <= 0.25 + 1e-6, "cap respected");
    assert!(max_dev >= 1e-4, "cap should unbalance contributions, dev {}", max_dev);
    assert_eq!(
        out.result.status,
        ConvergenceStatus::PartialConvergence,
        "projected weights with unequal contributions must not be tagged converged"
    );
    assert!(!out.warnings.is_empty(), "projection should be reported");
}

#[test]
fn test_capped_risk_parity_fails_when_convergence_required() {
    let cs = ConstraintSet {
        max_weights: Some(vec![1.0, 0.25, 1.0, 1.0]),
        ..ConstraintSet::long_only()
    };
    let mut inp = input(OptimizationMethod::RiskParity, cs);
    inp.params.require_convergence = true;
    assert!(matches!(
        optimize(&inp),
        Err(EngineError::ConvergenceFailure { .. })
    ));
}

// ---------------------------------------------------------------------------
// 6. Black-Litterman without views is the prior
// ---------------------------------------------------------------------------

#[test]
fn test_black_litterman_without_views_returns_prior() {
    let prior = vec![0.07, 0.03, 0.09, 0.05];
    let bl = BlackLittermanConfig {
        prior_returns: Some(prior.clone()),
        ..BlackLittermanConfig::default()
    };
    let out = optimize(&input(
        OptimizationMethod::BlackLitterman(bl),
        ConstraintSet::long_only(),
    ))
    .unwrap()
    .result;
    assert_eq!(out.posterior_returns, Some(prior.clone()));
    assert_eq!(out.prior_returns, Some(prior));
}

#[test]
fn test_black_litterman_bullish_view_tilts_weights() {
    let market = vec![0.4, 0.3, 0.1, 0.2];
    let base = BlackLittermanConfig {
        market_weights: Some(market.clone()),
        ..BlackLittermanConfig::default()
    };
    let with_view = BlackLittermanConfig {
        views: vec![View {
            label: Some("Real estate rallies".into()),
            weights: vec![0.0, 0.0, 0.0, 1.0],
            expected_return: 0.12,
            uncertainty: None,
        }],
        ..base.clone()
    };
    let cs = ConstraintSet::long_only();
    let before = optimize(&input(OptimizationMethod::BlackLitterman(base), cs.clone()))
        .unwrap()
        .result;
    let after = optimize(&input(OptimizationMethod::BlackLitterman(with_view), cs))
        .unwrap()
        .result;
    assert!(
        after.weights[3] > before.weights[3],
        "view should raise the real-estate weight: {} -> {}",
        before.weights[3],
        after.weights[3]
    );
}

// ---------------------------------------------------------------------------
// 7. Efficient frontier is monotone in risk
// ---------------------------------------------------------------------------

#[test]
fn test_frontier_risk_non_decreasing() {
    let (mu, cov) = four_asset_market();
    for constraints in [ConstraintSet::unconstrained(), ConstraintSet::long_only()] {
        let out = efficient_frontier(&FrontierInput {
            asset_names: None,
            expected_returns: mu.clone(),
            covariance_matrix: cov.clone(),
            constraints,
            point_count: 30,
            risk_free_rate: 0.02,
            solver: SolverSettings::default(),
        })
        .unwrap()
        .result;
        assert_eq!(out.points.len(), 30);
        for pair in out.points.windows(2) {
            assert!(
                pair[1].risk >= pair[0].risk - 1e-8,
                "risk fell from {} to {} as return rose to {}",
                pair[0].risk,
                pair[1].risk,
                pair[1].target_return
            );
        }
    }
}

// ---------------------------------------------------------------------------
// 8. JSON request shape
// ---------------------------------------------------------------------------

#[test]
fn test_request_from_json() {
    let json = r#"{
        "expected_returns": [0.10, 0.06],
        "covariance_matrix": [[0.04, 0.0], [0.0, 0.01]],
        "method": "mean_variance",
        "target_return": 0.08
    }"#;
    let inp: OptimizationInput = serde_json::from_str(json).unwrap();
    let out = optimize(&inp).unwrap().result;
    assert_abs_diff_eq!(out.expected_return, 0.08, epsilon = 1e-6);
    assert!(out.weights.iter().all(|w| *w >= -1e-9), "long-only by default");
}
