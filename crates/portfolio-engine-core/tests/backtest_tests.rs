use chrono::{Months, NaiveDate};
use portfolio_engine_core::backtest::{backtest, backtest_many, BacktestInput};
use portfolio_engine_core::estimation::EstimatorConfig;
use portfolio_engine_core::optimization::{
    ConstraintSet, OptimizationMethod, OptimizationParams,
};
use portfolio_engine_core::{EngineError, ReturnFrequency, ReturnMatrix};
use pretty_assertions::assert_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

// ===========================================================================
// Walk-forward backtesting
// ===========================================================================

fn monthly_history(periods: usize) -> ReturnMatrix {
    let mut rng = StdRng::seed_from_u64(17);
    let rows = (0..periods)
        .map(|_| {
            vec![
                0.007 + rng.gen_range(-0.05..0.05),
                0.003 + rng.gen_range(-0.01..0.01),
                0.006 + rng.gen_range(-0.03..0.03),
                0.005 + rng.gen_range(-0.04..0.04),
            ]
        })
        .collect();
    let start = NaiveDate::from_ymd_opt(2015, 1, 31).unwrap();
    let dates = (0..periods)
        .map(|k| start.checked_add_months(Months::new(k as u32)).unwrap())
        .collect();
    ReturnMatrix {
        asset_names: vec!["Stocks".into(), "Bonds".into(), "Credit".into(), "REITs".into()],
        returns: rows,
        dates: Some(dates),
        frequency: ReturnFrequency::Monthly,
    }
}

fn request(method: OptimizationMethod) -> BacktestInput {
    BacktestInput {
        label: None,
        returns: monthly_history(96),
        lookback: 36,
        rebalance_interval: 6,
        constraints: ConstraintSet::long_only(),
        method,
        params: OptimizationParams::default(),
        estimator: EstimatorConfig::default(),
        transaction_cost_bps: 10.0,
        initial_value: 1.0,
    }
}

// ---------------------------------------------------------------------------
// 1. Dated out-of-sample record
// ---------------------------------------------------------------------------

#[test]
fn test_backtest_record_is_dated_and_out_of_sample() {
    let out = backtest(&request(OptimizationMethod::MinVolatility)).unwrap().result;
    assert_eq!(out.points.len(), 60);
    assert_eq!(out.rebalances.len(), 10);
    let first = &out.rebalances[0];
    assert_eq!(first.period, 36, "first weights apply after the first lookback window");
    assert_eq!(first.date, NaiveDate::from_ymd_opt(2018, 1, 31));
    assert!(out.points.iter().all(|p| p.period >= 36));
    assert_eq!(out.summary.periods, 60);
    assert!(out.summary.annualized_volatility > 0.0);
    assert!(out.total_transaction_costs > 0.0);
}

// ---------------------------------------------------------------------------
// 2. Every method runs; parallel runs are independent
// ---------------------------------------------------------------------------

#[test]
fn test_backtest_many_methods() {
    let inputs = vec![
        request(OptimizationMethod::MinVolatility),
        request(OptimizationMethod::MaxSharpe),
        request(OptimizationMethod::RiskParity),
        request(OptimizationMethod::MeanVariance {
            risk_aversion: 4.0,
            target_return: None,
        }),
    ];
    let results = backtest_many(&inputs);
    assert_eq!(results.len(), 4);
    for (i, r) in results.iter().enumerate() {
        let r = r.as_ref().unwrap_or_else(|e| panic!("run {} failed: {}", i, e));
        assert!(r.result.final_value > 0.0);
        for rb in &r.result.rebalances {
            let sum: f64 = rb.weights.iter().sum();
            assert!((sum - 1.0).abs() < 1e-6, "run {}: weights sum {}", i, sum);
        }
    }
    let again = backtest(&inputs[2]).unwrap();
    assert_eq!(
        results[2].as_ref().unwrap().result.final_value,
        again.result.final_value
    );
}

// ---------------------------------------------------------------------------
// 3. Insufficient history
// ---------------------------------------------------------------------------

#[test]
fn test_lookback_longer_than_history() {
    let mut inp = request(OptimizationMethod::MinVolatility);
    inp.lookback = 96;
    assert!(matches!(
        backtest(&inp).unwrap_err(),
        EngineError::DataInsufficiency(_)
    ));
}
