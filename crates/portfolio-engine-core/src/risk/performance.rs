use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::risk::drawdown::drawdown_from_returns;
use crate::stats::{mean, sample_std};
use crate::types::ReturnFrequency;
use crate::EngineResult;

/// Realised performance of a periodic return series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceSummary {
    pub periods: usize,
    pub total_return: f64,
    /// Geometric: (1 + total)^(periods_per_year / periods) - 1.
    pub annualized_return: f64,
    pub annualized_volatility: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub calmar_ratio: Option<f64>,
    pub max_drawdown: f64,
    pub downside_deviation: f64,
    pub best_period: f64,
    pub worst_period: f64,
    /// Share of periods with a positive return.
    pub hit_rate: f64,
}

/// Active-return statistics against a benchmark series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingStats {
    /// Per-period standard deviation of (portfolio - benchmark).
    pub tracking_error: f64,
    pub annualized_tracking_error: f64,
    pub mean_active_return: f64,
    pub annualized_active_return: f64,
    pub information_ratio: Option<f64>,
    pub beta: Option<f64>,
    pub correlation: Option<f64>,
}

/// `risk_free_rate` is per period, the same unit as `returns`.
pub fn performance_summary(
    returns: &[f64],
    frequency: ReturnFrequency,
    risk_free_rate: f64,
) -> PerformanceSummary {
    let n = returns.len();
    let ppy = frequency.periods_per_year();
    let total_return = returns.iter().fold(1.0, |acc, r| acc * (1.0 + r)) - 1.0;
    let annualized_return = if n == 0 {
        0.0
    } else if 1.0 + total_return <= 0.0 {
        -1.0
    } else {
        (1.0 + total_return).powf(ppy / n as f64) - 1.0
    };

    let annualized_volatility = sample_std(returns) * ppy.sqrt();
    let excess_mean = mean(returns) - risk_free_rate;
    let sharpe_ratio = if annualized_volatility > 0.0 {
        excess_mean * ppy / annualized_volatility
    } else {
        0.0
    };

    // Downside deviation below the risk-free rate
    let downside_deviation = if n == 0 {
        0.0
    } else {
        let ss: f64 = returns
            .iter()
            .map(|r| (r - risk_free_rate).min(0.0).powi(2))
            .sum();
        (ss / n as f64).sqrt() * ppy.sqrt()
    };
    let sortino_ratio = if downside_deviation > 0.0 {
        excess_mean * ppy / downside_deviation
    } else {
        0.0
    };

    let max_drawdown = drawdown_from_returns(returns).max_drawdown;
    let calmar_ratio = if max_drawdown < 0.0 {
        Some(annualized_return / max_drawdown.abs())
    } else {
        None
    };

    PerformanceSummary {
        periods: n,
        total_return,
        annualized_return,
        annualized_volatility,
        sharpe_ratio,
        sortino_ratio,
        calmar_ratio,
        max_drawdown,
        downside_deviation,
        best_period: returns.iter().copied().reduce(f64::max).unwrap_or(0.0),
        worst_period: returns.iter().copied().reduce(f64::min).unwrap_or(0.0),
        hit_rate: if n == 0 {
            0.0
        } else {
            returns.iter().filter(|r| **r > 0.0).count() as f64 / n as f64
        },
    }
}

/// Tracking error is the sample standard deviation of the active return series.
pub fn tracking_statistics(
    portfolio: &[f64],
    benchmark: &[f64],
    frequency: ReturnFrequency,
) -> EngineResult<TrackingStats> {
    if benchmark.len() != portfolio.len() {
        return Err(EngineError::invalid(
            "benchmark_returns",
            format!(
                "Benchmark has {} periods but the portfolio has {}",
                benchmark.len(),
                portfolio.len()
            ),
        ));
    }
    if let Some(i) = benchmark.iter().position(|b| !b.is_finite()) {
        return Err(EngineError::invalid(
            format!("benchmark_returns[{}]", i),
            "Return must be a finite number",
        ));
    }
    if portfolio.len() < 2 {
        return Err(EngineError::DataInsufficiency(
            "At least 2 periods required for tracking error".into(),
        ));
    }

    let ppy = frequency.periods_per_year();
    let active: Vec<f64> = portfolio
        .iter()
        .zip(benchmark.iter())
        .map(|(p, b)| p - b)
        .collect();
    let tracking_error = sample_std(&active);
    let mean_active_return = mean(&active);
    let annualized_tracking_error = tracking_error * ppy.sqrt();
    let annualized_active_return = mean_active_return * ppy;

    let (mp, mb) = (mean(portfolio), mean(benchmark));
    let denom = (portfolio.len() - 1) as f64;
    let cov: f64 = portfolio
        .iter()
        .zip(benchmark.iter())
        .map(|(p, b)| (p - mp) * (b - mb))
        .sum::<f64>()
        / denom;
    let (sp, sb) = (sample_std(portfolio), sample_std(benchmark));

    Ok(TrackingStats {
        tracking_error,
        annualized_tracking_error,
        mean_active_return,
        annualized_active_return,
        information_ratio: (annualized_tracking_error > 0.0)
            .then(|| annualized_active_return / annualized_tracking_error),
        beta: (sb > 0.0).then(|| cov / (sb * sb)),
        correlation: (sp > 0.0 && sb > 0.0).then(|| cov / (sp * sb)),
    })
}
