use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::debug;

use crate::error::EngineError;
use crate::risk::attribution::{
    attribute, AttributionResult, AttributionScheme, SectorPerformance,
};
use crate::risk::drawdown::{drawdown_from_returns, DrawdownStats};
use crate::risk::performance::{
    performance_summary, tracking_statistics, PerformanceSummary, TrackingStats,
};
use crate::risk::var::{
    historical_cvar, historical_var, parametric_cvar, parametric_var, validate_confidence,
};
use crate::stats::{excess_kurtosis, mean, sample_std, skewness};
use crate::types::{with_metadata, ComputationOutput, ReturnMatrix};
use crate::validation::validate_vector;
use crate::EngineResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

fn default_confidence() -> f64 {
    0.95
}

fn default_horizon() -> f64 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskInput {
    /// Fixed portfolio weights, in the column order of `returns`.
    pub weights: Vec<f64>,
    pub returns: ReturnMatrix,
    #[serde(default)]
    pub benchmark_returns: Option<Vec<f64>>,
    #[serde(default = "default_confidence")]
    pub confidence_level: f64,
    /// Horizon in periods for parametric VaR/CVaR.
    #[serde(default = "default_horizon")]
    pub horizon_periods: f64,
    /// Per period.
    #[serde(default)]
    pub risk_free_rate: f64,
    #[serde(default)]
    pub sectors: Option<Vec<SectorPerformance>>,
    #[serde(default)]
    pub attribution_scheme: AttributionScheme,
}

/// Share of portfolio volatility attributable to one asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentRisk {
    pub name: String,
    pub weight: f64,
    /// d(sigma_p)/d(w_i) = cov(r_i, r_p) / sigma_p.
    pub marginal_contribution: f64,
    /// w_i times the marginal contribution; sums to sigma_p.
    pub risk_contribution: f64,
    pub percent_of_risk: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskReport {
    pub observations: usize,
    pub confidence_level: f64,
    pub horizon_periods: f64,
    /// One-period historical VaR, as a positive loss.
    pub historical_var: f64,
    pub historical_cvar: f64,
    pub parametric_var: f64,
    pub parametric_cvar: f64,
    pub mean_return: f64,
    pub volatility: f64,
    pub skewness: f64,
    pub excess_kurtosis: f64,
    pub drawdown: DrawdownStats,
    pub performance: PerformanceSummary,
    pub tracking: Option<TrackingStats>,
    pub component_risk: Vec<ComponentRisk>,
    pub attribution: Option<AttributionResult>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Risk and performance of a fixed-weight portfolio over historical returns.
pub fn analyze_risk(input: &RiskInput) -> EngineResult<ComputationOutput<RiskReport>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    validate_input(input, &mut warnings)?;
    let returns = &input.returns;
    let portfolio = returns.portfolio_returns(&input.weights);
    let t = portfolio.len();
    let c = input.confidence_level;
    let h = input.horizon_periods;

    let mu = mean(&portfolio);
    let sigma = sample_std(&portfolio);
    let tail_count = ((1.0 - c) * t as f64).floor() as usize;
    if tail_count < 2 {
        warnings.push(format!(
            "Only {} of {} observations lie beyond the {:.1}% tail; historical VaR/CVaR are imprecise",
            tail_count,
            t,
            c * 100.0
        ));
    }

    let tracking = match input.benchmark_returns {
        Some(ref bench) => Some(tracking_statistics(&portfolio, bench, returns.frequency)?),
        None => None,
    };

    let attribution = match input.sectors {
        Some(ref sectors) => {
            let (result, attribution_warnings) = attribute(sectors, input.attribution_scheme)?;
            warnings.extend(attribution_warnings);
            Some(result)
        }
        None => None,
    };

    debug!(observations = t, mu, sigma, "risk: portfolio series built");

    let report = RiskReport {
        observations: t,
        confidence_level: c,
        horizon_periods: h,
        historical_var: historical_var(&portfolio, c),
        historical_cvar: historical_cvar(&portfolio, c),
        parametric_var: parametric_var(mu, sigma, c, h)?,
        parametric_cvar: parametric_cvar(mu, sigma, c, h)?,
        mean_return: mu,
        volatility: sigma,
        skewness: skewness(&portfolio),
        excess_kurtosis: excess_kurtosis(&portfolio),
        drawdown: drawdown_from_returns(&portfolio),
        performance: performance_summary(&portfolio, returns.frequency, input.risk_free_rate),
        tracking,
        component_risk: component_risk(returns, &input.weights, &portfolio),
        attribution,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Historical and parametric (normal) VaR/CVaR, drawdown scan, tracking error",
        &serde_json::json!({
            "confidence_level": c,
            "horizon_periods": h,
            "observations": t,
            "frequency": returns.frequency,
            "risk_free_rate": input.risk_free_rate,
        }),
        warnings,
        elapsed,
        report,
    ))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn validate_input(input: &RiskInput, warnings: &mut Vec<String>) -> EngineResult<()> {
    input.returns.validate()?;
    validate_vector("weights", &input.weights, input.returns.n_assets())?;
    validate_confidence(input.confidence_level)?;
    if input.horizon_periods.is_nan() || input.horizon_periods <= 0.0 {
        return Err(EngineError::invalid(
            "horizon_periods",
            "Horizon must be positive",
        ));
    }
    if !input.risk_free_rate.is_finite() {
        return Err(EngineError::invalid(
            "risk_free_rate",
            "Risk-free rate must be finite",
        ));
    }
    let total: f64 = input.weights.iter().sum();
    if (total - 1.0).abs() > 1e-6 {
        warnings.push(format!("Weights sum to {:.6}, not 1.0", total));
    }
    Ok(())
}

/// Euler decomposition of sample portfolio volatility from asset/portfolio
/// covariances, so it needs no covariance matrix.
fn component_risk(returns: &ReturnMatrix, weights: &[f64], portfolio: &[f64]) -> Vec<ComponentRisk> {
    let t = portfolio.len();
    let mp = mean(portfolio);
    let sigma = sample_std(portfolio);
    let denom = (t.max(2) - 1) as f64;

    returns
        .asset_names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let col = returns.column(i);
            let mi = mean(&col);
            let cov: f64 = col
                .iter()
                .zip(portfolio.iter())
                .map(|(r, p)| (r - mi) * (p - mp))
                .sum::<f64>()
                / denom;
            let marginal = if sigma > 0.0 { cov / sigma } else { 0.0 };
            let rc = weights[i] * marginal;
            ComponentRisk {
                name: name.clone(),
                weight: weights[i],
                marginal_contribution: marginal,
                risk_contribution: rc,
                percent_of_risk: if sigma > 0.0 { rc / sigma } else { 0.0 },
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample_returns() -> ReturnMatrix {
        let rows: Vec<Vec<f64>> = (0..48)
            .map(|t| {
                let x = t as f64;
                vec![
                    0.010 + 0.04 * (x * 0.7).sin(),
                    0.006 + 0.02 * (x * 1.3).cos(),
                    0.008 + 0.03 * (x * 0.4 + 1.0).sin(),
                ]
            })
            .collect();
        ReturnMatrix::new(vec!["Eq".into(), "Bd".into(), "Re".into()], rows)
    }

    fn input() -> RiskInput {
        RiskInput {
            weights: vec![0.5, 0.3, 0.2],
            returns: sample_returns(),
            benchmark_returns: None,
            confidence_level: 0.95,
            horizon_periods: 1.0,
            risk_free_rate: 0.0,
            sectors: None,
            attribution_scheme: AttributionScheme::default(),
        }
    }

    // ------------------------------------------------------------------
    // 1. Core report
    // ------------------------------------------------------------------
    #[test]
    fn test_report_fields() {
        let out = analyze_risk(&input()).unwrap();
        let r = out.result;
        assert_eq!(r.observations, 48);
        assert!(r.historical_cvar >= r.historical_var, "CVaR is never below VaR");
        assert!(r.parametric_cvar > r.parametric_var);
        assert!(r.drawdown.max_drawdown <= 0.0);
        assert!(r.tracking.is_none());
        assert!(r.attribution.is_none());
    }

    // ------------------------------------------------------------------
    // 2. Component risk sums to portfolio volatility
    // ------------------------------------------------------------------
    #[test]
    fn test_component_risk_sums_to_volatility() {
        let r = analyze_risk(&input()).unwrap().result;
        let total: f64 = r.component_risk.iter().map(|c| c.risk_contribution).sum();
        assert_relative_eq!(total, r.volatility, epsilon = 1e-12);
        let pct: f64 = r.component_risk.iter().map(|c| c.percent_of_risk).sum();
        assert_relative_eq!(pct, 1.0, epsilon = 1e-12);
    }

    // ------------------------------------------------------------------
    // 3. Benchmark and attribution are optional extras
    // ------------------------------------------------------------------
    #[test]
    fn test_with_benchmark_and_sectors() {
        let mut inp = input();
        inp.benchmark_returns = Some(inp.returns.column(0));
        inp.sectors = Some(vec![SectorPerformance {
            sector: "All".into(),
            portfolio_weight: 1.0,
            benchmark_weight: 1.0,
            portfolio_return: 0.05,
            benchmark_return: 0.04,
        }]);
        let r = analyze_risk(&inp).unwrap().result;
        assert!(r.tracking.unwrap().tracking_error > 0.0);
        let a = r.attribution.unwrap();
        assert_relative_eq!(a.total_excess_return, 0.01, epsilon = 1e-15);
    }

    #[test]
    fn test_weight_length_mismatch() {
        let mut inp = input();
        inp.weights = vec![0.5, 0.5];
        assert!(matches!(
            analyze_risk(&inp).unwrap_err(),
            EngineError::Validation { .. }
        ));
    }

    #[test]
    fn test_short_sample_warns() {
        let mut inp = input();
        inp.returns = inp.returns.window(0, 20);
        let out = analyze_risk(&inp).unwrap();
        assert!(out.warnings.iter().any(|w| w.contains("tail")));
    }
}
