use statrs::distribution::{Continuous, ContinuousCDF, Normal};

use crate::error::EngineError;
use crate::stats::{percentile_sorted, sorted_copy};
use crate::EngineResult;

pub fn validate_confidence(confidence: f64) -> EngineResult<()> {
    if !(confidence > 0.0 && confidence < 1.0) {
        return Err(EngineError::invalid(
            "confidence_level",
            "Confidence level must be between 0 and 1 (exclusive)",
        ));
    }
    Ok(())
}

fn standard_normal() -> EngineResult<Normal> {
    Normal::new(0.0, 1.0).map_err(|e| EngineError::invalid("normal", e.to_string()))
}

/// Historical VaR: the negated (1 - confidence) percentile of realised returns,
/// reported as a positive loss.
pub fn historical_var(returns: &[f64], confidence: f64) -> f64 {
    let sorted = sorted_copy(returns);
    -percentile_sorted(&sorted, (1.0 - confidence) * 100.0)
}

/// Historical CVaR: mean loss over returns at or beyond the VaR threshold.
pub fn historical_cvar(returns: &[f64], confidence: f64) -> f64 {
    let var = historical_var(returns, confidence);
    let tail: Vec<f64> = returns.iter().copied().filter(|r| *r <= -var).collect();
    if tail.is_empty() {
        return var;
    }
    -(tail.iter().sum::<f64>() / tail.len() as f64)
}

/// Parametric (normal) VaR over `horizon` periods:
/// -μΔt + σ√Δt Φ⁻¹(confidence).
pub fn parametric_var(mean: f64, std_dev: f64, confidence: f64, horizon: f64) -> EngineResult<f64> {
    validate_confidence(confidence)?;
    let z = standard_normal()?.inverse_cdf(confidence);
    Ok(-mean * horizon + std_dev * horizon.sqrt() * z)
}

/// Parametric (normal) CVaR: -μΔt + σ√Δt φ(z) / (1 - confidence).
pub fn parametric_cvar(mean: f64, std_dev: f64, confidence: f64, horizon: f64) -> EngineResult<f64> {
    validate_confidence(confidence)?;
    let normal = standard_normal()?;
    let z = normal.inverse_cdf(confidence);
    Ok(-mean * horizon + std_dev * horizon.sqrt() * normal.pdf(z) / (1.0 - confidence))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_historical_var_interpolated() {
        // 21 returns from -0.10 to +0.10 step 0.01; the 5th percentile is -0.09.
        let r: Vec<f64> = (0..21).map(|i| -0.10 + 0.01 * i as f64).collect();
        let var = historical_var(&r, 0.95);
        assert!((var - 0.09).abs() < 1e-12, "var = {}", var);
        let cvar = historical_cvar(&r, 0.95);
        assert!((cvar - 0.095).abs() < 1e-12, "cvar = {}", cvar);
    }

    #[test]
    fn test_cvar_at_least_var() {
        let r = [0.02, -0.03, 0.01, -0.07, 0.04, -0.01, 0.00, -0.12, 0.03, 0.05];
        assert!(historical_cvar(&r, 0.9) >= historical_var(&r, 0.9));
    }

    #[test]
    fn test_parametric_var_known_value() {
        // Zero mean, 1% vol, 95%: 1.6449 * 0.01
        let var = parametric_var(0.0, 0.01, 0.95, 1.0).unwrap();
        assert!((var - 0.016448536).abs() < 1e-8, "var = {}", var);
        // Ten-period horizon scales by sqrt(10)
        let var10 = parametric_var(0.0, 0.01, 0.95, 10.0).unwrap();
        assert!((var10 - var * 10f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_parametric_cvar_exceeds_var() {
        let var = parametric_var(0.001, 0.02, 0.99, 1.0).unwrap();
        let cvar = parametric_cvar(0.001, 0.02, 0.99, 1.0).unwrap();
        assert!(cvar > var);
    }

    #[test]
    fn test_invalid_confidence() {
        assert!(parametric_var(0.0, 0.01, 1.0, 1.0).is_err());
        assert!(validate_confidence(0.0).is_err());
    }
}
