use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::EngineError;
use crate::types::{with_metadata, ComputationOutput};
use crate::EngineResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Portfolio and benchmark weight and return of one sector over the period.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectorPerformance {
    pub sector: String,
    pub portfolio_weight: f64,
    pub benchmark_weight: f64,
    pub portfolio_return: f64,
    pub benchmark_return: f64,
}

/// How the allocation effect is measured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributionScheme {
    /// Allocation = (w_p - w_b) * r_b.
    #[default]
    BrinsonHoodBeebower,
    /// Allocation = (w_p - w_b) * (r_b - R_b), relative to the total benchmark return.
    BrinsonFachler,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributionInput {
    pub sectors: Vec<SectorPerformance>,
    #[serde(default)]
    pub scheme: AttributionScheme,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectorAttribution {
    pub sector: String,
    pub allocation_effect: f64,
    pub selection_effect: f64,
    pub interaction_effect: f64,
    pub total_effect: f64,
    pub portfolio_contribution: f64,
    pub benchmark_contribution: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributionResult {
    pub portfolio_return: f64,
    pub benchmark_return: f64,
    /// Portfolio minus benchmark return.
    pub total_excess_return: f64,
    pub total_allocation: f64,
    pub total_selection: f64,
    pub total_interaction: f64,
    pub sector_attribution: Vec<SectorAttribution>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Single-period Brinson attribution of excess return.
pub fn brinson_attribution(
    input: &AttributionInput,
) -> EngineResult<ComputationOutput<AttributionResult>> {
    let start = Instant::now();
    let (result, warnings) = attribute(&input.sectors, input.scheme)?;
    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        match input.scheme {
            AttributionScheme::BrinsonHoodBeebower => "Brinson-Hood-Beebower attribution",
            AttributionScheme::BrinsonFachler => "Brinson-Fachler attribution",
        },
        &serde_json::json!({
            "sectors": input.sectors.len(),
            "scheme": input.scheme,
        }),
        warnings,
        elapsed,
        result,
    ))
}

/// Split portfolio-minus-benchmark return into allocation, selection and
/// interaction effects. The three totals sum to `total_excess_return`.
pub fn attribute(
    sectors: &[SectorPerformance],
    scheme: AttributionScheme,
) -> EngineResult<(AttributionResult, Vec<String>)> {
    let mut warnings = Vec::new();
    validate_sectors(sectors, &mut warnings)?;

    let portfolio_return: f64 = sectors
        .iter()
        .map(|s| s.portfolio_weight * s.portfolio_return)
        .sum();
    let benchmark_return: f64 = sectors
        .iter()
        .map(|s| s.benchmark_weight * s.benchmark_return)
        .sum();

    let allocation_base = match scheme {
        AttributionScheme::BrinsonHoodBeebower => 0.0,
        AttributionScheme::BrinsonFachler => benchmark_return,
    };
    if scheme == AttributionScheme::BrinsonFachler {
        let active_weight: f64 = sectors
            .iter()
            .map(|s| s.portfolio_weight - s.benchmark_weight)
            .sum();
        if active_weight.abs() > 1e-9 {
            warnings.push(format!(
                "Portfolio and benchmark weights differ in total by {:.4}; Brinson-Fachler effects will not sum to the excess return",
                active_weight
            ));
        }
    }

    let mut total_allocation = 0.0;
    let mut total_selection = 0.0;
    let mut total_interaction = 0.0;
    let mut sector_attribution = Vec::with_capacity(sectors.len());

    for s in sectors {
        let active_weight = s.portfolio_weight - s.benchmark_weight;
        let allocation_effect = active_weight * (s.benchmark_return - allocation_base);
        let selection_effect = s.benchmark_weight * (s.portfolio_return - s.benchmark_return);
        let interaction_effect = active_weight * (s.portfolio_return - s.benchmark_return);

        total_allocation += allocation_effect;
        total_selection += selection_effect;
        total_interaction += interaction_effect;

        sector_attribution.push(SectorAttribution {
            sector: s.sector.clone(),
            allocation_effect,
            selection_effect,
            interaction_effect,
            total_effect: allocation_effect + selection_effect + interaction_effect,
            portfolio_contribution: s.portfolio_weight * s.portfolio_return,
            benchmark_contribution: s.benchmark_weight * s.benchmark_return,
        });
    }

    Ok((
        AttributionResult {
            portfolio_return,
            benchmark_return,
            total_excess_return: portfolio_return - benchmark_return,
            total_allocation,
            total_selection,
            total_interaction,
            sector_attribution,
        },
        warnings,
    ))
}

fn validate_sectors(sectors: &[SectorPerformance], warnings: &mut Vec<String>) -> EngineResult<()> {
    if sectors.is_empty() {
        return Err(EngineError::invalid(
            "sectors",
            "At least one sector is required",
        ));
    }
    for (i, s) in sectors.iter().enumerate() {
        let values = [
            s.portfolio_weight,
            s.benchmark_weight,
            s.portfolio_return,
            s.benchmark_return,
        ];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(EngineError::invalid(
                format!("sectors[{}]", i),
                format!("Sector '{}' has a non-finite weight or return", s.sector),
            ));
        }
        if s.portfolio_weight < 0.0 {
            warnings.push(format!(
                "Negative portfolio weight in sector '{}': {} (short position)",
                s.sector, s.portfolio_weight
            ));
        }
    }

    for (label, sum) in [
        ("Portfolio", sectors.iter().map(|s| s.portfolio_weight).sum::<f64>()),
        ("Benchmark", sectors.iter().map(|s| s.benchmark_weight).sum::<f64>()),
    ] {
        if (sum - 1.0).abs() > 0.02 {
            warnings.push(format!("{} weights sum to {:.4}, not 1.0", label, sum));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn sector(name: &str, wp: f64, wb: f64, rp: f64, rb: f64) -> SectorPerformance {
        SectorPerformance {
            sector: name.to_string(),
            portfolio_weight: wp,
            benchmark_weight: wb,
            portfolio_return: rp,
            benchmark_return: rb,
        }
    }

    fn three_sectors() -> Vec<SectorPerformance> {
        vec![
            sector("Technology", 0.40, 0.30, 0.12, 0.10),
            sector("Financials", 0.35, 0.40, 0.05, 0.06),
            sector("Energy", 0.25, 0.30, -0.02, 0.01),
        ]
    }

    // ------------------------------------------------------------------
    // 1. Effects sum to the excess return
    // ------------------------------------------------------------------
    #[test]
    fn test_identity_holds() {
        let (r, warnings) = attribute(&three_sectors(), AttributionScheme::default()).unwrap();
        assert!(warnings.is_empty(), "warnings: {:?}", warnings);
        let sum = r.total_allocation + r.total_selection + r.total_interaction;
        assert_abs_diff_eq!(sum, r.total_excess_return, epsilon = 1e-15);
        // Rp = 0.048 + 0.0175 - 0.005 = 0.0605; Rb = 0.03 + 0.024 + 0.003 = 0.057
        assert_abs_diff_eq!(r.portfolio_return, 0.0605, epsilon = 1e-12);
        assert_abs_diff_eq!(r.benchmark_return, 0.057, epsilon = 1e-12);
    }

    // ------------------------------------------------------------------
    // 2. Per-sector effects
    // ------------------------------------------------------------------
    #[test]
    fn test_sector_breakdown() {
        let (r, _) = attribute(&three_sectors(), AttributionScheme::default()).unwrap();
        let tech = &r.sector_attribution[0];
        assert_abs_diff_eq!(tech.allocation_effect, 0.10 * 0.10, epsilon = 1e-15);
        assert_abs_diff_eq!(tech.selection_effect, 0.30 * 0.02, epsilon = 1e-15);
        assert_abs_diff_eq!(tech.interaction_effect, 0.10 * 0.02, epsilon = 1e-15);
        for s in &r.sector_attribution {
            assert_abs_diff_eq!(
                s.total_effect,
                s.allocation_effect + s.selection_effect + s.interaction_effect,
                epsilon = 1e-15
            );
        }
    }

    // ------------------------------------------------------------------
    // 3. Brinson-Fachler re-centres allocation on the benchmark return
    // ------------------------------------------------------------------
    #[test]
    fn test_fachler_identity_with_matched_totals() {
        let (r, warnings) = attribute(&three_sectors(), AttributionScheme::BrinsonFachler).unwrap();
        assert!(warnings.is_empty());
        let sum = r.total_allocation + r.total_selection + r.total_interaction;
        assert_abs_diff_eq!(sum, r.total_excess_return, epsilon = 1e-15);
        let tech = &r.sector_attribution[0];
        assert_abs_diff_eq!(tech.allocation_effect, 0.10 * (0.10 - 0.057), epsilon = 1e-15);
    }

    #[test]
    fn test_identity_with_unbalanced_weights() {
        let sectors = vec![
            sector("A", 0.7, 0.2, 0.04, -0.01),
            sector("B", 0.6, 0.5, -0.03, 0.02),
        ];
        let (r, warnings) = attribute(&sectors, AttributionScheme::default()).unwrap();
        assert!(!warnings.is_empty(), "portfolio weights sum to 1.3");
        let sum = r.total_allocation + r.total_selection + r.total_interaction;
        assert_abs_diff_eq!(sum, r.total_excess_return, epsilon = 1e-15);
    }

    #[test]
    fn test_empty_sectors_rejected() {
        let err = attribute(&[], AttributionScheme::default()).unwrap_err();
        assert!(matches!(err, EngineError::Validation { .. }));
    }

    #[test]
    fn test_envelope() {
        let out = brinson_attribution(&AttributionInput {
            sectors: three_sectors(),
            scheme: AttributionScheme::default(),
        })
        .unwrap();
        assert_eq!(out.result.sector_attribution.len(), 3);
        assert!(out.methodology.contains("Hood"));
    }
}
