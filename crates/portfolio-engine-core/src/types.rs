use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::EngineResult;

/// Rates and returns expressed as decimals (0.05 = 5%). Never as percentages.
pub type Rate = f64;

/// Portfolio weight of a single asset (0.25 = 25% of the budget).
pub type Weight = f64;

/// Dense row-major matrix.
pub type Matrix = Vec<Vec<f64>>;

/// Observation frequency of a return series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnFrequency {
    Daily,
    Weekly,
    #[default]
    Monthly,
    Quarterly,
    Annual,
}

impl ReturnFrequency {
    /// Number of periods in a year for annualisation
    pub fn periods_per_year(&self) -> f64 {
        match self {
            ReturnFrequency::Daily => 252.0,
            ReturnFrequency::Weekly => 52.0,
            ReturnFrequency::Monthly => 12.0,
            ReturnFrequency::Quarterly => 4.0,
            ReturnFrequency::Annual => 1.0,
        }
    }
}

/// T periods x N assets of periodic returns.
///
/// Row `t` holds the returns of every asset over period `t`, in the same
/// asset order as `asset_names`. The matrix is never mutated by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnMatrix {
    pub asset_names: Vec<String>,
    /// One row per period, one column per asset.
    pub returns: Matrix,
    /// Optional period end dates, one per row.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dates: Option<Vec<NaiveDate>>,
    #[serde(default)]
    pub frequency: ReturnFrequency,
}

impl ReturnMatrix {
    pub fn new(asset_names: Vec<String>, returns: Matrix) -> Self {
        ReturnMatrix {
            asset_names,
            returns,
            dates: None,
            frequency: ReturnFrequency::default(),
        }
    }

    pub fn n_assets(&self) -> usize {
        self.asset_names.len()
    }

    pub fn n_periods(&self) -> usize {
        self.returns.len()
    }

    /// Returns of a single asset across all periods.
    pub fn column(&self, asset: usize) -> Vec<f64> {
        self.returns.iter().map(|row| row[asset]).collect()
    }

    pub fn date(&self, period: usize) -> Option<NaiveDate> {
        self.dates.as_ref().and_then(|d| d.get(period).copied())
    }

    /// Rows `[start, end)` as a new matrix, carrying names, dates and frequency.
    pub fn window(&self, start: usize, end: usize) -> ReturnMatrix {
        ReturnMatrix {
            asset_names: self.asset_names.clone(),
            returns: self.returns[start..end].to_vec(),
            dates: self.dates.as_ref().map(|d| d[start..end].to_vec()),
            frequency: self.frequency,
        }
    }

    /// Portfolio return per period for fixed weights: r_t = w' R_t.
    pub fn portfolio_returns(&self, weights: &[f64]) -> Vec<f64> {
        self.returns
            .iter()
            .map(|row| row.iter().zip(weights.iter()).map(|(r, w)| r * w).sum())
            .collect()
    }

    /// Shape and value checks shared by every operation that consumes returns.
    pub fn validate(&self) -> EngineResult<()> {
        let n = self.n_assets();
        if n < 2 {
            return Err(EngineError::invalid(
                "returns.asset_names",
                format!("At least 2 assets required, got {}", n),
            ));
        }
        if self.returns.len() < 2 {
            return Err(EngineError::DataInsufficiency(format!(
                "At least 2 return periods required, got {}",
                self.returns.len()
            )));
        }
        for (t, row) in self.returns.iter().enumerate() {
            if row.len() != n {
                return Err(EngineError::invalid(
                    format!("returns.returns[{}]", t),
                    format!("Row has {} columns, expected {}", row.len(), n),
                ));
            }
            if let Some(j) = row.iter().position(|v| !v.is_finite()) {
                return Err(EngineError::invalid(
                    format!("returns.returns[{}][{}]", t, j),
                    "Return must be a finite number",
                ));
            }
        }
        if let Some(ref dates) = self.dates {
            if dates.len() != self.returns.len() {
                return Err(EngineError::invalid(
                    "returns.dates",
                    format!(
                        "Expected {} dates (one per row) but got {}",
                        self.returns.len(),
                        dates.len()
                    ),
                ));
            }
        }
        Ok(())
    }
}

/// Standard computation output envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationOutput<T: Serialize> {
    pub result: T,
    pub methodology: String,
    pub assumptions: serde_json::Value,
    pub warnings: Vec<String>,
    pub metadata: ComputationMetadata,
}

/// Metadata for every computation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationMetadata {
    pub version: String,
    pub computation_time_us: u64,
    pub precision: String,
}

/// Helper to wrap computation results with metadata
pub fn with_metadata<T: Serialize>(
    methodology: &str,
    assumptions: &impl Serialize,
    warnings: Vec<String>,
    elapsed_us: u64,
    result: T,
) -> ComputationOutput<T> {
    ComputationOutput {
        result,
        methodology: methodology.to_string(),
        assumptions: serde_json::to_value(assumptions).unwrap_or_default(),
        warnings,
        metadata: ComputationMetadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            computation_time_us: elapsed_us,
            precision: "ieee754_f64".to_string(),
        },
    }
}
