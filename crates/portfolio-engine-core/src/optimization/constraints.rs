use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::types::Matrix;
use crate::EngineResult;

/// Slack allowed when comparing aggregate bounds against each other.
const FEASIBILITY_SLACK: f64 = 1e-9;

fn default_true() -> bool {
    true
}

fn default_budget() -> f64 {
    1.0
}

fn default_sector_max() -> f64 {
    1.0
}

/// A constraint on a group of assets (sector/region/etc.).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectorConstraint {
    pub name: String,
    pub asset_indices: Vec<usize>,
    #[serde(default)]
    pub min_weight: f64,
    #[serde(default = "default_sector_max")]
    pub max_weight: f64,
}

/// Bounds, sector limits and budget shared by every optimization method.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstraintSet {
    /// Per-asset minimum weight (default 0 when long-only, unbounded otherwise).
    #[serde(default)]
    pub min_weights: Option<Vec<f64>>,
    /// Per-asset maximum weight (default unbounded).
    #[serde(default)]
    pub max_weights: Option<Vec<f64>>,
    /// No short selling.
    #[serde(default = "default_true")]
    pub long_only: bool,
    #[serde(default)]
    pub sectors: Vec<SectorConstraint>,
    /// Required sum of weights.
    #[serde(default = "default_budget")]
    pub budget: f64,
    /// Permit a budget other than 1.
    #[serde(default)]
    pub allow_leverage: bool,
}

impl Default for ConstraintSet {
    fn default() -> Self {
        ConstraintSet {
            min_weights: None,
            max_weights: None,
            long_only: true,
            sectors: Vec::new(),
            budget: 1.0,
            allow_leverage: false,
        }
    }
}

impl ConstraintSet {
    /// Budget equality only: shorting allowed, no bounds, no sectors.
    pub fn unconstrained() -> Self {
        ConstraintSet {
            long_only: false,
            ..ConstraintSet::default()
        }
    }

    pub fn long_only() -> Self {
        ConstraintSet::default()
    }

    /// True when only the budget equality binds, so closed forms apply.
    pub fn is_unconstrained(&self) -> bool {
        !self.long_only
            && self.sectors.is_empty()
            && self
                .min_weights
                .as_ref()
                .map_or(true, |m| m.iter().all(|v| v.is_infinite()))
            && self
                .max_weights
                .as_ref()
                .map_or(true, |m| m.iter().all(|v| v.is_infinite()))
    }

    /// Effective lower bound of asset `i`.
    pub fn lower(&self, i: usize) -> f64 {
        let explicit = self
            .min_weights
            .as_ref()
            .and_then(|m| m.get(i).copied())
            .unwrap_or(f64::NEG_INFINITY);
        if self.long_only {
            explicit.max(0.0)
        } else {
            explicit
        }
    }

    /// Effective upper bound of asset `i`.
    pub fn upper(&self, i: usize) -> f64 {
        self.max_weights
            .as_ref()
            .and_then(|m| m.get(i).copied())
            .unwrap_or(f64::INFINITY)
    }

    pub fn bounds(&self, n: usize) -> (Vec<f64>, Vec<f64>) {
        ((0..n).map(|i| self.lower(i)).collect(), (0..n).map(|i| self.upper(i)).collect())
    }

    /// Shape checks: vector lengths, index ranges, budget.
    pub fn validate(&self, n: usize) -> EngineResult<()> {
        if !self.budget.is_finite() || self.budget <= 0.0 {
            return Err(EngineError::invalid(
                "constraints.budget",
                format!("Budget must be a positive finite number, got {}", self.budget),
            ));
        }
        if !self.allow_leverage && (self.budget - 1.0).abs() > 1e-12 {
            return Err(EngineError::invalid(
                "constraints.budget",
                format!(
                    "Budget must equal 1 unless allow_leverage is set, got {}",
                    self.budget
                ),
            ));
        }
        for (field, values) in [
            ("constraints.min_weights", &self.min_weights),
            ("constraints.max_weights", &self.max_weights),
        ] {
            if let Some(v) = values {
                if v.len() != n {
                    return Err(EngineError::invalid(
                        field,
                        format!("Expected {} values but got {}", n, v.len()),
                    ));
                }
                if v.iter().any(|x| x.is_nan()) {
                    return Err(EngineError::invalid(field, "Bounds must not be NaN"));
                }
            }
        }
        for (si, sc) in self.sectors.iter().enumerate() {
            if sc.asset_indices.is_empty() {
                return Err(EngineError::invalid(
                    format!("constraints.sectors[{}]", si),
                    format!("Sector '{}' has no assets", sc.name),
                ));
            }
            if let Some(&idx) = sc.asset_indices.iter().find(|&&idx| idx >= n) {
                return Err(EngineError::invalid(
                    format!("constraints.sectors[{}]", si),
                    format!("Asset index {} out of range (n={})", idx, n),
                ));
            }
            if sc.min_weight.is_nan() || sc.max_weight.is_nan() {
                return Err(EngineError::invalid(
                    format!("constraints.sectors[{}]", si),
                    "Sector limits must not be NaN",
                ));
            }
        }
        Ok(())
    }

    /// Detect constraint sets with no feasible point before any solving.
    pub fn check_feasibility(&self, names: &[String]) -> EngineResult<()> {
        let n = names.len();
        let (lo, hi) = self.bounds(n);

        for i in 0..n {
            if lo[i] > hi[i] + FEASIBILITY_SLACK {
                return Err(EngineError::infeasible(
                    format!("bounds:{}", names[i]),
                    format!(
                        "minimum weight for {} ({}) exceeds its maximum weight ({})",
                        names[i],
                        pct(lo[i]),
                        pct(hi[i])
                    ),
                ));
            }
        }

        let min_sum: f64 = lo.iter().sum();
        if min_sum > self.budget + FEASIBILITY_SLACK {
            let culprits: Vec<String> = (0..n)
                .filter(|&i| lo[i] > 0.0)
                .map(|i| format!("{} ({})", names[i], pct(lo[i])))
                .collect();
            return Err(EngineError::infeasible(
                "min_weights",
                format!(
                    "sum of minimum weights ({}) exceeds the budget ({}): {}",
                    pct(min_sum),
                    pct(self.budget),
                    culprits.join(", ")
                ),
            ));
        }

        let max_sum: f64 = hi.iter().sum();
        if max_sum < self.budget - FEASIBILITY_SLACK {
            return Err(EngineError::infeasible(
                "max_weights",
                format!(
                    "sum of maximum weights ({}) is below the budget ({})",
                    pct(max_sum),
                    pct(self.budget)
                ),
            ));
        }

        for sc in &self.sectors {
            let label = format!("sector:{}", sc.name);
            if sc.min_weight > sc.max_weight + FEASIBILITY_SLACK {
                return Err(EngineError::infeasible(
                    label,
                    format!(
                        "sector minimum for {} ({}) exceeds its maximum ({})",
                        sc.name,
                        pct(sc.min_weight),
                        pct(sc.max_weight)
                    ),
                ));
            }
            let member_min: f64 = sc.asset_indices.iter().map(|&i| lo[i]).sum();
            if sc.max_weight < member_min - FEASIBILITY_SLACK {
                return Err(EngineError::infeasible(
                    label,
                    format!(
                        "sector limit for {} ({}) is below the sum of its assets' minimum weights ({})",
                        sc.name,
                        pct(sc.max_weight),
                        pct(member_min)
                    ),
                ));
            }
            let member_max: f64 = sc.asset_indices.iter().map(|&i| hi[i]).sum();
            if sc.min_weight > member_max + FEASIBILITY_SLACK {
                return Err(EngineError::infeasible(
                    label,
                    format!(
                        "sector minimum for {} ({}) exceeds the sum of its assets' maximum weights ({})",
                        sc.name,
                        pct(sc.min_weight),
                        pct(member_max)
                    ),
                ));
            }
        }
        Ok(())
    }

    /// Linear rows l <= A w <= u for the budget, the box bounds and each sector.
    pub fn linear_rows(&self, names: &[String]) -> LinearConstraints {
        let n = names.len();
        let mut rows = LinearConstraints::default();
        rows.push("budget".to_string(), vec![1.0; n], self.budget, self.budget);
        for (i, name) in names.iter().enumerate() {
            let (lo, hi) = (self.lower(i), self.upper(i));
            if lo.is_finite() || hi.is_finite() {
                let mut a = vec![0.0; n];
                a[i] = 1.0;
                rows.push(format!("bounds:{}", name), a, lo, hi);
            }
        }
        for sc in &self.sectors {
            let mut a = vec![0.0; n];
            for &i in &sc.asset_indices {
                a[i] = 1.0;
            }
            rows.push(format!("sector:{}", sc.name), a, sc.min_weight, sc.max_weight);
        }
        rows
    }

    /// Clamp numerical noise at the box bounds.
    pub fn snap_to_bounds(&self, weights: &mut [f64]) {
        for (i, w) in weights.iter_mut().enumerate() {
            *w = w.clamp(self.lower(i), self.upper(i));
        }
    }

    /// True when `weights` satisfy every constraint within `tol`.
    pub fn is_satisfied(&self, weights: &[f64], tol: f64) -> bool {
        let sum: f64 = weights.iter().sum();
        if (sum - self.budget).abs() > tol {
            return false;
        }
        for (i, w) in weights.iter().enumerate() {
            if *w < self.lower(i) - tol || *w > self.upper(i) + tol {
                return false;
            }
        }
        self.sectors.iter().all(|sc| {
            let s: f64 = sc.asset_indices.iter().map(|&i| weights[i]).sum();
            s >= sc.min_weight - tol && s <= sc.max_weight + tol
        })
    }
}

/// Labelled linear constraint rows in the form l <= A x <= u.
#[derive(Debug, Clone, Default)]
pub struct LinearConstraints {
    pub a: Matrix,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
    pub labels: Vec<String>,
}

impl LinearConstraints {
    pub fn push(&mut self, label: String, row: Vec<f64>, lower: f64, upper: f64) {
        self.a.push(row);
        self.lower.push(lower);
        self.upper.push(upper);
        self.labels.push(label);
    }

    pub fn len(&self) -> usize {
        self.a.len()
    }

    pub fn is_empty(&self) -> bool {
        self.a.is_empty()
    }
}

/// Percentage with at most two decimals and no trailing zeros: 0.35 -> "35%".
pub(crate) fn pct(x: f64) -> String {
    if x.is_infinite() {
        return if x > 0.0 { "unbounded".into() } else { "-unbounded".into() };
    }
    let s = format!("{:.2}", x * 100.0);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    format!("{}%", s)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(n: usize) -> Vec<String> {
        ["A", "B", "C", "D"][..n].iter().map(|s| s.to_string()).collect()
    }

    // ------------------------------------------------------------------
    // 1. Sum of minimums above budget names the offending assets
    // ------------------------------------------------------------------
    #[test]
    fn test_min_sum_exceeds_budget() {
        let cs = ConstraintSet {
            min_weights: Some(vec![0.5, 0.5, 0.1]),
            ..ConstraintSet::default()
        };
        let err = cs.check_feasibility(&names(3)).unwrap_err();
        match err {
            EngineError::InfeasibleConstraints { constraint, reason } => {
                assert_eq!(constraint, "min_weights");
                assert!(reason.contains("A (50%)"), "{}", reason);
                assert!(reason.contains("C (10%)"), "{}", reason);
                assert!(reason.contains("110%"), "{}", reason);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    // ------------------------------------------------------------------
    // 2. Sector cap below member minimums
    // ------------------------------------------------------------------
    #[test]
    fn test_sector_cap_below_member_minimums() {
        let cs = ConstraintSet {
            min_weights: Some(vec![0.20, 0.15, 0.0]),
            sectors: vec![SectorConstraint {
                name: "Technology".into(),
                asset_indices: vec![0, 1],
                min_weight: 0.0,
                max_weight: 0.30,
            }],
            ..ConstraintSet::default()
        };
        let err = cs.check_feasibility(&names(3)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Infeasible constraints: sector:Technology: sector limit for Technology (30%) is below the sum of its assets' minimum weights (35%)"
        );
    }

    // ------------------------------------------------------------------
    // 3. Max sum below budget
    // ------------------------------------------------------------------
    #[test]
    fn test_max_sum_below_budget() {
        let cs = ConstraintSet {
            max_weights: Some(vec![0.3, 0.3, 0.3]),
            ..ConstraintSet::default()
        };
        assert!(matches!(
            cs.check_feasibility(&names(3)),
            Err(EngineError::InfeasibleConstraints { .. })
        ));
    }

    // ------------------------------------------------------------------
    // 4. Leverage gate
    // ------------------------------------------------------------------
    #[test]
    fn test_budget_requires_leverage_flag() {
        let mut cs = ConstraintSet {
            budget: 1.3,
            ..ConstraintSet::default()
        };
        assert!(cs.validate(3).is_err());
        cs.allow_leverage = true;
        assert!(cs.validate(3).is_ok());
    }

    #[test]
    fn test_sector_index_out_of_range() {
        let cs = ConstraintSet {
            sectors: vec![SectorConstraint {
                name: "X".into(),
                asset_indices: vec![5],
                min_weight: 0.0,
                max_weight: 1.0,
            }],
            ..ConstraintSet::default()
        };
        assert!(matches!(cs.validate(3), Err(EngineError::Validation { .. })));
    }

    #[test]
    fn test_linear_rows_layout() {
        let cs = ConstraintSet {
            max_weights: Some(vec![0.6, 0.6, 0.6]),
            sectors: vec![SectorConstraint {
                name: "Tech".into(),
                asset_indices: vec![0, 2],
                min_weight: 0.1,
                max_weight: 0.5,
            }],
            ..ConstraintSet::default()
        };
        let rows = cs.linear_rows(&names(3));
        assert_eq!(rows.len(), 5);
        assert_eq!(rows.labels[0], "budget");
        assert_eq!(rows.labels[4], "sector:Tech");
        assert_eq!(rows.a[4], vec![1.0, 0.0, 1.0]);
        assert_eq!((rows.lower[1], rows.upper[1]), (0.0, 0.6));
    }

    #[test]
    fn test_unconstrained_detection() {
        assert!(ConstraintSet::unconstrained().is_unconstrained());
        assert!(!ConstraintSet::long_only().is_unconstrained());
    }

    #[test]
    fn test_pct_format() {
        assert_eq!(pct(0.35), "35%");
        assert_eq!(pct(0.125), "12.5%");
        assert_eq!(pct(1.0), "100%");
    }
}
