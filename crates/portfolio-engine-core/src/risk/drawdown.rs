use serde::{Deserialize, Serialize};

/// Largest peak-to-trough decline of a value series.
///
/// Indices refer to the value series, where index 0 is the starting value
/// (1.0 when built from returns) and index `t + 1` is the value after
/// period `t`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawdownStats {
    /// Most negative (value - peak) / peak observed; 0 when the series never falls.
    pub max_drawdown: f64,
    pub peak_index: usize,
    pub trough_index: usize,
    /// First index after the trough where the value regains the peak.
    pub recovery_index: Option<usize>,
    /// Periods from peak to trough.
    pub duration_periods: usize,
    /// Periods from trough to recovery.
    pub recovery_periods: Option<usize>,
}

/// Cumulative value series starting at 1.0 and compounding each return.
pub fn value_series(returns: &[f64]) -> Vec<f64> {
    let mut values = Vec::with_capacity(returns.len() + 1);
    let mut v = 1.0;
    values.push(v);
    for r in returns {
        v *= 1.0 + r;
        values.push(v);
    }
    values
}

/// Single left-to-right scan tracking the running peak.
pub fn drawdown_from_values(values: &[f64]) -> DrawdownStats {
    let mut peak = values.first().copied().unwrap_or(1.0);
    let mut peak_idx = 0usize;
    let mut stats = DrawdownStats {
        max_drawdown: 0.0,
        peak_index: 0,
        trough_index: 0,
        recovery_index: None,
        duration_periods: 0,
        recovery_periods: None,
    };
    let mut max_dd_peak_value = peak;

    for (i, &v) in values.iter().enumerate() {
        if v > peak {
            peak = v;
            peak_idx = i;
        }
        if peak > 0.0 {
            let dd = (v - peak) / peak;
            if dd < stats.max_drawdown {
                stats.max_drawdown = dd;
                stats.peak_index = peak_idx;
                stats.trough_index = i;
                stats.recovery_index = None;
                max_dd_peak_value = peak;
            }
        }
        if stats.max_drawdown < 0.0
            && stats.recovery_index.is_none()
            && i > stats.trough_index
            && v >= max_dd_peak_value
        {
            stats.recovery_index = Some(i);
        }
    }

    stats.duration_periods = stats.trough_index - stats.peak_index;
    stats.recovery_periods = stats.recovery_index.map(|r| r - stats.trough_index);
    stats
}

pub fn drawdown_from_returns(returns: &[f64]) -> DrawdownStats {
    drawdown_from_values(&value_series(returns))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drawdown_with_recovery() {
        // 1.0 -> 1.1 -> 0.88 -> 0.99 -> 1.2
        let values = [1.0, 1.1, 0.88, 0.99, 1.2];
        let dd = drawdown_from_values(&values);
        assert!((dd.max_drawdown + 0.2).abs() < 1e-12, "dd = {}", dd.max_drawdown);
        assert_eq!(dd.peak_index, 1);
        assert_eq!(dd.trough_index, 2);
        assert_eq!(dd.recovery_index, Some(4));
        assert_eq!(dd.duration_periods, 1);
        assert_eq!(dd.recovery_periods, Some(2));
    }

    #[test]
    fn test_drawdown_unrecovered() {
        let dd = drawdown_from_returns(&[0.05, -0.10, -0.10, 0.02]);
        assert!(dd.max_drawdown < 0.0);
        assert_eq!(dd.peak_index, 1);
        assert_eq!(dd.trough_index, 3);
        assert_eq!(dd.recovery_index, None);
        // 0.9 * 0.9 - 1 = -0.19
        assert!((dd.max_drawdown + 0.19).abs() < 1e-12);
    }

    #[test]
    fn test_monotone_series_has_no_drawdown() {
        let dd = drawdown_from_returns(&[0.01, 0.02, 0.0, 0.03]);
        assert_eq!(dd.max_drawdown, 0.0);
        assert_eq!(dd.duration_periods, 0);
        assert_eq!(dd.recovery_index, None);
    }

    #[test]
    fn test_deeper_later_drawdown_replaces_earlier() {
        let values = [1.0, 0.9, 1.05, 0.7, 0.8];
        let dd = drawdown_from_values(&values);
        assert_eq!(dd.peak_index, 2);
        assert_eq!(dd.trough_index, 3);
        assert_eq!(dd.recovery_index, None);
    }
}
