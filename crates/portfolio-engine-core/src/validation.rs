//! Input checks shared by every operation that accepts μ, Σ or weights.

use crate::error::EngineError;
use crate::EngineResult;

/// Length and finiteness of an N-vector.
pub fn validate_vector(field: &str, values: &[f64], n: usize) -> EngineResult<()> {
    if values.len() != n {
        return Err(EngineError::invalid(
            field,
            format!("Expected {} values but got {}", n, values.len()),
        ));
    }
    if let Some(i) = values.iter().position(|v| !v.is_finite()) {
        return Err(EngineError::invalid(
            format!("{}[{}]", field, i),
            "Value must be a finite number",
        ));
    }
    Ok(())
}

/// Square, finite, symmetric, positive diagonal, and every covariance
/// within the correlation bound |c_ij| <= sqrt(c_ii * c_jj).
pub fn validate_covariance(field: &str, cov: &[Vec<f64>], n: usize) -> EngineResult<()> {
    if cov.len() != n {
        return Err(EngineError::invalid(
            field,
            format!("Expected {}x{} matrix but got {} rows", n, n, cov.len()),
        ));
    }
    for (i, row) in cov.iter().enumerate() {
        if row.len() != n {
            return Err(EngineError::invalid(
                field,
                format!("Row {} has {} columns, expected {}", i, row.len(), n),
            ));
        }
        if row.iter().any(|v| !v.is_finite()) {
            return Err(EngineError::invalid(
                format!("{}[{}]", field, i),
                "Covariance entries must be finite",
            ));
        }
    }

    for i in 0..n {
        if cov[i][i] <= 0.0 {
            return Err(EngineError::invalid(
                format!("{}[{}][{}]", field, i, i),
                format!("Variance must be positive, got {}", cov[i][i]),
            ));
        }
    }

    for i in 0..n {
        for j in (i + 1)..n {
            let scale = (cov[i][i] * cov[j][j]).sqrt();
            if (cov[i][j] - cov[j][i]).abs() > 1e-10 * scale.max(1e-300) {
                return Err(EngineError::invalid(
                    field,
                    format!(
                        "Not symmetric: [{},{}]={} != [{},{}]={}",
                        i, j, cov[i][j], j, i, cov[j][i]
                    ),
                ));
            }
            if cov[i][j].abs() > scale * (1.0 + 1e-8) {
                return Err(EngineError::invalid(
                    field,
                    format!(
                        "Covariance [{},{}]={} exceeds the correlation bound sqrt({} * {})",
                        i, j, cov[i][j], cov[i][i], cov[j][j]
                    ),
                ));
            }
        }
    }
    Ok(())
}

/// Default asset labels when the caller supplies none.
pub fn asset_labels(names: Option<&[String]>, n: usize) -> Vec<String> {
    match names {
        Some(names) if names.len() == n => names.to_vec(),
        _ => (1..=n).map(|i| format!("Asset {}", i)).collect(),
    }
}
