//! Dense `f64` linear algebra used across the engine.
//!
//! Portfolios in this engine are small (tens of assets), so plain row-major
//! `Vec<Vec<f64>>` with O(n^3) factorisations is fast enough and keeps the
//! numerics easy to audit.

use crate::error::EngineError;
use crate::types::Matrix;
use crate::EngineResult;

/// Dot product.
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Matrix-vector multiplication.
pub fn mat_vec(mat: &[Vec<f64>], v: &[f64]) -> Vec<f64> {
    mat.iter().map(|row| dot(row, v)).collect()
}

/// Transposed matrix-vector multiplication: result = mat' * v.
pub fn mat_t_vec(mat: &[Vec<f64>], v: &[f64]) -> Vec<f64> {
    let cols = mat.first().map(|r| r.len()).unwrap_or(0);
    let mut out = vec![0.0; cols];
    for (row, vi) in mat.iter().zip(v.iter()) {
        for (o, a) in out.iter_mut().zip(row.iter()) {
            *o += a * vi;
        }
    }
    out
}

/// Matrix-matrix multiplication.
#[allow(clippy::needless_range_loop)]
pub fn mat_mul(a: &[Vec<f64>], b: &[Vec<f64>]) -> Matrix {
    let m = a.len();
    let p = b.len();
    let n_cols = b.first().map(|r| r.len()).unwrap_or(0);
    let mut c = vec![vec![0.0; n_cols]; m];
    for i in 0..m {
        for k in 0..p {
            let aik = a[i][k];
            if aik == 0.0 {
                continue;
            }
            for j in 0..n_cols {
                c[i][j] += aik * b[k][j];
            }
        }
    }
    c
}

pub fn transpose(a: &[Vec<f64>]) -> Matrix {
    let rows = a.len();
    let cols = a.first().map(|r| r.len()).unwrap_or(0);
    (0..cols)
        .map(|j| (0..rows).map(|i| a[i][j]).collect())
        .collect()
}

pub fn identity(n: usize) -> Matrix {
    (0..n)
        .map(|i| (0..n).map(|j| if i == j { 1.0 } else { 0.0 }).collect())
        .collect()
}

pub fn mat_add(a: &[Vec<f64>], b: &[Vec<f64>]) -> Matrix {
    a.iter()
        .zip(b.iter())
        .map(|(ra, rb)| ra.iter().zip(rb.iter()).map(|(x, y)| x + y).collect())
        .collect()
}

pub fn mat_scale(a: &[Vec<f64>], s: f64) -> Matrix {
    a.iter()
        .map(|row| row.iter().map(|v| v * s).collect())
        .collect()
}

/// Quadratic form w' * M * w.
pub fn quad_form(w: &[f64], m: &[Vec<f64>]) -> f64 {
    dot(w, &mat_vec(m, w))
}

/// Largest absolute entry; used to make pivot thresholds scale-free.
pub fn max_abs(a: &[Vec<f64>]) -> f64 {
    a.iter()
        .flat_map(|row| row.iter())
        .fold(0.0_f64, |acc, v| acc.max(v.abs()))
}

pub fn norm_inf(v: &[f64]) -> f64 {
    v.iter().fold(0.0_f64, |acc, x| acc.max(x.abs()))
}

/// Matrix inverse via Gauss-Jordan with partial pivoting.
///
/// A pivot smaller than `1e-14` times the largest entry is treated as zero.
#[allow(clippy::needless_range_loop)]
pub fn inverse(mat: &[Vec<f64>]) -> EngineResult<Matrix> {
    let n = mat.len();
    if n == 0 {
        return Ok(Vec::new());
    }

    let scale = max_abs(mat);
    let threshold = if scale > 0.0 { scale * 1e-14 } else { 0.0 };

    let mut aug: Matrix = Vec::with_capacity(n);
    for i in 0..n {
        let mut row = Vec::with_capacity(2 * n);
        row.extend_from_slice(&mat[i]);
        for j in 0..n {
            row.push(if i == j { 1.0 } else { 0.0 });
        }
        aug.push(row);
    }

    for col in 0..n {
        let mut max_row = col;
        let mut max_val = aug[col][col].abs();
        for row in (col + 1)..n {
            let val = aug[row][col].abs();
            if val > max_val {
                max_val = val;
                max_row = row;
            }
        }

        if max_val <= threshold {
            return Err(EngineError::SingularCovariance {
                reason: format!("matrix cannot be inverted (zero pivot in column {})", col),
                asset_index: Some(col),
                min_pivot: if scale > 0.0 { max_val / scale } else { 0.0 },
            });
        }

        if max_row != col {
            aug.swap(col, max_row);
        }

        let pivot = aug[col][col];
        for cell in aug[col].iter_mut() {
            *cell /= pivot;
        }

        let pivot_row = aug[col].clone();
        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = aug[row][col];
            if factor == 0.0 {
                continue;
            }
            for (cell, &pv) in aug[row].iter_mut().zip(pivot_row.iter()) {
                *cell -= factor * pv;
            }
        }
    }

    Ok(aug.iter().map(|row| row[n..].to_vec()).collect())
}

/// Lower-triangular Cholesky factor together with the smallest relative
/// pivot d_k / a_kk seen during the factorisation.
#[derive(Debug, Clone)]
pub struct CholeskyFactor {
    pub lower: Matrix,
    pub min_relative_pivot: f64,
}

/// Cholesky factorisation A = L L'.
///
/// Each pivot is compared to its own diagonal entry, so the test reads as
/// "fraction of asset k's variance not explained by assets 0..k". Fails with
/// `SingularCovariance` when that fraction is at or below `tolerance`.
#[allow(clippy::needless_range_loop)]
pub fn cholesky(a: &[Vec<f64>], tolerance: f64) -> EngineResult<CholeskyFactor> {
    let n = a.len();
    let mut l = vec![vec![0.0; n]; n];
    let mut min_rel = f64::INFINITY;

    for j in 0..n {
        let diag = a[j][j];
        if diag <= 0.0 || !diag.is_finite() {
            return Err(EngineError::SingularCovariance {
                reason: format!("non-positive variance on diagonal entry {}", j),
                asset_index: Some(j),
                min_pivot: 0.0,
            });
        }
        let mut d = diag;
        for k in 0..j {
            d -= l[j][k] * l[j][k];
        }
        let rel = d / diag;
        min_rel = min_rel.min(rel);
        if rel <= tolerance || !rel.is_finite() {
            return Err(EngineError::SingularCovariance {
                reason: format!(
                    "asset {} is a linear combination of earlier assets (collinear or duplicate columns)",
                    j
                ),
                asset_index: Some(j),
                min_pivot: rel.max(0.0),
            });
        }
        let ljj = d.sqrt();
        l[j][j] = ljj;
        for i in (j + 1)..n {
            let mut s = a[i][j];
            for k in 0..j {
                s -= l[i][k] * l[j][k];
            }
            l[i][j] = s / ljj;
        }
    }

    Ok(CholeskyFactor {
        lower: l,
        min_relative_pivot: if n == 0 { 1.0 } else { min_rel },
    })
}

/// Solve L L' x = b given the lower Cholesky factor.
#[allow(clippy::needless_range_loop)]
pub fn cholesky_solve(lower: &[Vec<f64>], b: &[f64]) -> Vec<f64> {
    let n = lower.len();
    let mut y = vec![0.0; n];
    for i in 0..n {
        let mut s = b[i];
        for k in 0..i {
            s -= lower[i][k] * y[k];
        }
        y[i] = s / lower[i][i];
    }
    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let mut s = y[i];
        for k in (i + 1)..n {
            s -= lower[k][i] * x[k];
        }
        x[i] = s / lower[i][i];
    }
    x
}

/// Solve a general square system with Gaussian elimination and partial
/// pivoting. Returns `None` when the system is numerically singular.
#[allow(clippy::needless_range_loop)]
pub fn solve(a: &[Vec<f64>], b: &[f64]) -> Option<Vec<f64>> {
    let n = a.len();
    let scale = max_abs(a).max(1e-300);
    let mut m: Matrix = a
        .iter()
        .zip(b.iter())
        .map(|(row, bi)| {
            let mut r = row.clone();
            r.push(*bi);
            r
        })
        .collect();

    for col in 0..n {
        let mut max_row = col;
        let mut max_val = m[col][col].abs();
        for row in (col + 1)..n {
            if m[row][col].abs() > max_val {
                max_val = m[row][col].abs();
                max_row = row;
            }
        }
        if max_val <= scale * 1e-13 {
            return None;
        }
        m.swap(col, max_row);
        for row in (col + 1)..n {
            let factor = m[row][col] / m[col][col];
            if factor == 0.0 {
                continue;
            }
            for j in col..=n {
                m[row][j] -= factor * m[col][j];
            }
        }
    }

    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let mut s = m[i][n];
        for j in (i + 1)..n {
            s -= m[i][j] * x[j];
        }
        x[i] = s / m[i][i];
    }
    if x.iter().all(|v| v.is_finite()) {
        Some(x)
    } else {
        None
    }
}
