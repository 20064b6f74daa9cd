use crate::types::Matrix;

/// Column means of a T x N return matrix.
pub fn sample_mean(returns: &[Vec<f64>]) -> Vec<f64> {
    let t = returns.len();
    let n = returns.first().map(|r| r.len()).unwrap_or(0);
    let mut mean = vec![0.0; n];
    if t == 0 {
        return mean;
    }
    for row in returns {
        for (m, r) in mean.iter_mut().zip(row.iter()) {
            *m += r;
        }
    }
    for m in mean.iter_mut() {
        *m /= t as f64;
    }
    mean
}

/// Bias-corrected sample covariance (T - 1 denominator).
#[allow(clippy::needless_range_loop)]
pub fn sample_covariance(returns: &[Vec<f64>], mean: &[f64]) -> Matrix {
    let t = returns.len();
    let n = mean.len();
    let mut cov = vec![vec![0.0; n]; n];
    if t < 2 {
        return cov;
    }
    for row in returns {
        let dev: Vec<f64> = row.iter().zip(mean.iter()).map(|(r, m)| r - m).collect();
        for i in 0..n {
            for j in i..n {
                cov[i][j] += dev[i] * dev[j];
            }
        }
    }
    let denom = (t - 1) as f64;
    for i in 0..n {
        for j in i..n {
            cov[i][j] /= denom;
            cov[j][i] = cov[i][j];
        }
    }
    cov
}

/// Shrink toward the diagonal target: (1 - delta) * S + delta * diag(S).
pub fn shrink_to_diagonal(cov: &[Vec<f64>], delta: f64) -> Matrix {
    cov.iter()
        .enumerate()
        .map(|(i, row)| {
            row.iter()
                .enumerate()
                .map(|(j, &c)| if i == j { c } else { (1.0 - delta) * c })
                .collect()
        })
        .collect()
}

pub fn volatilities(cov: &[Vec<f64>]) -> Vec<f64> {
    (0..cov.len()).map(|i| cov[i][i].max(0.0).sqrt()).collect()
}

/// Correlation matrix; rows/columns of zero-variance assets are left at zero.
pub fn correlation_from_covariance(cov: &[Vec<f64>]) -> Matrix {
    let vols = volatilities(cov);
    cov.iter()
        .enumerate()
        .map(|(i, row)| {
            row.iter()
                .enumerate()
                .map(|(j, &c)| {
                    let d = vols[i] * vols[j];
                    if i == j && d > 0.0 {
                        1.0
                    } else if d > 0.0 {
                        c / d
                    } else {
                        0.0
                    }
                })
                .collect()
        })
        .collect()
}
