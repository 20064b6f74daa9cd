use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid input: {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("Singular covariance matrix: {reason} (min relative pivot {min_pivot:e})")]
    SingularCovariance {
        reason: String,
        /// First asset (in factorisation order) whose pivot collapsed.
        asset_index: Option<usize>,
        min_pivot: f64,
    },

    #[error("Infeasible constraints: {constraint}: {reason}")]
    InfeasibleConstraints { constraint: String, reason: String },

    #[error("Convergence failure: {method} did not converge after {iterations} iterations (delta: {last_delta:e})")]
    ConvergenceFailure {
        method: String,
        iterations: u32,
        last_delta: f64,
    },

    #[error("Insufficient data: {0}")]
    DataInsufficiency(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl EngineError {
    pub(crate) fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        EngineError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn infeasible(constraint: impl Into<String>, reason: impl Into<String>) -> Self {
        EngineError::InfeasibleConstraints {
            constraint: constraint.into(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::SerializationError(e.to_string())
    }
}
