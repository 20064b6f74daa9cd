pub mod error;
pub mod linalg;
pub mod stats;
pub mod types;
pub mod validation;

#[cfg(feature = "estimation")]
pub mod estimation;

#[cfg(feature = "optimization")]
pub mod optimization;

#[cfg(feature = "frontier")]
pub mod frontier;

#[cfg(feature = "risk")]
pub mod risk;

#[cfg(feature = "monte_carlo")]
pub mod monte_carlo;

#[cfg(feature = "backtest")]
pub mod backtest;

pub use error::EngineError;
pub use types::*;

/// Standard result type for all engine operations
pub type EngineResult<T> = Result<T, EngineError>;
