pub mod black_litterman;
pub mod constraints;
pub mod methods;
pub mod qp;
pub mod risk_parity;

pub use black_litterman::{BlackLittermanConfig, BlackLittermanPosterior, View};
pub use constraints::{ConstraintSet, SectorConstraint};
pub use methods::{
    optimize, optimize_weights, AssetAllocation, ConvergenceStatus, MethodKind,
    OptimizationInput, OptimizationMethod, OptimizationParams, OptimizationResult,
};
pub use qp::SolverSettings;
pub use risk_parity::RiskParitySettings;
