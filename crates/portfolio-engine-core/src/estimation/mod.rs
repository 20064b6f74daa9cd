pub mod covariance;
pub mod estimator;

pub use estimator::{estimate, estimate_market, EstimationInput, EstimatorConfig, MarketEstimate};
