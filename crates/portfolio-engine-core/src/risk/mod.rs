pub mod attribution;
pub mod drawdown;
pub mod performance;
pub mod report;
pub mod var;

pub use attribution::{
    attribute, brinson_attribution, AttributionInput, AttributionResult, AttributionScheme,
    SectorAttribution, SectorPerformance,
};
pub use drawdown::{drawdown_from_returns, drawdown_from_values, value_series, DrawdownStats};
pub use performance::{performance_summary, tracking_statistics, PerformanceSummary, TrackingStats};
pub use report::{analyze_risk, ComponentRisk, RiskInput, RiskReport};
pub use var::{historical_cvar, historical_var, parametric_cvar, parametric_var};
