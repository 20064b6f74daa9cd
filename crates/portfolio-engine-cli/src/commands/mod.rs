pub mod backtest;
pub mod estimation;
pub mod optimization;
pub mod risk;
pub mod simulation;
