pub mod walk_forward;

pub use walk_forward::{
    backtest, backtest_many, BacktestInput, BacktestPoint, BacktestResult, RebalanceEvent,
};
