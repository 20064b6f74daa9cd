mod commands;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use commands::backtest::BacktestArgs;
use commands::estimation::EstimateArgs;
use commands::optimization::{FrontierArgs, OptimizeArgs};
use commands::risk::{AttributionArgs, RiskArgs};
use commands::simulation::SimulateArgs;

/// Portfolio construction and risk analytics
#[derive(Parser)]
#[command(
    name = "pfe",
    version,
    about = "Portfolio optimization and risk analytics",
    long_about = "A CLI for estimating return statistics, building optimal portfolios \
                  (min-volatility, mean-variance, max-Sharpe, risk parity, Black-Litterman), \
                  tracing efficient frontiers, measuring risk, simulating terminal wealth, \
                  and running walk-forward backtests. Requests are read as JSON or YAML \
                  from --input or stdin."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,

    /// Log level for diagnostics on stderr (RUST_LOG takes precedence)
    #[arg(long, default_value = "warn", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Estimate expected returns and a validated covariance matrix
    Estimate(EstimateArgs),
    /// Compute optimal weights with one of five methods
    Optimize(OptimizeArgs),
    /// Trace the efficient frontier
    Frontier(FrontierArgs),
    /// Portfolio risk report (VaR, CVaR, drawdown, tracking error)
    Risk(RiskArgs),
    /// Brinson performance attribution by sector
    Attribution(AttributionArgs),
    /// Monte Carlo simulation of portfolio value
    Simulate(SimulateArgs),
    /// Walk-forward backtest of a rebalancing strategy
    Backtest(BacktestArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Estimate(args) => commands::estimation::run_estimate(args),
        Commands::Optimize(args) => commands::optimization::run_optimize(args),
        Commands::Frontier(args) => commands::optimization::run_frontier(args),
        Commands::Risk(args) => commands::risk::run_risk(args),
        Commands::Attribution(args) => commands::risk::run_attribution(args),
        Commands::Simulate(args) => commands::simulation::run_simulate(args),
        Commands::Backtest(args) => commands::backtest::run_backtest(args),
        Commands::Version => {
            println!("pfe {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            tracing::debug!(error = %e, "command failed");
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
