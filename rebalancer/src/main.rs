//! CLI entry point for the balancebot rebalancer.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

use balancebot_rebalancer::config::Config;
use balancebot_rebalancer::error::Error;
use balancebot_rebalancer::plan::{self, PlanOptions};

#[derive(Parser)]
#[command(name = "rebalancer")]
#[command(about = "Multi-exchange portfolio rebalance planner")]
#[command(version)]
struct Cli {
    /// Path to config.toml (optional; defaults apply when missing)
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compute allocation, deltas and the shortest instruction plan
    Plan {
        /// Path to exchange_data.json
        exchange_data: PathBuf,

        /// Path to portfolio.json
        portfolio: PathBuf,

        /// Fix the search seed for a reproducible plan
        #[arg(long)]
        seed: Option<u64>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show current vs target allocation and deltas
    Allocation {
        exchange_data: PathBuf,
        portfolio: PathBuf,
    },

    /// Check whether the portfolio is due for a rebalance
    Drift {
        exchange_data: PathBuf,
        portfolio: PathBuf,

        /// Exit with status 2 when a rebalance is due (for cron)
        #[arg(long)]
        check: bool,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading config: {e}");
            process::exit(1);
        }
    };
    if let Err(e) = config.init_thread_pool() {
        eprintln!("Error: {e}");
        process::exit(1);
    }

    let result = match cli.command {
        Command::Plan {
            exchange_data,
            portfolio,
            seed,
            json,
        } => {
            let opts = PlanOptions {
                exchange_file: exchange_data,
                portfolio_file: portfolio,
                seed,
                json,
            };
            plan::run_plan(&config, &opts)
        }
        Command::Allocation {
            exchange_data,
            portfolio,
        } => plan::run_allocation(&config, &exchange_data, &portfolio),
        Command::Drift {
            exchange_data,
            portfolio,
            check,
        } => match plan::run_drift(&config, &exchange_data, &portfolio) {
            Ok(true) if check => process::exit(2),
            Ok(_) => Ok(()),
            Err(e) => Err(e),
        },
    };

    if let Err(e) = result {
        match &e {
            Error::Engine(balancebot::Error::ZeroValuePortfolio) => {
                println!("Portfolio is empty: nothing to rebalance.");
                process::exit(0);
            }
            Error::Engine(balancebot::Error::InsufficientLiquidity { .. }) => {
                eprintln!("\nAborted: {e}");
                process::exit(1);
            }
            _ => {
                eprintln!("Error: {e}");
                process::exit(1);
            }
        }
    }
}
