//! # balancebot
//!
//! Rebalance engine for portfolios spread over several exchanges.
//!
//! Given a snapshot of balances and listings per exchange and a target
//! percentage allocation (per ticker or per asset group), the engine plans a
//! short list of sells, USD transfers and buys that moves the portfolio toward
//! target. Each ticker is sold only where it is held and bought only where it
//! is listed.
//!
//! ## Pipeline
//!
//! | Stage | Module |
//! |-------|--------|
//! | Current allocation in percent, groups folded | [`allocation`] |
//! | Group delta split over member tickers | [`group`] |
//! | Target vs. current -> USD delta per ticker | [`delta`] |
//! | One randomized matching pass | [`matcher`] |
//! | Best of many passes, with progress | [`search`] |
//! | Off-thread requests, last request wins | [`coordinator`] |
//!
//! ## Quick Start
//!
//! ```
//! use balancebot::{Balance, ExchangeData, Instruction, Portfolio, TickerListing};
//! use balancebot::delta::{DeltaConfig, portfolio_deltas};
//! use balancebot::search::{SearchConfig, SolutionSearch};
//!
//! let data = ExchangeData::new(
//!     vec![Balance::new("BTC", 0.01, 20_000.0, "Kraken"), Balance::usd(800.0, "Kraken")],
//!     vec![TickerListing::new("BTC", "Kraken")],
//! );
//! let portfolio = Portfolio::with_targets([("BTC", 50.0), ("USD", 50.0)]);
//!
//! let deltas = portfolio_deltas(&data, &portfolio, &DeltaConfig::default()).unwrap();
//! let search = SolutionSearch::new(SearchConfig { seed: Some(7), ..SearchConfig::default() });
//! let plan = search.run(&deltas.deltas, &data).unwrap();
//!
//! assert_eq!(plan.instructions.len(), 1);
//! assert_eq!(plan.instructions[0].to_string(), "BUY $300.00 worth of BTC on Kraken");
//! ```
//!
//! Drift below one percentage point is treated as noise and folded into the
//! remaining deltas; see [`delta::compute_deltas`].

pub mod allocation;
pub mod coordinator;
pub mod delta;
pub mod drift;
mod error;
pub mod group;
pub mod instruction;
pub mod matcher;
pub mod search;
mod types;

// Re-export public API
pub use error::{Error, Result};
pub use instruction::{Command, Instruction, InstructionSet};
pub use types::{
    Balance, CalendarSchedule, Delta, ExchangeData, Portfolio, RebalanceTrigger, TickerListing, USD,
};
