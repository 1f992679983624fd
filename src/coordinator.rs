//! Request dispatch: runs searches off the calling thread and delivers
//! progress and results over one channel, last request wins.
//!
//! ```no_run
//! use balancebot::coordinator::{EngineConfig, Outcome, Rebalancer, wait_for};
//! use balancebot::{Balance, ExchangeData, Portfolio, TickerListing};
//!
//! let (rebalancer, events) = Rebalancer::new(EngineConfig::default());
//! let data = ExchangeData::new(
//!     vec![Balance::usd(1000.0, "Kraken")],
//!     vec![TickerListing::new("BTC", "Kraken")],
//! );
//! let portfolio = Portfolio::with_targets([("BTC", 100.0)]);
//!
//! let request = rebalancer.request(data, portfolio).unwrap();
//! match wait_for(&events, request.id, |p| println!("{}/{}", p.current, p.total)).unwrap() {
//!     Outcome::Completed(plan) => println!("{} instructions", plan.instructions.len()),
//!     Outcome::Superseded => println!("a newer request replaced this one"),
//! }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};

use log::debug;

use crate::delta::{DeltaConfig, PortfolioDeltas, portfolio_deltas};
use crate::error::{Error, Result};
use crate::search::{Plan, Progress, SearchConfig, SolutionSearch};
use crate::types::{ExchangeData, Portfolio};

/// Engine-wide tuning.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct EngineConfig {
    pub delta: DeltaConfig,
    pub search: SearchConfig,
}

/// Message from a search worker to the interactive context.
#[derive(Debug)]
pub enum RebalanceEvent {
    Progress { request_id: u64, progress: Progress },
    Finished { request_id: u64, result: Result<Plan> },
    /// A newer request was issued while this one was running; its result is discarded.
    Superseded { request_id: u64 },
}

impl RebalanceEvent {
    pub fn request_id(&self) -> u64 {
        match self {
            RebalanceEvent::Progress { request_id, .. }
            | RebalanceEvent::Finished { request_id, .. }
            | RebalanceEvent::Superseded { request_id } => *request_id,
        }
    }
}

/// A dispatched request. The allocation and deltas are available at once;
/// the plan arrives on the event channel.
#[derive(Clone, Debug)]
pub struct Request {
    pub id: u64,
    pub deltas: PortfolioDeltas,
}

/// Issues rebalance requests and tracks which one is current.
pub struct Rebalancer {
    config: EngineConfig,
    latest: Arc<AtomicU64>,
    events: Sender<RebalanceEvent>,
}

impl Rebalancer {
    /// Create a rebalancer and the receiving end of its event channel.
    pub fn new(config: EngineConfig) -> (Self, Receiver<RebalanceEvent>) {
        let (events, rx) = mpsc::channel();
        let rebalancer = Self {
            config,
            latest: Arc::new(AtomicU64::new(0)),
            events,
        };
        (rebalancer, rx)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Id of the most recent request.
    pub fn latest_id(&self) -> u64 {
        self.latest.load(Ordering::Acquire)
    }

    pub fn is_latest(&self, request_id: u64) -> bool {
        self.latest_id() == request_id
    }

    /// Start a rebalance for the given snapshots.
    ///
    /// Allocation and deltas are computed on the calling thread, so
    /// [`Error::ZeroValuePortfolio`] is returned here before any search work
    /// starts. The request still counts as the newest one, superseding any
    /// search in flight.
    pub fn request(&self, data: ExchangeData, portfolio: Portfolio) -> Result<Request> {
        let id = self.latest.fetch_add(1, Ordering::AcqRel) + 1;

        let data = data.without_excluded(&portfolio.excluded_balances);
        let deltas = portfolio_deltas(&data, &portfolio, &self.config.delta)?;
        debug!("request {id}: {} deltas over ${:.2}", deltas.deltas.len(), deltas.total_usd);

        let latest = Arc::clone(&self.latest);
        let events = self.events.clone();
        let search = SolutionSearch::new(self.config.search);
        let delta = deltas.deltas.clone();

        std::thread::Builder::new()
            .name(format!("rebalance-{id}"))
            .spawn(move || {
                let is_current = || latest.load(Ordering::Acquire) == id;
                let result = search.run_with_progress(&delta, &data, |progress| {
                    if is_current() {
                        let _ = events.send(RebalanceEvent::Progress {
                            request_id: id,
                            progress,
                        });
                    }
                });
                let event = if is_current() {
                    RebalanceEvent::Finished {
                        request_id: id,
                        result,
                    }
                } else {
                    debug!("request {id} superseded, dropping its plan");
                    RebalanceEvent::Superseded { request_id: id }
                };
                let _ = events.send(event);
            })
            .map_err(|e| Error::Worker(e.to_string()))?;

        Ok(Request { id, deltas })
    }
}

/// How a request ended.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    Completed(Plan),
    Superseded,
}

/// Block until `request_id` finishes, forwarding its progress.
///
/// Events that belong to other requests are skipped.
pub fn wait_for<F>(
    events: &Receiver<RebalanceEvent>,
    request_id: u64,
    mut on_progress: F,
) -> Result<Outcome>
where
    F: FnMut(Progress),
{
    loop {
        let event = events
            .recv()
            .map_err(|_| Error::Worker(format!("request {request_id} lost its worker")))?;
        if event.request_id() != request_id {
            continue;
        }
        match event {
            RebalanceEvent::Progress { progress, .. } => on_progress(progress),
            RebalanceEvent::Finished { result, .. } => return result.map(Outcome::Completed),
            RebalanceEvent::Superseded { .. } => return Ok(Outcome::Superseded),
        }
    }
}
