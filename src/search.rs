//! Best-of-N search over randomized liquidity-matching trials.
//!
//! Trials are pure functions of (delta, snapshot, seed), so they run in
//! parallel with rayon when the `parallel` feature is on. Each finished trial
//! sends a token over a channel; the calling thread counts tokens and reports
//! progress in strictly increasing order before returning the result.

use std::sync::mpsc;

use log::{debug, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::error::{Error, Result};
use crate::instruction::{EPSILON_USD, Instruction, send_count};
use crate::matcher::{Trial, run_trial};
use crate::types::{Delta, ExchangeData};

/// Search tuning.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SearchConfig {
    /// Trials per entry of the delta map.
    pub trials_per_delta: usize,
    /// Trials per distinct exchange holding balances.
    pub trials_per_exchange: usize,
    /// Base seed; trial `i` uses `seed + i`. `None` draws a fresh seed per search.
    pub seed: Option<u64>,
    /// Fail with [`Error::InsufficientLiquidity`] instead of dropping unmet demand.
    pub strict_liquidity: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            trials_per_delta: 50,
            trials_per_exchange: 200,
            seed: None,
            strict_liquidity: false,
        }
    }
}

/// Progress of one search: `current` of `total` trials finished.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Progress {
    pub current: usize,
    pub total: usize,
}

/// The selected rebalance plan.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Plan {
    pub instructions: Vec<Instruction>,
    /// Buy demand left unfunded by the chosen trial.
    pub unmatched_usd: f64,
    /// Number of trials evaluated.
    pub trials: usize,
}

impl Plan {
    pub fn send_count(&self) -> usize {
        send_count(&self.instructions)
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

/// Number of trials for a delta map over a snapshot.
pub fn iteration_count(delta: &Delta, data: &ExchangeData, config: &SearchConfig) -> usize {
    config.trials_per_delta * delta.len() + config.trials_per_exchange * data.exchange_count()
}

/// Ranking key: fewest instructions, then fewest sends, then earliest trial.
fn score(index: usize, trial: &Trial) -> (usize, usize, usize) {
    (trial.instructions.len(), trial.send_count(), index)
}

/// Runs many matcher trials and keeps the cheapest.
#[derive(Clone, Debug, Default)]
pub struct SolutionSearch {
    config: SearchConfig,
}

impl SolutionSearch {
    pub fn new(config: SearchConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Search without progress reporting.
    pub fn run(&self, delta: &Delta, data: &ExchangeData) -> Result<Plan> {
        self.run_with_progress(delta, data, |_| {})
    }

    /// Search, calling `on_progress` once per finished trial with increasing
    /// `current`. All progress calls happen before this returns.
    pub fn run_with_progress<F>(
        &self,
        delta: &Delta,
        data: &ExchangeData,
        mut on_progress: F,
    ) -> Result<Plan>
    where
        F: FnMut(Progress),
    {
        if delta.is_empty() {
            return Ok(Plan::default());
        }

        let total = iteration_count(delta, data, &self.config).max(1);
        let seed = self.config.seed.unwrap_or_else(rand::random);
        debug!(
            "searching {total} trials over {} deltas, {} exchanges (seed {seed})",
            delta.len(),
            data.exchange_count()
        );

        let (tx, rx) = mpsc::channel::<()>();
        let best = std::thread::scope(|s| {
            let worker = s.spawn(move || run_trials(delta, data, seed, total, tx));
            for (done, ()) in rx.iter().enumerate() {
                on_progress(Progress {
                    current: done + 1,
                    total,
                });
            }
            worker
                .join()
                .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
        });

        let Some((index, trial)) = best else {
            return Ok(Plan::default());
        };
        debug!(
            "trial {index} selected: {} instructions, {} sends",
            trial.instructions.len(),
            trial.send_count()
        );

        if trial.unmatched_usd > EPSILON_USD {
            if self.config.strict_liquidity {
                return Err(Error::InsufficientLiquidity {
                    shortfall_usd: trial.unmatched_usd,
                });
            }
            warn!(
                "${:.2} of buy demand cannot be funded and was left out of the plan",
                trial.unmatched_usd
            );
        }

        Ok(Plan {
            instructions: trial.instructions,
            unmatched_usd: trial.unmatched_usd,
            trials: total,
        })
    }
}

fn trial(delta: &Delta, data: &ExchangeData, seed: u64, index: usize) -> Trial {
    let mut rng = StdRng::seed_from_u64(seed.wrapping_add(index as u64));
    run_trial(delta, data, &mut rng)
}

#[cfg(feature = "parallel")]
fn run_trials(
    delta: &Delta,
    data: &ExchangeData,
    seed: u64,
    total: usize,
    tx: mpsc::Sender<()>,
) -> Option<(usize, Trial)> {
    use rayon::prelude::*;

    (0..total)
        .into_par_iter()
        .map_with(tx, |tx, i| {
            let t = trial(delta, data, seed, i);
            // The receiver outlives the workers; a failed send only loses a tick.
            let _ = tx.send(());
            (i, t)
        })
        .min_by_key(|(i, t)| score(*i, t))
}

#[cfg(not(feature = "parallel"))]
fn run_trials(
    delta: &Delta,
    data: &ExchangeData,
    seed: u64,
    total: usize,
    tx: mpsc::Sender<()>,
) -> Option<(usize, Trial)> {
    (0..total)
        .map(|i| {
            let t = trial(delta, data, seed, i);
            let _ = tx.send(());
            (i, t)
        })
        .min_by_key(|(i, t)| score(*i, t))
}
