//! One randomized liquidity-matching pass: deltas -> sells, sends, buys.
//!
//! Constraints:
//! - a ticker is sold only where it is held, never more than the holding;
//! - a ticker is bought only on an exchange listing it;
//! - buys are funded by USD on the buying exchange: existing cash, proceeds of
//!   sells there, or USD sent in from another exchange.
//!
//! Every ordering decision is shuffled with the caller's RNG, so independent
//! trials explore different feasible plans. The pass never mutates its input.

use std::collections::{BTreeMap, BTreeSet};

use rand::Rng;
use rand::seq::{IndexedRandom, SliceRandom};

use crate::instruction::{EPSILON_USD, Instruction, InstructionSet};
use crate::types::{Balance, Delta, ExchangeData, USD};

/// Result of one trial.
#[derive(Clone, Debug, Default)]
pub struct Trial {
    /// Sells, then sends, then buys; each part merged by instruction key.
    pub instructions: Vec<Instruction>,
    /// Buy demand in USD that no liquidity could fund.
    pub unmatched_usd: f64,
}

impl Trial {
    pub fn send_count(&self) -> usize {
        crate::instruction::send_count(&self.instructions)
    }
}

/// Buy tickers that share one exact set of eligible exchanges.
#[derive(Debug)]
struct BuyGroup<'a> {
    exchanges: Vec<&'a str>,
    needs: Vec<(&'a str, f64)>,
}

impl BuyGroup<'_> {
    fn remaining(&self) -> f64 {
        self.needs.iter().map(|(_, n)| n).sum()
    }
}

/// Spend up to `available` USD on `exchange` against the group's needs.
/// Returns the amount spent.
fn fill(
    group: &mut BuyGroup<'_>,
    exchange: &str,
    available: &mut f64,
    buys: &mut InstructionSet,
) -> f64 {
    let mut spent = 0.0;
    for (ticker, need) in group.needs.iter_mut() {
        if *available <= EPSILON_USD {
            break;
        }
        if *need <= EPSILON_USD {
            continue;
        }
        let amount = need.min(*available);
        buys.push(Instruction::buy(ticker, amount, exchange));
        *need -= amount;
        *available -= amount;
        spent += amount;
    }
    spent
}

/// Run one matching trial.
pub fn run_trial<R: Rng + ?Sized>(delta: &Delta, data: &ExchangeData, rng: &mut R) -> Trial {
    let mut sells = InstructionSet::new();
    let mut sends = InstructionSet::new();
    let mut buys = InstructionSet::new();
    let mut liquidity: BTreeMap<&str, f64> = BTreeMap::new();

    // Sorted first so a seeded RNG gives the same trial for the same input.
    let mut sell_needs: Vec<(&str, f64)> = delta
        .iter()
        .filter(|(_, v)| **v < 0.0)
        .map(|(t, v)| (t.as_str(), -v))
        .collect();
    sell_needs.sort_by(|a, b| a.0.cmp(b.0));
    sell_needs.shuffle(rng);

    for (ticker, mut need) in sell_needs {
        let mut holdings: Vec<&Balance> = data
            .balances
            .iter()
            .filter(|b| b.ticker == ticker && b.usd_value > EPSILON_USD)
            .collect();
        holdings.sort_by(|a, b| a.exchange.cmp(&b.exchange));
        holdings.shuffle(rng);

        for holding in holdings {
            if need <= EPSILON_USD {
                break;
            }
            let amount = need.min(holding.usd_value);
            sells.push(Instruction::sell(ticker, amount, &holding.exchange));
            *liquidity.entry(holding.exchange.as_str()).or_default() += amount;
            need -= amount;
        }
    }

    for cash in data.balances.iter().filter(|b| b.ticker == USD && b.usd_value > 0.0) {
        *liquidity.entry(cash.exchange.as_str()).or_default() += cash.usd_value;
    }

    let mut unmatched = 0.0;
    let mut by_venues: BTreeMap<BTreeSet<&str>, Vec<(&str, f64)>> = BTreeMap::new();
    let mut buy_needs: Vec<(&str, f64)> = delta
        .iter()
        .filter(|(_, v)| **v > 0.0)
        .map(|(t, v)| (t.as_str(), *v))
        .collect();
    buy_needs.sort_by(|a, b| a.0.cmp(b.0));

    for (ticker, need) in buy_needs {
        let venues = data.eligible_exchanges(ticker);
        if venues.is_empty() {
            unmatched += need;
            continue;
        }
        by_venues.entry(venues).or_default().push((ticker, need));
    }

    let mut groups: Vec<BuyGroup<'_>> = by_venues
        .into_iter()
        .map(|(venues, needs)| BuyGroup {
            exchanges: venues.into_iter().collect(),
            needs,
        })
        .collect();
    for group in &mut groups {
        group.needs.shuffle(rng);
    }

    // Phase A: spend each exchange's liquidity on its own eligible buys.
    let mut sources: Vec<&str> = liquidity
        .iter()
        .filter(|(_, usd)| **usd > EPSILON_USD)
        .map(|(ex, _)| *ex)
        .collect();
    sources.shuffle(rng);

    for &source in &sources {
        let mut order: Vec<usize> = (0..groups.len()).collect();
        order.shuffle(rng);
        for gi in order {
            let group = &mut groups[gi];
            if !group.exchanges.contains(&source) {
                continue;
            }
            let Some(available) = liquidity.get_mut(source) else {
                break;
            };
            if *available <= EPSILON_USD {
                break;
            }
            fill(group, source, available, &mut buys);
        }
    }

    // Phase B: move what is left to a random eligible venue of any unmet group.
    let mut sources: Vec<&str> = liquidity
        .iter()
        .filter(|(_, usd)| **usd > EPSILON_USD)
        .map(|(ex, _)| *ex)
        .collect();
    sources.shuffle(rng);

    for source in sources {
        let mut order: Vec<usize> = (0..groups.len()).collect();
        order.shuffle(rng);
        for gi in order {
            let Some(available) = liquidity.get_mut(source) else {
                break;
            };
            if *available <= EPSILON_USD {
                break;
            }
            let group = &mut groups[gi];
            if group.remaining() <= EPSILON_USD {
                continue;
            }
            let Some(&destination) = group.exchanges.choose(rng) else {
                continue;
            };
            let moved = fill(group, destination, available, &mut buys);
            if source != destination {
                sends.push(Instruction::send(moved, source, destination));
            }
        }
    }

    unmatched += groups.iter().map(BuyGroup::remaining).sum::<f64>();

    let mut instructions = sells.into_vec();
    instructions.extend(sends.into_vec());
    instructions.extend(buys.into_vec());

    Trial {
        instructions,
        unmatched_usd: if unmatched > EPSILON_USD { unmatched } else { 0.0 },
    }
}
