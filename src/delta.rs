//! Target vs. current allocation -> per-ticker USD deltas.

use std::collections::BTreeSet;

use rustc_hash::FxHashMap;

use crate::allocation::{current_allocation, ticker_totals, total_usd};
use crate::error::Result;
use crate::group::{GroupStrategy, distribute};
use crate::types::{Delta, ExchangeData, Portfolio, USD};

/// Tuning for the delta computation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DeltaConfig {
    /// Drift below this many percentage points is noise and not traded.
    pub noise_threshold_pct: f64,
    pub group_strategy: GroupStrategy,
}

impl Default for DeltaConfig {
    fn default() -> Self {
        Self {
            noise_threshold_pct: 1.0,
            group_strategy: GroupStrategy::DistanceWeighted,
        }
    }
}

/// Compute per-ticker USD deltas.
///
/// * `current` - current allocation in percent (from [`current_allocation`])
/// * `target` - target allocation in percent
/// * `total` - grand total USD value of the portfolio
/// * `asset_groups` - group name -> member tickers
/// * `totals` - current USD value per ticker
///
/// Keys drifting less than the noise threshold are skipped, but their drift is
/// not lost: it is spread evenly over the remaining deltas, moving each toward
/// zero (never across it). Deltas that end at zero are dropped. Cash (`USD`)
/// never gets a delta.
pub fn compute_deltas(
    current: &FxHashMap<String, f64>,
    target: &FxHashMap<String, f64>,
    total: f64,
    asset_groups: &FxHashMap<String, Vec<String>>,
    totals: &FxHashMap<String, f64>,
    config: &DeltaConfig,
) -> Delta {
    // BTreeSet keeps the walk order independent of hash iteration.
    let keys: BTreeSet<&String> = current.keys().chain(target.keys()).collect();

    let mut deltas = Delta::default();
    let mut ignored = 0.0_f64;

    for key in keys {
        let d = target.get(key).copied().unwrap_or(0.0) - current.get(key).copied().unwrap_or(0.0);

        if d.abs() < config.noise_threshold_pct {
            ignored += d.abs();
        } else if let Some(members) = asset_groups.get(key) {
            let usd = total * d / 100.0;
            for (ticker, share) in distribute(members, totals, usd, config.group_strategy) {
                *deltas.entry(ticker).or_default() += share;
            }
        } else if key == USD {
            continue;
        } else {
            *deltas.entry(key.clone()).or_default() += total * d / 100.0;
        }
    }

    if !deltas.is_empty() && ignored > 0.0 {
        let share = total * ignored / (100.0 * deltas.len() as f64);
        for value in deltas.values_mut() {
            *value = if *value < 0.0 {
                (*value + share).min(0.0)
            } else {
                (*value - share).max(0.0)
            };
        }
    }

    deltas.retain(|_, v| *v != 0.0);
    deltas
}

/// Allocation and deltas for one portfolio snapshot.
#[derive(Clone, Debug)]
pub struct PortfolioDeltas {
    /// Current allocation in percent, groups folded.
    pub current: FxHashMap<String, f64>,
    pub total_usd: f64,
    pub deltas: Delta,
}

/// Run the allocation calculator and the delta engine on raw snapshots.
///
/// Excluded balances are removed first.
pub fn portfolio_deltas(
    data: &ExchangeData,
    portfolio: &Portfolio,
    config: &DeltaConfig,
) -> Result<PortfolioDeltas> {
    let data = data.without_excluded(&portfolio.excluded_balances);
    let current = current_allocation(
        &data.balances,
        &portfolio.asset_groups,
        portfolio.target_allocation.keys(),
    )?;
    let total = total_usd(&data.balances);
    let totals = ticker_totals(&data.balances);
    let deltas = compute_deltas(
        &current,
        &portfolio.target_allocation,
        total,
        &portfolio.asset_groups,
        &totals,
        config,
    );
    Ok(PortfolioDeltas {
        current,
        total_usd: total,
        deltas,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Balance;

    fn map(entries: &[(&str, f64)]) -> FxHashMap<String, f64> {
        entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn simple_buy() {
        let current = map(&[("BTC", 20.0), ("USD", 80.0)]);
        let target = map(&[("BTC", 50.0), ("USD", 50.0)]);
        let d = compute_deltas(
            &current,
            &target,
            1000.0,
            &FxHashMap::default(),
            &map(&[("BTC", 200.0), ("USD", 800.0)]),
            &DeltaConfig::default(),
        );
        assert_eq!(d.len(), 1);
        assert!((d["BTC"] - 300.0).abs() < 1e-9);
    }

    #[test]
    fn untargeted_holdings_are_sold() {
        let current = map(&[("BTC", 50.0), ("DOGE", 50.0)]);
        let target = map(&[("BTC", 100.0)]);
        let d = compute_deltas(
            &current,
            &target,
            1000.0,
            &FxHashMap::default(),
            &map(&[("BTC", 500.0), ("DOGE", 500.0)]),
            &DeltaConfig::default(),
        );
        assert!((d["BTC"] - 500.0).abs() < 1e-9);
        assert!((d["DOGE"] + 500.0).abs() < 1e-9);
    }

    #[test]
    fn sub_threshold_drift_dampens_the_rest() {
        // ETH drifts 0.5 points; BTC +10, XRP -9.5
        let current = map(&[("BTC", 40.0), ("ETH", 30.5), ("XRP", 29.5)]);
        let target = map(&[("BTC", 50.0), ("ETH", 30.0), ("XRP", 20.0)]);
        let d = compute_deltas(
            &current,
            &target,
            1000.0,
            &FxHashMap::default(),
            &FxHashMap::default(),
            &DeltaConfig::default(),
        );
        assert!(!d.contains_key("ETH"));
        // share = 1000 * 0.5 / (100 * 2) = 2.5
        assert!((d["BTC"] - 97.5).abs() < 1e-9);
        assert!((d["XRP"] + 92.5).abs() < 1e-9);
    }

    #[test]
    fn damping_clamps_at_zero_and_drops() {
        let current = map(&[("A", 0.0), ("B", 0.9), ("C", 0.9), ("D", 0.9)]);
        let target = map(&[("A", 1.0), ("B", 0.0), ("C", 0.0), ("D", 0.0)]);
        let d = compute_deltas(
            &current,
            &target,
            100.0,
            &FxHashMap::default(),
            &FxHashMap::default(),
            &DeltaConfig::default(),
        );
        // A: +1.0 USD, ignored 2.7 points -> share 2.7 USD -> clamped to 0 and dropped
        assert!(d.is_empty());
    }

    #[test]
    fn usd_is_never_traded() {
        let current = map(&[("BTC", 100.0)]);
        let target = map(&[("USD", 100.0)]);
        let d = compute_deltas(
            &current,
            &target,
            1000.0,
            &FxHashMap::default(),
            &FxHashMap::default(),
            &DeltaConfig::default(),
        );
        assert!(!d.contains_key("USD"));
        assert!((d["BTC"] + 1000.0).abs() < 1e-9);
    }

    #[test]
    fn groups_fan_out() {
        let mut groups = FxHashMap::default();
        groups.insert("ALTS".to_string(), vec!["ADA".to_string(), "SOL".to_string()]);
        let current = map(&[("ALTS", 40.0), ("USD", 60.0)]);
        let target = map(&[("ALTS", 50.0), ("USD", 50.0)]);
        let totals = map(&[("ADA", 100.0), ("SOL", 300.0), ("USD", 600.0)]);
        let d = compute_deltas(
            &current,
            &target,
            1000.0,
            &groups,
            &totals,
            &DeltaConfig::default(),
        );
        assert_eq!(d.len(), 1);
        assert!((d["ADA"] - 100.0).abs() < 1e-9);
    }

    #[test]
    fn custom_threshold() {
        let current = map(&[("BTC", 47.0), ("USD", 53.0)]);
        let target = map(&[("BTC", 50.0), ("USD", 50.0)]);
        let config = DeltaConfig {
            noise_threshold_pct: 5.0,
            ..DeltaConfig::default()
        };
        let d = compute_deltas(
            &current,
            &target,
            1000.0,
            &FxHashMap::default(),
            &FxHashMap::default(),
            &config,
        );
        assert!(d.is_empty());
    }

    #[test]
    fn from_snapshots() {
        let data = ExchangeData::new(
            vec![
                Balance::new("BTC", 1.0, 200.0, "X"),
                Balance::usd(800.0, "X"),
                Balance::new("DOGE", 1.0, 5000.0, "Y"),
            ],
            vec![],
        );
        let mut portfolio = Portfolio::with_targets([("BTC", 50.0), ("USD", 50.0)]);
        portfolio
            .excluded_balances
            .insert("Y".to_string(), vec!["DOGE".to_string()]);

        let pd = portfolio_deltas(&data, &portfolio, &DeltaConfig::default()).unwrap();
        assert_eq!(pd.total_usd, 1000.0);
        assert!((pd.current["BTC"] - 20.0).abs() < 1e-9);
        assert!((pd.deltas["BTC"] - 300.0).abs() < 1e-9);
        assert!(!pd.deltas.contains_key("DOGE"));
    }
}
