//! Property-based tests for engine invariants.
//!
//! These tests use proptest to verify that allocation, delta and matching
//! invariants hold across randomly generated snapshots.

use balancebot::allocation::current_allocation;
use balancebot::delta::{DeltaConfig, compute_deltas, portfolio_deltas};
use balancebot::group::{GroupStrategy, distribute};
use balancebot::matcher::run_trial;
use balancebot::search::{SearchConfig, SolutionSearch, iteration_count};
use balancebot::{Balance, Command, ExchangeData, Portfolio, TickerListing};
use proptest::prelude::*;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rustc_hash::FxHashMap;

const TICKERS: [&str; 5] = ["BTC", "ETH", "SOL", "ADA", "USD"];
const EXCHANGES: [&str; 3] = ["Kraken", "Binance", "Coinbase"];

/// Balances spread over a few tickers and exchanges.
fn balances_strategy() -> impl Strategy<Value = Vec<Balance>> {
    prop::collection::vec((0usize..5, 0usize..3, 0.0f64..10_000.0), 1..12).prop_map(|v| {
        v.into_iter()
            .map(|(t, e, usd)| Balance::new(TICKERS[t], usd, 1.0, EXCHANGES[e]))
            .collect()
    })
}

/// Listings for the non-cash tickers.
fn listings_strategy() -> impl Strategy<Value = Vec<TickerListing>> {
    prop::collection::vec((0usize..4, 0usize..3), 0..12).prop_map(|v| {
        v.into_iter()
            .map(|(t, e)| TickerListing::new(TICKERS[t], EXCHANGES[e]))
            .collect()
    })
}

/// Target percentages per ticker, normalized to sum to 100.
fn targets_strategy() -> impl Strategy<Value = FxHashMap<String, f64>> {
    prop::collection::vec(0.0f64..100.0, 5).prop_map(|w| {
        let sum: f64 = w.iter().sum();
        TICKERS
            .iter()
            .zip(w)
            .map(|(t, x)| {
                let pct = if sum > 0.0 { 100.0 * x / sum } else { 20.0 };
                (t.to_string(), pct)
            })
            .collect()
    })
}

fn portfolio(targets: FxHashMap<String, f64>) -> Portfolio {
    Portfolio {
        target_allocation: targets,
        ..Portfolio::default()
    }
}

fn totals(balances: &[Balance]) -> f64 {
    balances.iter().map(|b| b.usd_value).sum()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    // ========================================================================
    // ALLOCATION
    // ========================================================================

    /// Percentages sum to 100 whenever the portfolio has value.
    #[test]
    fn allocation_sums_to_100(
        balances in balances_strategy(),
        targets in targets_strategy(),
        group_alts in any::<bool>(),
    ) {
        prop_assume!(totals(&balances) > 1.0);
        let mut groups = FxHashMap::default();
        let mut targets = targets;
        if group_alts {
            groups.insert("ALTS".to_string(), vec!["SOL".to_string(), "ADA".to_string()]);
            let alts = targets.remove("SOL").unwrap_or(0.0) + targets.remove("ADA").unwrap_or(0.0);
            targets.insert("ALTS".to_string(), alts);
        }

        let pct = current_allocation(&balances, &groups, targets.keys()).unwrap();
        let sum: f64 = pct.values().sum();
        prop_assert!((sum - 100.0).abs() < 1e-6, "allocation sums to {}", sum);
        for key in targets.keys() {
            prop_assert!(pct.contains_key(key));
        }
    }

    // ========================================================================
    // DELTAS
    // ========================================================================

    /// With cash excluded and no damping, buys and sells balance out.
    #[test]
    fn deltas_balance_without_cash(
        balances in balances_strategy(),
        targets in targets_strategy(),
    ) {
        let balances: Vec<Balance> = balances.into_iter().filter(|b| b.ticker != "USD").collect();
        prop_assume!(totals(&balances) > 1.0);
        let mut targets = targets;
        let cash = targets.remove("USD").unwrap_or(0.0);
        let n = targets.len() as f64;
        for v in targets.values_mut() {
            *v += cash / n;
        }

        let config = DeltaConfig { noise_threshold_pct: 0.0, ..DeltaConfig::default() };
        let pd = portfolio_deltas(
            &ExchangeData::new(balances, vec![]),
            &portfolio(targets),
            &config,
        ).unwrap();

        let buys: f64 = pd.deltas.values().filter(|v| **v > 0.0).sum();
        let sells: f64 = pd.deltas.values().filter(|v| **v < 0.0).map(|v| -v).sum();
        let tolerance = 1e-6 * pd.total_usd.max(1.0);
        prop_assert!((buys - sells).abs() < tolerance, "buys {} sells {}", buys, sells);
    }

    /// Damping shrinks deltas toward zero but never flips their sign.
    #[test]
    fn damping_preserves_sign(
        balances in balances_strategy(),
        targets in targets_strategy(),
    ) {
        prop_assume!(totals(&balances) > 1.0);
        let data = ExchangeData::new(balances, vec![]);
        let p = portfolio(targets);

        let undamped = DeltaConfig { noise_threshold_pct: 0.0, ..DeltaConfig::default() };
        let raw = portfolio_deltas(&data, &p, &undamped).unwrap();
        let damped = portfolio_deltas(&data, &p, &DeltaConfig::default()).unwrap();

        for (ticker, d) in &damped.deltas {
            let r = raw.deltas[ticker];
            prop_assert_eq!(d.signum(), r.signum());
            prop_assert!(d.abs() <= r.abs() + 1e-9);
        }
    }

    /// Allocation and deltas are pure.
    #[test]
    fn deltas_are_deterministic(
        balances in balances_strategy(),
        targets in targets_strategy(),
    ) {
        prop_assume!(totals(&balances) > 1.0);
        let data = ExchangeData::new(balances, vec![]);
        let p = portfolio(targets);
        let a = portfolio_deltas(&data, &p, &DeltaConfig::default()).unwrap();
        let b = portfolio_deltas(&data, &p, &DeltaConfig::default()).unwrap();
        prop_assert_eq!(a.current, b.current);
        prop_assert_eq!(a.deltas, b.deltas);
    }

    /// Group shares go only to members on the correcting side of equilibrium.
    #[test]
    fn group_shares_on_correct_side(
        values in prop::collection::vec(0.0f64..5_000.0, 1..6),
        delta in -2_000.0f64..2_000.0,
        equal in any::<bool>(),
    ) {
        prop_assume!(delta.abs() > 1e-6);
        let members: Vec<String> = (0..values.len()).map(|i| format!("T{i}")).collect();
        let member_totals: FxHashMap<String, f64> =
            members.iter().cloned().zip(values.iter().copied()).collect();
        let group_total: f64 = values.iter().sum();
        let equilibrium = (group_total + delta) / values.len() as f64;
        let strategy = if equal {
            GroupStrategy::EqualSplit
        } else {
            GroupStrategy::DistanceWeighted
        };

        let shares = distribute(&members, &member_totals, delta, strategy);
        let sum: f64 = shares.iter().map(|(_, s)| s).sum();
        prop_assert!((sum - delta).abs() < 1e-6);
        for (member, share) in shares {
            prop_assert_eq!(share.signum(), delta.signum());
            let v = member_totals[&member];
            if delta > 0.0 {
                prop_assert!(v < equilibrium);
            } else {
                prop_assert!(v > equilibrium);
            }
        }
    }

    // ========================================================================
    // MATCHING
    // ========================================================================

    /// Sells never exceed holdings; buys only happen on listing exchanges.
    #[test]
    fn trial_respects_venue_constraints(
        balances in balances_strategy(),
        listings in listings_strategy(),
        targets in targets_strategy(),
        seed in any::<u64>(),
    ) {
        prop_assume!(totals(&balances) > 1.0);
        let data = ExchangeData::new(balances, listings);
        let pd = portfolio_deltas(&data, &portfolio(targets), &DeltaConfig::default()).unwrap();
        let trial = run_trial(&pd.deltas, &data, &mut StdRng::seed_from_u64(seed));

        for i in &trial.instructions {
            prop_assert!(i.usd_value > 0.0);
            match i.command {
                Command::Sell => {
                    let held: f64 = data.balances.iter()
                        .filter(|b| {
                            Some(b.ticker.as_str()) == i.asset.as_deref()
                                && b.exchange == i.exchange
                        })
                        .map(|b| b.usd_value)
                        .sum();
                    prop_assert!(
                        i.usd_value <= held + 1e-6,
                        "sold {} of {} held",
                        i.usd_value,
                        held
                    );
                }
                Command::Buy => {
                    let asset = i.asset.as_deref().unwrap_or_default();
                    prop_assert!(data.eligible_exchanges(asset).contains(i.exchange.as_str()));
                }
                Command::Send => {
                    prop_assert!(i.asset.is_none());
                    prop_assert_ne!(Some(i.exchange.as_str()), i.exchange2.as_deref());
                }
            }
        }
    }

    /// The chosen plan is at least as short as every trial the search ran.
    #[test]
    fn search_picks_shortest_trial(
        balances in balances_strategy(),
        listings in listings_strategy(),
        targets in targets_strategy(),
        seed in any::<u64>(),
    ) {
        prop_assume!(totals(&balances) > 1.0);
        let data = ExchangeData::new(balances, listings);
        let pd = portfolio_deltas(&data, &portfolio(targets), &DeltaConfig::default()).unwrap();
        let config = SearchConfig {
            trials_per_delta: 2,
            trials_per_exchange: 3,
            seed: Some(seed),
            strict_liquidity: false,
        };
        let plan = SolutionSearch::new(config).run(&pd.deltas, &data).unwrap();

        if pd.deltas.is_empty() {
            prop_assert!(plan.is_empty());
        } else {
            let n = iteration_count(&pd.deltas, &data, &config).max(1);
            for i in 0..n {
                let mut rng = StdRng::seed_from_u64(seed.wrapping_add(i as u64));
                let trial = run_trial(&pd.deltas, &data, &mut rng);
                prop_assert!(
                    (plan.instructions.len(), plan.send_count())
                        <= (trial.instructions.len(), trial.send_count())
                );
            }
        }
    }
}

/// Deltas computed directly agree with the snapshot helper.
#[test]
fn direct_and_snapshot_deltas_agree() {
    let balances = vec![
        Balance::new("BTC", 1.0, 600.0, "Kraken"),
        Balance::usd(400.0, "Binance"),
    ];
    let p = Portfolio::with_targets([("BTC", 30.0), ("ETH", 30.0), ("USD", 40.0)]);
    let current =
        current_allocation(&balances, &p.asset_groups, p.target_allocation.keys()).unwrap();
    let mut per_ticker = FxHashMap::default();
    per_ticker.insert("BTC".to_string(), 600.0);
    per_ticker.insert("USD".to_string(), 400.0);
    let direct = compute_deltas(
        &current,
        &p.target_allocation,
        1000.0,
        &p.asset_groups,
        &per_ticker,
        &DeltaConfig::default(),
    );
    let data = ExchangeData::new(balances, vec![]);
    let pd = portfolio_deltas(&data, &p, &DeltaConfig::default()).unwrap();
    assert_eq!(direct, pd.deltas);
}
