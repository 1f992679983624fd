//! Current allocation: percentage of portfolio value per ticker or asset group.

use rustc_hash::FxHashMap;

use crate::error::{Error, Result};
use crate::types::Balance;

/// USD value per ticker, summed across exchanges.
pub fn ticker_totals(balances: &[Balance]) -> FxHashMap<String, f64> {
    let mut totals: FxHashMap<String, f64> = FxHashMap::default();
    for b in balances {
        *totals.entry(b.ticker.clone()).or_default() += b.usd_value;
    }
    totals
}

/// Grand total USD value of all balances.
pub fn total_usd(balances: &[Balance]) -> f64 {
    balances.iter().map(|b| b.usd_value).sum()
}

/// Compute the current allocation in percent.
///
/// Tickers belonging to a group that is itself a target key are folded into
/// one entry under the group name. Every target key missing from the result
/// is inserted with 0%, so unknown tickers or groups never abort the request.
///
/// Fails with [`Error::ZeroValuePortfolio`] when the balances are worth nothing.
pub fn current_allocation<'a>(
    balances: &[Balance],
    asset_groups: &FxHashMap<String, Vec<String>>,
    target_keys: impl IntoIterator<Item = &'a String>,
) -> Result<FxHashMap<String, f64>> {
    let totals = ticker_totals(balances);
    let grand_total: f64 = totals.values().sum();
    if !grand_total.is_finite() {
        return Err(Error::InvalidInput(format!(
            "portfolio total is not finite: {grand_total}"
        )));
    }
    if grand_total <= 0.0 {
        return Err(Error::ZeroValuePortfolio);
    }

    let mut pct: FxHashMap<String, f64> = totals
        .into_iter()
        .map(|(ticker, usd)| (ticker, 100.0 * usd / grand_total))
        .collect();

    let target_keys: Vec<&String> = target_keys.into_iter().collect();

    // Sorted so overlapping groups resolve the same way on every call.
    let mut group_names: Vec<&String> = asset_groups
        .keys()
        .filter(|name| target_keys.contains(name))
        .collect();
    group_names.sort();

    for name in group_names {
        let grouped: f64 = asset_groups[name]
            .iter()
            .filter_map(|member| pct.remove(member))
            .sum();
        *pct.entry(name.clone()).or_default() += grouped;
    }

    for key in target_keys {
        pct.entry(key.clone()).or_insert(0.0);
    }

    Ok(pct)
}
