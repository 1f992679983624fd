//! Drift check for scheduled jobs: allocation and deltas only, no trade search.

use std::collections::BTreeSet;

use rustc_hash::FxHashMap;

use crate::delta::{DeltaConfig, portfolio_deltas};
use crate::error::Result;
use crate::types::{Delta, ExchangeData, Portfolio, RebalanceTrigger};

/// Current vs. target allocation of one key.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DriftEntry {
    pub key: String,
    pub target_pct: f64,
    pub current_pct: f64,
    /// `target - current`, in percentage points.
    pub drift_pct: f64,
}

/// Drift of a whole portfolio.
#[derive(Clone, Debug)]
pub struct DriftReport {
    /// Sorted by key.
    pub entries: Vec<DriftEntry>,
    pub max_drift_pct: f64,
    pub total_usd: f64,
    pub deltas: Delta,
    pub trigger: RebalanceTrigger,
    pub is_live: bool,
}

impl DriftReport {
    /// True when a live, threshold-triggered portfolio drifted past its threshold.
    /// Calendar-triggered portfolios are due by date, not by drift; see
    /// [`calendar_due`].
    pub fn should_rebalance(&self) -> bool {
        match self.trigger {
            RebalanceTrigger::Threshold(pct) => {
                self.is_live && self.max_drift_pct >= f64::from(pct)
            }
            RebalanceTrigger::Calendar(_) => false,
        }
    }
}

/// Compute the drift report for one portfolio.
pub fn drift_report(
    data: &ExchangeData,
    portfolio: &Portfolio,
    config: &DeltaConfig,
) -> Result<DriftReport> {
    let pd = portfolio_deltas(data, portfolio, config)?;
    let entries = drift_entries(&pd.current, &portfolio.target_allocation);
    let max_drift_pct = entries
        .iter()
        .map(|e| e.drift_pct.abs())
        .fold(0.0_f64, f64::max);

    Ok(DriftReport {
        entries,
        max_drift_pct,
        total_usd: pd.total_usd,
        deltas: pd.deltas,
        trigger: portfolio.rebalance_trigger,
        is_live: portfolio.is_live,
    })
}

/// Per-key drift over the union of current and target keys, sorted by key.
pub fn drift_entries(
    current: &FxHashMap<String, f64>,
    target: &FxHashMap<String, f64>,
) -> Vec<DriftEntry> {
    let keys: BTreeSet<&String> = current.keys().chain(target.keys()).collect();
    keys.into_iter()
        .map(|key| {
            let target_pct = target.get(key).copied().unwrap_or(0.0);
            let current_pct = current.get(key).copied().unwrap_or(0.0);
            DriftEntry {
                key: key.clone(),
                target_pct,
                current_pct,
                drift_pct: target_pct - current_pct,
            }
        })
        .collect()
}

/// Whether a calendar-triggered portfolio is due, given whole days since the
/// last rebalance. `None` (never rebalanced) is always due.
pub fn calendar_due(trigger: RebalanceTrigger, days_since_last: Option<i64>) -> bool {
    match (trigger, days_since_last) {
        (RebalanceTrigger::Calendar(_), None) => true,
        (RebalanceTrigger::Calendar(schedule), Some(days)) => days >= schedule.period_days(),
        (RebalanceTrigger::Threshold(_), _) => false,
    }
}
