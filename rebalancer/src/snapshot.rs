//! Exchange snapshot (exchange_data.json) and portfolio file loading.
//!
//! The exchange snapshot is the typed `ExchangeData` record; the portfolio
//! file is a `Portfolio` plus the CLI-only `last_rebalanced` timestamp used by
//! calendar triggers.

use std::path::Path;

use balancebot::{ExchangeData, Portfolio};
use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Allowed slack on the target total before warning.
const TARGET_TOTAL_TOLERANCE: f64 = 1e-6;

/// A portfolio definition as stored on disk.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PortfolioFile {
    #[serde(flatten)]
    pub portfolio: Portfolio,
    #[serde(default)]
    pub last_rebalanced: Option<DateTime<Utc>>,
}

impl PortfolioFile {
    /// Load and validate a portfolio file.
    pub fn load(path: &Path) -> Result<Self> {
        Self::from_json(&read(path)?)
    }

    /// Parse from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        let file: PortfolioFile = serde_json::from_str(json)?;
        file.validate()?;
        Ok(file)
    }

    /// Whole days since the last rebalance, if there was one.
    pub fn days_since_rebalance(&self, now: DateTime<Utc>) -> Option<i64> {
        self.last_rebalanced.map(|t| (now - t).num_days())
    }

    fn validate(&self) -> Result<()> {
        let p = &self.portfolio;
        if p.target_allocation.is_empty() {
            return Err(Error::Snapshot("target_allocation is empty".into()));
        }

        for (key, pct) in &p.target_allocation {
            if key.is_empty() {
                return Err(Error::Snapshot("empty target key".into()));
            }
            if !pct.is_finite() || !(0.0..=100.0).contains(pct) {
                return Err(Error::Snapshot(format!(
                    "target for {key} ({pct}) must be in [0, 100]"
                )));
            }
        }

        for (name, members) in &p.asset_groups {
            if members.is_empty() {
                return Err(Error::Snapshot(format!("asset group {name} has no members")));
            }
        }

        let total = p.target_total();
        if (total - 100.0).abs() > TARGET_TOTAL_TOLERANCE {
            warn!("target allocation sums to {total:.4}%, not 100%");
        }
        Ok(())
    }
}

/// Load and validate an exchange snapshot.
pub fn load_exchange_data(path: &Path) -> Result<ExchangeData> {
    exchange_data_from_json(&read(path)?)
}

/// Parse an exchange snapshot from a JSON string.
pub fn exchange_data_from_json(json: &str) -> Result<ExchangeData> {
    let data: ExchangeData = serde_json::from_str(json)?;
    validate_exchange_data(&data)?;
    Ok(data)
}

fn validate_exchange_data(data: &ExchangeData) -> Result<()> {
    for b in &data.balances {
        if b.ticker.is_empty() || b.exchange.is_empty() {
            return Err(Error::Snapshot("balance with empty ticker or exchange".into()));
        }
        if !b.usd_value.is_finite() || b.usd_value < 0.0 {
            return Err(Error::Snapshot(format!(
                "{} on {} has invalid usd_value {}",
                b.ticker, b.exchange, b.usd_value
            )));
        }
    }
    for l in &data.tickers {
        if l.ticker.is_empty() || l.exchange.is_empty() {
            return Err(Error::Snapshot("listing with empty ticker or exchange".into()));
        }
    }
    Ok(())
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| Error::SnapshotRead {
        path: path.to_path_buf(),
        source: e,
    })
}
