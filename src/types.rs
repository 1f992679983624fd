//! Core types: balances, exchange snapshots, portfolio settings.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use rustc_hash::FxHashMap;

/// Ticker of the cash asset. Cash is the residual of every allocation and is
/// never bought or sold directly.
pub const USD: &str = "USD";

/// Signed USD amount per ticker needed to reach the target allocation.
/// Positive means buy, negative means sell.
pub type Delta = FxHashMap<String, f64>;

/// One holding of one ticker on one exchange.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Balance {
    pub ticker: String,
    pub amount: f64,
    pub price: f64,
    pub usd_value: f64,
    pub exchange: String,
}

impl Balance {
    /// Build a balance, deriving `usd_value` from amount and price.
    pub fn new(ticker: &str, amount: f64, price: f64, exchange: &str) -> Self {
        Self {
            ticker: ticker.to_string(),
            amount,
            price,
            usd_value: amount * price,
            exchange: exchange.to_string(),
        }
    }

    /// A cash balance (price 1).
    pub fn usd(amount: f64, exchange: &str) -> Self {
        Self::new(USD, amount, 1.0, exchange)
    }
}

/// Records that `ticker` can be traded on `exchange`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TickerListing {
    pub ticker: String,
    pub exchange: String,
}

impl TickerListing {
    pub fn new(ticker: &str, exchange: &str) -> Self {
        Self {
            ticker: ticker.to_string(),
            exchange: exchange.to_string(),
        }
    }
}

/// Snapshot of every connected exchange: what is held and what is listed.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExchangeData {
    pub balances: Vec<Balance>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub tickers: Vec<TickerListing>,
}

impl ExchangeData {
    pub fn new(balances: Vec<Balance>, tickers: Vec<TickerListing>) -> Self {
        Self { balances, tickers }
    }

    /// Exchanges on which `ticker` can be bought.
    pub fn eligible_exchanges(&self, ticker: &str) -> BTreeSet<&str> {
        self.tickers
            .iter()
            .filter(|l| l.ticker == ticker)
            .map(|l| l.exchange.as_str())
            .collect()
    }

    /// Number of distinct exchanges that appear in the balance list.
    pub fn exchange_count(&self) -> usize {
        self.balances
            .iter()
            .map(|b| b.exchange.as_str())
            .collect::<BTreeSet<_>>()
            .len()
    }

    /// Copy of this snapshot without the balances the user excluded
    /// (`exchange -> [ticker]`). Listings are kept.
    pub fn without_excluded(&self, excluded: &FxHashMap<String, Vec<String>>) -> Self {
        if excluded.is_empty() {
            return self.clone();
        }
        let balances = self
            .balances
            .iter()
            .filter(|b| {
                !excluded
                    .get(&b.exchange)
                    .is_some_and(|tickers| tickers.contains(&b.ticker))
            })
            .cloned()
            .collect();
        Self {
            balances,
            tickers: self.tickers.clone(),
        }
    }
}

/// How often a calendar-triggered portfolio rebalances.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CalendarSchedule {
    Weekly,
    Monthly,
    Quarterly,
}

impl CalendarSchedule {
    pub const ALL: [CalendarSchedule; 3] = [
        CalendarSchedule::Weekly,
        CalendarSchedule::Monthly,
        CalendarSchedule::Quarterly,
    ];

    /// Nominal period length in days.
    pub fn period_days(self) -> i64 {
        match self {
            CalendarSchedule::Weekly => 7,
            CalendarSchedule::Monthly => 30,
            CalendarSchedule::Quarterly => 91,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            CalendarSchedule::Weekly => "weekly",
            CalendarSchedule::Monthly => "monthly",
            CalendarSchedule::Quarterly => "quarterly",
        }
    }
}

/// What makes a live portfolio due for rebalancing.
///
/// Serialized as `"calendar:monthly"` or `"threshold:10"`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "String", into = "String")
)]
pub enum RebalanceTrigger {
    Calendar(CalendarSchedule),
    /// Rebalance when any allocation drifts by at least this many percentage points.
    Threshold(u32),
}

impl Default for RebalanceTrigger {
    fn default() -> Self {
        RebalanceTrigger::Calendar(CalendarSchedule::Monthly)
    }
}

impl fmt::Display for RebalanceTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RebalanceTrigger::Calendar(s) => write!(f, "calendar:{}", s.as_str()),
            RebalanceTrigger::Threshold(pct) => write!(f, "threshold:{pct}"),
        }
    }
}

impl FromStr for RebalanceTrigger {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, value) = s
            .split_once(':')
            .ok_or_else(|| format!("rebalance trigger '{s}' must be 'kind:value'"))?;
        match kind {
            "calendar" => CalendarSchedule::ALL
                .into_iter()
                .find(|c| c.as_str() == value)
                .map(RebalanceTrigger::Calendar)
                .ok_or_else(|| format!("unknown calendar schedule '{value}'")),
            "threshold" => {
                let pct: u32 = value
                    .parse()
                    .map_err(|_| format!("threshold '{value}' is not an integer"))?;
                if pct == 0 || pct > 100 {
                    return Err(format!("threshold must be in 1..=100, got {pct}"));
                }
                Ok(RebalanceTrigger::Threshold(pct))
            }
            _ => Err(format!("unknown rebalance trigger kind '{kind}'")),
        }
    }
}

impl TryFrom<String> for RebalanceTrigger {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<RebalanceTrigger> for String {
    fn from(t: RebalanceTrigger) -> Self {
        t.to_string()
    }
}

/// The parts of a user's portfolio configuration the engine reads.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Portfolio {
    /// Target percentage per ticker or asset-group name, each in [0, 100].
    /// The values are not required to sum to 100.
    pub target_allocation: FxHashMap<String, f64>,
    /// Group name -> member tickers.
    #[cfg_attr(feature = "serde", serde(default))]
    pub asset_groups: FxHashMap<String, Vec<String>>,
    /// Exchange -> tickers whose balances the user excluded from the portfolio.
    #[cfg_attr(feature = "serde", serde(default))]
    pub excluded_balances: FxHashMap<String, Vec<String>>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub rebalance_trigger: RebalanceTrigger,
    #[cfg_attr(feature = "serde", serde(default))]
    pub is_live: bool,
}

impl Portfolio {
    /// Portfolio with only a target allocation.
    pub fn with_targets<'a>(targets: impl IntoIterator<Item = (&'a str, f64)>) -> Self {
        Self {
            target_allocation: targets
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            ..Self::default()
        }
    }

    /// Builder-style asset group registration.
    pub fn group(mut self, name: &str, members: &[&str]) -> Self {
        self.asset_groups.insert(
            name.to_string(),
            members.iter().map(|m| m.to_string()).collect(),
        );
        self
    }

    /// Sum of all target percentages.
    pub fn target_total(&self) -> f64 {
        self.target_allocation.values().sum()
    }
}
