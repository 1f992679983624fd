//! Planned rebalance actions and their merge semantics.

use std::fmt;

use rustc_hash::FxHashMap;

/// Amounts at or below this many USD are treated as zero.
pub const EPSILON_USD: f64 = 1e-9;

/// What an instruction does.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Command {
    Buy,
    Sell,
    /// Transfer USD from `exchange` to `exchange2`.
    Send,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Buy => write!(f, "BUY"),
            Command::Sell => write!(f, "SELL"),
            Command::Send => write!(f, "SEND"),
        }
    }
}

/// One planned action.
///
/// `asset` is set for Buy/Sell only, `exchange2` for Send only.
/// `usd_value` is always positive.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Instruction {
    pub command: Command,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub asset: Option<String>,
    pub usd_value: f64,
    pub exchange: String,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub exchange2: Option<String>,
}

/// Identity under which two instructions merge.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct InstructionKey {
    pub command: Command,
    pub asset: Option<String>,
    pub exchange: String,
    pub exchange2: Option<String>,
}

impl Instruction {
    pub fn buy(asset: &str, usd_value: f64, exchange: &str) -> Self {
        Self {
            command: Command::Buy,
            asset: Some(asset.to_string()),
            usd_value,
            exchange: exchange.to_string(),
            exchange2: None,
        }
    }

    pub fn sell(asset: &str, usd_value: f64, exchange: &str) -> Self {
        Self {
            command: Command::Sell,
            asset: Some(asset.to_string()),
            usd_value,
            exchange: exchange.to_string(),
            exchange2: None,
        }
    }

    pub fn send(usd_value: f64, from: &str, to: &str) -> Self {
        Self {
            command: Command::Send,
            asset: None,
            usd_value,
            exchange: from.to_string(),
            exchange2: Some(to.to_string()),
        }
    }

    pub fn key(&self) -> InstructionKey {
        InstructionKey {
            command: self.command,
            asset: self.asset.clone(),
            exchange: self.exchange.clone(),
            exchange2: self.exchange2.clone(),
        }
    }

    pub fn is_send(&self) -> bool {
        self.command == Command::Send
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = format_usd(self.usd_value);
        match (self.command, &self.asset, &self.exchange2) {
            (Command::Send, _, Some(to)) => {
                write!(f, "SEND {value} from {} to {to}", self.exchange)
            }
            (cmd, Some(asset), _) => {
                write!(f, "{cmd} {value} worth of {asset} on {}", self.exchange)
            }
            (cmd, None, _) => write!(f, "{cmd} {value} on {}", self.exchange),
        }
    }
}

/// Format a USD amount with thousands separators, e.g. `$1,234.50`.
pub fn format_usd(value: f64) -> String {
    let cents = (value.abs() * 100.0).round() as u64;
    let dollars = (cents / 100).to_string();
    let mut grouped = String::with_capacity(dollars.len() + dollars.len() / 3);
    for (i, ch) in dollars.chars().enumerate() {
        if i > 0 && (dollars.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let sign = if value < 0.0 && cents > 0 { "-" } else { "" };
    format!("{sign}${grouped}.{:02}", cents % 100)
}

/// Insertion-ordered instruction list that merges by [`InstructionKey`].
#[derive(Clone, Debug, Default)]
pub struct InstructionSet {
    items: Vec<Instruction>,
    index: FxHashMap<InstructionKey, usize>,
}

impl InstructionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an instruction, summing its value into an existing one with the
    /// same key. Non-positive amounts and self-sends are ignored.
    pub fn push(&mut self, instruction: Instruction) {
        if instruction.usd_value.is_nan() || instruction.usd_value <= EPSILON_USD {
            return;
        }
        if instruction.is_send()
            && instruction.exchange2.as_deref() == Some(instruction.exchange.as_str())
        {
            return;
        }
        let key = instruction.key();
        match self.index.get(&key) {
            Some(&i) => self.items[i].usd_value += instruction.usd_value,
            None => {
                self.index.insert(key, self.items.len());
                self.items.push(instruction);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Instruction> {
        self.items.iter()
    }

    pub fn into_vec(self) -> Vec<Instruction> {
        self.items
    }
}

impl Extend<Instruction> for InstructionSet {
    fn extend<I: IntoIterator<Item = Instruction>>(&mut self, iter: I) {
        for instruction in iter {
            self.push(instruction);
        }
    }
}

impl FromIterator<Instruction> for InstructionSet {
    fn from_iter<I: IntoIterator<Item = Instruction>>(iter: I) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

/// Number of Send instructions in a plan.
pub fn send_count(instructions: &[Instruction]) -> usize {
    instructions.iter().filter(|i| i.is_send()).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_key_merges() {
        let mut set = InstructionSet::new();
        set.push(Instruction::buy("BTC", 100.0, "Kraken"));
        set.push(Instruction::buy("BTC", 50.0, "Kraken"));
        set.push(Instruction::buy("BTC", 25.0, "Binance"));
        set.push(Instruction::sell("BTC", 10.0, "Kraken"));

        let items = set.into_vec();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].usd_value, 150.0);
        assert_eq!(items[1].exchange, "Binance");
        assert_eq!(items[2].command, Command::Sell);
    }

    #[test]
    fn sends_merge_per_route() {
        let mut set = InstructionSet::new();
        set.push(Instruction::send(10.0, "A", "B"));
        set.push(Instruction::send(5.0, "A", "B"));
        set.push(Instruction::send(5.0, "B", "A"));
        let items = set.into_vec();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].usd_value, 15.0);
    }

    #[test]
    fn zero_and_self_send_ignored() {
        let mut set = InstructionSet::new();
        set.push(Instruction::buy("BTC", 0.0, "Kraken"));
        set.push(Instruction::buy("BTC", -3.0, "Kraken"));
        set.push(Instruction::buy("BTC", f64::NAN, "Kraken"));
        set.push(Instruction::buy("BTC", 1e-10, "Kraken"));
        set.push(Instruction::send(10.0, "A", "A"));
        assert!(set.is_empty());
    }

    #[test]
    fn display() {
        assert_eq!(
            Instruction::sell("ETH", 200.0, "Kraken").to_string(),
            "SELL $200.00 worth of ETH on Kraken"
        );
        assert_eq!(
            Instruction::send(1000.0, "Binance", "Kraken").to_string(),
            "SEND $1,000.00 from Binance to Kraken"
        );
    }

    #[test]
    fn usd_formatting() {
        assert_eq!(format_usd(0.0), "$0.00");
        assert_eq!(format_usd(999.999), "$1,000.00");
        assert_eq!(format_usd(1_234_567.5), "$1,234,567.50");
        assert_eq!(format_usd(-42.1), "-$42.10");
    }

    #[test]
    fn send_counting() {
        let plan = vec![
            Instruction::send(1.0, "A", "B"),
            Instruction::buy("BTC", 1.0, "B"),
        ];
        assert_eq!(send_count(&plan), 1);
    }
}
