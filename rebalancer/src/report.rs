//! Terminal and JSON renderings of allocations, deltas and plans.

use std::collections::BTreeMap;
use std::fmt;

use balancebot::Delta;
use balancebot::drift::DriftEntry;
use balancebot::instruction::format_usd;
use balancebot::search::Plan;
use serde::Serialize;

/// Current vs. target allocation table.
#[derive(Debug, Clone, Serialize)]
pub struct AllocationReport {
    pub entries: Vec<DriftEntry>,
    pub total_usd: f64,
}

impl fmt::Display for AllocationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ALLOCATION ({} total):", format_usd(self.total_usd))?;
        writeln!(
            f,
            "  {:10} {:>10} {:>10} {:>10}",
            "Key", "Target%", "Current%", "Drift%"
        )?;
        for e in &self.entries {
            writeln!(
                f,
                "  {:10} {:>9.2}% {:>9.2}% {:>+9.2}%",
                e.key, e.target_pct, e.current_pct, e.drift_pct,
            )?;
        }
        Ok(())
    }
}

/// Per-ticker USD deltas, sorted by ticker.
#[derive(Debug, Clone, Serialize)]
pub struct DeltaReport(pub BTreeMap<String, f64>);

impl From<&Delta> for DeltaReport {
    fn from(deltas: &Delta) -> Self {
        DeltaReport(deltas.iter().map(|(k, v)| (k.clone(), *v)).collect())
    }
}

impl fmt::Display for DeltaReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "DELTAS:")?;
        if self.0.is_empty() {
            return writeln!(f, "  (none)");
        }
        for (ticker, usd) in &self.0 {
            let sign = if *usd < 0.0 { "-" } else { "+" };
            writeln!(f, "  {ticker:10} {sign}{}", format_usd(usd.abs()))?;
        }
        Ok(())
    }
}

/// The chosen instruction list.
#[derive(Debug, Clone, Serialize)]
pub struct PlanReport {
    #[serde(flatten)]
    pub plan: Plan,
    pub sends: usize,
}

impl From<Plan> for PlanReport {
    fn from(plan: Plan) -> Self {
        let sends = plan.send_count();
        PlanReport { plan, sends }
    }
}

impl fmt::Display for PlanReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "PLAN:")?;
        if self.plan.is_empty() {
            writeln!(f, "  No instructions: portfolio is on target.")?;
        }
        for (i, instruction) in self.plan.instructions.iter().enumerate() {
            writeln!(f, "  {:>3}. {instruction}", i + 1)?;
        }
        writeln!(
            f,
            "\n  {} instructions, {} transfers, best of {} trials",
            self.plan.instructions.len(),
            self.sends,
            self.plan.trials
        )?;
        if self.plan.unmatched_usd > 0.0 {
            writeln!(
                f,
                "  Unfunded buy demand: {}",
                format_usd(self.plan.unmatched_usd)
            )?;
        }
        Ok(())
    }
}

/// Everything `plan --json` prints.
#[derive(Debug, Clone, Serialize)]
pub struct PlanOutput {
    pub allocation: AllocationReport,
    pub deltas: DeltaReport,
    pub plan: PlanReport,
}
