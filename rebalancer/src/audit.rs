//! JSONL audit trail logging.
//!
//! Each rebalancer run appends events to an audit.jsonl file,
//! one JSON object per line.

use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use balancebot::Delta;
use balancebot::drift::DriftReport;
use balancebot::search::Plan;
use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::error::Result;

/// An audit event written to the JSONL trail.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub event: &'static str,
    pub ts: DateTime<Utc>,
    #[serde(flatten)]
    pub data: serde_json::Value,
}

/// Append-only audit logger.
pub struct AuditLog {
    writer: BufWriter<std::fs::File>,
}

impl AuditLog {
    /// Open (or create) the audit log file for appending.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    /// Log an event with arbitrary JSON data.
    pub fn log(&mut self, event: &'static str, data: serde_json::Value) -> Result<()> {
        let entry = AuditEvent {
            event,
            ts: Utc::now(),
            data,
        };
        let json = serde_json::to_string(&entry)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        writeln!(self.writer, "{json}")?;
        self.writer.flush()?;
        Ok(())
    }

    /// Log a simple event with no additional data.
    pub fn log_simple(&mut self, event: &'static str) -> Result<()> {
        self.log(event, serde_json::json!({}))
    }
}

/// Convenience: log a plan run start.
pub fn log_plan_started(
    audit: &mut AuditLog,
    exchange_file: &str,
    portfolio_file: &str,
    seed: Option<u64>,
) -> Result<()> {
    audit.log(
        "plan_started",
        serde_json::json!({
            "exchange_data": exchange_file,
            "portfolio": portfolio_file,
            "seed": seed,
        }),
    )
}

/// Convenience: log the current allocation.
pub fn log_allocation(
    audit: &mut AuditLog,
    current: &FxHashMap<String, f64>,
    total_usd: f64,
) -> Result<()> {
    audit.log(
        "allocation_computed",
        serde_json::json!({
            "allocation": sorted(current),
            "total_usd": total_usd,
        }),
    )
}

/// Convenience: log computed deltas.
pub fn log_deltas(audit: &mut AuditLog, deltas: &Delta) -> Result<()> {
    audit.log("deltas_computed", serde_json::json!({ "deltas": sorted(deltas) }))
}

/// Convenience: log the chosen plan.
pub fn log_plan(audit: &mut AuditLog, plan: &Plan) -> Result<()> {
    let instructions: Vec<_> = plan.instructions.iter().map(|i| i.to_string()).collect();
    audit.log(
        "plan_computed",
        serde_json::json!({
            "instructions": instructions,
            "sends": plan.send_count(),
            "unmatched_usd": plan.unmatched_usd,
            "trials": plan.trials,
        }),
    )
}

/// Convenience: log a drift check.
pub fn log_drift(audit: &mut AuditLog, report: &DriftReport, due: bool) -> Result<()> {
    audit.log(
        "drift_checked",
        serde_json::json!({
            "max_drift_pct": report.max_drift_pct,
            "trigger": report.trigger.to_string(),
            "is_live": report.is_live,
            "due": due,
        }),
    )
}

/// Sorted copy of a map so audit lines are stable across runs.
fn sorted(map: &FxHashMap<String, f64>) -> std::collections::BTreeMap<&str, f64> {
    map.iter().map(|(k, v)| (k.as_str(), *v)).collect()
}
