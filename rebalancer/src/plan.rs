//! Run orchestration: snapshot -> allocation -> deltas -> search -> report.
//!
//! This is the main workflow that ties together the engine and the CLI.

use std::io::Write;
use std::path::{Path, PathBuf};

use balancebot::coordinator::{Outcome, Rebalancer, wait_for};
use balancebot::drift::{DriftReport, calendar_due, drift_entries, drift_report};
use balancebot::search::Progress;
use balancebot::{ExchangeData, RebalanceTrigger};
use chrono::{DateTime, Utc};
use log::{info, warn};

use crate::audit::{self, AuditLog};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::report::{AllocationReport, DeltaReport, PlanOutput, PlanReport};
use crate::snapshot::{PortfolioFile, load_exchange_data};

/// Options for a `plan` run.
pub struct PlanOptions {
    pub exchange_file: PathBuf,
    pub portfolio_file: PathBuf,
    pub seed: Option<u64>,
    pub json: bool,
}

/// Compute a plan for already-loaded snapshots, logging each stage to the
/// audit trail. `on_progress` sees every finished trial in order.
pub fn compute_plan<F>(
    config: &Config,
    data: ExchangeData,
    file: PortfolioFile,
    seed: Option<u64>,
    audit: &mut AuditLog,
    on_progress: F,
) -> Result<PlanOutput>
where
    F: FnMut(Progress),
{
    let (rebalancer, events) = Rebalancer::new(config.engine_config(seed));
    let targets = file.portfolio.target_allocation.clone();

    let request = match rebalancer.request(data, file.portfolio) {
        Ok(r) => r,
        Err(e @ balancebot::Error::ZeroValuePortfolio) => {
            audit.log_simple("nothing_to_rebalance")?;
            return Err(e.into());
        }
        Err(e) => return Err(e.into()),
    };

    let pd = &request.deltas;
    audit::log_allocation(audit, &pd.current, pd.total_usd)?;
    audit::log_deltas(audit, &pd.deltas)?;
    info!(
        "request {}: {} deltas over {} total",
        request.id,
        pd.deltas.len(),
        balancebot::instruction::format_usd(pd.total_usd)
    );

    let plan = match wait_for(&events, request.id, on_progress)? {
        Outcome::Completed(plan) => plan,
        Outcome::Superseded => return Err(Error::Superseded(request.id)),
    };
    audit::log_plan(audit, &plan)?;

    Ok(PlanOutput {
        allocation: AllocationReport {
            entries: drift_entries(&pd.current, &targets),
            total_usd: pd.total_usd,
        },
        deltas: DeltaReport::from(&pd.deltas),
        plan: PlanReport::from(plan),
    })
}

/// Execute a full `plan` run from files.
pub fn run_plan(config: &Config, opts: &PlanOptions) -> Result<()> {
    let data = load_exchange_data(&opts.exchange_file)?;
    let file = PortfolioFile::load(&opts.portfolio_file)?;

    let mut audit = AuditLog::open(&config.audit_path())?;
    audit::log_plan_started(
        &mut audit,
        &opts.exchange_file.display().to_string(),
        &opts.portfolio_file.display().to_string(),
        opts.seed.or(config.search.seed),
    )?;

    let show_progress = !opts.json;
    let output = compute_plan(config, data, file, opts.seed, &mut audit, |p| {
        if show_progress {
            print_progress(p);
        }
    })?;

    if opts.json {
        println!("{}", render_json(&output)?);
    } else {
        println!("{}", output.allocation);
        println!("{}", output.deltas);
        print!("{}", output.plan);
    }
    Ok(())
}

/// Pretty JSON for `plan --json`.
pub fn render_json(output: &PlanOutput) -> Result<String> {
    serde_json::to_string_pretty(output).map_err(Error::Output)
}

/// Overwrite a single stderr line with the search progress.
fn print_progress(p: Progress) {
    let step = (p.total / 100).max(1);
    if p.current % step != 0 && p.current != p.total {
        return;
    }
    let mut err = std::io::stderr().lock();
    let _ = write!(err, "\r  searching: {}/{} trials", p.current, p.total);
    if p.current == p.total {
        let _ = writeln!(err);
    }
    let _ = err.flush();
}

/// Print current vs. target allocation and the deltas, without searching.
pub fn run_allocation(config: &Config, exchange_file: &Path, portfolio_file: &Path) -> Result<()> {
    let data = load_exchange_data(exchange_file)?;
    let file = PortfolioFile::load(portfolio_file)?;
    let engine = config.engine_config(None);

    let report = drift_report(&data, &file.portfolio, &engine.delta)?;

    let mut audit = AuditLog::open(&config.audit_path())?;
    let current: rustc_hash::FxHashMap<String, f64> = report
        .entries
        .iter()
        .map(|e| (e.key.clone(), e.current_pct))
        .collect();
    audit::log_allocation(&mut audit, &current, report.total_usd)?;

    println!(
        "{}",
        AllocationReport {
            entries: report.entries.clone(),
            total_usd: report.total_usd,
        }
    );
    print!("{}", DeltaReport::from(&report.deltas));
    Ok(())
}

/// Result of a drift check.
#[derive(Debug, Clone)]
pub struct DriftStatus {
    pub report: DriftReport,
    pub days_since_rebalance: Option<i64>,
    pub due: bool,
}

/// Decide whether a portfolio is due for rebalancing at `now`.
///
/// Threshold triggers compare the largest drift with the threshold; calendar
/// triggers compare the days since `last_rebalanced` with the schedule.
/// Portfolios that are not live are never due.
pub fn evaluate_drift(
    config: &Config,
    data: &ExchangeData,
    file: &PortfolioFile,
    now: DateTime<Utc>,
) -> Result<DriftStatus> {
    let engine = config.engine_config(None);
    let report = drift_report(data, &file.portfolio, &engine.delta)?;
    let days = file.days_since_rebalance(now);

    let due = match report.trigger {
        RebalanceTrigger::Threshold(_) => report.should_rebalance(),
        RebalanceTrigger::Calendar(_) => report.is_live && calendar_due(report.trigger, days),
    };
    if !report.is_live {
        warn!("portfolio is not live; drift check never triggers a rebalance");
    }

    Ok(DriftStatus {
        report,
        days_since_rebalance: days,
        due,
    })
}

/// Execute a `drift` run from files. Returns whether a rebalance is due.
pub fn run_drift(config: &Config, exchange_file: &Path, portfolio_file: &Path) -> Result<bool> {
    let data = load_exchange_data(exchange_file)?;
    let file = PortfolioFile::load(portfolio_file)?;
    let status = evaluate_drift(config, &data, &file, Utc::now())?;

    let mut audit = AuditLog::open(&config.audit_path())?;
    audit::log_drift(&mut audit, &status.report, status.due)?;

    let report = &status.report;
    println!(
        "{}",
        AllocationReport {
            entries: report.entries.clone(),
            total_usd: report.total_usd,
        }
    );
    println!("  Trigger:   {}", report.trigger);
    println!("  Max drift: {:.2}%", report.max_drift_pct);
    if let Some(days) = status.days_since_rebalance {
        println!("  Last rebalance: {days} days ago");
    }
    println!("  Rebalance due: {}", if status.due { "yes" } else { "no" });
    Ok(status.due)
}
