//! balancebot-rebalancer: command-line front end for the balancebot engine.
//!
//! Reads an exchange snapshot and a portfolio definition from JSON files,
//! computes the current allocation and deltas, searches for a short
//! instruction plan and keeps a JSONL audit trail of every run.

pub mod audit;
pub mod config;
pub mod error;
pub mod plan;
pub mod report;
pub mod snapshot;
