//! `sentinel` - An autonomous fraud-defense agent for payment streams
//!
//! The agent observes synthetic or imported transactions, applies fraud rules,
//! blocks or investigates suspicious payments, raises alerts and adapts its
//! fraud threshold. State lives in SQLite; a browser dashboard and a CLI
//! drive it.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod agent;
pub mod cli;
pub mod config;
pub mod dataset;
pub mod error;
pub mod generator;
pub mod logging;
pub mod records;
pub mod rules;
pub mod runner;
pub mod server;
pub mod storage;
pub mod transaction;

pub use agent::{AgentPhase, AgentStats, CycleReport, DashboardStats, SentinelAgent};
pub use config::Config;
pub use error::{Error, Result};
pub use generator::{Scenario, TransactionGenerator};
pub use logging::init_logging;
pub use records::{Alert, Investigation, InvestigationStatus, LogEntry, Phase, Severity};
pub use rules::{Action, Finding, Policy, Rule, RuleEngine};
pub use storage::{Storage, StorageStats, TransactionFilter};
pub use transaction::{Transaction, TransactionStatus};
