//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};

use crate::generator::Scenario;
use crate::transaction::TransactionStatus;

/// Serve command arguments.
#[derive(Debug, Args)]
pub struct ServeCommand {
    /// Address to listen on (overrides `server.bind`)
    #[arg(short, long, value_name = "ADDR")]
    pub bind: Option<String>,

    /// Start the agent loop as soon as the server is up
    #[arg(long)]
    pub autostart: bool,
}

/// Simulate command arguments.
#[derive(Debug, Args)]
pub struct SimulateCommand {
    /// Stop after this many cycles (runs until Ctrl-C otherwise)
    #[arg(short = 'n', long)]
    pub cycles: Option<u64>,

    /// Milliseconds between cycles (overrides `agent.loop_interval_ms`)
    #[arg(short, long, value_name = "MS")]
    pub interval_ms: Option<u64>,
}

/// Step command arguments.
#[derive(Debug, Args)]
pub struct StepCommand {
    /// Number of cycles to run
    #[arg(short = 'n', long, default_value = "1")]
    pub count: u32,
}

/// Status command arguments.
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Logs command arguments.
#[derive(Debug, Args)]
pub struct LogsCommand {
    /// Number of entries to show
    #[arg(short, long, default_value = "20")]
    pub limit: usize,
}

/// Transactions command arguments.
#[derive(Debug, Args)]
pub struct TransactionsCommand {
    /// Filter by status
    #[arg(short, long, value_enum)]
    pub status: Option<StatusArg>,

    /// Filter by bank
    #[arg(short, long)]
    pub bank: Option<String>,

    /// Only risk scores at or above this
    #[arg(short = 'r', long)]
    pub min_risk: Option<u32>,

    /// Maximum number of results
    #[arg(short, long, default_value = "20")]
    pub limit: usize,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

/// Import command arguments.
#[derive(Debug, Args)]
pub struct ImportCommand {
    /// CSV files to import (defaults to `dataset.paths`)
    pub files: Vec<PathBuf>,
}

/// Reset command arguments.
#[derive(Debug, Args)]
pub struct ResetCommand {
    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

/// Threshold commands.
#[derive(Debug, Subcommand)]
pub enum ThresholdCommand {
    /// Show the live fraud threshold
    Show,

    /// Override the fraud threshold
    Set {
        /// New threshold between 0 and 1
        value: f64,
    },
}

/// Inject command arguments.
#[derive(Debug, Args)]
pub struct InjectCommand {
    /// Scenario to inject
    #[arg(value_enum)]
    pub scenario: ScenarioArg,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// Transaction status argument for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StatusArg {
    /// Processed payments
    Processed,
    /// Failed payments
    Failed,
    /// Blocked payments
    Blocked,
    /// Payments under investigation
    UnderInvestigation,
}

impl From<StatusArg> for TransactionStatus {
    fn from(arg: StatusArg) -> Self {
        match arg {
            StatusArg::Processed => Self::Processed,
            StatusArg::Failed => Self::Failed,
            StatusArg::Blocked => Self::Blocked,
            StatusArg::UnderInvestigation => Self::UnderInvestigation,
        }
    }
}

/// Scenario argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ScenarioArg {
    /// Burst of high-value, high-probability card payments
    FraudAttack,
    /// Burst of failed UPI payments at one bank
    BankOutage,
}

impl From<ScenarioArg> for Scenario {
    fn from(arg: ScenarioArg) -> Self {
        match arg {
            ScenarioArg::FraudAttack => Self::FraudAttack,
            ScenarioArg::BankOutage => Self::BankOutage,
        }
    }
}

/// Output format for commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Plain text output
    #[default]
    Plain,
    /// Formatted table
    Table,
    /// JSON output
    Json,
}
