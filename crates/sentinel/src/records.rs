//! Records the agent writes besides transactions: its running log,
//! investigations and alerts.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Stage of the agent cycle (or other source) that produced a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    /// Startup, dataset loading, scenario injection.
    System,
    /// Ingesting new transactions.
    Observe,
    /// Applying the rules.
    Reason,
    /// Blocking, investigating, alerting.
    Act,
    /// Adjusting the fraud threshold.
    Learn,
    /// Manual configuration changes.
    Config,
    /// Analyst actions through the API.
    UserAction,
    /// A cycle failed.
    Error,
}

impl Phase {
    /// The stored text form of this phase.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "SYSTEM",
            Self::Observe => "OBSERVE",
            Self::Reason => "REASON",
            Self::Act => "ACT",
            Self::Learn => "LEARN",
            Self::Config => "CONFIG",
            Self::UserAction => "USER_ACTION",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SYSTEM" => Ok(Self::System),
            "OBSERVE" => Ok(Self::Observe),
            "REASON" => Ok(Self::Reason),
            "ACT" => Ok(Self::Act),
            "LEARN" => Ok(Self::Learn),
            "CONFIG" => Ok(Self::Config),
            "USER_ACTION" => Ok(Self::UserAction),
            "ERROR" => Ok(Self::Error),
            other => Err(Error::invalid_input(format!("unknown phase: {other}"))),
        }
    }
}

/// One line of the agent's running log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Assigned by storage.
    pub id: i64,
    /// When the entry was written.
    pub timestamp: DateTime<Utc>,
    /// Which stage wrote it.
    pub phase: Phase,
    /// Human-readable summary.
    pub message: String,
    /// Longer supporting text (ids, reasons).
    pub details: Option<String>,
}

impl LogEntry {
    /// Render as `[HH:MM:SS] [PHASE] message`.
    #[must_use]
    pub fn render(&self) -> String {
        format!(
            "[{}] [{}] {}",
            self.timestamp.format("%H:%M:%S"),
            self.phase,
            self.message
        )
    }
}

/// State of an investigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvestigationStatus {
    /// Awaiting an outcome.
    Open,
    /// Cleared; the flag was a false positive.
    Resolved,
    /// Confirmed fraud; the payment was blocked.
    Blocked,
}

impl InvestigationStatus {
    /// The stored text form of this status.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Resolved => "RESOLVED",
            Self::Blocked => "BLOCKED",
        }
    }
}

impl fmt::Display for InvestigationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvestigationStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "OPEN" => Ok(Self::Open),
            "RESOLVED" => Ok(Self::Resolved),
            "BLOCKED" => Ok(Self::Blocked),
            _ => Err(Error::invalid_input(format!(
                "unknown investigation status: {s}"
            ))),
        }
    }
}

/// A case opened against a single transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Investigation {
    /// Assigned by storage.
    pub id: i64,
    /// The transaction under investigation.
    pub transaction_id: String,
    /// Why the case was opened.
    pub reason: String,
    /// When the case was opened.
    pub start_time: DateTime<Utc>,
    /// Current state.
    pub status: InvestigationStatus,
    /// Analyst or simulated verdict.
    pub outcome: Option<String>,
}

/// Alert severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    /// Informational.
    Low,
    /// Needs a look.
    Medium,
    /// Likely abuse.
    High,
    /// Fraud blocked.
    Critical,
}

impl Severity {
    /// The stored text form of this severity.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LOW" => Ok(Self::Low),
            "MEDIUM" => Ok(Self::Medium),
            "HIGH" => Ok(Self::High),
            "CRITICAL" => Ok(Self::Critical),
            other => Err(Error::invalid_input(format!("unknown severity: {other}"))),
        }
    }
}

/// A notification raised by the agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    /// Assigned by storage.
    pub id: i64,
    /// How urgent it is.
    pub severity: Severity,
    /// What happened.
    pub message: String,
    /// When it was raised.
    pub timestamp: DateTime<Utc>,
    /// Whether someone has acknowledged it.
    pub is_read: bool,
}
