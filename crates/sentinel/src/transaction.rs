//! Core transaction types for sentinel.
//!
//! This module defines the payment records the agent observes and the
//! statuses it moves them through.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Lifecycle status of a payment transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionStatus {
    /// The payment went through.
    Processed,
    /// The payment was declined or errored.
    Failed,
    /// The agent or an analyst blocked the payment.
    Blocked,
    /// An investigation is open for the payment.
    #[serde(rename = "Under Investigation")]
    UnderInvestigation,
}

impl TransactionStatus {
    /// All statuses, in display order.
    pub const ALL: [Self; 4] = [
        Self::Processed,
        Self::Failed,
        Self::Blocked,
        Self::UnderInvestigation,
    ];

    /// The stored text form of this status.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Processed => "Processed",
            Self::Failed => "Failed",
            Self::Blocked => "Blocked",
            Self::UnderInvestigation => "Under Investigation",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = Error;

    /// Parses case-insensitively. Payment gateway exports say `success`
    /// for processed payments.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['_', '-'], " ");
        match normalized.as_str() {
            "processed" | "success" => Ok(Self::Processed),
            "failed" => Ok(Self::Failed),
            "blocked" => Ok(Self::Blocked),
            "under investigation" => Ok(Self::UnderInvestigation),
            _ => Err(Error::invalid_input(format!(
                "unknown transaction status: {s}"
            ))),
        }
    }
}

/// A payment transaction observed by the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Gateway payment id.
    pub id: String,
    /// When the payment happened.
    pub timestamp: DateTime<Utc>,
    /// Merchant or payment app.
    pub merchant: String,
    /// Payment amount.
    pub amount: f64,
    /// Issuing bank.
    pub bank: String,
    /// Card, UPI, net banking, ...
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
    /// Current lifecycle status.
    pub status: TransactionStatus,
    /// Risk score in `0..=100`.
    pub risk_score: u32,
    /// Fraud probability in `0.0..=1.0`.
    pub fraud_probability: f64,
    /// Gateway error code for failed payments.
    pub error_code: Option<String>,
    /// How many times the payment was retried.
    pub retry_count: u32,
    /// Reason given by the upstream fraud scorer, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fraud_reason: Option<String>,
}

impl Transaction {
    /// Whether the payment failed at the gateway.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.status == TransactionStatus::Failed
    }

    /// Whether the payment has been blocked.
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        self.status == TransactionStatus::Blocked
    }

    /// Whether the payment carries a non-empty error code.
    #[must_use]
    pub fn has_error_code(&self) -> bool {
        self.error_code.as_deref().is_some_and(|c| !c.is_empty())
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// A processed, low-risk transaction to tweak in tests.
    pub fn transaction(id: &str) -> Transaction {
        Transaction {
            id: id.to_string(),
            timestamp: Utc::now(),
            merchant: "Amazon".to_string(),
            amount: 120.5,
            bank: "HDFC".to_string(),
            payment_method: Some("Card".to_string()),
            status: TransactionStatus::Processed,
            risk_score: 5,
            fraud_probability: 0.05,
            error_code: None,
            retry_count: 0,
            fraud_reason: None,
        }
    }
}
