//! Static threshold rules applied in the REASON phase.
//!
//! The engine is compiled once from [`AgentConfig`]; only the fraud threshold
//! changes between cycles, so it is passed to [`RuleEngine::evaluate`].

use std::fmt;

use regex::Regex;
use serde::Serialize;
use tracing::trace;

use crate::config::AgentConfig;
use crate::error::{Error, Result};
use crate::transaction::{Transaction, TransactionStatus};

/// Which rule produced a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    /// A processed payment with an elevated risk score.
    HighRisk,
    /// Fraud probability above the live threshold.
    FraudSpike,
    /// A failed payment retried too often or failing authentication.
    BankingSpam,
}

impl Rule {
    /// Display name of the rule.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::HighRisk => "High Risk",
            Self::FraudSpike => "Fraud Spike",
            Self::BankingSpam => "Banking Spam",
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What the agent does about a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    /// Open an investigation.
    Investigate,
    /// Block the payment.
    Block,
    /// Raise an alert about the bank.
    Alert,
}

impl Action {
    /// Upper-case label used in log lines.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Investigate => "INVESTIGATE",
            Self::Block => "BLOCK",
            Self::Alert => "ALERT",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rule that fired for one transaction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Finding {
    /// The rule.
    pub rule: Rule,
    /// The response it calls for.
    pub action: Action,
    /// The flagged transaction.
    pub transaction_id: String,
    /// Bank of the flagged transaction.
    pub bank: String,
    /// Error code of the flagged transaction.
    pub error_code: Option<String>,
    /// Fraud probability at evaluation time.
    pub fraud_probability: f64,
    /// Why the rule fired.
    pub reason: String,
}

impl Finding {
    /// One-line label, e.g. `BLOCK: Fraud Spike TX_1 (0.93)`.
    #[must_use]
    pub fn action_label(&self) -> String {
        match self.rule {
            Rule::HighRisk => format!("{}: {} {}", self.action, self.rule, self.transaction_id),
            Rule::FraudSpike => format!(
                "{}: {} {} ({:.2})",
                self.action, self.rule, self.transaction_id, self.fraud_probability
            ),
            Rule::BankingSpam => format!(
                "{}: {} {} ({})",
                self.action,
                self.rule,
                self.bank,
                self.error_code.as_deref().unwrap_or("-")
            ),
        }
    }
}

/// The current rule parameters, for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Policy {
    /// Live fraud probability cutoff.
    pub fraud_threshold: f64,
    /// Risk score above which processed payments are investigated.
    pub high_risk_trigger: u32,
    /// Retries above which failed payments count as spam.
    pub max_retries: u32,
}

/// Compiled rule set.
#[derive(Debug, Clone)]
pub struct RuleEngine {
    high_risk_threshold: u32,
    retry_count_threshold: u32,
    auth_failure: Regex,
}

impl RuleEngine {
    /// Compile the rules from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the auth-failure pattern is not a valid regex.
    pub fn new(config: &AgentConfig) -> Result<Self> {
        let auth_failure = Regex::new(&config.auth_failure_pattern).map_err(|e| {
            Error::ConfigValidation {
                message: format!("invalid regex pattern {}: {e}", config.auth_failure_pattern),
            }
        })?;

        Ok(Self {
            high_risk_threshold: config.high_risk_threshold,
            retry_count_threshold: config.retry_count_threshold,
            auth_failure,
        })
    }

    /// Describe the rules with the given live threshold.
    #[must_use]
    pub fn policy(&self, fraud_threshold: f64) -> Policy {
        Policy {
            fraud_threshold,
            high_risk_trigger: self.high_risk_threshold,
            max_retries: self.retry_count_threshold,
        }
    }

    /// Apply every rule to every transaction.
    ///
    /// Findings come out per transaction in rule order. Blocked payments are
    /// never flagged again.
    #[must_use]
    pub fn evaluate(&self, transactions: &[Transaction], fraud_threshold: f64) -> Vec<Finding> {
        let findings: Vec<_> = transactions
            .iter()
            .filter(|tx| !tx.is_blocked())
            .flat_map(|tx| self.evaluate_one(tx, fraud_threshold))
            .collect();
        trace!(
            "Evaluated {} transactions, {} findings",
            transactions.len(),
            findings.len()
        );
        findings
    }

    fn evaluate_one(&self, tx: &Transaction, fraud_threshold: f64) -> Vec<Finding> {
        let mut findings = Vec::new();
        let finding = |rule, action, reason| Finding {
            rule,
            action,
            transaction_id: tx.id.clone(),
            bank: tx.bank.clone(),
            error_code: tx.error_code.clone(),
            fraud_probability: tx.fraud_probability,
            reason,
        };

        if tx.risk_score > self.high_risk_threshold && tx.status == TransactionStatus::Processed {
            findings.push(finding(
                Rule::HighRisk,
                Action::Investigate,
                format!(
                    "{}: risk score {} > {}",
                    tx.id, tx.risk_score, self.high_risk_threshold
                ),
            ));
        }

        if tx.fraud_probability > fraud_threshold {
            findings.push(finding(
                Rule::FraudSpike,
                Action::Block,
                format!(
                    "{}: fraud probability {:.2} > threshold {:.2}",
                    tx.id, tx.fraud_probability, fraud_threshold
                ),
            ));
        }

        if tx.is_failed() && tx.has_error_code() {
            let code = tx.error_code.as_deref().unwrap_or_default();
            let auth_failure = self.auth_failure.is_match(code);
            if tx.retry_count > self.retry_count_threshold || auth_failure {
                let reason = if auth_failure {
                    format!("{}: {} at {}", tx.id, code, tx.bank)
                } else {
                    format!("{}: {} retries at {}", tx.id, tx.retry_count, tx.bank)
                };
                findings.push(finding(Rule::BankingSpam, Action::Alert, reason));
            }
        }

        findings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::fixtures::transaction;

    fn engine() -> RuleEngine {
        RuleEngine::new(&AgentConfig::default()).unwrap()
    }

    #[test]
    fn test_clean_transaction_passes() {
        let findings = engine().evaluate(&[transaction("TX_1")], 0.8);
        assert!(findings.is_empty());
    }

    #[test]
    fn test_high_risk_requires_processed() {
        let mut tx = transaction("TX_1");
        tx.risk_score = 21;
        let findings = engine().evaluate(std::slice::from_ref(&tx), 0.8);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].rule, Rule::HighRisk);
        assert_eq!(findings[0].action, Action::Investigate);
        assert_eq!(findings[0].action_label(), "INVESTIGATE: High Risk TX_1");

        tx.risk_score = 20;
        assert!(engine().evaluate(std::slice::from_ref(&tx), 0.8).is_empty());

        tx.risk_score = 90;
        tx.status = TransactionStatus::UnderInvestigation;
        assert!(engine().evaluate(&[tx], 0.8).is_empty());
    }

    #[test]
    fn test_fraud_spike_uses_live_threshold() {
        let mut tx = transaction("TX_2");
        tx.fraud_probability = 0.85;

        let findings = engine().evaluate(std::slice::from_ref(&tx), 0.8);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].action, Action::Block);
        assert_eq!(findings[0].action_label(), "BLOCK: Fraud Spike TX_2 (0.85)");
        assert!(findings[0].reason.contains("> threshold 0.80"));

        assert!(engine().evaluate(&[tx], 0.9).is_empty());
    }

    #[test]
    fn test_fraud_and_high_risk_together() {
        let mut tx = transaction("TX_3");
        tx.risk_score = 95;
        tx.fraud_probability = 0.97;

        let findings = engine().evaluate(&[tx], 0.8);
        let rules: Vec<_> = findings.iter().map(|f| f.rule).collect();
        assert_eq!(rules, [Rule::HighRisk, Rule::FraudSpike]);
    }

    #[test]
    fn test_banking_spam_by_retries() {
        let mut tx = transaction("TX_4");
        tx.status = TransactionStatus::Failed;
        tx.error_code = Some("INSUFFICIENT_FUNDS".to_string());
        tx.retry_count = 4;

        let findings = engine().evaluate(std::slice::from_ref(&tx), 0.8);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].action, Action::Alert);
        assert_eq!(
            findings[0].action_label(),
            "ALERT: Banking Spam HDFC (INSUFFICIENT_FUNDS)"
        );
        assert!(findings[0].reason.contains("4 retries"));

        tx.retry_count = 3;
        assert!(engine().evaluate(&[tx], 0.8).is_empty());
    }

    #[test]
    fn test_banking_spam_by_auth_failure() {
        for code in ["UPI_AUTHENTICATION_FAILED", "UPI_AUTH_FAIL"] {
            let mut tx = transaction("TX_5");
            tx.status = TransactionStatus::Failed;
            tx.error_code = Some(code.to_string());
            tx.retry_count = 0;

            let findings = engine().evaluate(&[tx], 0.8);
            assert_eq!(findings.len(), 1, "{code}");
            assert_eq!(findings[0].rule, Rule::BankingSpam);
        }
    }

    #[test]
    fn test_banking_spam_needs_error_code() {
        let mut tx = transaction("TX_6");
        tx.status = TransactionStatus::Failed;
        tx.retry_count = 9;
        assert!(engine().evaluate(&[tx], 0.8).is_empty());
    }

    #[test]
    fn test_bank_outage_pattern_not_flagged() {
        // Three retries with a server error stays below the spam trigger.
        let mut tx = transaction("TX_7");
        tx.status = TransactionStatus::Failed;
        tx.error_code = Some("BANK_SERVER_ERROR".to_string());
        tx.retry_count = 3;
        tx.fraud_probability = 0.1;
        assert!(engine().evaluate(&[tx], 0.8).is_empty());
    }

    #[test]
    fn test_blocked_never_reflagged() {
        let mut tx = transaction("TX_8");
        tx.status = TransactionStatus::Blocked;
        tx.fraud_probability = 0.99;
        tx.risk_score = 99;
        assert!(engine().evaluate(&[tx], 0.8).is_empty());
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let config = AgentConfig {
            auth_failure_pattern: "(".to_string(),
            ..AgentConfig::default()
        };
        assert!(RuleEngine::new(&config).is_err());
    }

    #[test]
    fn test_policy() {
        let policy = engine().policy(0.83);
        assert_eq!(policy.high_risk_trigger, 20);
        assert_eq!(policy.max_retries, 3);
        assert!((policy.fraud_threshold - 0.83).abs() < f64::EPSILON);
    }
}
