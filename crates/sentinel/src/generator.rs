//! Synthetic transaction stream.
//!
//! The generator stands in for a live payment feed: each call produces a
//! batch of plausible records, a fraction of them fraudulent or failing with
//! banking errors. Scenarios inject a burst of one specific pattern.

use std::fmt;
use std::str::FromStr;

use chrono::{Duration, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{AgentConfig, GeneratorConfig};
use crate::error::Error;
use crate::transaction::{Transaction, TransactionStatus};

/// Spacing between backfilled records.
const BACKFILL_SPACING_MINUTES: i64 = 10;

/// Records produced by one scenario injection.
const SCENARIO_SIZE: usize = 10;

/// A canned burst of suspicious traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
    /// High-value card payments at a handful of merchants, all near-certain fraud.
    FraudAttack,
    /// A bank rejecting UPI payments with server errors.
    BankOutage,
}

impl Scenario {
    /// The wire name of this scenario.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FraudAttack => "fraud_attack",
            Self::BankOutage => "bank_outage",
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scenario {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "fraud_attack" => Ok(Self::FraudAttack),
            "bank_outage" => Ok(Self::BankOutage),
            _ => Err(Error::invalid_input(format!("unknown scenario: {s}"))),
        }
    }
}

/// Produces synthetic transactions.
#[derive(Debug)]
pub struct TransactionGenerator {
    config: GeneratorConfig,
    batch_min: usize,
    batch_max: usize,
    rng: StdRng,
    sequence: u64,
}

impl TransactionGenerator {
    /// Create a generator. A configured seed makes the stream reproducible.
    #[must_use]
    pub fn new(config: GeneratorConfig, agent: &AgentConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            batch_min: agent.batch_min,
            batch_max: agent.batch_max.max(agent.batch_min),
            config,
            rng,
            sequence: 0,
        }
    }

    /// Draw the size of the next observed batch.
    pub fn batch_size(&mut self) -> usize {
        self.rng.gen_range(self.batch_min..=self.batch_max)
    }

    /// Roll a probability for callers that share this generator's RNG.
    pub fn chance(&mut self, probability: f64) -> bool {
        self.rng.gen_bool(probability.clamp(0.0, 1.0))
    }

    /// Generate `count` transactions stamped now.
    pub fn generate(&mut self, count: usize) -> Vec<Transaction> {
        let batch: Vec<_> = (0..count).map(|_| self.next_transaction()).collect();
        debug!("Generated {} transactions", batch.len());
        batch
    }

    /// Generate `count` transactions spaced ten minutes apart, ending now.
    pub fn backfill(&mut self, count: usize) -> Vec<Transaction> {
        let now = Utc::now();
        let mut records = self.generate(count);
        for (tx, steps_back) in records.iter_mut().zip((0..count).rev()) {
            let steps_back = i64::try_from(steps_back).unwrap_or(i64::MAX / BACKFILL_SPACING_MINUTES);
            tx.timestamp = now - Duration::minutes(steps_back * BACKFILL_SPACING_MINUTES);
        }
        records
    }

    /// Build the records of a scenario.
    pub fn scenario(&mut self, scenario: Scenario) -> Vec<Transaction> {
        const ATTACKED_MERCHANTS: [&str; 3] = ["Amazon", "Walmart", "Apple"];

        (0..SCENARIO_SIZE)
            .map(|i| {
                let id = self.next_id();
                match scenario {
                    Scenario::FraudAttack => Transaction {
                        id,
                        timestamp: Utc::now(),
                        merchant: ATTACKED_MERCHANTS[i % ATTACKED_MERCHANTS.len()].to_string(),
                        amount: 999.99,
                        bank: "Unknown".to_string(),
                        payment_method: Some("Card".to_string()),
                        status: TransactionStatus::Processed,
                        risk_score: 90,
                        fraud_probability: 0.99,
                        error_code: None,
                        retry_count: 0,
                        fraud_reason: None,
                    },
                    Scenario::BankOutage => Transaction {
                        id,
                        timestamp: Utc::now(),
                        merchant: "Multiple".to_string(),
                        amount: 50.0,
                        bank: "HDFC".to_string(),
                        payment_method: Some("UPI".to_string()),
                        status: TransactionStatus::Failed,
                        risk_score: 10,
                        fraud_probability: 0.1,
                        error_code: Some("BANK_SERVER_ERROR".to_string()),
                        retry_count: 3,
                        fraud_reason: None,
                    },
                }
            })
            .collect()
    }

    fn next_id(&mut self) -> String {
        self.sequence += 1;
        format!(
            "TX_{}_{}_{}",
            Utc::now().timestamp(),
            self.rng.gen_range(1000..=9999),
            self.sequence
        )
    }

    fn next_transaction(&mut self) -> Transaction {
        let is_spam = self.rng.gen_bool(self.config.spam_rate);
        let is_fraud = self.rng.gen_bool(self.config.fraud_rate);

        let id = self.next_id();
        let merchant = pick(&mut self.rng, &self.config.merchants, "Unknown");
        let bank = pick(&mut self.rng, &self.config.banks, "Unknown");
        let payment_method = pick(&mut self.rng, &self.config.payment_methods, "Card");
        let amount = round_to(
            self.rng
                .gen_range(self.config.amount_min..=self.config.amount_max),
            2,
        );

        let (status, error_code, retry_count) = if is_spam {
            (
                TransactionStatus::Failed,
                Some(pick(&mut self.rng, &self.config.error_codes, "BANK_SERVER_ERROR")),
                self.rng.gen_range(4..=10),
            )
        } else {
            (TransactionStatus::Processed, None, 0)
        };

        let (risk_score, fraud_probability) = if is_fraud {
            (self.rng.gen_range(80..=100), self.rng.gen_range(0.80..=0.99))
        } else {
            (self.rng.gen_range(0..=30), self.rng.gen_range(0.01..=0.20))
        };

        Transaction {
            id,
            timestamp: Utc::now(),
            merchant,
            amount,
            bank,
            payment_method: Some(payment_method),
            status,
            risk_score,
            fraud_probability: round_to(fraud_probability, 2),
            error_code,
            retry_count,
            fraud_reason: None,
        }
    }
}

fn pick(rng: &mut StdRng, items: &[String], fallback: &str) -> String {
    items
        .choose(rng)
        .cloned()
        .unwrap_or_else(|| fallback.to_string())
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
