//! The fraud-defense agent.
//!
//! One [`SentinelAgent::run_cycle`] call walks the observe → reason → act →
//! learn loop once. Every step is written to the agent log in storage and
//! echoed as a `tracing` event.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::{Config, LearningMode};
use crate::dataset::{self, ImportReport};
use crate::error::{Error, Result};
use crate::generator::{Scenario, TransactionGenerator};
use crate::records::{Investigation, InvestigationStatus, LogEntry, Phase, Severity};
use crate::rules::{Action, Finding, Policy, RuleEngine};
use crate::storage::Storage;
use crate::transaction::{Transaction, TransactionStatus};

/// More high-probability records than this means a spike is under way.
const SPIKE_MIN_RECORDS: i64 = 5;

/// Where the agent is in its loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentPhase {
    /// Between cycles.
    Idle,
    /// Ingesting transactions.
    Observe,
    /// Applying rules.
    Reason,
    /// Executing actions.
    Act,
    /// Adjusting the threshold.
    Learn,
}

/// Counters for the current session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AgentStats {
    /// Transactions ingested by cycles.
    pub processed: u64,
    /// Payments blocked.
    pub blocked: u64,
    /// Investigations opened plus spam alerts raised.
    pub investigated: u64,
    /// Spam alerts raised.
    pub alerts: u64,
}

/// What one cycle did.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    /// New transactions generated.
    pub ingested: usize,
    /// Stored transactions judged (new plus injected).
    pub evaluated: usize,
    /// Rules that fired.
    pub findings: Vec<Finding>,
    /// Threshold when the cycle started.
    pub threshold_before: f64,
    /// Threshold after learning.
    pub threshold_after: f64,
    /// Log entries written during the cycle.
    pub logs: Vec<LogEntry>,
}

/// Figures shown on the dashboard's metric cards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardStats {
    /// Stored transactions.
    pub total_transactions: i64,
    /// Share of failed transactions, in percent.
    pub failure_rate: f64,
    /// Mean risk score.
    pub avg_risk_score: f64,
    /// Investigations awaiting a verdict.
    pub active_investigations: i64,
    /// Blocked transactions in storage.
    pub blocked_count: i64,
    /// Whether many stored records carry a high fraud probability.
    pub fraud_spike_detected: bool,
    /// Blocked payments per ingested payment this session, in percent.
    pub session_fraud_rate: f64,
}

/// Snapshot of the agent for status displays.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentSnapshot {
    /// Current loop phase.
    pub phase: AgentPhase,
    /// When the last cycle finished.
    pub last_run: Option<DateTime<Utc>>,
    /// Live rule parameters.
    pub policy: Policy,
    /// Session counters.
    pub stats: AgentStats,
}

/// The fraud-defense agent.
#[derive(Debug)]
pub struct SentinelAgent {
    config: Config,
    storage: Storage,
    generator: TransactionGenerator,
    rules: RuleEngine,
    stats: AgentStats,
    phase: AgentPhase,
    last_run: Option<DateTime<Utc>>,
}

impl SentinelAgent {
    /// Build an agent over an opened store.
    ///
    /// # Errors
    ///
    /// Returns an error if the rules cannot be compiled from `config`.
    pub fn new(config: Config, storage: Storage) -> Result<Self> {
        let rules = RuleEngine::new(&config.agent)?;
        let generator = TransactionGenerator::new(config.generator.clone(), &config.agent);
        Ok(Self {
            config,
            storage,
            generator,
            rules,
            stats: AgentStats::default(),
            phase: AgentPhase::Idle,
            last_run: None,
        })
    }

    /// The underlying store.
    #[must_use]
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// The configuration the agent runs with.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Session counters.
    #[must_use]
    pub fn stats(&self) -> AgentStats {
        self.stats
    }

    /// Current loop phase.
    #[must_use]
    pub fn phase(&self) -> AgentPhase {
        self.phase
    }

    /// When the last cycle finished.
    #[must_use]
    pub fn last_run(&self) -> Option<DateTime<Utc>> {
        self.last_run
    }

    /// Seed an empty store with history.
    ///
    /// Imports the configured datasets, then backfills synthetic records.
    /// Does nothing when the store already holds transactions.
    ///
    /// # Errors
    ///
    /// Returns an error if storage fails.
    pub fn initialize(&mut self) -> Result<Vec<ImportReport>> {
        if self.storage.count_transactions()? > 0 {
            debug!("Store already populated, skipping initialization");
            return Ok(Vec::new());
        }

        let reports = dataset::import_all(&self.storage, &self.config.dataset.paths)?;
        let imported: usize = reports.iter().map(|r| r.imported).sum();
        if imported > 0 {
            self.log(
                Phase::System,
                &format!("Dataset loaded: {imported} historical records."),
                None,
            )?;
        }

        let backfill = self.generator.backfill(self.config.dataset.backfill);
        if !backfill.is_empty() {
            self.storage.insert_transactions(&backfill, true)?;
        }
        self.log(
            Phase::System,
            &format!(
                "Agent initialized with {} historical records.",
                imported + backfill.len()
            ),
            None,
        )?;

        Ok(reports)
    }

    /// Run one observe → reason → act → learn cycle.
    ///
    /// A failure is written to the log with phase `ERROR` and returned.
    ///
    /// # Errors
    ///
    /// Returns an error if any step of the cycle fails.
    pub fn run_cycle(&mut self) -> Result<CycleReport> {
        match self.cycle() {
            Ok(report) => Ok(report),
            Err(e) => {
                self.phase = AgentPhase::Idle;
                error!("Agent cycle failed: {}", e);
                if let Err(log_err) =
                    self.log(Phase::Error, &format!("Agent loop failed: {e}"), None)
                {
                    warn!("Could not record cycle failure: {}", log_err);
                }
                Err(e)
            }
        }
    }

    fn cycle(&mut self) -> Result<CycleReport> {
        let mut logs = Vec::new();
        let threshold_before = self.storage.fraud_threshold()?;

        // OBSERVE
        self.phase = AgentPhase::Observe;
        let count = self.generator.batch_size();
        let batch = self.generator.generate(count);
        self.storage.insert_transactions(&batch, false)?;
        self.stats.processed += batch.len() as u64;
        let ids = batch
            .iter()
            .map(|tx| tx.id.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        logs.push(self.log(
            Phase::Observe,
            &format!("Ingested {} new transactions.", batch.len()),
            Some(&ids),
        )?);
        let pending = self
            .storage
            .unevaluated_transactions(self.config.agent.evaluation_window)?;

        // REASON
        self.phase = AgentPhase::Reason;
        let findings = self.rules.evaluate(&pending, threshold_before);
        if !findings.is_empty() {
            let reasons = findings
                .iter()
                .map(|f| f.reason.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            logs.push(self.log(Phase::Reason, "Decision logic applied", Some(&reasons))?);
        }

        // ACT
        self.phase = AgentPhase::Act;
        let labels = self.act(&findings)?;
        if labels.len() > self.config.agent.action_log_group_limit {
            logs.push(self.log(
                Phase::Act,
                &format!("Executed {} defensive actions.", labels.len()),
                Some(&labels.join("\n")),
            )?);
        } else {
            for label in &labels {
                logs.push(self.log(Phase::Act, label, None)?);
            }
        }
        let evaluated_ids: Vec<String> = pending.iter().map(|tx| tx.id.clone()).collect();
        self.storage.mark_evaluated(&evaluated_ids)?;

        // LEARN
        self.phase = AgentPhase::Learn;
        logs.extend(self.learn(threshold_before)?);
        let threshold_after = self.storage.fraud_threshold()?;

        self.apply_retention()?;
        self.phase = AgentPhase::Idle;
        self.last_run = Some(Utc::now());

        Ok(CycleReport {
            ingested: batch.len(),
            evaluated: pending.len(),
            findings,
            threshold_before,
            threshold_after,
            logs,
        })
    }

    /// Carry out findings; returns the label of each action taken.
    fn act(&mut self, findings: &[Finding]) -> Result<Vec<String>> {
        let mut labels = Vec::new();

        for finding in findings {
            let id = finding.transaction_id.as_str();
            match finding.action {
                Action::Investigate => {
                    if self.storage.investigation_for_transaction(id)?.is_some() {
                        debug!("Investigation already open for {}", id);
                        continue;
                    }
                    self.storage.create_investigation(id, &finding.reason)?;
                    self.set_status_unless_blocked(id, TransactionStatus::UnderInvestigation)?;
                    self.storage
                        .create_alert(Severity::Medium, &format!("Investigation opened for {id}"))?;
                    self.stats.investigated += 1;
                }
                Action::Block => {
                    self.storage
                        .update_transaction_status(id, TransactionStatus::Blocked)?;
                    if let Some(open) = self.open_investigation_for(id)? {
                        self.storage.update_investigation(
                            open.id,
                            InvestigationStatus::Blocked,
                            Some("Blocked by fraud spike rule"),
                        )?;
                    }
                    self.storage.create_alert(
                        Severity::Critical,
                        &format!(
                            "Blocked {id}: fraud probability {:.2}",
                            finding.fraud_probability
                        ),
                    )?;
                    self.stats.blocked += 1;
                }
                Action::Alert => {
                    self.storage.create_alert(
                        Severity::High,
                        &format!(
                            "Banking spam at {} ({})",
                            finding.bank,
                            finding.error_code.as_deref().unwrap_or("-")
                        ),
                    )?;
                    self.stats.investigated += 1;
                    self.stats.alerts += 1;
                }
            }
            labels.push(finding.action_label());
        }

        Ok(labels)
    }

    fn learn(&mut self, threshold: f64) -> Result<Option<LogEntry>> {
        match self.config.learning.mode {
            LearningMode::RandomWalk => self.learn_random_walk(threshold),
            LearningMode::Feedback => self.learn_from_feedback(threshold).map(Some),
        }
    }

    fn learn_random_walk(&mut self, threshold: f64) -> Result<Option<LogEntry>> {
        let learning = &self.config.learning;
        if !self.generator.chance(learning.adjust_probability) {
            return Ok(None);
        }

        let step = if self.generator.chance(0.5) {
            learning.step
        } else {
            -learning.step
        };
        let adjusted = round_threshold(
            (threshold + step).clamp(learning.min_threshold, learning.max_threshold),
        );
        if (adjusted - threshold).abs() < f64::EPSILON {
            return Ok(None);
        }

        self.storage.set_fraud_threshold(adjusted)?;
        self.log(
            Phase::Learn,
            &format!("Adjusted fraud threshold to {adjusted:.2} based on patterns."),
            None,
        )
        .map(Some)
    }

    fn learn_from_feedback(&mut self, threshold: f64) -> Result<LogEntry> {
        self.triage_open_investigations()?;

        let learning = self.config.learning.clone();
        let closed = self
            .storage
            .recent_closed_investigations(learning.feedback_window)?;
        let false_positives = closed
            .iter()
            .filter(|i| i.status == InvestigationStatus::Resolved)
            .count();
        let true_positives = closed
            .iter()
            .filter(|i| i.status == InvestigationStatus::Blocked)
            .count();

        let (adjusted, message) = if false_positives > true_positives + learning.feedback_margin {
            let relaxed =
                round_threshold((threshold + learning.step).min(learning.feedback_max_threshold));
            (
                relaxed,
                format!("Relaxing fraud threshold to {relaxed:.2} due to false positives."),
            )
        } else if true_positives > false_positives + learning.feedback_margin {
            let tightened =
                round_threshold((threshold - learning.step).max(learning.feedback_min_threshold));
            (
                tightened,
                format!("Tightening fraud threshold to {tightened:.2} due to confirmed threats."),
            )
        } else {
            (threshold, format!("Threshold stable at {threshold:.2}."))
        };

        if (adjusted - threshold).abs() >= f64::EPSILON {
            self.storage.set_fraud_threshold(adjusted)?;
        }
        self.log(
            Phase::Learn,
            &message,
            Some(&format!(
                "{false_positives} false positives, {true_positives} confirmed threats"
            )),
        )
    }

    /// Give every open investigation a simulated analyst verdict.
    fn triage_open_investigations(&mut self) -> Result<()> {
        let open = self
            .storage
            .investigations_with_status(InvestigationStatus::Open)?;
        let resolve_probability = self.config.learning.resolve_probability;

        for investigation in open {
            if self.generator.chance(resolve_probability) {
                self.storage.update_investigation(
                    investigation.id,
                    InvestigationStatus::Resolved,
                    Some("Cleared on review"),
                )?;
                self.set_status_unless_blocked(
                    &investigation.transaction_id,
                    TransactionStatus::Processed,
                )?;
            } else {
                self.storage.update_investigation(
                    investigation.id,
                    InvestigationStatus::Blocked,
                    Some("Confirmed fraud on review"),
                )?;
                self.storage.update_transaction_status(
                    &investigation.transaction_id,
                    TransactionStatus::Blocked,
                )?;
            }
        }
        Ok(())
    }

    fn apply_retention(&self) -> Result<()> {
        let storage_config = &self.config.storage;
        if storage_config.max_transactions > 0 {
            self.storage
                .prune_transactions_keep_recent(storage_config.max_transactions)?;
        }
        if storage_config.max_log_entries > 0 {
            self.storage
                .prune_logs_keep_recent(storage_config.max_log_entries)?;
        }
        Ok(())
    }

    /// Clear all data, restore the configured threshold and re-seed history.
    ///
    /// # Errors
    ///
    /// Returns an error if storage fails.
    pub fn reset(&mut self) -> Result<()> {
        self.storage.clear_all(self.config.agent.fraud_threshold)?;
        self.stats = AgentStats::default();
        self.phase = AgentPhase::Idle;
        self.last_run = None;
        info!("Agent reset");
        self.initialize()?;
        Ok(())
    }

    /// The live fraud threshold.
    ///
    /// # Errors
    ///
    /// Returns an error if storage fails.
    pub fn fraud_threshold(&self) -> Result<f64> {
        self.storage.fraud_threshold()
    }

    /// Override the fraud threshold by hand.
    ///
    /// # Errors
    ///
    /// Returns an error if `value` is outside `[0, 1]` or storage fails.
    pub fn set_fraud_threshold(&mut self, value: f64) -> Result<()> {
        if !(0.0..=1.0).contains(&value) {
            return Err(Error::invalid_input(format!(
                "threshold must be between 0 and 1, got {value}"
            )));
        }
        self.storage.set_fraud_threshold(value)?;
        self.log(
            Phase::Config,
            &format!("Manual threshold override to {value}"),
            None,
        )?;
        Ok(())
    }

    /// Store a scenario's records for the next cycle to judge.
    ///
    /// # Errors
    ///
    /// Returns an error if storage fails.
    pub fn inject_scenario(&mut self, scenario: Scenario) -> Result<Vec<Transaction>> {
        let records = self.generator.scenario(scenario);
        self.storage.insert_transactions(&records, false)?;
        self.log(
            Phase::System,
            &format!(
                "Injected scenario {scenario} with {} transactions.",
                records.len()
            ),
            None,
        )?;
        Ok(records)
    }

    /// Open an investigation at an analyst's request.
    ///
    /// # Errors
    ///
    /// Returns an error if the reason is blank, the transaction is unknown,
    /// it already has an investigation, or storage fails.
    pub fn open_investigation(&mut self, transaction_id: &str, reason: &str) -> Result<Investigation> {
        if transaction_id.trim().is_empty() || reason.trim().is_empty() {
            return Err(Error::invalid_input(
                "transaction_id and reason are required",
            ));
        }
        if self.storage.get_transaction(transaction_id)?.is_none() {
            return Err(Error::TransactionNotFound {
                id: transaction_id.to_string(),
            });
        }
        if self
            .storage
            .investigation_for_transaction(transaction_id)?
            .is_some()
        {
            return Err(Error::InvestigationExists {
                transaction_id: transaction_id.to_string(),
            });
        }

        let investigation = self.storage.create_investigation(transaction_id, reason)?;
        self.set_status_unless_blocked(transaction_id, TransactionStatus::UnderInvestigation)?;
        self.log(
            Phase::UserAction,
            &format!("User manually started investigation for {transaction_id}"),
            Some(reason),
        )?;
        Ok(investigation)
    }

    /// Record an analyst's verdict on an investigation.
    ///
    /// `Resolved` returns the transaction to `Processed`; `Blocked` blocks it.
    ///
    /// # Errors
    ///
    /// Returns an error if the status is `Open`, the investigation is unknown,
    /// or storage fails.
    pub fn close_investigation(
        &mut self,
        id: i64,
        status: InvestigationStatus,
        outcome: Option<&str>,
    ) -> Result<Investigation> {
        let tx_status = match status {
            InvestigationStatus::Resolved => TransactionStatus::Processed,
            InvestigationStatus::Blocked => TransactionStatus::Blocked,
            InvestigationStatus::Open => {
                return Err(Error::invalid_input(
                    "status must be RESOLVED or BLOCKED",
                ))
            }
        };

        if !self.storage.update_investigation(id, status, outcome)? {
            return Err(Error::InvestigationNotFound { id });
        }
        let investigation = self
            .storage
            .get_investigation(id)?
            .ok_or(Error::InvestigationNotFound { id })?;
        self.storage
            .update_transaction_status(&investigation.transaction_id, tx_status)?;
        self.log(
            Phase::UserAction,
            &format!(
                "Investigation {id} closed as {status} for {}",
                investigation.transaction_id
            ),
            outcome,
        )?;
        Ok(investigation)
    }

    /// Figures for the dashboard.
    ///
    /// # Errors
    ///
    /// Returns an error if storage fails.
    pub fn dashboard_stats(&self) -> Result<DashboardStats> {
        let stats = self.storage.stats()?;
        let failure_rate = if stats.total_transactions > 0 {
            round2(ratio(stats.failed, stats.total_transactions) * 100.0)
        } else {
            0.0
        };
        #[allow(clippy::cast_precision_loss)]
        let session_fraud_rate =
            self.stats.blocked as f64 / self.stats.processed.max(1) as f64 * 100.0;

        Ok(DashboardStats {
            total_transactions: stats.total_transactions,
            failure_rate,
            avg_risk_score: round2(stats.avg_risk_score),
            active_investigations: stats.open_investigations,
            blocked_count: stats.blocked,
            fraud_spike_detected: stats.high_fraud_count > SPIKE_MIN_RECORDS,
            session_fraud_rate: round2(session_fraud_rate),
        })
    }

    /// The live rule parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if storage fails.
    pub fn policy(&self) -> Result<Policy> {
        Ok(self.rules.policy(self.fraud_threshold()?))
    }

    /// Phase, last run, policy and counters in one value.
    ///
    /// # Errors
    ///
    /// Returns an error if storage fails.
    pub fn snapshot(&self) -> Result<AgentSnapshot> {
        Ok(AgentSnapshot {
            phase: self.phase,
            last_run: self.last_run,
            policy: self.policy()?,
            stats: self.stats,
        })
    }

    fn open_investigation_for(&self, transaction_id: &str) -> Result<Option<Investigation>> {
        Ok(self
            .storage
            .investigation_for_transaction(transaction_id)?
            .filter(|i| i.status == InvestigationStatus::Open))
    }

    fn set_status_unless_blocked(&self, id: &str, status: TransactionStatus) -> Result<()> {
        let blocked = self
            .storage
            .get_transaction(id)?
            .is_some_and(|tx| tx.is_blocked());
        if !blocked {
            self.storage.update_transaction_status(id, status)?;
        }
        Ok(())
    }

    fn log(&self, phase: Phase, message: &str, details: Option<&str>) -> Result<LogEntry> {
        info!(phase = %phase, "{}", message);
        self.storage.append_log(phase, message, details)
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Thresholds move in small steps; rounding keeps them free of float drift.
fn round_threshold(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

#[allow(clippy::cast_precision_loss)]
fn ratio(part: i64, whole: i64) -> f64 {
    part as f64 / whole as f64
}
