//! Storage layer for sentinel.
//!
//! This module provides `SQLite`-based persistent storage for transactions,
//! the agent log, settings, investigations and alerts.

pub mod migrations;
pub mod schema;

use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::records::{Alert, Investigation, InvestigationStatus, LogEntry, Phase, Severity};
use crate::transaction::{Transaction, TransactionStatus};

use migrations::FRAUD_THRESHOLD_KEY;

const TRANSACTION_COLUMNS: &str = "id, timestamp, merchant, amount, bank, payment_method, status, \
     risk_score, fraud_probability, error_code, retry_count, fraud_reason";

/// Fraud probability above which a stored record counts towards a spike.
const HIGH_FRAUD_PROBABILITY: f64 = 0.8;

/// Filter for transaction listings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionFilter {
    /// Only this status.
    pub status: Option<TransactionStatus>,
    /// Only risk scores at or above this.
    pub min_risk: Option<u32>,
    /// Only this bank.
    pub bank: Option<String>,
    /// Maximum number of rows; 0 means no limit.
    pub limit: usize,
}

/// Storage engine for the agent.
///
/// Provides persistent storage using `SQLite` with support for:
/// - Transaction upserts and filtered listings
/// - An append-only agent log
/// - Key/value settings (the live fraud threshold)
/// - Investigations, alerts and imported dataset fingerprints
#[derive(Debug)]
pub struct Storage {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection.
    conn: Connection,
}

impl Storage {
    /// Open or create a storage database at the given path.
    ///
    /// Creates the parent directories and database file if they don't exist.
    /// Initializes the schema if this is a new database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema initialization fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening database at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        migrations::initialize_schema(&conn)?;

        info!("Database opened successfully at {}", path.display());
        Ok(Self { path, conn })
    }

    /// Create an in-memory storage instance.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;

        migrations::initialize_schema(&conn)?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn,
        })
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    // ------------------------------------------------------------------
    // Transactions
    // ------------------------------------------------------------------

    /// Insert a transaction, replacing any stored record with the same id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn upsert_transaction(&self, tx: &Transaction, evaluated: bool) -> Result<()> {
        Self::upsert_with(&self.conn, tx, evaluated)
    }

    /// Insert many transactions inside one SQL transaction.
    ///
    /// Returns the number of records written.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails; nothing is written then.
    pub fn insert_transactions(&self, txs: &[Transaction], evaluated: bool) -> Result<usize> {
        let db_tx = self.conn.unchecked_transaction()?;
        for tx in txs {
            Self::upsert_with(&db_tx, tx, evaluated)?;
        }
        db_tx.commit()?;
        debug!("Inserted {} transactions", txs.len());
        Ok(txs.len())
    }

    fn upsert_with(conn: &Connection, tx: &Transaction, evaluated: bool) -> Result<()> {
        conn.execute(
            r"
            INSERT OR REPLACE INTO transactions (
                id, timestamp, merchant, amount, bank, payment_method, status,
                risk_score, fraud_probability, error_code, retry_count, fraud_reason, evaluated
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            ",
            params![
                tx.id,
                format_timestamp(tx.timestamp),
                tx.merchant,
                tx.amount,
                tx.bank,
                tx.payment_method,
                tx.status.as_str(),
                tx.risk_score,
                tx.fraud_probability,
                tx.error_code,
                tx.retry_count,
                tx.fraud_reason,
                evaluated,
            ],
        )?;
        Ok(())
    }

    /// Get a transaction by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_transaction(&self, id: &str) -> Result<Option<Transaction>> {
        let result = self
            .conn
            .query_row(
                &format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = ?1"),
                [id],
                Self::row_to_transaction,
            )
            .optional()?;
        Ok(result)
    }

    /// List transactions matching a filter, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_transactions(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>> {
        let mut clauses = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(status) = filter.status {
            values.push(Value::Text(status.as_str().to_string()));
            clauses.push(format!("status = ?{}", values.len()));
        }
        if let Some(min_risk) = filter.min_risk {
            values.push(Value::Integer(i64::from(min_risk)));
            clauses.push(format!("risk_score >= ?{}", values.len()));
        }
        if let Some(bank) = &filter.bank {
            values.push(Value::Text(bank.clone()));
            clauses.push(format!("bank = ?{}", values.len()));
        }

        let mut sql = format!("SELECT {TRANSACTION_COLUMNS} FROM transactions");
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY timestamp DESC, rowid DESC");
        if filter.limit > 0 {
            values.push(Value::Integer(to_i64(filter.limit)));
            sql.push_str(&format!(" LIMIT ?{}", values.len()));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let transactions = stmt
            .query_map(params_from_iter(values), Self::row_to_transaction)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(transactions)
    }

    /// Get the most recent transactions.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn recent_transactions(&self, limit: usize) -> Result<Vec<Transaction>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions \
             ORDER BY timestamp DESC, rowid DESC LIMIT ?1"
        ))?;

        let transactions = stmt
            .query_map([to_i64(limit)], Self::row_to_transaction)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(transactions)
    }

    /// Get transactions the agent has not judged yet, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn unevaluated_transactions(&self, limit: usize) -> Result<Vec<Transaction>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE evaluated = 0 \
             ORDER BY timestamp ASC, rowid ASC LIMIT ?1"
        ))?;

        let transactions = stmt
            .query_map([to_i64(limit)], Self::row_to_transaction)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(transactions)
    }

    /// Flag transactions as judged.
    ///
    /// Returns the number of rows updated.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn mark_evaluated(&self, ids: &[String]) -> Result<usize> {
        let db_tx = self.conn.unchecked_transaction()?;
        let mut updated = 0;
        {
            let mut stmt = db_tx.prepare("UPDATE transactions SET evaluated = 1 WHERE id = ?1")?;
            for id in ids {
                updated += stmt.execute([id])?;
            }
        }
        db_tx.commit()?;
        Ok(updated)
    }

    /// Change a transaction's status.
    ///
    /// Returns `true` if the transaction exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn update_transaction_status(&self, id: &str, status: TransactionStatus) -> Result<bool> {
        let affected = self.conn.execute(
            "UPDATE transactions SET status = ?1 WHERE id = ?2",
            params![status.as_str(), id],
        )?;
        Ok(affected > 0)
    }

    /// Count stored transactions.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn count_transactions(&self) -> Result<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM transactions", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Prune transactions to keep only the most recent N entries.
    ///
    /// Returns the number of transactions deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn prune_transactions_keep_recent(&self, keep_count: usize) -> Result<usize> {
        let affected = self.conn.execute(
            r"
            DELETE FROM transactions WHERE rowid NOT IN (
                SELECT rowid FROM transactions ORDER BY timestamp DESC, rowid DESC LIMIT ?1
            )
            ",
            [to_i64(keep_count)],
        )?;

        if affected > 0 {
            info!("Pruned {} transactions to keep {} recent", affected, keep_count);
        }
        Ok(affected)
    }

    // ------------------------------------------------------------------
    // Agent log
    // ------------------------------------------------------------------

    /// Append an entry to the agent log.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn append_log(&self, phase: Phase, message: &str, details: Option<&str>) -> Result<LogEntry> {
        let timestamp = Utc::now();
        self.conn.execute(
            "INSERT INTO agent_logs (timestamp, phase, message, details) VALUES (?1, ?2, ?3, ?4)",
            params![format_timestamp(timestamp), phase.as_str(), message, details],
        )?;

        Ok(LogEntry {
            id: self.conn.last_insert_rowid(),
            timestamp,
            phase,
            message: message.to_string(),
            details: details.map(str::to_string),
        })
    }

    /// Get the most recent log entries, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn recent_logs(&self, limit: usize) -> Result<Vec<LogEntry>> {
        let mut stmt = self.conn.prepare(
            r"
            SELECT id, timestamp, phase, message, details
            FROM agent_logs ORDER BY id DESC LIMIT ?1
            ",
        )?;

        let logs = stmt
            .query_map([to_i64(limit)], Self::row_to_log)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(logs)
    }

    /// Prune the log to keep only the most recent N entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn prune_logs_keep_recent(&self, keep_count: usize) -> Result<usize> {
        let affected = self.conn.execute(
            r"
            DELETE FROM agent_logs WHERE id NOT IN (
                SELECT id FROM agent_logs ORDER BY id DESC LIMIT ?1
            )
            ",
            [to_i64(keep_count)],
        )?;

        if affected > 0 {
            debug!("Pruned {} log entries", affected);
        }
        Ok(affected)
    }

    // ------------------------------------------------------------------
    // Settings
    // ------------------------------------------------------------------

    /// Read a setting.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM settings WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    /// Write a setting.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
            (key, value),
        )?;
        Ok(())
    }

    /// The live fraud threshold.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails or the stored value
    /// is not a number.
    pub fn fraud_threshold(&self) -> Result<f64> {
        let raw = self
            .get_setting(FRAUD_THRESHOLD_KEY)?
            .unwrap_or_else(|| migrations::DEFAULT_FRAUD_THRESHOLD.to_string());
        raw.parse()
            .map_err(|_| Error::internal(format!("stored fraud threshold is not a number: {raw}")))
    }

    /// Persist the fraud threshold.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn set_fraud_threshold(&self, value: f64) -> Result<()> {
        self.set_setting(FRAUD_THRESHOLD_KEY, &value.to_string())
    }

    // ------------------------------------------------------------------
    // Investigations
    // ------------------------------------------------------------------

    /// Open an investigation against a transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn create_investigation(&self, transaction_id: &str, reason: &str) -> Result<Investigation> {
        let start_time = Utc::now();
        self.conn.execute(
            r"
            INSERT INTO investigations (transaction_id, reason, start_time, status)
            VALUES (?1, ?2, ?3, ?4)
            ",
            params![
                transaction_id,
                reason,
                format_timestamp(start_time),
                InvestigationStatus::Open.as_str()
            ],
        )?;

        Ok(Investigation {
            id: self.conn.last_insert_rowid(),
            transaction_id: transaction_id.to_string(),
            reason: reason.to_string(),
            start_time,
            status: InvestigationStatus::Open,
            outcome: None,
        })
    }

    /// Get an investigation by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_investigation(&self, id: i64) -> Result<Option<Investigation>> {
        let result = self
            .conn
            .query_row(
                r"
                SELECT id, transaction_id, reason, start_time, status, outcome
                FROM investigations WHERE id = ?1
                ",
                [id],
                Self::row_to_investigation,
            )
            .optional()?;
        Ok(result)
    }

    /// Get the most recent investigation of a transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn investigation_for_transaction(
        &self,
        transaction_id: &str,
    ) -> Result<Option<Investigation>> {
        let result = self
            .conn
            .query_row(
                r"
                SELECT id, transaction_id, reason, start_time, status, outcome
                FROM investigations WHERE transaction_id = ?1
                ORDER BY id DESC LIMIT 1
                ",
                [transaction_id],
                Self::row_to_investigation,
            )
            .optional()?;
        Ok(result)
    }

    /// List investigations, newest first. A limit of 0 means no limit.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_investigations(&self, limit: usize) -> Result<Vec<Investigation>> {
        let mut stmt = self.conn.prepare(
            r"
            SELECT id, transaction_id, reason, start_time, status, outcome
            FROM investigations ORDER BY id DESC LIMIT ?1
            ",
        )?;

        let limit = if limit == 0 { -1 } else { to_i64(limit) };
        let investigations = stmt
            .query_map([limit], Self::row_to_investigation)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(investigations)
    }

    /// List investigations in a given state, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn investigations_with_status(
        &self,
        status: InvestigationStatus,
    ) -> Result<Vec<Investigation>> {
        let mut stmt = self.conn.prepare(
            r"
            SELECT id, transaction_id, reason, start_time, status, outcome
            FROM investigations WHERE status = ?1 ORDER BY id ASC
            ",
        )?;

        let investigations = stmt
            .query_map([status.as_str()], Self::row_to_investigation)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(investigations)
    }

    /// Set an investigation's status and outcome.
    ///
    /// Returns `true` if the investigation exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn update_investigation(
        &self,
        id: i64,
        status: InvestigationStatus,
        outcome: Option<&str>,
    ) -> Result<bool> {
        let affected = self.conn.execute(
            "UPDATE investigations SET status = ?1, outcome = ?2 WHERE id = ?3",
            params![status.as_str(), outcome, id],
        )?;
        Ok(affected > 0)
    }

    /// The most recent investigations that reached a verdict.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn recent_closed_investigations(&self, limit: usize) -> Result<Vec<Investigation>> {
        let mut stmt = self.conn.prepare(
            r"
            SELECT id, transaction_id, reason, start_time, status, outcome
            FROM investigations WHERE status != ?1
            ORDER BY id DESC LIMIT ?2
            ",
        )?;

        let investigations = stmt
            .query_map(
                params![InvestigationStatus::Open.as_str(), to_i64(limit)],
                Self::row_to_investigation,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(investigations)
    }

    // ------------------------------------------------------------------
    // Alerts
    // ------------------------------------------------------------------

    /// Raise an alert.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn create_alert(&self, severity: Severity, message: &str) -> Result<Alert> {
        let timestamp = Utc::now();
        self.conn.execute(
            "INSERT INTO alerts (severity, message, timestamp, is_read) VALUES (?1, ?2, ?3, 0)",
            params![severity.as_str(), message, format_timestamp(timestamp)],
        )?;

        Ok(Alert {
            id: self.conn.last_insert_rowid(),
            severity,
            message: message.to_string(),
            timestamp,
            is_read: false,
        })
    }

    /// List alerts, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_alerts(&self, limit: usize) -> Result<Vec<Alert>> {
        let mut stmt = self.conn.prepare(
            r"
            SELECT id, severity, message, timestamp, is_read
            FROM alerts ORDER BY id DESC LIMIT ?1
            ",
        )?;

        let alerts = stmt
            .query_map([to_i64(limit)], Self::row_to_alert)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(alerts)
    }

    // ------------------------------------------------------------------
    // Datasets
    // ------------------------------------------------------------------

    /// Check whether a dataset with this content hash was imported.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn dataset_imported(&self, content_hash: &str) -> Result<bool> {
        let count: i32 = self.conn.query_row(
            "SELECT COUNT(*) FROM datasets WHERE content_hash = ?1",
            [content_hash],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Remember an imported dataset.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn record_dataset(&self, content_hash: &str, path: &Path, imported: usize) -> Result<()> {
        self.conn.execute(
            r"
            INSERT OR REPLACE INTO datasets (content_hash, path, imported, imported_at)
            VALUES (?1, ?2, ?3, ?4)
            ",
            params![
                content_hash,
                path.to_string_lossy(),
                to_i64(imported),
                format_timestamp(Utc::now())
            ],
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Maintenance
    // ------------------------------------------------------------------

    /// Delete all agent data and restore the fraud threshold.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails; nothing is deleted then.
    pub fn clear_all(&self, fraud_threshold: f64) -> Result<()> {
        let db_tx = self.conn.unchecked_transaction()?;
        db_tx.execute_batch(
            r"
            DELETE FROM transactions;
            DELETE FROM agent_logs;
            DELETE FROM investigations;
            DELETE FROM alerts;
            DELETE FROM datasets;
            ",
        )?;
        db_tx.execute(
            "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
            (FRAUD_THRESHOLD_KEY, fraud_threshold.to_string()),
        )?;
        db_tx.commit()?;
        info!("Cleared all agent data");
        Ok(())
    }

    /// Get database statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn stats(&self) -> Result<StorageStats> {
        let (total_transactions, failed, blocked, high_fraud_count, avg_risk_score): (
            i64,
            i64,
            i64,
            i64,
            Option<f64>,
        ) = self.conn.query_row(
            r"
            SELECT COUNT(*),
                   COALESCE(SUM(status = ?1), 0),
                   COALESCE(SUM(status = ?2), 0),
                   COALESCE(SUM(fraud_probability > ?3), 0),
                   AVG(risk_score)
            FROM transactions
            ",
            params![
                TransactionStatus::Failed.as_str(),
                TransactionStatus::Blocked.as_str(),
                HIGH_FRAUD_PROBABILITY
            ],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
        )?;

        let open_investigations: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM investigations WHERE status = ?1",
            [InvestigationStatus::Open.as_str()],
            |row| row.get(0),
        )?;

        let log_entries: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM agent_logs", [], |row| row.get(0))?;

        let (oldest, newest): (Option<String>, Option<String>) = self.conn.query_row(
            "SELECT MIN(timestamp), MAX(timestamp) FROM transactions",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let db_size_bytes = if self.path.to_string_lossy() == ":memory:" {
            0
        } else {
            std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
        };

        Ok(StorageStats {
            total_transactions,
            failed,
            blocked,
            open_investigations,
            high_fraud_count,
            avg_risk_score: avg_risk_score.unwrap_or(0.0),
            log_entries,
            oldest_transaction: oldest.as_deref().and_then(parse_stored_timestamp),
            newest_transaction: newest.as_deref().and_then(parse_stored_timestamp),
            db_size_bytes,
        })
    }

    // ------------------------------------------------------------------
    // Row mapping
    // ------------------------------------------------------------------

    fn row_to_transaction(row: &rusqlite::Row) -> rusqlite::Result<Transaction> {
        let timestamp_str: String = row.get(1)?;
        let status_str: String = row.get(6)?;

        Ok(Transaction {
            id: row.get(0)?,
            timestamp: timestamp_or_now(&timestamp_str),
            merchant: row.get(2)?,
            amount: row.get(3)?,
            bank: row.get(4)?,
            payment_method: row.get(5)?,
            status: parse_column(6, &status_str)?,
            risk_score: row.get(7)?,
            fraud_probability: row.get(8)?,
            error_code: row.get(9)?,
            retry_count: row.get(10)?,
            fraud_reason: row.get(11)?,
        })
    }

    fn row_to_log(row: &rusqlite::Row) -> rusqlite::Result<LogEntry> {
        let timestamp_str: String = row.get(1)?;
        let phase_str: String = row.get(2)?;

        let phase = phase_str.parse().unwrap_or_else(|_| {
            warn!("Unknown log phase: {}, defaulting to SYSTEM", phase_str);
            Phase::System
        });

        Ok(LogEntry {
            id: row.get(0)?,
            timestamp: timestamp_or_now(&timestamp_str),
            phase,
            message: row.get(3)?,
            details: row.get(4)?,
        })
    }

    fn row_to_investigation(row: &rusqlite::Row) -> rusqlite::Result<Investigation> {
        let start_str: String = row.get(3)?;
        let status_str: String = row.get(4)?;

        Ok(Investigation {
            id: row.get(0)?,
            transaction_id: row.get(1)?,
            reason: row.get(2)?,
            start_time: timestamp_or_now(&start_str),
            status: parse_column(4, &status_str)?,
            outcome: row.get(5)?,
        })
    }

    fn row_to_alert(row: &rusqlite::Row) -> rusqlite::Result<Alert> {
        let severity_str: String = row.get(1)?;
        let timestamp_str: String = row.get(3)?;

        Ok(Alert {
            id: row.get(0)?,
            severity: parse_column(1, &severity_str)?,
            message: row.get(2)?,
            timestamp: timestamp_or_now(&timestamp_str),
            is_read: row.get(4)?,
        })
    }
}

/// Statistics about the storage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StorageStats {
    /// Total number of transactions stored.
    pub total_transactions: i64,
    /// Transactions with status `Failed`.
    pub failed: i64,
    /// Transactions with status `Blocked`.
    pub blocked: i64,
    /// Investigations still awaiting a verdict.
    pub open_investigations: i64,
    /// Transactions with a fraud probability above 0.8.
    pub high_fraud_count: i64,
    /// Mean risk score, 0 when empty.
    pub avg_risk_score: f64,
    /// Entries in the agent log.
    pub log_entries: i64,
    /// Timestamp of the oldest transaction.
    pub oldest_transaction: Option<DateTime<Utc>>,
    /// Timestamp of the newest transaction.
    pub newest_transaction: Option<DateTime<Utc>>,
    /// Size of the database file in bytes.
    pub db_size_bytes: u64,
}

/// Timestamps are stored with fixed precision so text order is time order.
fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_stored_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn timestamp_or_now(s: &str) -> DateTime<Utc> {
    parse_stored_timestamp(s).unwrap_or_else(|| {
        warn!("Unparseable stored timestamp: {}", s);
        Utc::now()
    })
}

fn parse_column<T>(idx: usize, value: &str) -> rusqlite::Result<T>
where
    T: FromStr<Err = Error>,
{
    value.parse().map_err(|e: Error| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            e.to_string().into(),
        )
    })
}

fn to_i64(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
