//! Historical dataset import.
//!
//! Payment gateway exports arrive as CSV with a header row. Only a handful of
//! columns matter to the agent; they are picked by position.

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use csv::StringRecord;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::storage::Storage;
use crate::transaction::{Transaction, TransactionStatus};

/// Rows shorter than this are not payment records.
const MIN_COLUMNS: usize = 14;

mod column {
    pub const ID: usize = 1;
    pub const TIMESTAMP: usize = 2;
    pub const AMOUNT: usize = 4;
    pub const PAYMENT_METHOD: usize = 6;
    pub const MERCHANT: usize = 7;
    pub const BANK: usize = 8;
    pub const STATUS: usize = 9;
    pub const ERROR_CODE: usize = 10;
    pub const FRAUD_SCORE: usize = 13;
    pub const FRAUD_REASON: usize = 15;
    pub const ATTEMPTS: usize = 20;
}

const NAIVE_TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Outcome of importing one dataset file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    /// The file that was read.
    pub path: PathBuf,
    /// Records written to storage.
    pub imported: usize,
    /// Rows that could not be turned into records.
    pub skipped: usize,
    /// The file had been imported before; nothing was written.
    pub duplicate_file: bool,
}

/// Records parsed from CSV text.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRows {
    /// Successfully mapped records.
    pub records: Vec<Transaction>,
    /// Data rows that were dropped.
    pub skipped: usize,
}

/// Import a CSV file into storage.
///
/// Records are stored as already evaluated. A file whose content was imported
/// before is reported as a duplicate and not re-read into storage.
///
/// # Errors
///
/// Returns an error if the file cannot be read or storage fails.
pub fn import_file(storage: &Storage, path: &Path) -> Result<ImportReport> {
    let bytes = std::fs::read(path).map_err(|e| Error::dataset(path, e.to_string()))?;
    let content_hash = blake3::hash(&bytes).to_hex().to_string();

    if storage.dataset_imported(&content_hash)? {
        debug!("Dataset {} already imported", path.display());
        return Ok(ImportReport {
            path: path.to_path_buf(),
            imported: 0,
            skipped: 0,
            duplicate_file: true,
        });
    }

    let text = String::from_utf8_lossy(&bytes);
    let parsed = parse_rows(&text);
    let imported = storage.insert_transactions(&parsed.records, true)?;
    storage.record_dataset(&content_hash, path, imported)?;

    info!(
        "Imported {} records from {} ({} skipped)",
        imported,
        path.display(),
        parsed.skipped
    );
    Ok(ImportReport {
        path: path.to_path_buf(),
        imported,
        skipped: parsed.skipped,
        duplicate_file: false,
    })
}

/// Import every existing file in `paths`; missing files are logged and skipped.
///
/// # Errors
///
/// Returns an error if storage fails. Unreadable files are skipped.
pub fn import_all(storage: &Storage, paths: &[PathBuf]) -> Result<Vec<ImportReport>> {
    let mut reports = Vec::new();
    for path in paths {
        if !path.exists() {
            debug!("Dataset {} not found, skipping", path.display());
            continue;
        }
        match import_file(storage, path) {
            Ok(report) => reports.push(report),
            Err(e @ Error::Dataset { .. }) => warn!("{}", e),
            Err(e) => return Err(e),
        }
    }
    Ok(reports)
}

/// Parse CSV text (header row first) into transactions.
///
/// Rows the CSV reader cannot decode count as skipped, like rows that do
/// not map to a record.
#[must_use]
pub fn parse_rows(text: &str) -> ParsedRows {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let mut records = Vec::new();
    let mut skipped = 0;

    for row in reader.records() {
        match row.ok().as_ref().and_then(map_row) {
            Some(tx) => records.push(tx),
            None => skipped += 1,
        }
    }

    ParsedRows { records, skipped }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn map_row(row: &StringRecord) -> Option<Transaction> {
    if row.len() < MIN_COLUMNS {
        return None;
    }
    let field = |idx: usize| row.get(idx).unwrap_or("");
    let optional = |idx: usize| Some(field(idx)).filter(|s| !s.is_empty()).map(str::to_string);
    let or_unknown = |idx: usize| optional(idx).unwrap_or_else(|| "Unknown".to_string());

    let id = optional(column::ID)?;
    let timestamp = parse_timestamp(field(column::TIMESTAMP))?;
    let amount = parse_number(field(column::AMOUNT))?;
    let status = parse_status(field(column::STATUS));

    let score = if field(column::FRAUD_SCORE).is_empty() {
        0.0
    } else {
        parse_number(field(column::FRAUD_SCORE))?.clamp(0.0, 100.0)
    };
    let attempts = parse_number(field(column::ATTEMPTS)).unwrap_or(0.0).max(0.0);

    Some(Transaction {
        id,
        timestamp,
        merchant: or_unknown(column::MERCHANT),
        amount,
        bank: or_unknown(column::BANK),
        payment_method: optional(column::PAYMENT_METHOD),
        status,
        risk_score: score.round() as u32,
        fraud_probability: score / 100.0,
        error_code: optional(column::ERROR_CODE),
        retry_count: attempts as u32,
        fraud_reason: optional(column::FRAUD_REASON),
    })
}

fn parse_number(s: &str) -> Option<f64> {
    s.replace(',', "").parse().ok().filter(|v: &f64| v.is_finite())
}

/// Gateway exports only distinguish `success` from everything else; any
/// status other than one of ours counts as a failed payment.
fn parse_status(s: &str) -> TransactionStatus {
    s.parse().unwrap_or(TransactionStatus::Failed)
}

/// Accepts RFC 3339 and the common naive layouts, naive ones read as UTC.
fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NAIVE_TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
        .map(|naive| naive.and_utc())
}
