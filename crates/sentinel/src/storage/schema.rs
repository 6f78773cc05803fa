//! `SQLite` schema definitions for sentinel.
//!
//! This module contains the SQL statements for creating and managing
//! the database schema.

/// SQL statement to create the transactions table.
pub const CREATE_TRANSACTIONS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS transactions (
    id TEXT PRIMARY KEY,
    timestamp TEXT NOT NULL,
    merchant TEXT NOT NULL,
    amount REAL NOT NULL,
    bank TEXT NOT NULL,
    payment_method TEXT,
    status TEXT NOT NULL,
    risk_score INTEGER NOT NULL,
    fraud_probability REAL NOT NULL,
    error_code TEXT,
    retry_count INTEGER NOT NULL,
    fraud_reason TEXT,
    evaluated INTEGER NOT NULL DEFAULT 0
)
";

/// SQL statement to create an index on timestamp for newest-first listings.
pub const CREATE_TIMESTAMP_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_transactions_timestamp ON transactions(timestamp DESC)
";

/// SQL statement to create an index on status for filtering.
pub const CREATE_STATUS_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_transactions_status ON transactions(status)
";

/// SQL statement to create an index on bank for filtering.
pub const CREATE_BANK_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_transactions_bank ON transactions(bank)
";

/// SQL statement to create the append-only agent log.
pub const CREATE_AGENT_LOGS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS agent_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    phase TEXT NOT NULL,
    message TEXT NOT NULL,
    details TEXT
)
";

/// SQL statement to create the settings key-value table.
pub const CREATE_SETTINGS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS settings (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// SQL statement to create the investigations table.
pub const CREATE_INVESTIGATIONS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS investigations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    transaction_id TEXT NOT NULL,
    reason TEXT NOT NULL,
    start_time TEXT NOT NULL,
    status TEXT NOT NULL,
    outcome TEXT
)
";

/// SQL statement to create an index on the investigated transaction.
pub const CREATE_INVESTIGATION_TX_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_investigations_tx ON investigations(transaction_id)
";

/// SQL statement to create the alerts table.
pub const CREATE_ALERTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS alerts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    severity TEXT NOT NULL,
    message TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    is_read INTEGER NOT NULL DEFAULT 0
)
";

/// SQL statement to record imported dataset fingerprints.
pub const CREATE_DATASETS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS datasets (
    content_hash TEXT PRIMARY KEY,
    path TEXT NOT NULL,
    imported INTEGER NOT NULL,
    imported_at TEXT NOT NULL
)
";

/// SQL statement to create the metadata table for storing key-value pairs.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// All schema creation statements in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    CREATE_TRANSACTIONS_TABLE,
    CREATE_TIMESTAMP_INDEX,
    CREATE_STATUS_INDEX,
    CREATE_BANK_INDEX,
    CREATE_AGENT_LOGS_TABLE,
    CREATE_SETTINGS_TABLE,
    CREATE_INVESTIGATIONS_TABLE,
    CREATE_INVESTIGATION_TX_INDEX,
    CREATE_ALERTS_TABLE,
    CREATE_DATASETS_TABLE,
    CREATE_METADATA_TABLE,
];
