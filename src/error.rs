//! Error types for screening-db
//!
//! Errors are grouped by the layer that raises them: connection setup,
//! schema management, filter resolution, and per-row ingestion failures.
//! Connection and schema errors abort the current operation; row errors are
//! collected into an [`IngestReport`](crate::ingest::IngestReport) instead.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Error, Debug)]
pub enum Error {
    /// Connection could not be established or is not open
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// Schema mutation or lookup failed
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Filter expression could not be parsed or resolved
    #[error("Filter error: {0}")]
    Filter(#[from] FilterError),

    /// Query matched no results
    #[error("This search does not match any records")]
    EmptyResult,

    /// Routine module could not be located
    #[error("Module '{name}' not found in '{}'", dir.display())]
    ModuleNotFound {
        /// Module (routine) name
        name: String,
        /// Directory that was searched
        dir: PathBuf,
    },

    /// Invalid input (wrong structure returned by a module, bad arguments)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// File format not supported for import
    #[error("Unsupported file format '{0}': accepted formats are txt, csv, tsv")]
    UnsupportedFormat(String),

    /// Configuration file could not be read or parsed
    #[error("Configuration error: {0}")]
    Config(String),

    /// Underlying SQLite error
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Arrow error
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Parquet export error
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// JSON (de)serialization error
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures establishing or using a database connection.
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// Dialect is not in the allow-list
    #[error("Dialect '{dialect}' is not supported, try '{supported}'")]
    UnsupportedDialect {
        /// Requested dialect
        dialect: String,
        /// Comma-separated allow-list
        supported: String,
    },

    /// URL could not be constructed from the components
    #[error("The URL '{url}' is not valid: {reason}")]
    MalformedUrl {
        /// Redacted URL
        url: String,
        /// What is wrong with it
        reason: String,
    },

    /// Server rejected the credentials
    #[error("Check password, user name or server: {0}")]
    Authentication(String),

    /// Database does not exist
    #[error("Check database name: '{0}' does not exist")]
    UnknownDatabase(String),

    /// Host did not answer within the connect timeout
    #[error("Host '{host}' is unreachable: {reason}")]
    Unreachable {
        /// Host (and port) that was probed
        host: String,
        /// Underlying failure
        reason: String,
    },

    /// Dialect is allowed but no driver is compiled in
    #[error("No driver available for dialect '{0}' (only sqlite is built in)")]
    DriverUnavailable(String),

    /// Operation requires an open connection
    #[error("Could not establish connection to the database (not connected)")]
    NotConnected,
}

/// Schema-level failures: routine definitions and dynamic tables.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// Routine alias already taken
    #[error("Routine '{0}' already exists")]
    DuplicateRoutine(String),

    /// Routine alias not found
    #[error("Routine '{0}' does not exist")]
    UnknownRoutine(String),

    /// Dynamic table is missing from the catalog
    #[error("Table '{0}' not found")]
    MissingTable(String),

    /// Column is missing from a table
    #[error("Column '{column}' not found in table '{table}'")]
    MissingColumn {
        /// Table name
        table: String,
        /// Column name
        column: String,
    },

    /// Alias or field name cannot be used as an identifier
    #[error("Invalid identifier '{name}': {reason}")]
    InvalidIdentifier {
        /// Offending name
        name: String,
        /// Why it was rejected
        reason: String,
    },

    /// Field type tag not recognized
    #[error("Unknown field type '{0}', expected one of bool, int, float, string, datetime, duration")]
    UnknownFieldType(String),

    /// Only column additions are supported
    #[error("Cannot change field '{field}' of routine '{routine}' from {from} to {to}: only new columns can be added")]
    UnsupportedAlteration {
        /// Routine alias
        routine: String,
        /// Field name
        field: String,
        /// Current type tag
        from: String,
        /// Requested type tag
        to: String,
    },
}

/// Filter expression failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    /// Text could not be parsed
    #[error("Could not create filter '{input}': {reason}")]
    Syntax {
        /// Original filter text
        input: String,
        /// Parser message
        reason: String,
    },

    /// Field is not in the queryable whitelist
    #[error("Field '{0}' is not queryable")]
    UnknownField(String),

    /// Operator outside `=, !=, <=, >=, IN, NOT IN, LIKE`
    #[error("Operator '{0}' is not supported")]
    UnsupportedOperator(String),

    /// Operand does not fit the operator
    #[error("Invalid operand for {operator}: {reason}")]
    InvalidOperand {
        /// Operator
        operator: String,
        /// What is wrong
        reason: String,
    },

    /// Boolean connective with no operands
    #[error("Empty filter")]
    Empty,
}

/// A single row that could not be ingested.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IngestRowError {
    /// Required metadata key absent from both row and common metadata
    #[error("Missing required field '{0}'")]
    MissingField(String),

    /// Date value could not be interpreted
    #[error("Invalid date '{0}'")]
    InvalidDate(String),

    /// Metadata value has the wrong type
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue {
        /// Metadata key
        field: String,
        /// What is wrong
        reason: String,
    },

    /// Row targets a routine that does not exist
    #[error("Routine '{0}' does not exist")]
    UnknownRoutine(String),

    /// Dynamic table or column missing
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Constraint violation (unique, foreign key, not null)
    #[error("Constraint violation: {0}")]
    Constraint(String),

    /// Any other database failure on this row
    #[error("Could not write row to database: {0}")]
    Database(String),
}

impl From<rusqlite::Error> for IngestRowError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(ref code, ref message)
                if code.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Self::Constraint(message.clone().unwrap_or_else(|| err.to_string()))
            }
            other => Self::Database(other.to_string()),
        }
    }
}

impl From<Error> for IngestRowError {
    fn from(err: Error) -> Self {
        match err {
            Error::Schema(schema) => Self::Schema(schema),
            Error::Sqlite(sqlite) => sqlite.into(),
            other => Self::Database(other.to_string()),
        }
    }
}
