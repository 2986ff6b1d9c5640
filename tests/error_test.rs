//! Tests for error types

use std::path::PathBuf;

use screening_db::error::{ConnectionError, FilterError, IngestRowError, SchemaError};
use screening_db::Error;

#[test]
fn test_unsupported_dialect_error() {
    let error = ConnectionError::UnsupportedDialect {
        dialect: "mongodb".to_string(),
        supported: "mysql, sqlite".to_string(),
    };
    let error_str = format!("{error}");
    assert!(error_str.contains("mongodb"));
    assert!(error_str.contains("try 'mysql, sqlite'"));
}

#[test]
fn test_unreachable_error() {
    let error = Error::from(ConnectionError::Unreachable {
        host: "db.lab:5432".to_string(),
        reason: "connection refused".to_string(),
    });
    let error_str = format!("{error}");
    assert!(error_str.starts_with("Connection error"));
    assert!(error_str.contains("db.lab:5432"));
    assert!(error_str.contains("connection refused"));
}

#[test]
fn test_not_connected_error() {
    let error = Error::from(ConnectionError::NotConnected);
    assert!(format!("{error}").contains("Could not establish connection"));
}

#[test]
fn test_duplicate_routine_error() {
    let error = Error::from(SchemaError::DuplicateRoutine("assay1".to_string()));
    let error_str = format!("{error}");
    assert!(error_str.contains("Schema error"));
    assert!(error_str.contains("'assay1' already exists"));
}

#[test]
fn test_missing_column_error() {
    let error = SchemaError::MissingColumn {
        table: "assay1".to_string(),
        column: "od600".to_string(),
    };
    assert_eq!(
        format!("{error}"),
        "Column 'od600' not found in table 'assay1'"
    );
}

#[test]
fn test_filter_syntax_error() {
    let error = Error::from(FilterError::Syntax {
        input: "Cpd.name ==".to_string(),
        reason: "Expected an expression".to_string(),
    });
    let error_str = format!("{error}");
    assert!(error_str.contains("Could not create filter 'Cpd.name =='"));
    assert!(error_str.contains("Expected an expression"));
}

#[test]
fn test_empty_result_error() {
    assert_eq!(
        format!("{}", Error::EmptyResult),
        "This search does not match any records"
    );
}

#[test]
fn test_module_not_found_error() {
    let error = Error::ModuleNotFound {
        name: "assay1".to_string(),
        dir: PathBuf::from("/home/alice"),
    };
    assert_eq!(
        format!("{error}"),
        "Module 'assay1' not found in '/home/alice'"
    );
}

#[test]
fn test_unsupported_format_error() {
    let error = Error::UnsupportedFormat("xlsx".to_string());
    let error_str = format!("{error}");
    assert!(error_str.contains("'xlsx'"));
    assert!(error_str.contains("txt, csv, tsv"));
}

#[test]
fn test_row_errors() {
    assert_eq!(
        format!("{}", IngestRowError::MissingField("sample".to_string())),
        "Missing required field 'sample'"
    );
    assert_eq!(
        format!("{}", IngestRowError::InvalidDate("yesterday".to_string())),
        "Invalid date 'yesterday'"
    );
    let schema = IngestRowError::from(SchemaError::MissingTable("assay1".to_string()));
    assert_eq!(format!("{schema}"), "Table 'assay1' not found");
}

#[test]
fn test_constraint_violation_is_classified() {
    let conn = rusqlite::Connection::open_in_memory().unwrap();
    conn.execute_batch("CREATE TABLE t (name TEXT UNIQUE); INSERT INTO t VALUES ('a');")
        .unwrap();
    let err = conn.execute("INSERT INTO t VALUES ('a')", []).unwrap_err();
    assert!(matches!(
        IngestRowError::from(err),
        IngestRowError::Constraint(_)
    ));
}

#[test]
fn test_io_error_conversion() {
    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing file");
    let error: Error = io.into();
    let error_str = format!("{error}");
    assert!(error_str.contains("IO error"));
    assert!(error_str.contains("missing file"));
}
