//! Integration tests for result ingestion

use std::path::Path;

use chrono::NaiveDate;
use screening_db::entity::RoutineRecord;
use screening_db::error::IngestRowError;
use screening_db::ingest::{DateMode, IngestOptions, LoadTarget, Row};
use screening_db::schema::{FieldType, FieldTypes};
use screening_db::Database;

fn open(root: &Path) -> Database {
    let mut db = Database::in_memory().unwrap().with_workspace_root(root);
    db.initialize_schema().unwrap();
    db
}

fn define_assay1(db: &mut Database) {
    let fields = FieldTypes::new().with("od600", FieldType::Float);
    let record = RoutineRecord::builder("assay1", fields).author("alice").build();
    db.define_routine(&record, None).unwrap();
}

fn measurement(sample: &str, od600: f64) -> Row {
    Row::new()
        .with("od600", od600)
        .with("sample", sample)
        .with("user", "alice")
        .with("date", "2020-01-05")
        .with("active", true)
}

fn count(db: &Database, table: &str) -> i64 {
    db.connection()
        .unwrap()
        .query_row(&format!(r#"SELECT COUNT(*) FROM "{table}""#), [], |row| row.get(0))
        .unwrap()
}

// ============================================================================
// Happy path
// ============================================================================

#[test]
fn test_single_row_writes_result_and_data() {
    let root = tempfile::tempdir().unwrap();
    let mut db = open(root.path());
    define_assay1(&mut db);

    let report = db
        .ingest("assay1", &[measurement("CompoundX", 0.42)], &Row::new())
        .unwrap();

    assert_eq!(report.total, 1);
    assert_eq!(report.committed, 1);
    assert!(report.is_complete());
    assert_eq!(report.created_compounds, vec!["CompoundX".to_string()]);
    assert_eq!(count(&db, "results"), 1);
    assert_eq!(count(&db, "assay1"), 1);

    let (link, od600): (i64, f64) = db
        .connection()
        .unwrap()
        .query_row(r#"SELECT "link", "od600" FROM "assay1""#, [], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })
        .unwrap();
    assert_eq!(link, report.result_ids[0]);
    assert!((od600 - 0.42).abs() < f64::EPSILON);

    let results = db.results_for_routine("assay1").unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].id(), Some(link));
    assert!(results[0].is_active());
    assert_eq!(
        results[0].measured_at(),
        NaiveDate::from_ymd_opt(2020, 1, 5).unwrap().and_hms_opt(0, 0, 0)
    );
}

#[test]
fn test_common_metadata_fills_blank_cells() {
    let root = tempfile::tempdir().unwrap();
    let mut db = open(root.path());
    define_assay1(&mut db);

    let rows = [
        Row::new().with("od600", 0.1).with("sample", "A1"),
        Row::new().with("od600", 0.2).with("sample", "A2").with("user", ""),
    ];
    let common = Row::new().with("user", "alice").with("active", "no");
    let report = db.ingest("assay1", &rows, &common).unwrap();

    assert_eq!(report.committed, 2);
    let results = db.results_for_routine("assay1").unwrap();
    assert!(results.iter().all(|r| !r.is_active()));
    let alice = db.find_user("alice").unwrap().unwrap();
    assert!(results.iter().all(|r| Some(r.user_id()) == alice.id()));
}

#[test]
fn test_serial_and_text_dates_agree() {
    let root = tempfile::tempdir().unwrap();
    let mut db = open(root.path());
    define_assay1(&mut db);

    let rows = [
        measurement("A1", 0.1).with("date", 43831),
        measurement("A2", 0.2).with("date", "2020-01-01"),
    ];
    db.ingest("assay1", &rows, &Row::new()).unwrap();

    let dates: Vec<_> = db
        .results_for_routine("assay1")
        .unwrap()
        .iter()
        .map(|r| r.measured_at())
        .collect();
    assert_eq!(dates.len(), 2);
    assert_eq!(dates[0], dates[1]);
    assert_eq!(
        dates[0],
        NaiveDate::from_ymd_opt(2020, 1, 1).unwrap().and_hms_opt(0, 0, 0)
    );
}

#[test]
fn test_1904_date_mode() {
    let root = tempfile::tempdir().unwrap();
    let mut db = open(root.path());
    define_assay1(&mut db);

    let options = IngestOptions {
        date_mode: DateMode::Epoch1904,
        ..IngestOptions::default()
    };
    let rows = [measurement("A1", 0.1).with("date", 0)];
    db.ingest_with("assay1", &rows, &Row::new(), options).unwrap();

    let results = db.results_for_routine("assay1").unwrap();
    assert_eq!(
        results[0].measured_at(),
        NaiveDate::from_ymd_opt(1904, 1, 1).unwrap().and_hms_opt(0, 0, 0)
    );
}

// ============================================================================
// Row failures
// ============================================================================

#[test]
fn test_unknown_routine_is_reported() {
    let root = tempfile::tempdir().unwrap();
    let mut db = open(root.path());

    let report = db
        .ingest("assay9", &[measurement("CompoundX", 0.42)], &Row::new())
        .unwrap();

    assert_eq!(report.committed, 0);
    assert_eq!(report.failed_count(), 1);
    assert_eq!(report.failed[0].index, 0);
    assert_eq!(
        report.failed[0].error,
        IngestRowError::UnknownRoutine("assay9".to_string())
    );
    assert_eq!(count(&db, "results"), 0);
    assert_eq!(count(&db, "compounds"), 0);
}

#[test]
fn test_invalid_date_drops_only_that_row() {
    let root = tempfile::tempdir().unwrap();
    let mut db = open(root.path());
    define_assay1(&mut db);

    let rows = [
        measurement("A1", 0.1),
        measurement("A2", 0.2).with("date", "the day after tomorrow"),
        measurement("A3", 0.3),
    ];
    let report = db.ingest("assay1", &rows, &Row::new()).unwrap();

    assert_eq!(report.committed, 2);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].index, 1);
    assert!(matches!(report.failed[0].error, IngestRowError::InvalidDate(_)));
    assert_eq!(count(&db, "results"), 2);
    assert_eq!(count(&db, "assay1"), 2);
}

#[test]
fn test_missing_sample_is_reported() {
    let root = tempfile::tempdir().unwrap();
    let mut db = open(root.path());
    define_assay1(&mut db);

    let rows = [Row::new().with("od600", 0.1).with("user", "alice")];
    let report = db.ingest("assay1", &rows, &Row::new()).unwrap();

    assert_eq!(
        report.failed[0].error,
        IngestRowError::MissingField("sample".to_string())
    );
}

#[test]
fn test_failed_data_insert_leaves_no_orphan_result() {
    let root = tempfile::tempdir().unwrap();
    let mut db = open(root.path());
    define_assay1(&mut db);

    let rows = [measurement("A1", 0.1).with("turbidity", 3.0)];
    let report = db.ingest("assay1", &rows, &Row::new()).unwrap();

    assert_eq!(report.committed, 0);
    assert!(matches!(report.failed[0].error, IngestRowError::Schema(_)));
    assert_eq!(count(&db, "results"), 0);
    assert_eq!(count(&db, "compounds"), 0);
}

#[test]
fn test_rolled_back_user_leaves_no_directory() {
    let root = tempfile::tempdir().unwrap();
    let mut db = open(root.path());
    define_assay1(&mut db);

    let rows = [
        measurement("A1", 0.1).with("user", "bob").with("turbidity", 3.0),
        measurement("A2", 0.2).with("user", "carol"),
    ];
    let report = db.ingest("assay1", &rows, &Row::new()).unwrap();

    assert_eq!(report.committed, 1);
    assert_eq!(report.created_users, vec!["carol".to_string()]);
    assert!(db.find_user("bob").unwrap().is_none());
    assert!(!root.path().join("bob").exists());
    assert!(root.path().join("carol").is_dir());
}

#[test]
fn test_blank_rows_are_skipped() {
    let root = tempfile::tempdir().unwrap();
    let mut db = open(root.path());
    define_assay1(&mut db);

    let rows = [
        measurement("A1", 0.1),
        Row::new().with("od600", None::<f64>).with("sample", None::<String>),
    ];
    let report = db.ingest("assay1", &rows, &Row::new()).unwrap();

    assert_eq!(report.total, 2);
    assert_eq!(report.committed, 1);
    assert_eq!(report.skipped, 1);
    assert!(report.failed.is_empty());
}

#[test]
fn test_column_names_match_ignoring_case() {
    let root = tempfile::tempdir().unwrap();
    let mut db = open(root.path());
    define_assay1(&mut db);

    let row = Row::new()
        .with("OD600", 0.4)
        .with("Sample", "CompoundX")
        .with("USER", "alice");
    let report = db.ingest("assay1", &[row], &Row::new()).unwrap();

    assert!(report.is_complete(), "{:?}", report.failed);
    assert_eq!(report.committed, 1);
    let od600: f64 = db
        .connection()
        .unwrap()
        .query_row(r#"SELECT "od600" FROM "assay1""#, [], |row| row.get(0))
        .unwrap();
    assert!((od600 - 0.4).abs() < f64::EPSILON);
}

#[test]
fn test_auto_create_does_not_duplicate_column_in_other_case() {
    let root = tempfile::tempdir().unwrap();
    let mut db = open(root.path());
    define_assay1(&mut db);

    let options = IngestOptions {
        auto_create_routines: true,
        ..IngestOptions::default()
    };
    let row = Row::new()
        .with("OD600", 0.4)
        .with("sample", "CompoundX")
        .with("user", "alice");
    let report = db.ingest_with("assay1", &[row], &Row::new(), options).unwrap();

    assert_eq!(report.committed, 1);
    let table = db.catalog().table("assay1").unwrap();
    assert_eq!(
        table.column_names().collect::<Vec<_>>(),
        vec!["id", "link", "od600"]
    );
}

#[test]
fn test_columns_repeated_in_other_case_are_rejected() {
    let root = tempfile::tempdir().unwrap();
    let mut db = open(root.path());
    define_assay1(&mut db);

    let row = measurement("CompoundX", 0.4).with("OD600", 0.5);
    let report = db.ingest("assay1", &[row], &Row::new()).unwrap();

    assert_eq!(report.committed, 0);
    assert!(matches!(
        report.failed[0].error,
        IngestRowError::InvalidValue { .. }
    ));
    assert_eq!(count(&db, "results"), 0);
}

// ============================================================================
// Auto-creation
// ============================================================================

#[test]
fn test_auto_create_defines_routine_from_columns() {
    let root = tempfile::tempdir().unwrap();
    let mut db = open(root.path());

    let options = IngestOptions {
        auto_create_routines: true,
        ..IngestOptions::default()
    };
    let rows = [
        measurement("A1", 0.1).with("well", "A01"),
        measurement("A2", 0.2).with("well", "A02"),
    ];
    let report = db.ingest_with("assay2", &rows, &Row::new(), options).unwrap();

    assert_eq!(report.committed, 2);
    assert_eq!(report.created_routines, vec!["assay2".to_string()]);
    let routine = db.find_routine("assay2").unwrap().unwrap();
    assert_eq!(routine.author(), Some("alice"));
    assert_eq!(routine.data_fields().get("od600"), Some(FieldType::Float));
    assert_eq!(routine.data_fields().get("well"), Some(FieldType::String));
    assert!(!routine.data_fields().contains("sample"));
    assert_eq!(count(&db, "assay2"), 2);
}

// ============================================================================
// Batch loading of compounds and users
// ============================================================================

#[test]
fn test_batch_load_compounds_with_update() {
    let root = tempfile::tempdir().unwrap();
    let mut db = open(root.path());
    let file = root.path().join("compounds.csv");
    std::fs::write(
        &file,
        "name,group,smiles\nCompoundX,kinase,CCO\nCompoundY,,CCN\n,orphan,C\n",
    )
    .unwrap();

    let first = db.batch_load(LoadTarget::Compounds, &file, b',', false).unwrap();
    assert_eq!(first.inserted, 2);
    assert_eq!(first.skipped, 1);

    std::fs::write(&file, "name,group\nCompoundX,protease\n").unwrap();
    let skipped = db.batch_load(LoadTarget::Compounds, &file, b',', false).unwrap();
    assert_eq!(skipped.skipped, 1);
    assert_eq!(
        db.find_compound("CompoundX").unwrap().unwrap().group(),
        Some("kinase")
    );

    let updated = db.batch_load(LoadTarget::Compounds, &file, b',', true).unwrap();
    assert_eq!(updated.updated, 1);
    let compound = db.find_compound("CompoundX").unwrap().unwrap();
    assert_eq!(compound.group(), Some("protease"));
    assert_eq!(compound.smiles(), Some("CCO"));
}

#[test]
fn test_batch_load_users_creates_directories() {
    let root = tempfile::tempdir().unwrap();
    let mut db = open(root.path());
    let file = root.path().join("users.tsv");
    std::fs::write(&file, "usr_name\tfirst_name\tlast_name\nbob\tBob\tBuilder\n").unwrap();

    let report = db.batch_load(LoadTarget::Users, &file, b'\t', false).unwrap();
    assert_eq!(report.inserted, 1);

    let bob = db.find_user("bob").unwrap().unwrap();
    assert_eq!(bob.last_name(), Some("Builder"));
    assert_eq!(bob.working_directory(), Some(root.path().join("bob").as_path()));
    assert!(root.path().join("bob").is_dir());
}

#[test]
fn test_batch_load_rejects_workbooks() {
    let root = tempfile::tempdir().unwrap();
    let mut db = open(root.path());
    let file = root.path().join("compounds.xlsx");
    std::fs::write(&file, "not really a workbook").unwrap();

    let err = db
        .batch_load(LoadTarget::Compounds, &file, b',', false)
        .unwrap_err();
    assert!(matches!(err, screening_db::Error::UnsupportedFormat(_)));
}
