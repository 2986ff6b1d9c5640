//! Tests for filter queries over ingested results

use std::path::Path;

use arrow::array::{Array, Float64Array, Int64Array};
use screening_db::entity::{CompoundRecord, RoutineRecord};
use screening_db::ingest::Row;
use screening_db::query::{Comparator, Connective, Field, Filter, FilterRow};
use screening_db::schema::{FieldType, FieldTypes};
use screening_db::{Database, Error};

fn measurement(sample: &str, user: &str, od600: f64) -> Row {
    Row::new()
        .with("od600", od600)
        .with("sample", sample)
        .with("user", user)
        .with("date", "2020-01-05")
}

/// Two routines: `assay1` by alice, `assay2` by bob.
fn populated(root: &Path) -> Database {
    let mut db = Database::in_memory().unwrap().with_workspace_root(root);
    db.initialize_schema().unwrap();

    db.register_compound(&CompoundRecord::builder("CompoundX").group("kinase").build())
        .unwrap();
    db.register_compound(&CompoundRecord::builder("CompoundY").group("protease").build())
        .unwrap();

    for (alias, author) in [("assay1", "alice"), ("assay2", "bob")] {
        let fields = FieldTypes::new().with("od600", FieldType::Float);
        let record = RoutineRecord::builder(alias, fields).author(author).build();
        db.define_routine(&record, None).unwrap();
    }

    let assay1 = [
        measurement("CompoundX", "alice", 0.42),
        measurement("CompoundY", "alice", 0.13),
        measurement("CompoundX", "carol", 0.40),
    ];
    db.ingest("assay1", &assay1, &Row::new()).unwrap();
    let assay2 = [measurement("CompoundX", "bob", 1.5)];
    db.ingest("assay2", &assay2, &Row::new()).unwrap();
    db
}

fn od600(db: &Database, filter: &str, alias: &str) -> Vec<f64> {
    let result = db.query_text(filter).unwrap();
    let data = &result.get(alias).unwrap().data;
    let column = data
        .column_by_name("od600")
        .unwrap()
        .as_any()
        .downcast_ref::<Float64Array>()
        .unwrap();
    column.iter().map(Option::unwrap).collect()
}

// ============================================================================
// Selection
// ============================================================================

#[test]
fn test_filter_by_compound_name() {
    let root = tempfile::tempdir().unwrap();
    let db = populated(root.path());

    let result = db.query_text(r#"Cpd.name == "CompoundX""#).unwrap();
    assert_eq!(result.aliases().collect::<Vec<_>>(), vec!["assay1", "assay2"]);
    assert_eq!(result.total_rows(), 3);
    assert_eq!(od600(&db, r#"Cpd.name == "CompoundX""#, "assay1"), vec![0.42, 0.40]);
}

#[test]
fn test_rows_are_linked_to_results() {
    let root = tempfile::tempdir().unwrap();
    let db = populated(root.path());

    let result = db.query_text("Cpd.name = 'CompoundY'").unwrap();
    let data = &result.get("assay1").unwrap().data;
    assert_eq!(data.num_rows(), 1);

    let link = data
        .column_by_name("link")
        .unwrap()
        .as_any()
        .downcast_ref::<Int64Array>()
        .unwrap();
    let results = db.results_for_routine("assay1").unwrap();
    let compound = db.find_compound("CompoundY").unwrap().unwrap();
    let expected = results
        .iter()
        .find(|r| Some(r.sample_id()) == compound.id())
        .unwrap();
    assert_eq!(Some(link.value(0)), expected.id());
}

#[test]
fn test_filter_combines_entities() {
    let root = tempfile::tempdir().unwrap();
    let db = populated(root.path());

    let text = "Cpd.group = 'kinase' AND Usr.usr_name IN ('alice', 'bob')";
    let result = db.query_text(text).unwrap();
    assert_eq!(result.total_rows(), 2);
    assert_eq!(od600(&db, text, "assay1"), vec![0.42]);
    assert_eq!(od600(&db, text, "assay2"), vec![1.5]);
}

#[test]
fn test_filter_by_routine_alias() {
    let root = tempfile::tempdir().unwrap();
    let db = populated(root.path());

    let result = db.query_text("Rtn.alias = 'assay2'").unwrap();
    assert_eq!(result.len(), 1);
    assert!(result.get("assay1").is_none());
}

#[test]
fn test_like_and_or() {
    let root = tempfile::tempdir().unwrap();
    let db = populated(root.path());

    let result = db
        .query_text("Cpd.name LIKE '%Y' OR Usr.usr_name = 'carol'")
        .unwrap();
    assert_eq!(result.total_rows(), 2);
    assert_eq!(od600(&db, "Cpd.name LIKE '%Y' OR Usr.usr_name = 'carol'", "assay1"), vec![0.13, 0.40]);
}

#[test]
fn test_typed_filter_matches_text_filter() {
    let root = tempfile::tempdir().unwrap();
    let db = populated(root.path());

    let filter = Filter::eq(Field::CompoundName, "CompoundX")
        .unwrap()
        .and(Filter::ne(Field::UserName, "carol").unwrap());
    let typed = db.query(&filter).unwrap();
    let text = db.query_text(&filter.to_string()).unwrap();
    assert_eq!(typed.total_rows(), 2);
    assert_eq!(typed.total_rows(), text.total_rows());
}

#[test]
fn test_filter_rows_build_a_query() {
    let root = tempfile::tempdir().unwrap();
    let db = populated(root.path());

    let rows = [
        FilterRow::new(Field::CompoundName, Comparator::In, "CompoundX, CompoundY"),
        FilterRow::new(Field::UserName, Comparator::Eq, "alice"),
    ];
    let filter = Filter::from_rows(&rows).unwrap();
    assert_eq!(db.query(&filter).unwrap().total_rows(), 2);

    let rows = [
        FilterRow::new(Field::UserName, Comparator::Eq, "alice"),
        FilterRow::new(Field::UserName, Comparator::Eq, "bob").connective(Connective::Or),
    ];
    let filter = Filter::from_rows(&rows).unwrap();
    assert_eq!(db.query(&filter).unwrap().total_rows(), 3);
}

#[test]
fn test_working_directory_is_authors() {
    let root = tempfile::tempdir().unwrap();
    let db = populated(root.path());

    let result = db.query_text(r#"Cpd.name == "CompoundX""#).unwrap();
    assert_eq!(
        result.get("assay1").unwrap().working_directory.as_deref(),
        Some(root.path().join("alice").as_path())
    );
    assert_eq!(
        result.get("assay2").unwrap().working_directory.as_deref(),
        Some(root.path().join("bob").as_path())
    );
}

#[test]
fn test_result_columns() {
    let root = tempfile::tempdir().unwrap();
    let db = populated(root.path());

    let result = db.query_text("Usr.usr_name = 'bob'").unwrap();
    let data = &result.get("assay2").unwrap().data;
    let names: Vec<_> = data
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();
    assert_eq!(names, vec!["id", "link", "od600"]);
    assert_eq!(data.column(2).null_count(), 0);
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn test_no_match_is_empty_result() {
    let root = tempfile::tempdir().unwrap();
    let db = populated(root.path());

    let err = db.query_text("Cpd.name = 'CompoundZ'").unwrap_err();
    assert!(matches!(err, Error::EmptyResult));
    assert!(format!("{err}").contains("does not match any records"));
}

#[test]
fn test_empty_database_is_empty_result() {
    let root = tempfile::tempdir().unwrap();
    let mut db = Database::in_memory().unwrap().with_workspace_root(root.path());
    db.initialize_schema().unwrap();

    assert!(matches!(
        db.query_text("Cpd.name = 'CompoundX'"),
        Err(Error::EmptyResult)
    ));
}

#[test]
fn test_invalid_filters() {
    let root = tempfile::tempdir().unwrap();
    let db = populated(root.path());

    for text in [
        "Cpd.name ==",
        "Cpd.mass = 3",
        "name = 'CompoundX'",
        "Cpd.name > 'A'",
        "Cpd.name IN ()",
    ] {
        let result = db.query_text(text);
        assert!(matches!(result, Err(Error::Filter(_))), "should reject: {text}");
    }
}

#[test]
fn test_query_requires_connection() {
    let mut db = Database::in_memory().unwrap();
    db.close();
    assert!(matches!(
        db.query_text("Cpd.name = 'CompoundX'"),
        Err(Error::Connection(_))
    ));
}
