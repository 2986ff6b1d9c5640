//! Filter execution
//!
//! A query runs in two steps. The filter is evaluated once over the join of
//! results, routines, compounds and users to find the routines with matches.
//! Each routine then gets its own query against its dynamic table, because
//! the column sets differ from routine to routine. Columns are typed from the
//! reflected catalog, so every [`RoutineResult`] carries a batch whose schema
//! matches the routine's declared fields.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use arrow::array::{
    ArrayRef, BooleanArray, DurationMicrosecondArray, Float64Array, Int64Array, StringArray,
    TimestampMicrosecondArray,
};
use arrow::datatypes::{Field as ArrowField, Schema};
use arrow::record_batch::RecordBatch;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use tracing::{debug, info};

use super::{Comparator, Field, Filter, Operand};
use crate::connection::Database;
use crate::error::FilterError;
use crate::schema::{quote_ident, Catalog, FieldType, TableInfo};
use crate::value::{parse_stored_datetime, Value};
use crate::{Error, Result};

const MATCH_JOIN: &str = r#""results" AS q_res
    JOIN "routines" AS q_rtn ON q_res."routine" = q_rtn."rtn_id"
    LEFT JOIN "compounds" AS q_cpd ON q_res."sample" = q_cpd."cpd_id"
    LEFT JOIN "users" AS q_usr ON q_res."user" = q_usr."usr_id""#;

/// A filter lowered to a SQL predicate over the match join.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFilter {
    /// Predicate with `?` placeholders
    pub sql: String,
    /// Placeholder values, in order
    pub params: Vec<Value>,
}

fn column_ref(field: Field) -> String {
    let table = match field.qualifier() {
        "Cpd" => "q_cpd",
        "Usr" => "q_usr",
        _ => "q_rtn",
    };
    format!("{table}.{}", quote_ident(field.column()))
}

fn compile_into(filter: &Filter, params: &mut Vec<Value>) -> std::result::Result<String, FilterError> {
    let (operands, keyword) = match filter {
        Filter::Condition(condition) => {
            let column = column_ref(condition.field());
            let sql = match condition.operand() {
                Operand::Single(value) => {
                    params.push(value.clone());
                    match condition.comparator() {
                        Comparator::Like => format!("{column} LIKE ?"),
                        other => format!("{column} {} ?", other.symbol()),
                    }
                }
                Operand::List(values) => {
                    params.extend(values.iter().cloned());
                    let placeholders = vec!["?"; values.len()].join(", ");
                    format!("{column} {} ({placeholders})", condition.comparator().symbol())
                }
            };
            return Ok(sql);
        }
        Filter::And(operands) => (operands, " AND "),
        Filter::Or(operands) => (operands, " OR "),
    };
    if operands.is_empty() {
        return Err(FilterError::Empty);
    }
    let parts = operands
        .iter()
        .map(|operand| compile_into(operand, params))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(format!("({})", parts.join(keyword)))
}

/// Lower a filter to a parameterized predicate.
///
/// # Errors
///
/// Returns [`FilterError::Empty`] if an `And`/`Or` node has no operands
pub fn compile(filter: &Filter) -> std::result::Result<CompiledFilter, FilterError> {
    let mut params = Vec::new();
    let sql = compile_into(filter, &mut params)?;
    Ok(CompiledFilter { sql, params })
}

/// Matches of one routine.
#[derive(Debug, Clone)]
pub struct RoutineResult {
    /// Routine alias
    pub alias: String,
    /// `id`, `link` and the routine's fields, one row per matching result
    pub data: RecordBatch,
    /// Working directory of the routine's author, where its scripts live
    pub working_directory: Option<PathBuf>,
}

/// Matches grouped by routine alias.
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    routines: BTreeMap<String, RoutineResult>,
}

impl QueryResult {
    /// Result for one routine.
    #[must_use]
    pub fn get(&self, alias: &str) -> Option<&RoutineResult> {
        self.routines.get(alias)
    }

    /// Aliases with matches, in alphabetical order.
    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.routines.keys().map(String::as_str)
    }

    /// Per-routine results, in alias order.
    pub fn iter(&self) -> impl Iterator<Item = &RoutineResult> {
        self.routines.values()
    }

    /// Number of routines with matches.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routines.len()
    }

    /// Whether no routine matched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routines.is_empty()
    }

    /// Matching rows over all routines.
    #[must_use]
    pub fn total_rows(&self) -> usize {
        self.routines.values().map(|r| r.data.num_rows()).sum()
    }
}

impl IntoIterator for QueryResult {
    type Item = (String, RoutineResult);
    type IntoIter = std::collections::btree_map::IntoIter<String, RoutineResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.routines.into_iter()
    }
}

fn matching_routines(conn: &Connection, compiled: &CompiledFilter) -> Result<Vec<String>> {
    let sql = format!(
        r#"SELECT DISTINCT q_rtn."alias" FROM {MATCH_JOIN} WHERE {} ORDER BY q_rtn."alias""#,
        compiled.sql
    );
    debug!(%sql, "matching routines");
    let mut stmt = conn.prepare(&sql)?;
    let aliases = stmt
        .query_map(params_from_iter(compiled.params.iter()), |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(aliases)
}

fn author_directory(conn: &Connection, alias: &str) -> Result<Option<PathBuf>> {
    let directory: Option<Option<String>> = conn
        .query_row(
            r#"SELECT q_usr."working_directory"
               FROM "routines" AS q_rtn
               LEFT JOIN "users" AS q_usr ON q_rtn."author" = q_usr."usr_name"
               WHERE q_rtn."alias" = ?1"#,
            [alias],
            |row| row.get(0),
        )
        .optional()?;
    Ok(directory.flatten().map(PathBuf::from))
}

fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Int(i) => Some(*i != 0),
        Value::Text(t) => match t.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Whole floats within `i64` range; anything else is null.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn float_to_int(x: f64) -> Option<i64> {
    // i64::MAX as f64 rounds up to 2^63, which is out of range.
    (x.fract() == 0.0 && x >= i64::MIN as f64 && x < i64::MAX as f64).then(|| x as i64)
}

#[allow(clippy::cast_precision_loss)]
fn typed_column(field_type: FieldType, values: &[Value]) -> ArrayRef {
    match field_type {
        FieldType::Bool => Arc::new(values.iter().map(as_bool).collect::<BooleanArray>()),
        FieldType::Int => Arc::new(
            values
                .iter()
                .map(|v| match v {
                    Value::Int(i) => Some(*i),
                    Value::Bool(b) => Some(i64::from(*b)),
                    Value::Float(x) => float_to_int(*x),
                    Value::Text(t) => t.trim().parse().ok(),
                    _ => None,
                })
                .collect::<Int64Array>(),
        ),
        FieldType::Float => Arc::new(
            values
                .iter()
                .map(|v| match v {
                    Value::Float(x) => Some(*x),
                    Value::Int(i) => Some(*i as f64),
                    Value::Text(t) => t.trim().parse().ok(),
                    _ => None,
                })
                .collect::<Float64Array>(),
        ),
        FieldType::String => Arc::new(
            values
                .iter()
                .map(|v| (!v.is_null()).then(|| v.to_string()))
                .collect::<StringArray>(),
        ),
        FieldType::DateTime => Arc::new(TimestampMicrosecondArray::from(
            values
                .iter()
                .map(|v| match v {
                    Value::DateTime(dt) => Some(dt.and_utc().timestamp_micros()),
                    Value::Text(t) => parse_stored_datetime(t).map(|dt| dt.and_utc().timestamp_micros()),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )),
        FieldType::Duration => Arc::new(DurationMicrosecondArray::from(
            values
                .iter()
                .map(|v| match v {
                    Value::Int(i) => Some(*i),
                    Value::Duration(d) => d.num_microseconds(),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )),
    }
}

fn routine_batch(
    conn: &Connection,
    table: &TableInfo,
    compiled: &CompiledFilter,
) -> Result<RecordBatch> {
    let columns = table
        .columns
        .iter()
        .map(|c| format!("q_data.{}", quote_ident(&c.name)))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        r#"SELECT {columns}
           FROM {MATCH_JOIN}
           JOIN {} AS q_data ON q_data."link" = q_res."res_id"
           WHERE {} AND q_rtn."alias" = ?
           ORDER BY q_res."res_id", q_data."id""#,
        quote_ident(&table.name),
        compiled.sql
    );
    debug!(routine = %table.name, %sql, "loading routine rows");

    let mut params = compiled.params.clone();
    params.push(Value::from(table.name.as_str()));

    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params_from_iter(params.iter()))?;
    let mut values: Vec<Vec<Value>> = vec![Vec::new(); table.columns.len()];
    while let Some(row) = rows.next()? {
        for (i, column) in values.iter_mut().enumerate() {
            column.push(Value::from_sql_ref(row.get_ref(i)?));
        }
    }

    let fields = table
        .columns
        .iter()
        .map(|c| ArrowField::new(&c.name, c.field_type().arrow_type(), !c.primary_key))
        .collect::<Vec<_>>();
    let arrays = table
        .columns
        .iter()
        .zip(&values)
        .map(|(c, v)| typed_column(c.field_type(), v))
        .collect::<Vec<_>>();
    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)?)
}

/// Run a filter against an open connection.
///
/// # Errors
///
/// Returns [`Error::Filter`] for an empty connective, [`Error::EmptyResult`]
/// if nothing matches, or a schema error if a matched routine has no table
pub(crate) fn execute(conn: &Connection, catalog: &Catalog, filter: &Filter) -> Result<QueryResult> {
    let compiled = compile(filter)?;
    let mut result = QueryResult::default();
    for alias in matching_routines(conn, &compiled)? {
        let table = catalog.require_table(&alias)?;
        let data = routine_batch(conn, table, &compiled)?;
        if data.num_rows() == 0 {
            debug!(%alias, "matched results have no data rows");
            continue;
        }
        let working_directory = author_directory(conn, &alias)?;
        result.routines.insert(
            alias.clone(),
            RoutineResult {
                alias,
                data,
                working_directory,
            },
        );
    }
    if result.is_empty() {
        return Err(Error::EmptyResult);
    }
    info!(%filter, routines = result.len(), rows = result.total_rows(), "query finished");
    Ok(result)
}

impl Database {
    /// Select results by filter, grouped by routine.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyResult`] if no result matches, or a connection
    /// or database error
    ///
    /// # Example
    /// ```
    /// use screening_db::connection::Database;
    /// use screening_db::ingest::Row;
    /// use screening_db::query::{Field, Filter};
    /// use screening_db::schema::{FieldType, FieldTypes};
    /// use screening_db::entity::RoutineRecord;
    ///
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let root = tempfile::tempdir()?;
    /// let mut db = Database::in_memory()?.with_workspace_root(root.path());
    /// db.initialize_schema()?;
    /// let fields = FieldTypes::new().with("od600", FieldType::Float);
    /// db.define_routine(&RoutineRecord::builder("assay1", fields).author("alice").build(), None)?;
    ///
    /// let row = Row::new().with("od600", 0.42).with("sample", "CompoundX").with("user", "alice");
    /// db.ingest("assay1", &[row], &Row::new())?;
    ///
    /// let result = db.query(&Filter::eq(Field::CompoundName, "CompoundX")?)?;
    /// assert_eq!(result.get("assay1").map(|r| r.data.num_rows()), Some(1));
    /// # Ok(())
    /// # }
    /// ```
    pub fn query(&self, filter: &Filter) -> Result<QueryResult> {
        execute(self.connection()?, self.catalog(), filter)
    }

    /// Parse a text filter and run it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Filter`] if the text does not parse, otherwise as
    /// [`Database::query`]
    pub fn query_text(&self, filter: &str) -> Result<QueryResult> {
        let filter = Filter::parse(filter)?;
        self.query(&filter)
    }
}
