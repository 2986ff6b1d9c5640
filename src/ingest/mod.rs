//! Result ingestion pipeline
//!
//! ## Flow
//!
//! ```text
//! Dataset (RecordBatch + metadata)
//!    │ rows_from_batch
//!    ▼
//! Row ──> routine / sample / user / date / active / raw_data_id
//!    │        │
//!    │        ├─ resolve_or_create_compound ─┐
//!    │        ├─ resolve_or_create_user ─────┤
//!    │        └─ find_routine ───────────────┴─> results row (res_id)
//!    │
//!    └─ remaining columns ─> <routine alias> row (link = res_id)
//! ```
//!
//! Each dataset runs in one transaction that commits at the end. Each row
//! runs in a savepoint of that transaction, so its metadata row and data row
//! are written together or not at all. Row failures are collected in the
//! [`IngestReport`] and never abort the dataset.

mod date;
mod loader;
mod rows;

pub use date::{parse_date, parse_date_text, serial_to_datetime, DateMode, MAX_SERIAL};
pub use loader::{read_delimited, LoadReport, LoadTarget, DELIMITED_EXTENSIONS};
pub use rows::{batch_from_rows, rows_from_batch, Row};

use std::path::Path;

use arrow::record_batch::RecordBatch;
use chrono::NaiveDateTime;
use rusqlite::{params_from_iter, Connection};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::connection::Database;
use crate::entity::{store, ResultRecord, RoutineRecord};
use crate::error::{IngestRowError, SchemaError};
use crate::routine::{self, CreatedRoutine};
use crate::schema::{self, quote_ident, Catalog, FieldType, FieldTypes};
use crate::value::Value;
use crate::Result;

/// Metadata keys without which a row is rejected.
pub const REQUIRED_METADATA_KEYS: [&str; 2] = ["sample", "user"];

/// Metadata keys with defaults (`routine` falls back to the target routine).
pub const OPTIONAL_METADATA_KEYS: [&str; 4] = ["routine", "date", "active", "raw_data_id"];

/// Every metadata key; these columns are not written to routine tables.
pub const METADATA_KEYS: [&str; 6] = ["sample", "user", "routine", "date", "active", "raw_data_id"];

/// Common metadata of a dataset.
pub type Metadata = Row;

/// Raw data of one dataset plus the metadata shared by all of its rows.
#[derive(Debug, Clone)]
pub struct Dataset {
    /// Tabular data, one result per row
    pub data: RecordBatch,
    /// Values for metadata keys missing from the rows
    pub metadata: Metadata,
}

impl Dataset {
    /// Create a dataset.
    #[must_use]
    pub const fn new(data: RecordBatch, metadata: Metadata) -> Self {
        Self { data, metadata }
    }
}

/// Ingestion settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestOptions {
    /// Define unknown routines, recreate missing tables and add missing
    /// columns from the dataset's column types
    pub auto_create_routines: bool,
    /// Convention for numeric dates
    pub date_mode: DateMode,
}

/// A row that was not ingested.
#[derive(Debug, Clone, PartialEq)]
pub struct RowFailure {
    /// Zero-based row index within the dataset
    pub index: usize,
    /// Why the row was rejected
    pub error: IngestRowError,
}

/// Outcome of ingesting one dataset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestReport {
    /// Target routine alias
    pub routine: String,
    /// Rows seen
    pub total: usize,
    /// Rows written
    pub committed: usize,
    /// Blank rows
    pub skipped: usize,
    /// Rejected rows
    pub failed: Vec<RowFailure>,
    /// Compounds created on the fly
    pub created_compounds: Vec<String>,
    /// Users created on the fly
    pub created_users: Vec<String>,
    /// Routines defined on the fly
    pub created_routines: Vec<String>,
    /// Ids of the new results, in row order
    pub result_ids: Vec<i64>,
}

impl IngestReport {
    fn new(routine: &str) -> Self {
        Self {
            routine: routine.to_string(),
            ..Self::default()
        }
    }

    /// Number of rejected rows.
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    /// Whether every non-blank row was written.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Default)]
struct RowOutcome {
    result_id: i64,
    compound: Option<String>,
    user: Option<String>,
    routine: Option<String>,
}

struct RowContext<'a> {
    default_routine: &'a str,
    common: &'a Metadata,
    inferred: &'a FieldTypes,
    options: IngestOptions,
    workspace_root: &'a Path,
}

impl RowContext<'_> {
    fn lookup<'r>(&'r self, row: &'r Row, key: &str) -> &'r Value {
        row.get_ignore_case(key)
            .filter(|v| !v.is_null() && v.as_text().map_or(true, |t| !t.trim().is_empty()))
            .or_else(|| self.common.get_ignore_case(key))
            .unwrap_or(&Value::Null)
    }

    fn required_text(&self, row: &Row, key: &str) -> std::result::Result<String, IngestRowError> {
        match self.lookup(row, key) {
            Value::Null => Err(IngestRowError::MissingField(key.to_string())),
            value => {
                let text = value.to_string().trim().to_string();
                if text.is_empty() {
                    Err(IngestRowError::MissingField(key.to_string()))
                } else {
                    Ok(text)
                }
            }
        }
    }

    fn routine_alias(&self, row: &Row) -> std::result::Result<String, IngestRowError> {
        match self.lookup(row, "routine") {
            Value::Null => {
                if self.default_routine.is_empty() {
                    Err(IngestRowError::MissingField("routine".to_string()))
                } else {
                    Ok(self.default_routine.to_string())
                }
            }
            _ => self.required_text(row, "routine"),
        }
    }

    fn date(&self, row: &Row) -> std::result::Result<Option<NaiveDateTime>, IngestRowError> {
        parse_date(self.lookup(row, "date"), self.options.date_mode)
    }

    fn active(&self, row: &Row) -> std::result::Result<bool, IngestRowError> {
        let invalid = |reason: String| IngestRowError::InvalidValue {
            field: "active".to_string(),
            reason,
        };
        match self.lookup(row, "active") {
            Value::Null => Ok(true),
            Value::Bool(b) => Ok(*b),
            Value::Int(i) => Ok(*i != 0),
            Value::Text(text) => match text.trim().to_ascii_lowercase().as_str() {
                "" | "true" | "yes" | "y" | "1" => Ok(true),
                "false" | "no" | "n" | "0" => Ok(false),
                other => Err(invalid(format!("'{other}' is not a boolean"))),
            },
            other => Err(invalid(format!("'{other}' is not a boolean"))),
        }
    }

    fn raw_data_id(&self, row: &Row) -> std::result::Result<Option<i64>, IngestRowError> {
        let invalid = |shown: String| IngestRowError::InvalidValue {
            field: "raw_data_id".to_string(),
            reason: format!("'{shown}' is not an integer"),
        };
        match self.lookup(row, "raw_data_id") {
            Value::Null => Ok(None),
            Value::Int(i) => Ok(Some(*i)),
            #[allow(clippy::cast_possible_truncation)]
            Value::Float(x) if x.fract() == 0.0 && x.is_finite() => Ok(Some(*x as i64)),
            Value::Text(text) if text.trim().is_empty() => Ok(None),
            Value::Text(text) => text
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| invalid(text.clone())),
            other => Err(invalid(other.to_string())),
        }
    }

    fn is_metadata_column(column: &str) -> bool {
        METADATA_KEYS.iter().any(|k| k.eq_ignore_ascii_case(column))
    }
}

/// Find the routine, defining it from the inferred columns if allowed.
fn resolve_routine(
    conn: &Connection,
    catalog: &mut Catalog,
    ctx: &RowContext<'_>,
    alias: &str,
    author: &str,
    outcome: &mut RowOutcome,
) -> std::result::Result<RoutineRecord, IngestRowError> {
    if let Some(routine) = store::find_routine(conn, alias)? {
        return Ok(routine);
    }
    if !ctx.options.auto_create_routines {
        return Err(IngestRowError::UnknownRoutine(alias.to_string()));
    }
    let record = RoutineRecord::builder(alias, ctx.inferred.clone())
        .author(author)
        .full_name(alias)
        .data_dimension(1)
        .build();
    let CreatedRoutine { id, author_created } =
        routine::create_routine(conn, catalog, ctx.workspace_root, &record)?;
    warn!(%alias, "unknown routine defined from dataset columns");
    outcome.routine = Some(alias.to_string());
    if author_created {
        outcome.user = Some(author.to_string());
    }
    Ok(record.with_id(id))
}

/// Make sure the routine table can take `columns`, repairing it if allowed.
fn prepare_table(
    conn: &Connection,
    catalog: &mut Catalog,
    ctx: &RowContext<'_>,
    routine: &RoutineRecord,
    columns: &[&str],
) -> std::result::Result<(), IngestRowError> {
    let alias = routine.alias();
    if !catalog.contains(alias) {
        if !ctx.options.auto_create_routines {
            return Err(SchemaError::MissingTable(alias.to_string()).into());
        }
        warn!(%alias, "routine table missing, recreating it");
        schema::create_dynamic_table(conn, catalog, alias, routine.data_fields())?;
    }

    let missing: FieldTypes = {
        let table = catalog.require_table(alias)?;
        columns
            .iter()
            .filter(|c| !table.has_column(c))
            .map(|c| {
                let field_type = ctx.inferred.get(c).unwrap_or(FieldType::String);
                ((*c).to_string(), field_type)
            })
            .collect()
    };
    if missing.is_empty() {
        return Ok(());
    }
    if !ctx.options.auto_create_routines {
        let column = missing.names().next().unwrap_or_default().to_string();
        return Err(SchemaError::MissingColumn {
            table: alias.to_string(),
            column,
        }
        .into());
    }
    warn!(%alias, columns = ?missing.names().collect::<Vec<_>>(), "adding missing columns");
    routine::extend_routine(conn, catalog, alias, &missing)?;
    Ok(())
}

fn ingest_row(
    conn: &Connection,
    catalog: &mut Catalog,
    ctx: &RowContext<'_>,
    row: &Row,
) -> std::result::Result<RowOutcome, IngestRowError> {
    let mut outcome = RowOutcome::default();

    let alias = ctx.routine_alias(row)?;
    let sample = ctx.required_text(row, "sample")?;
    let user = ctx.required_text(row, "user")?;
    let date = ctx.date(row)?;
    let active = ctx.active(row)?;
    let raw_data_id = ctx.raw_data_id(row)?;

    let routine = resolve_routine(conn, catalog, ctx, &alias, &user, &mut outcome)?;
    let routine_id = routine
        .id()
        .ok_or_else(|| IngestRowError::UnknownRoutine(alias.clone()))?;

    let compound = store::resolve_or_create_compound(conn, &sample)?;
    if compound.created {
        outcome.compound = Some(sample);
    }
    let usr = store::resolve_or_create_user(conn, ctx.workspace_root, &user)?;
    if usr.created {
        outcome.user = Some(user);
    }

    let result = ResultRecord::new(compound.id, usr.id, routine_id)
        .date(date)
        .active(active)
        .raw_data_id(raw_data_id);
    outcome.result_id = store::insert_result(conn, &result)?;

    let data: Vec<(&str, &Value)> = row
        .iter()
        .filter(|(column, _)| {
            routine.data_fields().find_ignore_case(column).is_some()
                || !RowContext::is_metadata_column(column)
        })
        .collect();
    let columns: Vec<&str> = data.iter().map(|(c, _)| *c).collect();
    for (i, column) in columns.iter().enumerate() {
        if columns[..i].iter().any(|c| c.eq_ignore_ascii_case(column)) {
            return Err(IngestRowError::InvalidValue {
                field: (*column).to_string(),
                reason: "column appears twice, ignoring case".to_string(),
            });
        }
    }
    prepare_table(conn, catalog, ctx, &routine, &columns)?;

    // Write under the stored column names, whatever case the row used.
    let table = catalog.require_table(routine.alias())?;
    let mut names = vec![quote_ident("link")];
    names.extend(
        columns
            .iter()
            .map(|c| quote_ident(table.column(c).map_or(*c, |info| info.name.as_str()))),
    );
    let placeholders = (1..=names.len())
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({placeholders})",
        quote_ident(routine.alias()),
        names.join(", ")
    );
    let link = Value::Int(outcome.result_id);
    conn.execute(
        &sql,
        params_from_iter(std::iter::once(&link).chain(data.iter().map(|(_, v)| *v))),
    )?;
    debug!(alias = routine.alias(), result_id = outcome.result_id, "row ingested");
    Ok(outcome)
}

impl Database {
    /// Ingest rows into a routine with default options.
    ///
    /// # Errors
    ///
    /// Returns error only for connection-level failures; row failures are
    /// reported in the [`IngestReport`]
    pub fn ingest(&mut self, routine: &str, rows: &[Row], common: &Metadata) -> Result<IngestReport> {
        self.ingest_with(routine, rows, common, IngestOptions::default())
    }

    /// Ingest rows into a routine.
    ///
    /// `routine` is the default target; a row's own `routine` value (or one
    /// in `common`) overrides it.
    ///
    /// # Errors
    ///
    /// Returns error only for connection-level failures; row failures are
    /// reported in the [`IngestReport`]
    pub fn ingest_with(
        &mut self,
        routine: &str,
        rows: &[Row],
        common: &Metadata,
        options: IngestOptions,
    ) -> Result<IngestReport> {
        let inferred = if options.auto_create_routines {
            FieldTypes::infer_from_schema(&batch_from_rows(rows)?.schema(), &METADATA_KEYS)
        } else {
            FieldTypes::new()
        };
        self.ingest_rows(routine, rows, common, &inferred, options)
    }

    /// Ingest one dataset.
    ///
    /// # Errors
    ///
    /// Returns error only for connection-level failures or unreadable data
    pub fn ingest_dataset(
        &mut self,
        routine: &str,
        dataset: &Dataset,
        options: IngestOptions,
    ) -> Result<IngestReport> {
        let rows = rows_from_batch(&dataset.data)?;
        let inferred = FieldTypes::infer_from_schema(&dataset.data.schema(), &METADATA_KEYS);
        self.ingest_rows(routine, &rows, &dataset.metadata, &inferred, options)
    }

    /// Ingest several datasets, committing after each one.
    ///
    /// # Errors
    ///
    /// A connection-level failure stops the remaining datasets and is
    /// returned; datasets committed before it stay committed
    pub fn ingest_datasets(
        &mut self,
        routine: &str,
        datasets: &[Dataset],
        options: IngestOptions,
    ) -> Result<Vec<IngestReport>> {
        datasets
            .iter()
            .map(|dataset| self.ingest_dataset(routine, dataset, options))
            .collect()
    }

    fn ingest_rows(
        &mut self,
        routine: &str,
        rows: &[Row],
        common: &Metadata,
        inferred: &FieldTypes,
        options: IngestOptions,
    ) -> Result<IngestReport> {
        let report = self.transaction(|tx, catalog, root| {
            let ctx = RowContext {
                default_routine: routine,
                common,
                inferred,
                options,
                workspace_root: root,
            };
            let mut report = IngestReport::new(routine);
            for (index, row) in rows.iter().enumerate() {
                report.total += 1;
                if row.is_all_null() {
                    report.skipped += 1;
                    continue;
                }

                let savepoint = tx.savepoint()?;
                match ingest_row(&savepoint, catalog, &ctx, row) {
                    Ok(outcome) => {
                        savepoint.commit()?;
                        report.committed += 1;
                        report.result_ids.push(outcome.result_id);
                        report.created_compounds.extend(outcome.compound);
                        report.created_users.extend(outcome.user);
                        report.created_routines.extend(outcome.routine);
                    }
                    Err(error) => {
                        drop(savepoint);
                        if options.auto_create_routines {
                            catalog.reflect(tx)?;
                        }
                        warn!(index, %error, "row dropped");
                        report.failed.push(RowFailure { index, error });
                    }
                }
            }
            Ok(report)
        })?;

        self.create_working_directories(report.created_users.iter().map(String::as_str))?;
        if !report.created_routines.is_empty() {
            let conn = self.connection()?;
            for alias in &report.created_routines {
                if let Some(record) = store::find_routine(conn, alias)? {
                    routine::write_template_logged(conn, self.workspace_root(), &record, None);
                }
            }
        }

        info!(
            routine,
            total = report.total,
            committed = report.committed,
            skipped = report.skipped,
            failed = report.failed_count(),
            "dataset ingested"
        );
        Ok(report)
    }
}
