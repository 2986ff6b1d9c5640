//! Delimited text import and batch loading of compounds and users

use std::fs::File;
use std::io::{Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;

use arrow::compute::concat_batches;
use arrow::csv::reader::Format;
use arrow::csv::ReaderBuilder;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::rows::{rows_from_batch, Row};
use crate::connection::Database;
use crate::entity::store::{self, COMPOUND_COLUMNS, USER_COLUMNS};
use crate::entity::{CompoundRecord, UserRecord};
use crate::{Error, Result};

/// Extensions accepted for delimited text.
pub const DELIMITED_EXTENSIONS: [&str; 3] = ["txt", "csv", "tsv"];

fn check_extension(path: &Path) -> Result<()> {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    if ext.is_empty() || DELIMITED_EXTENSIONS.contains(&ext.as_str()) {
        Ok(())
    } else {
        Err(Error::UnsupportedFormat(ext))
    }
}

fn read_delimited_impl(path: &Path, delimiter: u8, all_text: bool) -> Result<RecordBatch> {
    check_extension(path)?;
    let mut file = File::open(path)?;
    let format = Format::default()
        .with_header(true)
        .with_delimiter(delimiter);
    let (inferred, _) = format.infer_schema(&mut file, None)?;
    file.seek(SeekFrom::Start(0))?;

    let schema = if all_text {
        Schema::new(
            inferred
                .fields()
                .iter()
                .map(|f| Field::new(f.name(), DataType::Utf8, true))
                .collect::<Vec<_>>(),
        )
    } else {
        inferred
    };
    let schema = Arc::new(schema);

    let reader = ReaderBuilder::new(Arc::clone(&schema))
        .with_header(true)
        .with_delimiter(delimiter)
        .build(file)?;
    let batches = reader.collect::<std::result::Result<Vec<_>, _>>()?;
    let batch = concat_batches(&schema, &batches)?;
    debug!(path = %path.display(), rows = batch.num_rows(), columns = batch.num_columns(), "delimited file read");
    Ok(batch)
}

/// Read a delimited text file with a header row, inferring column types.
///
/// # Errors
///
/// Returns [`Error::UnsupportedFormat`] for extensions other than txt, csv
/// and tsv, or an IO/Arrow error if the file cannot be read
pub fn read_delimited(path: impl AsRef<Path>, delimiter: u8) -> Result<RecordBatch> {
    read_delimited_impl(path.as_ref(), delimiter, false)
}

/// Fixed table targeted by [`Database::batch_load`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadTarget {
    /// `compounds`, keyed by `name`
    Compounds,
    /// `users`, keyed by `usr_name`
    Users,
}

impl LoadTarget {
    /// Column identifying a record.
    #[must_use]
    pub const fn key_column(self) -> &'static str {
        match self {
            Self::Compounds => "name",
            Self::Users => "usr_name",
        }
    }

    const fn columns(self) -> &'static [&'static str] {
        match self {
            Self::Compounds => &COMPOUND_COLUMNS,
            Self::Users => &USER_COLUMNS,
        }
    }
}

/// Outcome of a batch load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// New records
    pub inserted: usize,
    /// Existing records overwritten
    pub updated: usize,
    /// Rows without key, or existing records when not updating
    pub skipped: usize,
}

fn text_of(row: &Row, column: &str) -> Option<Option<String>> {
    row.get_ignore_case(column).map(|v| {
        let text = v.to_string();
        (!v.is_null() && !text.trim().is_empty()).then(|| text.trim().to_string())
    })
}

impl Database {
    /// Load compounds or users from a delimited file with a header row.
    ///
    /// Columns are matched to table columns case-insensitively; unknown
    /// columns are ignored. Existing records (same key) are updated with the
    /// columns present in the file when `update` is set, otherwise skipped.
    /// The load runs in one transaction.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedFormat`] for workbooks or other
    /// extensions, or a database error (nothing is committed then)
    pub fn batch_load(
        &mut self,
        target: LoadTarget,
        path: impl AsRef<Path>,
        delimiter: u8,
        update: bool,
    ) -> Result<LoadReport> {
        let path = path.as_ref();
        let batch = read_delimited_impl(path, delimiter, true)?;
        let rows = rows_from_batch(&batch)?;

        let mut new_users = Vec::new();
        let report = self.transaction(|tx, _, root| {
            let mut report = LoadReport::default();
            for row in &rows {
                let Some(Some(key)) = text_of(row, target.key_column()) else {
                    report.skipped += 1;
                    continue;
                };
                let present = target
                    .columns()
                    .iter()
                    .filter_map(|c| text_of(row, c).map(|v| (*c, v)));

                match target {
                    LoadTarget::Compounds => match store::find_compound(tx, &key)? {
                        Some(mut existing) if update => {
                            for (column, value) in present {
                                existing.set_column(column, value);
                            }
                            store::update_compound(tx, &existing)?;
                            report.updated += 1;
                        }
                        Some(_) => {
                            info!(%key, "compound already exists");
                            report.skipped += 1;
                        }
                        None => {
                            let mut record = CompoundRecord::new(key);
                            for (column, value) in present {
                                record.set_column(column, value);
                            }
                            store::insert_compound(tx, &record)?;
                            report.inserted += 1;
                        }
                    },
                    LoadTarget::Users => match store::find_user(tx, &key)? {
                        Some(mut existing) if update => {
                            for (column, value) in present {
                                existing.set_column(column, value);
                            }
                            store::update_user(tx, &existing)?;
                            report.updated += 1;
                        }
                        Some(_) => {
                            info!(%key, "user already exists");
                            report.skipped += 1;
                        }
                        None => {
                            let mut record = UserRecord::new(key);
                            for (column, value) in present {
                                record.set_column(column, value);
                            }
                            store::insert_user(tx, &record, root)?;
                            new_users.push(record.usr_name().to_string());
                            report.inserted += 1;
                        }
                    },
                }
            }
            Ok(report)
        })?;
        self.create_working_directories(new_users.iter().map(String::as_str))?;

        info!(
            ?target,
            path = %path.display(),
            inserted = report.inserted,
            updated = report.updated,
            skipped = report.skipped,
            "batch load finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn test_read_delimited_infers_types() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plate.tsv");
        std::fs::write(&path, "Sample\tod600\tvalid\nA1\t0.42\ttrue\nA2\t0.5\tfalse\n").unwrap();

        let batch = read_delimited(&path, b'\t').unwrap();
        assert_eq!(batch.num_rows(), 2);
        let schema = batch.schema();
        assert_eq!(schema.field(1).data_type(), &DataType::Float64);
        assert_eq!(schema.field(2).data_type(), &DataType::Boolean);

        let rows = rows_from_batch(&batch).unwrap();
        assert_eq!(rows[0].get("Sample"), Some(&Value::from("A1")));
    }

    #[test]
    fn test_workbooks_rejected() {
        let err = read_delimited("plates.xlsx", b',').unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(ext) if ext == "xlsx"));
    }

    #[test]
    fn test_text_of_blank_is_null() {
        let row = Row::new().with("Name", "  ").with("cas", "50-00-0");
        assert_eq!(text_of(&row, "name"), Some(None));
        assert_eq!(text_of(&row, "CAS"), Some(Some("50-00-0".to_string())));
        assert_eq!(text_of(&row, "smiles"), None);
    }
}
