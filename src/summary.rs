//! Rendering and export of query results

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use arrow::record_batch::RecordBatch;
use arrow::util::pretty::pretty_format_batches;
use chrono::{Local, NaiveDate};
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;
use tracing::info;

use crate::Result;

/// Render a batch as a plain-text table.
///
/// # Errors
///
/// Returns error if a column cannot be formatted
pub fn render_table(batch: &RecordBatch) -> Result<String> {
    Ok(pretty_format_batches(std::slice::from_ref(batch))?.to_string())
}

/// `summary_<alias>_<dd_mm_YYYY>.txt`
#[must_use]
pub fn summary_file_name(alias: &str, date: NaiveDate) -> String {
    format!("summary_{alias}_{}.txt", date.format("%d_%m_%Y"))
}

/// Write a summary to `dir`, named after the routine and today's date.
///
/// An existing summary from the same day is overwritten.
///
/// # Errors
///
/// Returns error if the directory cannot be created or the file written
pub fn save_summary(dir: impl AsRef<Path>, alias: &str, text: &str) -> Result<PathBuf> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;
    let path = dir.join(summary_file_name(alias, Local::now().date_naive()));
    fs::write(&path, text)?;
    info!(%alias, path = %path.display(), "summary saved");
    Ok(path)
}

/// Export a batch to a Parquet file.
///
/// # Errors
///
/// Returns error if the file cannot be created or encoding fails
pub fn write_parquet(batch: &RecordBatch, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path)?;
    let props = WriterProperties::builder().build();
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))?;
    writer.write(batch)?;
    writer.close()?;
    info!(path = %path.display(), rows = batch.num_rows(), "parquet written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use arrow::array::{Float64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

    fn batch() -> RecordBatch {
        let schema = Schema::new(vec![
            Field::new("sample", DataType::Utf8, true),
            Field::new("od600", DataType::Float64, true),
        ]);
        RecordBatch::try_new(
            Arc::new(schema),
            vec![
                Arc::new(StringArray::from(vec!["A1", "A2"])),
                Arc::new(Float64Array::from(vec![0.42, 0.5])),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_render_table() {
        let text = render_table(&batch()).unwrap();
        assert!(text.contains("| sample | od600 |"));
        assert!(text.contains("| A1     | 0.42  |"));
    }

    #[test]
    fn test_summary_file_name() {
        let date = NaiveDate::from_ymd_opt(2020, 1, 5).unwrap();
        assert_eq!(summary_file_name("assay1", date), "summary_assay1_05_01_2020.txt");
    }

    #[test]
    fn test_save_summary_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("alice");
        let path = save_summary(&target, "assay1", "hello").unwrap();
        assert!(path.starts_with(&target));
        assert_eq!(fs::read_to_string(path).unwrap(), "hello");
    }

    #[test]
    fn test_write_parquet_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("assay1.parquet");
        write_parquet(&batch(), &path).unwrap();

        let reader = ParquetRecordBatchReaderBuilder::try_new(File::open(&path).unwrap())
            .unwrap()
            .build()
            .unwrap();
        let rows: usize = reader.map(|b| b.unwrap().num_rows()).sum();
        assert_eq!(rows, 2);
    }
}
