//! Row view of Arrow record batches
//!
//! Ingestion works row by row, while raw data arrives (and query results
//! leave) as columnar [`RecordBatch`]es. Conversion goes through
//! [`arrow::compute::cast`] to a handful of canonical types; anything else is
//! carried as its display string.

use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, AsArray, BooleanArray, DurationMicrosecondArray, Float64Array, Int64Array,
    StringArray, TimestampMicrosecondArray,
};
use arrow::compute::cast;
use arrow::datatypes::{
    DataType, DurationMicrosecondType, Field, Float64Type, Int64Type, Schema, TimeUnit,
    TimestampMicrosecondType,
};
use arrow::record_batch::RecordBatch;
use arrow::util::display::{ArrayFormatter, FormatOptions};
use chrono::TimeDelta;

use crate::value::Value;
use crate::Result;

/// One row: ordered column name → value pairs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    cells: Vec<(String, Value)>,
}

impl Row {
    /// Create an empty row.
    #[must_use]
    pub const fn new() -> Self {
        Self { cells: Vec::new() }
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert or replace a cell.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        match self.cells.iter_mut().find(|(k, _)| *k == key) {
            Some(cell) => cell.1 = value,
            None => self.cells.push((key, value)),
        }
    }

    /// Value of a column, by exact name.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.cells.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Value of a column, preferring an exact match over a case-insensitive one.
    #[must_use]
    pub fn get_ignore_case(&self, key: &str) -> Option<&Value> {
        self.get(key).or_else(|| {
            self.cells
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(key))
                .map(|(_, v)| v)
        })
    }

    /// Number of cells.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Whether the row has no cells.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Whether every cell is null (or the row is empty).
    #[must_use]
    pub fn is_all_null(&self) -> bool {
        self.cells.iter().all(|(_, v)| v.is_null())
    }

    /// Iterate cells in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.cells.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Column names in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(k, _)| k.as_str())
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut row = Self::new();
        for (k, v) in iter {
            row.insert(k, v);
        }
        row
    }
}

fn column_values(array: &ArrayRef) -> Result<Vec<Value>> {
    let len = array.len();
    let values = match array.data_type() {
        DataType::Boolean => {
            let bools = array.as_boolean();
            (0..len)
                .map(|i| if bools.is_null(i) { Value::Null } else { Value::Bool(bools.value(i)) })
                .collect()
        }
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32 => {
            let casted = cast(array, &DataType::Int64)?;
            let ints = casted.as_primitive::<Int64Type>();
            (0..len)
                .map(|i| if ints.is_null(i) { Value::Null } else { Value::Int(ints.value(i)) })
                .collect()
        }
        DataType::Float16
        | DataType::Float32
        | DataType::Float64
        | DataType::Decimal128(_, _)
        | DataType::Decimal256(_, _) => {
            let casted = cast(array, &DataType::Float64)?;
            let floats = casted.as_primitive::<Float64Type>();
            (0..len)
                .map(|i| if floats.is_null(i) { Value::Null } else { Value::Float(floats.value(i)) })
                .collect()
        }
        DataType::Date32 | DataType::Date64 | DataType::Timestamp(_, _) => {
            let casted = cast(array, &DataType::Timestamp(TimeUnit::Microsecond, None))?;
            let stamps = casted.as_primitive::<TimestampMicrosecondType>();
            (0..len)
                .map(|i| {
                    if stamps.is_null(i) {
                        Value::Null
                    } else {
                        stamps.value_as_datetime(i).map_or(Value::Null, Value::DateTime)
                    }
                })
                .collect()
        }
        DataType::Duration(_) => {
            let casted = cast(array, &DataType::Duration(TimeUnit::Microsecond))?;
            let spans = casted.as_primitive::<DurationMicrosecondType>();
            (0..len)
                .map(|i| {
                    if spans.is_null(i) {
                        Value::Null
                    } else {
                        Value::Duration(TimeDelta::microseconds(spans.value(i)))
                    }
                })
                .collect()
        }
        DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View => {
            let casted = cast(array, &DataType::Utf8)?;
            let strings = casted.as_string::<i32>();
            (0..len)
                .map(|i| {
                    if strings.is_null(i) {
                        Value::Null
                    } else {
                        Value::Text(strings.value(i).to_string())
                    }
                })
                .collect()
        }
        _ => {
            let formatter = ArrayFormatter::try_new(array.as_ref(), &FormatOptions::default())?;
            (0..len)
                .map(|i| {
                    if array.is_null(i) {
                        Value::Null
                    } else {
                        Value::Text(formatter.value(i).to_string())
                    }
                })
                .collect()
        }
    };
    Ok(values)
}

/// Split a batch into rows.
///
/// # Errors
///
/// Returns error if a column cannot be cast to its canonical type
pub fn rows_from_batch(batch: &RecordBatch) -> Result<Vec<Row>> {
    let schema = batch.schema();
    let columns = batch
        .columns()
        .iter()
        .map(column_values)
        .collect::<Result<Vec<_>>>()?;

    let rows = (0..batch.num_rows())
        .map(|i| {
            schema
                .fields()
                .iter()
                .zip(&columns)
                .map(|(field, values)| (field.name().clone(), values[i].clone()))
                .collect()
        })
        .collect();
    Ok(rows)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Bool,
    Int,
    Float,
    Text,
    DateTime,
    Duration,
}

impl ColumnKind {
    const fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(_) => Some(Self::Bool),
            Value::Int(_) => Some(Self::Int),
            Value::Float(_) => Some(Self::Float),
            Value::Text(_) => Some(Self::Text),
            Value::DateTime(_) => Some(Self::DateTime),
            Value::Duration(_) => Some(Self::Duration),
        }
    }

    /// Common kind of two kinds: ints widen to floats, any other mix is text.
    fn unify(self, other: Self) -> Self {
        match (self, other) {
            (a, b) if a == b => a,
            (Self::Int, Self::Float) | (Self::Float, Self::Int) => Self::Float,
            _ => Self::Text,
        }
    }
}

fn build_column(kind: ColumnKind, values: &[&Value]) -> ArrayRef {
    match kind {
        ColumnKind::Bool => Arc::new(BooleanArray::from(
            values
                .iter()
                .map(|v| match v {
                    Value::Bool(b) => Some(*b),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )),
        ColumnKind::Int => Arc::new(Int64Array::from(
            values
                .iter()
                .map(|v| match v {
                    Value::Int(i) => Some(*i),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )),
        #[allow(clippy::cast_precision_loss)]
        ColumnKind::Float => Arc::new(Float64Array::from(
            values
                .iter()
                .map(|v| match v {
                    Value::Float(x) => Some(*x),
                    Value::Int(i) => Some(*i as f64),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )),
        ColumnKind::DateTime => Arc::new(TimestampMicrosecondArray::from(
            values
                .iter()
                .map(|v| match v {
                    Value::DateTime(dt) => Some(dt.and_utc().timestamp_micros()),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )),
        ColumnKind::Duration => Arc::new(DurationMicrosecondArray::from(
            values
                .iter()
                .map(|v| match v {
                    Value::Duration(d) => d.num_microseconds(),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )),
        ColumnKind::Text => Arc::new(StringArray::from(
            values
                .iter()
                .map(|v| (!v.is_null()).then(|| v.to_string()))
                .collect::<Vec<_>>(),
        )),
    }
}

/// Assemble rows into a batch.
///
/// Columns appear in first-seen order. Each column's type follows its
/// non-null values: integers mixed with floats become floats, other mixes
/// and all-null columns become strings.
///
/// # Errors
///
/// Returns error if the batch cannot be assembled
pub fn batch_from_rows(rows: &[Row]) -> Result<RecordBatch> {
    let mut names: Vec<&str> = Vec::new();
    for row in rows {
        for key in row.keys() {
            if !names.contains(&key) {
                names.push(key);
            }
        }
    }

    let mut fields = Vec::with_capacity(names.len());
    let mut columns = Vec::with_capacity(names.len());
    for name in names {
        let values: Vec<&Value> = rows
            .iter()
            .map(|row| row.get(name).unwrap_or(&Value::Null))
            .collect();
        let kind = values
            .iter()
            .filter_map(|v| ColumnKind::of(v))
            .reduce(ColumnKind::unify)
            .unwrap_or(ColumnKind::Text);
        let column = build_column(kind, &values);
        fields.push(Field::new(name, column.data_type().clone(), true));
        columns.push(column);
    }

    let schema = Arc::new(Schema::new(fields));
    let batch = if columns.is_empty() {
        RecordBatch::new_empty(schema)
    } else {
        RecordBatch::try_new(schema, columns)?
    };
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Int32Array, UInt64Array};
    use chrono::NaiveDate;

    #[test]
    fn test_rows_from_batch_canonical_values() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("n", DataType::Int32, true),
            Field::new("big", DataType::UInt64, true),
            Field::new("name", DataType::Utf8, true),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int32Array::from(vec![Some(1), None])),
                Arc::new(UInt64Array::from(vec![7, 8])),
                Arc::new(StringArray::from(vec!["a", "b"])),
            ],
        )
        .unwrap();

        let rows = rows_from_batch(&batch).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("n"), Some(&Value::Int(1)));
        assert_eq!(rows[1].get("n"), Some(&Value::Null));
        assert_eq!(rows[0].get("big"), Some(&Value::Text("7".to_string())));
        assert_eq!(rows[1].get("name"), Some(&Value::Text("b".to_string())));
    }

    #[test]
    fn test_batch_from_rows_infers_types() {
        let when = NaiveDate::from_ymd_opt(2020, 1, 5)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let rows = vec![
            Row::new().with("od600", 1_i64).with("when", when),
            Row::new().with("od600", 0.5).with("flag", true),
        ];
        let batch = batch_from_rows(&rows).unwrap();

        let schema = batch.schema();
        assert_eq!(schema.field(0).data_type(), &DataType::Float64);
        assert_eq!(
            schema.field(1).data_type(),
            &DataType::Timestamp(TimeUnit::Microsecond, None)
        );
        assert_eq!(schema.field(2).data_type(), &DataType::Boolean);

        let back = rows_from_batch(&batch).unwrap();
        assert_eq!(back[0].get("od600"), Some(&Value::Float(1.0)));
        assert_eq!(back[0].get("when"), Some(&Value::DateTime(when)));
        assert_eq!(back[0].get("flag"), Some(&Value::Null));
    }

    #[test]
    fn test_row_lookup_prefers_exact_case() {
        let row = Row::new().with("Sample", "a").with("sample", "b");
        assert_eq!(row.get_ignore_case("sample"), Some(&Value::from("b")));
        assert_eq!(row.get_ignore_case("SAMPLE"), Some(&Value::from("a")));
        assert!(Row::new().with("x", Value::Null).is_all_null());
    }
}
