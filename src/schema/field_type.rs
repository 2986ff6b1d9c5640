//! Symbolic field types for routine tables
//!
//! A routine's data schema is an ordered list of `(name, FieldType)` pairs.
//! The tags are persisted as plain strings so the mapping stays portable;
//! native column types are chosen only when a table is created.

use std::fmt;
use std::str::FromStr;

use arrow::datatypes::{DataType, Schema, TimeUnit};
use serde::{Deserialize, Serialize};

use crate::error::SchemaError;

/// Maximum length of string columns in dynamic tables.
pub const STRING_COLUMN_LENGTH: usize = 200;

/// Declared data type of a routine field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Boolean flag
    Bool,
    /// 64-bit signed integer
    Int,
    /// Double precision float
    Float,
    /// Bounded string
    String,
    /// Timestamp without time zone
    DateTime,
    /// Time span, stored as microseconds
    Duration,
}

impl FieldType {
    /// All tags, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::Bool,
        Self::Int,
        Self::Float,
        Self::String,
        Self::DateTime,
        Self::Duration,
    ];

    /// Symbolic tag as persisted in the routine catalog.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::String => "string",
            Self::DateTime => "datetime",
            Self::Duration => "duration",
        }
    }

    /// Column type used in `CREATE TABLE` / `ALTER TABLE`.
    #[must_use]
    pub fn sql_type(self) -> String {
        match self {
            Self::Bool => "BOOLEAN".to_string(),
            Self::Int => "INTEGER".to_string(),
            Self::Float => "DOUBLE PRECISION".to_string(),
            Self::String => format!("VARCHAR({STRING_COLUMN_LENGTH})"),
            Self::DateTime => "DATETIME".to_string(),
            Self::Duration => "INTERVAL".to_string(),
        }
    }

    /// Recover a field type from a reflected column declaration.
    ///
    /// Unknown declarations fall back to [`FieldType::String`].
    #[must_use]
    pub fn from_sql_type(declared: &str) -> Self {
        let upper = declared.trim().to_ascii_uppercase();
        if upper.starts_with("BOOL") {
            Self::Bool
        } else if upper.contains("INT") && !upper.starts_with("INTERVAL") {
            Self::Int
        } else if upper.contains("DOUB") || upper.contains("FLOA") || upper.contains("REAL") {
            Self::Float
        } else if upper.starts_with("DATETIME") || upper.starts_with("TIMESTAMP") {
            Self::DateTime
        } else if upper.starts_with("INTERVAL") {
            Self::Duration
        } else {
            Self::String
        }
    }

    /// Infer a field type from an Arrow column type.
    ///
    /// `UInt64` maps to a string because it does not fit a signed 64-bit
    /// column.
    #[must_use]
    pub const fn from_arrow(data_type: &DataType) -> Self {
        match data_type {
            DataType::Boolean => Self::Bool,
            DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32 => Self::Int,
            DataType::Float16
            | DataType::Float32
            | DataType::Float64
            | DataType::Decimal128(_, _)
            | DataType::Decimal256(_, _) => Self::Float,
            DataType::Date32 | DataType::Date64 | DataType::Timestamp(_, _) => Self::DateTime,
            DataType::Duration(_) | DataType::Interval(_) => Self::Duration,
            _ => Self::String,
        }
    }

    /// Arrow type used when materializing query results.
    #[must_use]
    pub const fn arrow_type(self) -> DataType {
        match self {
            Self::Bool => DataType::Boolean,
            Self::Int => DataType::Int64,
            Self::Float => DataType::Float64,
            Self::String => DataType::Utf8,
            Self::DateTime => DataType::Timestamp(TimeUnit::Microsecond, None),
            Self::Duration => DataType::Duration(TimeUnit::Microsecond),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for FieldType {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bool" | "boolean" => Ok(Self::Bool),
            "int" | "integer" => Ok(Self::Int),
            "float" | "double" => Ok(Self::Float),
            "string" | "str" | "text" => Ok(Self::String),
            "datetime" | "timestamp" => Ok(Self::DateTime),
            "duration" | "interval" => Ok(Self::Duration),
            other => Err(SchemaError::UnknownFieldType(other.to_string())),
        }
    }
}

/// One named field of a routine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Column name
    pub name: String,
    /// Declared type
    #[serde(rename = "type")]
    pub field_type: FieldType,
}

/// Ordered field-name → type mapping.
///
/// Insertion order is the column order of the dynamic table. Inserting an
/// existing name replaces its type in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldTypes(Vec<FieldSpec>);

impl FieldTypes {
    /// Create an empty mapping.
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.insert(name, field_type);
        self
    }

    /// Insert or replace a field.
    pub fn insert(&mut self, name: impl Into<String>, field_type: FieldType) {
        let name = name.into();
        if let Some(spec) = self.0.iter_mut().find(|spec| spec.name == name) {
            spec.field_type = field_type;
        } else {
            self.0.push(FieldSpec { name, field_type });
        }
    }

    /// Type of a field, if declared.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<FieldType> {
        self.0
            .iter()
            .find(|spec| spec.name == name)
            .map(|spec| spec.field_type)
    }

    /// Whether a field is declared.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Declared field whose name matches ignoring ASCII case.
    #[must_use]
    pub fn find_ignore_case(&self, name: &str) -> Option<&FieldSpec> {
        self.0.iter().find(|spec| spec.name.eq_ignore_ascii_case(name))
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no fields are declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate fields in order.
    pub fn iter(&self) -> impl Iterator<Item = &FieldSpec> {
        self.0.iter()
    }

    /// Field names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|spec| spec.name.as_str())
    }

    /// Infer one field per column of an Arrow schema, skipping `skip` names
    /// (compared case-insensitively).
    #[must_use]
    pub fn infer_from_schema(schema: &Schema, skip: &[&str]) -> Self {
        schema
            .fields()
            .iter()
            .filter(|field| !skip.iter().any(|s| s.eq_ignore_ascii_case(field.name())))
            .map(|field| {
                (
                    field.name().clone(),
                    FieldType::from_arrow(field.data_type()),
                )
            })
            .collect()
    }

    /// Serialize to the JSON stored in `routines.data_fields`.
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Deserialize from `routines.data_fields`.
    ///
    /// # Errors
    ///
    /// Returns error if the JSON is malformed or contains an unknown tag
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

impl<S: Into<String>> FromIterator<(S, FieldType)> for FieldTypes {
    fn from_iter<I: IntoIterator<Item = (S, FieldType)>>(iter: I) -> Self {
        let mut fields = Self::new();
        for (name, field_type) in iter {
            fields.insert(name, field_type);
        }
        fields
    }
}

impl<'a> IntoIterator for &'a FieldTypes {
    type Item = &'a FieldSpec;
    type IntoIter = std::slice::Iter<'a, FieldSpec>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::datatypes::{Field, IntervalUnit};

    #[test]
    fn test_tag_round_trip() {
        for field_type in FieldType::ALL {
            assert_eq!(field_type.tag().parse::<FieldType>().unwrap(), field_type);
        }
    }

    #[test]
    fn test_unknown_tag() {
        let err = "complex".parse::<FieldType>().unwrap_err();
        assert_eq!(err, SchemaError::UnknownFieldType("complex".to_string()));
    }

    #[test]
    fn test_sql_type_round_trip() {
        for field_type in FieldType::ALL {
            assert_eq!(FieldType::from_sql_type(&field_type.sql_type()), field_type);
        }
    }

    #[test]
    fn test_arrow_inference() {
        assert_eq!(FieldType::from_arrow(&DataType::Boolean), FieldType::Bool);
        assert_eq!(FieldType::from_arrow(&DataType::Int16), FieldType::Int);
        assert_eq!(FieldType::from_arrow(&DataType::UInt32), FieldType::Int);
        assert_eq!(FieldType::from_arrow(&DataType::UInt64), FieldType::String);
        assert_eq!(FieldType::from_arrow(&DataType::Float32), FieldType::Float);
        assert_eq!(
            FieldType::from_arrow(&DataType::Timestamp(TimeUnit::Nanosecond, None)),
            FieldType::DateTime
        );
        assert_eq!(
            FieldType::from_arrow(&DataType::Duration(TimeUnit::Second)),
            FieldType::Duration
        );
        assert_eq!(
            FieldType::from_arrow(&DataType::Interval(IntervalUnit::DayTime)),
            FieldType::Duration
        );
        assert_eq!(FieldType::from_arrow(&DataType::Utf8), FieldType::String);
    }

    #[test]
    fn test_insert_replaces_in_place() {
        let mut fields = FieldTypes::new()
            .with("a", FieldType::Int)
            .with("b", FieldType::Bool);
        fields.insert("a", FieldType::Float);

        let names: Vec<_> = fields.names().collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(fields.get("a"), Some(FieldType::Float));
    }

    #[test]
    fn test_json_preserves_order_and_tags() {
        let fields = FieldTypes::new()
            .with("od600", FieldType::Float)
            .with("valid", FieldType::Bool);
        let json = fields.to_json().unwrap();
        assert_eq!(
            json,
            r#"[{"name":"od600","type":"float"},{"name":"valid","type":"bool"}]"#
        );
        assert_eq!(FieldTypes::from_json(&json).unwrap(), fields);
    }

    #[test]
    fn test_infer_from_schema_skips_metadata() {
        let schema = Schema::new(vec![
            Field::new("Sample", DataType::Utf8, true),
            Field::new("od600", DataType::Float64, true),
        ]);
        let fields = FieldTypes::infer_from_schema(&schema, &["sample"]);
        assert_eq!(fields.len(), 1);
        assert_eq!(fields.get("od600"), Some(FieldType::Float));
    }
}
