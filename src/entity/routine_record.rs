//! Routine Record - an experiment type with its own data schema

use serde::{Deserialize, Serialize};

use crate::schema::FieldTypes;

/// Descriptive, freely editable part of a routine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoutineMetadata {
    /// Human-readable name
    pub full_name: Option<String>,
    /// Free-text description
    pub description: Option<String>,
    /// Standard operating procedure reference
    pub sop: Option<String>,
    /// Where raw data files are kept
    pub data_location: Option<String>,
    /// Number of data rows produced per sample
    pub data_dimension: i64,
}

impl Default for RoutineMetadata {
    fn default() -> Self {
        Self {
            full_name: None,
            description: None,
            sop: None,
            data_location: None,
            data_dimension: 1,
        }
    }
}

/// Routine Record represents a screening routine.
///
/// Each routine owns exactly one dynamic table named after its `alias`, whose
/// columns are `id`, `link` and one column per entry of `data_fields`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoutineRecord {
    id: Option<i64>,
    alias: String,
    author: Option<String>,
    metadata: RoutineMetadata,
    data_fields: FieldTypes,
}

impl RoutineRecord {
    /// Create a routine with the given alias and fields.
    #[must_use]
    pub fn new(alias: impl Into<String>, data_fields: FieldTypes) -> Self {
        Self {
            id: None,
            alias: alias.into(),
            author: None,
            metadata: RoutineMetadata::default(),
            data_fields,
        }
    }

    /// Create a builder for a routine with optional fields.
    #[must_use]
    pub fn builder(alias: impl Into<String>, data_fields: FieldTypes) -> RoutineRecordBuilder {
        RoutineRecordBuilder {
            record: Self::new(alias, data_fields),
        }
    }

    /// Database id, once stored.
    #[must_use]
    pub const fn id(&self) -> Option<i64> {
        self.id
    }

    /// Unique alias, also the name of the dynamic table.
    #[must_use]
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Author's user name.
    #[must_use]
    pub fn author(&self) -> Option<&str> {
        self.author.as_deref()
    }

    /// Descriptive metadata.
    #[must_use]
    pub const fn metadata(&self) -> &RoutineMetadata {
        &self.metadata
    }

    /// Declared data fields.
    #[must_use]
    pub const fn data_fields(&self) -> &FieldTypes {
        &self.data_fields
    }

    pub(crate) const fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    pub(crate) fn set_author(&mut self, author: Option<String>) {
        self.author = author;
    }

    pub(crate) fn set_metadata(&mut self, metadata: RoutineMetadata) {
        self.metadata = metadata;
    }

    pub(crate) fn data_fields_mut(&mut self) -> &mut FieldTypes {
        &mut self.data_fields
    }
}

/// Builder for `RoutineRecord`.
#[derive(Debug)]
pub struct RoutineRecordBuilder {
    record: RoutineRecord,
}

impl RoutineRecordBuilder {
    /// Set the author.
    #[must_use]
    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.record.author = Some(author.into());
        self
    }

    /// Set the full name.
    #[must_use]
    pub fn full_name(mut self, full_name: impl Into<String>) -> Self {
        self.record.metadata.full_name = Some(full_name.into());
        self
    }

    /// Set the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.record.metadata.description = Some(description.into());
        self
    }

    /// Set the SOP reference.
    #[must_use]
    pub fn sop(mut self, sop: impl Into<String>) -> Self {
        self.record.metadata.sop = Some(sop.into());
        self
    }

    /// Set the raw data location.
    #[must_use]
    pub fn data_location(mut self, location: impl Into<String>) -> Self {
        self.record.metadata.data_location = Some(location.into());
        self
    }

    /// Set the data dimension.
    #[must_use]
    pub const fn data_dimension(mut self, dimension: i64) -> Self {
        self.record.metadata.data_dimension = dimension;
        self
    }

    /// Build the `RoutineRecord`.
    #[must_use]
    pub fn build(self) -> RoutineRecord {
        self.record
    }
}
