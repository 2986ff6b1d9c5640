//! Compound Record - a screened sample

use serde::{Deserialize, Serialize};

/// Compound Record represents a sample tested by routines.
///
/// Compounds are identified by their unique `name`. They are usually created
/// on first reference during ingestion and enriched later.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompoundRecord {
    id: Option<i64>,
    name: String,
    group: Option<String>,
    smiles: Option<String>,
    cas: Option<String>,
    formula: Option<String>,
    address: Option<String>,
    batch: Option<String>,
}

impl CompoundRecord {
    /// Create a compound with only a name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Create a builder for a compound with optional fields.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> CompoundRecordBuilder {
        CompoundRecordBuilder {
            record: Self::new(name),
        }
    }

    /// Database id, once stored.
    #[must_use]
    pub const fn id(&self) -> Option<i64> {
        self.id
    }

    /// Unique name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Compound group.
    #[must_use]
    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    /// SMILES string.
    #[must_use]
    pub fn smiles(&self) -> Option<&str> {
        self.smiles.as_deref()
    }

    /// CAS registry number.
    #[must_use]
    pub fn cas(&self) -> Option<&str> {
        self.cas.as_deref()
    }

    /// Molecular formula.
    #[must_use]
    pub fn formula(&self) -> Option<&str> {
        self.formula.as_deref()
    }

    /// Storage address.
    #[must_use]
    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    /// Synthesis batch.
    #[must_use]
    pub fn batch(&self) -> Option<&str> {
        self.batch.as_deref()
    }

    pub(crate) const fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    /// Set a column by its table name. Unknown columns are ignored and
    /// reported as `false`.
    pub(crate) fn set_column(&mut self, column: &str, value: Option<String>) -> bool {
        let slot = match column {
            "group" => &mut self.group,
            "smiles" => &mut self.smiles,
            "cas" => &mut self.cas,
            "formula" => &mut self.formula,
            "address" => &mut self.address,
            "batch" => &mut self.batch,
            _ => return false,
        };
        *slot = value;
        true
    }
}

/// Builder for `CompoundRecord`.
#[derive(Debug)]
pub struct CompoundRecordBuilder {
    record: CompoundRecord,
}

impl CompoundRecordBuilder {
    /// Set the group.
    #[must_use]
    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.record.group = Some(group.into());
        self
    }

    /// Set the SMILES string.
    #[must_use]
    pub fn smiles(mut self, smiles: impl Into<String>) -> Self {
        self.record.smiles = Some(smiles.into());
        self
    }

    /// Set the CAS number.
    #[must_use]
    pub fn cas(mut self, cas: impl Into<String>) -> Self {
        self.record.cas = Some(cas.into());
        self
    }

    /// Set the formula.
    #[must_use]
    pub fn formula(mut self, formula: impl Into<String>) -> Self {
        self.record.formula = Some(formula.into());
        self
    }

    /// Set the storage address.
    #[must_use]
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.record.address = Some(address.into());
        self
    }

    /// Set the batch.
    #[must_use]
    pub fn batch(mut self, batch: impl Into<String>) -> Self {
        self.record.batch = Some(batch.into());
        self
    }

    /// Build the `CompoundRecord`.
    #[must_use]
    pub fn build(self) -> CompoundRecord {
        self.record
    }
}
