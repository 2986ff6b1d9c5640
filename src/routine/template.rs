//! Routine script templates
//!
//! Defining a routine leaves a starting point for its import script in the
//! author's working directory: either a copy of a user-supplied script, or a
//! TOML manifest listing the routine's fields and the metadata keys every
//! dataset must provide.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::entity::{RoutineMetadata, RoutineRecord};
use crate::ingest::{OPTIONAL_METADATA_KEYS, REQUIRED_METADATA_KEYS};
use crate::schema::{FieldSpec, FieldTypes};
use crate::{Error, Result};

const MANIFEST_HEADER: &str = "\
# Routine manifest. The import script for this routine must return datasets
# whose columns match [[fields]] and whose metadata provides the required keys.
# Keys missing from a data row are taken from the dataset metadata.
";

/// Serialized description of a routine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutineManifest {
    /// Routine identity and description
    pub routine: ManifestRoutine,
    /// Metadata keys read from each data row
    pub metadata: ManifestKeys,
    /// Data fields, in column order
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
}

/// `[routine]` section of a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestRoutine {
    /// Alias
    pub alias: String,
    /// Author's user name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Full name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    /// Description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// SOP reference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sop: Option<String>,
    /// Raw data location
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_location: Option<String>,
    /// Data dimension
    #[serde(default = "default_dimension")]
    pub data_dimension: i64,
}

const fn default_dimension() -> i64 {
    1
}

/// `[metadata]` section of a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestKeys {
    /// Keys without which a row is rejected
    pub required: Vec<String>,
    /// Keys with defaults
    pub optional: Vec<String>,
}

impl Default for ManifestKeys {
    fn default() -> Self {
        Self {
            required: REQUIRED_METADATA_KEYS.iter().map(|k| (*k).to_string()).collect(),
            optional: OPTIONAL_METADATA_KEYS.iter().map(|k| (*k).to_string()).collect(),
        }
    }
}

impl RoutineManifest {
    /// Describe a routine.
    #[must_use]
    pub fn from_record(record: &RoutineRecord) -> Self {
        let meta = record.metadata();
        Self {
            routine: ManifestRoutine {
                alias: record.alias().to_string(),
                author: record.author().map(str::to_string),
                full_name: meta.full_name.clone(),
                description: meta.description.clone(),
                sop: meta.sop.clone(),
                data_location: meta.data_location.clone(),
                data_dimension: meta.data_dimension,
            },
            metadata: ManifestKeys::default(),
            fields: record.data_fields().iter().cloned().collect(),
        }
    }

    /// Rebuild the routine definition.
    #[must_use]
    pub fn into_record(self) -> RoutineRecord {
        let fields: FieldTypes = self
            .fields
            .into_iter()
            .map(|spec| (spec.name, spec.field_type))
            .collect();
        let routine = self.routine;
        let mut record = RoutineRecord::new(routine.alias, fields);
        record.set_author(routine.author);
        record.set_metadata(RoutineMetadata {
            full_name: routine.full_name,
            description: routine.description,
            sop: routine.sop,
            data_location: routine.data_location,
            data_dimension: routine.data_dimension,
        });
        record
    }

    /// Render as TOML with an explanatory header.
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails
    pub fn to_toml(&self) -> Result<String> {
        let body = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        Ok(format!("{MANIFEST_HEADER}\n{body}"))
    }

    /// Load a manifest file.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or is not a valid manifest
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }
}

/// Write the script template of a routine into `dir`.
///
/// With `script`, the file is copied as `<alias>.<ext>`; otherwise a manifest
/// `<alias>.toml` is generated. An existing target is kept.
///
/// # Errors
///
/// Returns error if the directory or file cannot be written
pub fn write_template(record: &RoutineRecord, dir: &Path, script: Option<&Path>) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let target = match script {
        Some(source) => {
            let mut target = dir.join(record.alias());
            if let Some(ext) = source.extension() {
                target.set_extension(ext);
            }
            target
        }
        None => dir.join(format!("{}.toml", record.alias())),
    };

    if target.exists() {
        warn!(path = %target.display(), "script template already exists, keeping it");
        return Ok(target);
    }

    match script {
        Some(source) => {
            std::fs::copy(source, &target)?;
        }
        None => std::fs::write(&target, RoutineManifest::from_record(record).to_toml()?)?,
    }
    info!(alias = record.alias(), path = %target.display(), "script template written");
    Ok(target)
}
