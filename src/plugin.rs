//! Routine modules
//!
//! Every routine can have a module that knows how to read its raw data and,
//! optionally, how to summarize query results. Modules are looked up by the
//! routine alias in the author's working directory through a
//! [`ModuleLoader`]. The crate ships an in-process loader,
//! [`ModuleRegistry`], where modules are registered explicitly; loaders
//! backed by dynamic libraries or subprocesses can implement the same trait.
//!
//! ```text
//!   write_results(db, loader, "assay1", dir, args)
//!        │
//!        ├── loader.load("assay1", dir) ──► RoutineModule
//!        ├── module.get_data(args)      ──► Vec<Dataset>
//!        └── db.ingest_datasets(...)    ──► Vec<IngestReport>
//! ```

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::record_batch::RecordBatch;
use serde::Deserialize;
use tracing::{debug, info};

use crate::connection::Database;
use crate::ingest::{read_delimited, Dataset, IngestOptions, IngestReport, Metadata, Row};
use crate::summary::render_table;
use crate::value::Value;
use crate::{Error, Result};

/// Free-form arguments handed to module calls.
pub type ModuleArgs = serde_json::Value;

/// Raw-data reader and summarizer of one routine.
pub trait RoutineModule {
    /// Read the raw data as datasets of tabular data plus common metadata.
    ///
    /// # Errors
    ///
    /// Returns error if the raw data cannot be read
    fn get_data(&self, args: &ModuleArgs) -> Result<Vec<Dataset>>;

    /// Text summary of query results. `None` selects the default table.
    ///
    /// # Errors
    ///
    /// Returns error if the summary cannot be produced
    fn summarize_list(&self, _data: &RecordBatch, _args: &ModuleArgs) -> Result<Option<String>> {
        Ok(None)
    }
}

/// Locates the module of a routine.
pub trait ModuleLoader {
    /// Load module `name` from `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ModuleNotFound`] if no such module exists
    fn load(&self, name: &str, dir: &Path) -> Result<Arc<dyn RoutineModule>>;
}

/// In-process [`ModuleLoader`] with explicitly registered modules.
///
/// A module registered for a directory shadows one registered globally
/// under the same name.
#[derive(Default)]
pub struct ModuleRegistry {
    global: HashMap<String, Arc<dyn RoutineModule>>,
    scoped: HashMap<(PathBuf, String), Arc<dyn RoutineModule>>,
}

impl ModuleRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module for every directory.
    pub fn register(&mut self, name: impl Into<String>, module: Box<dyn RoutineModule>) {
        self.global.insert(name.into(), Arc::from(module));
    }

    /// Register a module for one working directory.
    pub fn register_in(
        &mut self,
        dir: impl Into<PathBuf>,
        name: impl Into<String>,
        module: Box<dyn RoutineModule>,
    ) {
        self.scoped
            .insert((dir.into(), name.into()), Arc::from(module));
    }

    /// Number of registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.global.len() + self.scoped.len()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ModuleLoader for ModuleRegistry {
    fn load(&self, name: &str, dir: &Path) -> Result<Arc<dyn RoutineModule>> {
        self.scoped
            .get(&(dir.to_path_buf(), name.to_string()))
            .or_else(|| self.global.get(name))
            .cloned()
            .ok_or_else(|| Error::ModuleNotFound {
                name: name.to_string(),
                dir: dir.to_path_buf(),
            })
    }
}

impl fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut global = self.global.keys().collect::<Vec<_>>();
        global.sort();
        f.debug_struct("ModuleRegistry")
            .field("global", &global)
            .field("scoped", &self.scoped.len())
            .finish()
    }
}

/// Arguments understood by [`DelimitedFileModule`].
#[derive(Debug, Clone, Deserialize)]
struct DelimitedArgs {
    files: Vec<PathBuf>,
    #[serde(default = "default_delimiter")]
    delimiter: char,
    #[serde(default)]
    metadata: serde_json::Map<String, serde_json::Value>,
}

const fn default_delimiter() -> char {
    '\t'
}

fn json_to_value(value: &serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => n
            .as_i64()
            .map(Value::Int)
            .or_else(|| n.as_f64().map(Value::Float))
            .unwrap_or(Value::Null),
        serde_json::Value::String(s) => Value::Text(s.clone()),
        other => Value::Text(other.to_string()),
    }
}

/// Module for routines whose raw data are delimited text files with a
/// header row.
///
/// Arguments: `{"files": [...], "delimiter": "\t", "metadata": {...}}`.
/// Each file becomes one dataset sharing `metadata`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DelimitedFileModule;

impl RoutineModule for DelimitedFileModule {
    fn get_data(&self, args: &ModuleArgs) -> Result<Vec<Dataset>> {
        let args = DelimitedArgs::deserialize(args)
            .map_err(|e| Error::InvalidInput(format!("delimited module arguments: {e}")))?;
        let delimiter = u8::try_from(args.delimiter).map_err(|_| {
            Error::InvalidInput(format!("delimiter '{}' is not a single byte", args.delimiter))
        })?;
        let metadata: Metadata = args
            .metadata
            .iter()
            .map(|(key, value)| (key.clone(), json_to_value(value)))
            .collect::<Row>();
        args.files
            .iter()
            .map(|file| Ok(Dataset::new(read_delimited(file, delimiter)?, metadata.clone())))
            .collect()
    }
}

fn validate_datasets(name: &str, datasets: &[Dataset]) -> Result<()> {
    if datasets.is_empty() {
        return Err(Error::InvalidInput(format!("module '{name}' returned no data")));
    }
    if let Some(i) = datasets.iter().position(|d| d.data.num_columns() == 0) {
        return Err(Error::InvalidInput(format!(
            "module '{name}' returned a dataset without columns at position {i}"
        )));
    }
    Ok(())
}

/// Read raw data through the routine's module and ingest it.
///
/// # Errors
///
/// Returns [`Error::ModuleNotFound`] if the module cannot be loaded,
/// [`Error::InvalidInput`] if it returns no datasets or a dataset without
/// columns, or the first connection-level ingestion error
pub fn write_results(
    db: &mut Database,
    loader: &dyn ModuleLoader,
    routine: &str,
    dir: &Path,
    args: &ModuleArgs,
    options: IngestOptions,
) -> Result<Vec<IngestReport>> {
    let module = loader.load(routine, dir)?;
    let datasets = module.get_data(args)?;
    validate_datasets(routine, &datasets)?;
    debug!(%routine, datasets = datasets.len(), "module returned data");

    let reports = db.ingest_datasets(routine, &datasets, options)?;
    let committed: usize = reports.iter().map(|r| r.committed).sum();
    let failed: usize = reports.iter().map(IngestReport::failed_count).sum();
    info!(%routine, datasets = reports.len(), committed, failed, "results written");
    Ok(reports)
}

/// Summarize query results with the routine's module, falling back to a
/// plain table when the module has no list summary.
///
/// # Errors
///
/// Returns [`Error::ModuleNotFound`] if the module cannot be loaded, or the
/// module's own error
pub fn summarize(
    loader: &dyn ModuleLoader,
    routine: &str,
    dir: &Path,
    data: &RecordBatch,
    args: &ModuleArgs,
) -> Result<String> {
    let module = loader.load(routine, dir)?;
    match module.summarize_list(data, args)? {
        Some(text) => Ok(text),
        None => render_table(data),
    }
}
