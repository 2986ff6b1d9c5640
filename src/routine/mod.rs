//! Routine definition manager
//!
//! Defining a routine is a schema migration: the routine row and its dynamic
//! table are created in one transaction, after which the schema cache is up
//! to date. Existing tables are only ever extended (`alter_routine`) or
//! dropped as a whole (`drop_routine`); columns are never retyped or removed.

mod template;

pub use template::{write_template, ManifestKeys, ManifestRoutine, RoutineManifest};

use std::path::{Path, PathBuf};

use rusqlite::Connection;
use tracing::{info, warn};

use crate::connection::Database;
use crate::entity::{store, RoutineMetadata, RoutineRecord};
use crate::error::SchemaError;
use crate::schema::{self, Catalog, FieldTypes};
use crate::Result;

/// Id of a routine row.
pub type RoutineId = i64;

/// Outcome of [`create_routine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CreatedRoutine {
    pub id: RoutineId,
    pub author_created: bool,
}

/// Insert the routine row and create its dynamic table. The author is
/// created as a minimal user if unknown.
pub(crate) fn create_routine(
    conn: &Connection,
    catalog: &mut Catalog,
    workspace_root: &Path,
    record: &RoutineRecord,
) -> Result<CreatedRoutine> {
    let alias = record.alias();
    schema::validate_alias(alias)?;
    for name in record.data_fields().names() {
        schema::validate_field_name(name)?;
    }
    // Aliases name tables, so they are unique ignoring ASCII case.
    if catalog.contains(alias) || store::find_routine_id(conn, alias)?.is_some() {
        return Err(SchemaError::DuplicateRoutine(alias.to_string()).into());
    }

    let author_created = match record.author() {
        Some(author) => store::resolve_or_create_user(conn, workspace_root, author)?.created,
        None => false,
    };
    let id = store::insert_routine(conn, record)?;
    schema::create_dynamic_table(conn, catalog, alias, record.data_fields())?;
    info!(%alias, id, fields = record.data_fields().len(), "routine defined");
    Ok(CreatedRoutine { id, author_created })
}

/// Add new columns to a routine. Returns the names actually added.
pub(crate) fn extend_routine(
    conn: &Connection,
    catalog: &mut Catalog,
    alias: &str,
    new_fields: &FieldTypes,
) -> Result<Vec<String>> {
    let mut routine =
        store::find_routine(conn, alias)?.ok_or_else(|| SchemaError::UnknownRoutine(alias.to_string()))?;

    let mut added = Vec::new();
    for spec in new_fields {
        let current = routine
            .data_fields()
            .find_ignore_case(&spec.name)
            .map(|declared| declared.field_type);
        match current {
            Some(current) if current == spec.field_type => {}
            Some(current) => {
                return Err(SchemaError::UnsupportedAlteration {
                    routine: alias.to_string(),
                    field: spec.name.clone(),
                    from: current.to_string(),
                    to: spec.field_type.to_string(),
                }
                .into())
            }
            None if added.iter().any(|a: &String| a.eq_ignore_ascii_case(&spec.name)) => {}
            None => {
                schema::add_column(conn, catalog, alias, &spec.name, spec.field_type)?;
                routine
                    .data_fields_mut()
                    .insert(spec.name.clone(), spec.field_type);
                added.push(spec.name.clone());
            }
        }
    }
    if !added.is_empty() {
        store::update_routine_fields(conn, alias, routine.data_fields())?;
        info!(%alias, ?added, "routine altered");
    }
    Ok(added)
}

/// Directory where a routine's script template belongs: the author's working
/// directory, or the workspace root for routines without author.
pub(crate) fn template_directory(
    conn: &Connection,
    workspace_root: &Path,
    record: &RoutineRecord,
) -> Result<PathBuf> {
    let Some(author) = record.author() else {
        return Ok(workspace_root.to_path_buf());
    };
    Ok(store::find_user(conn, author)?
        .and_then(|user| user.working_directory().map(Path::to_path_buf))
        .unwrap_or_else(|| workspace_root.join(author)))
}

/// Write the script template, logging instead of failing. The routine is
/// already committed at this point.
pub(crate) fn write_template_logged(
    conn: &Connection,
    workspace_root: &Path,
    record: &RoutineRecord,
    script: Option<&Path>,
) -> Option<PathBuf> {
    let written = template_directory(conn, workspace_root, record)
        .and_then(|dir| write_template(record, &dir, script));
    match written {
        Ok(path) => Some(path),
        Err(e) => {
            warn!(alias = record.alias(), error = %e, "could not write script template");
            None
        }
    }
}

impl Database {
    /// Define a routine and materialize its dynamic table.
    ///
    /// The author is created if unknown. Afterwards a script template is
    /// written to the author's working directory: a copy of `script` when
    /// given, otherwise a TOML manifest.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::DuplicateRoutine`] if the alias is taken,
    /// [`SchemaError::InvalidIdentifier`] for a bad alias or field name, or a
    /// connection/database error. Nothing is committed on error.
    pub fn define_routine(
        &mut self,
        record: &RoutineRecord,
        script: Option<&Path>,
    ) -> Result<RoutineId> {
        let created = self.transaction(|tx, catalog, root| create_routine(tx, catalog, root, record))?;
        if created.author_created {
            self.create_working_directories(record.author())?;
        }
        write_template_logged(self.connection()?, self.workspace_root(), record, script);
        Ok(created.id)
    }

    /// Add columns to a routine.
    ///
    /// Fields already declared with the same type are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::UnknownRoutine`] if the alias does not exist or
    /// [`SchemaError::UnsupportedAlteration`] if a field would change type.
    /// Nothing is committed on error.
    pub fn alter_routine(&mut self, alias: &str, new_fields: &FieldTypes) -> Result<Vec<String>> {
        self.transaction(|tx, catalog, _| extend_routine(tx, catalog, alias, new_fields))
    }

    /// Drop a routine: its dynamic table, its results and its row.
    ///
    /// Returns the number of deleted results.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::UnknownRoutine`] if the alias does not exist
    pub fn drop_routine(&mut self, alias: &str) -> Result<usize> {
        let deleted = self.transaction(|tx, catalog, _| {
            let id = store::find_routine_id(tx, alias)?
                .ok_or_else(|| SchemaError::UnknownRoutine(alias.to_string()))?;
            schema::drop_table(tx, catalog, alias)?;
            store::delete_routine(tx, id)
        })?;
        info!(%alias, results = deleted, "routine dropped");
        Ok(deleted)
    }

    /// Replace a routine's descriptive metadata.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::UnknownRoutine`] if the alias does not exist
    pub fn update_routine_metadata(&self, alias: &str, metadata: &RoutineMetadata) -> Result<()> {
        store::update_routine_metadata(self.connection()?, alias, metadata)
    }
}
