//! Entity Store - SQL access to the fixed tables
//!
//! Every function takes a plain `&Connection` so it can run either directly on
//! the session or inside a transaction / savepoint (both deref to
//! `Connection`).

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, warn};

use super::{CompoundRecord, ResultRecord, RoutineMetadata, RoutineRecord, UserRecord};
use crate::error::SchemaError;
use crate::schema::FieldTypes;
use crate::value::{parse_stored_datetime, Value};
use crate::Result;

/// Optional compound columns, in table order.
pub const COMPOUND_COLUMNS: [&str; 6] = ["group", "smiles", "cas", "formula", "address", "batch"];

/// Optional user columns, in table order.
pub const USER_COLUMNS: [&str; 8] = [
    "first_name",
    "middle_name",
    "last_name",
    "e_mail",
    "affiliation",
    "degree",
    "phone",
    "working_directory",
];

/// Outcome of a resolve-or-create step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    /// Id of the existing or new row
    pub id: i64,
    /// Whether the row was created by this call
    pub created: bool,
}

impl Resolution {
    const fn existing(id: i64) -> Self {
        Self { id, created: false }
    }

    const fn created(id: i64) -> Self {
        Self { id, created: true }
    }
}

// ============================================================================
// Compounds
// ============================================================================

fn compound_from_row(row: &Row<'_>) -> rusqlite::Result<CompoundRecord> {
    let mut record = CompoundRecord::new(row.get::<_, String>(1)?).with_id(row.get(0)?);
    for (i, column) in COMPOUND_COLUMNS.iter().enumerate() {
        record.set_column(column, row.get(i + 2)?);
    }
    Ok(record)
}

fn compound_values(record: &CompoundRecord) -> [Option<&str>; 6] {
    [
        record.group(),
        record.smiles(),
        record.cas(),
        record.formula(),
        record.address(),
        record.batch(),
    ]
}

/// Insert a compound.
///
/// # Errors
///
/// Returns error if the name is taken or the insert fails
pub fn insert_compound(conn: &Connection, record: &CompoundRecord) -> Result<i64> {
    let [group, smiles, cas, formula, address, batch] = compound_values(record);
    conn.execute(
        r#"INSERT INTO "compounds" ("name", "group", "smiles", "cas", "formula", "address", "batch")
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
        params![record.name(), group, smiles, cas, formula, address, batch],
    )?;
    let id = conn.last_insert_rowid();
    debug!(name = record.name(), id, "compound inserted");
    Ok(id)
}

/// Find a compound by name.
///
/// # Errors
///
/// Returns error if the lookup fails
pub fn find_compound(conn: &Connection, name: &str) -> Result<Option<CompoundRecord>> {
    let record = conn
        .query_row(
            r#"SELECT "cpd_id", "name", "group", "smiles", "cas", "formula", "address", "batch"
               FROM "compounds" WHERE "name" = ?1"#,
            [name],
            compound_from_row,
        )
        .optional()?;
    Ok(record)
}

/// Overwrite the optional columns of a compound, matched by name.
///
/// Returns `false` if no compound has this name.
///
/// # Errors
///
/// Returns error if the update fails
pub fn update_compound(conn: &Connection, record: &CompoundRecord) -> Result<bool> {
    let [group, smiles, cas, formula, address, batch] = compound_values(record);
    let changed = conn.execute(
        r#"UPDATE "compounds"
           SET "group" = ?2, "smiles" = ?3, "cas" = ?4, "formula" = ?5, "address" = ?6, "batch" = ?7
           WHERE "name" = ?1"#,
        params![record.name(), group, smiles, cas, formula, address, batch],
    )?;
    Ok(changed > 0)
}

/// Return the id of the compound with this name, creating it if absent.
///
/// # Errors
///
/// Returns error if the lookup or insert fails
pub fn resolve_or_create_compound(conn: &Connection, name: &str) -> Result<Resolution> {
    let existing: Option<i64> = conn
        .query_row(
            r#"SELECT "cpd_id" FROM "compounds" WHERE "name" = ?1"#,
            [name],
            |row| row.get(0),
        )
        .optional()?;
    match existing {
        Some(id) => Ok(Resolution::existing(id)),
        None => insert_compound(conn, &CompoundRecord::new(name)).map(Resolution::created),
    }
}

// ============================================================================
// Users
// ============================================================================

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRecord> {
    let mut record = UserRecord::new(row.get::<_, String>(1)?).with_id(row.get(0)?);
    for (i, column) in USER_COLUMNS.iter().enumerate() {
        record.set_column(column, row.get(i + 2)?);
    }
    Ok(record)
}

const USER_SELECT: &str = r#"SELECT "usr_id", "usr_name", "first_name", "middle_name", "last_name",
    "e_mail", "affiliation", "degree", "phone", "working_directory" FROM "users""#;

/// Working directory of a user: the explicit one, or `<root>/<usr_name>`.
#[must_use]
pub fn working_directory_of(record: &UserRecord, workspace_root: &Path) -> PathBuf {
    record
        .working_directory()
        .map_or_else(|| workspace_root.join(record.usr_name()), Path::to_path_buf)
}

/// Create a user's working directory if missing. Failure is logged only.
///
/// Call this after the transaction that inserted the user has committed.
pub fn create_working_directory(record: &UserRecord, workspace_root: &Path) -> PathBuf {
    let dir = working_directory_of(record, workspace_root);
    if let Err(e) = std::fs::create_dir_all(&dir) {
        warn!(user = record.usr_name(), dir = %dir.display(), error = %e, "could not create working directory");
    }
    dir
}

/// Insert a user, recording the working directory path.
///
/// The directory itself is not created here; see [`create_working_directory`].
///
/// # Errors
///
/// Returns error if the user name is taken or the insert fails
pub fn insert_user(conn: &Connection, record: &UserRecord, workspace_root: &Path) -> Result<i64> {
    let dir = working_directory_of(record, workspace_root);
    conn.execute(
        r#"INSERT INTO "users" ("usr_name", "first_name", "middle_name", "last_name", "e_mail",
               "affiliation", "degree", "phone", "working_directory")
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"#,
        params![
            record.usr_name(),
            record.first_name(),
            record.middle_name(),
            record.last_name(),
            record.e_mail(),
            record.affiliation(),
            record.degree(),
            record.phone(),
            dir.to_string_lossy(),
        ],
    )?;
    let id = conn.last_insert_rowid();
    debug!(usr_name = record.usr_name(), id, "user inserted");
    Ok(id)
}

/// Find a user by user name.
///
/// # Errors
///
/// Returns error if the lookup fails
pub fn find_user(conn: &Connection, usr_name: &str) -> Result<Option<UserRecord>> {
    let record = conn
        .query_row(
            &format!(r#"{USER_SELECT} WHERE "usr_name" = ?1"#),
            [usr_name],
            user_from_row,
        )
        .optional()?;
    Ok(record)
}

/// Overwrite the profile columns of a user, matched by user name.
///
/// A user without a working directory keeps the stored one. Returns `false`
/// if no user has this name.
///
/// # Errors
///
/// Returns error if the update fails
pub fn update_user(conn: &Connection, record: &UserRecord) -> Result<bool> {
    let dir = record
        .working_directory()
        .map(|d| d.to_string_lossy().into_owned());
    let changed = conn.execute(
        r#"UPDATE "users"
           SET "first_name" = ?2, "middle_name" = ?3, "last_name" = ?4, "e_mail" = ?5,
               "affiliation" = ?6, "degree" = ?7, "phone" = ?8,
               "working_directory" = COALESCE(?9, "working_directory")
           WHERE "usr_name" = ?1"#,
        params![
            record.usr_name(),
            record.first_name(),
            record.middle_name(),
            record.last_name(),
            record.e_mail(),
            record.affiliation(),
            record.degree(),
            record.phone(),
            dir,
        ],
    )?;
    Ok(changed > 0)
}

/// Return the id of the user with this name, creating a minimal user if
/// absent.
///
/// # Errors
///
/// Returns error if the lookup or insert fails
pub fn resolve_or_create_user(
    conn: &Connection,
    workspace_root: &Path,
    usr_name: &str,
) -> Result<Resolution> {
    let existing: Option<i64> = conn
        .query_row(
            r#"SELECT "usr_id" FROM "users" WHERE "usr_name" = ?1"#,
            [usr_name],
            |row| row.get(0),
        )
        .optional()?;
    match existing {
        Some(id) => Ok(Resolution::existing(id)),
        None => {
            insert_user(conn, &UserRecord::new(usr_name), workspace_root).map(Resolution::created)
        }
    }
}

// ============================================================================
// Routines
// ============================================================================

const ROUTINE_SELECT: &str = r#"SELECT "rtn_id", "alias", "author", "full_name", "description",
    "sop", "data_location", "data_dimension", "data_fields" FROM "routines""#;

struct RawRoutine {
    id: i64,
    alias: String,
    author: Option<String>,
    metadata: RoutineMetadata,
    data_fields: String,
}

fn raw_routine_from_row(row: &Row<'_>) -> rusqlite::Result<RawRoutine> {
    Ok(RawRoutine {
        id: row.get(0)?,
        alias: row.get(1)?,
        author: row.get(2)?,
        metadata: RoutineMetadata {
            full_name: row.get(3)?,
            description: row.get(4)?,
            sop: row.get(5)?,
            data_location: row.get(6)?,
            data_dimension: row.get(7)?,
        },
        data_fields: row.get(8)?,
    })
}

impl RawRoutine {
    fn into_record(self) -> Result<RoutineRecord> {
        let fields = FieldTypes::from_json(&self.data_fields)?;
        let mut record = RoutineRecord::new(self.alias, fields).with_id(self.id);
        record.set_author(self.author);
        record.set_metadata(self.metadata);
        Ok(record)
    }
}

/// Insert a routine row.
///
/// # Errors
///
/// Returns [`SchemaError::DuplicateRoutine`] if the alias is taken, or a
/// database error if the insert fails
pub fn insert_routine(conn: &Connection, record: &RoutineRecord) -> Result<i64> {
    if find_routine_id(conn, record.alias())?.is_some() {
        return Err(SchemaError::DuplicateRoutine(record.alias().to_string()).into());
    }
    let meta = record.metadata();
    conn.execute(
        r#"INSERT INTO "routines" ("alias", "author", "full_name", "description", "sop",
               "data_location", "data_dimension", "data_fields")
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#,
        params![
            record.alias(),
            record.author(),
            meta.full_name,
            meta.description,
            meta.sop,
            meta.data_location,
            meta.data_dimension,
            record.data_fields().to_json()?,
        ],
    )?;
    let id = conn.last_insert_rowid();
    debug!(alias = record.alias(), id, "routine inserted");
    Ok(id)
}

/// Id of a routine by alias.
///
/// # Errors
///
/// Returns error if the lookup fails
pub fn find_routine_id(conn: &Connection, alias: &str) -> Result<Option<i64>> {
    let id = conn
        .query_row(
            r#"SELECT "rtn_id" FROM "routines" WHERE "alias" = ?1"#,
            [alias],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id)
}

/// Find a routine by alias.
///
/// # Errors
///
/// Returns error if the lookup fails or the stored field types are corrupt
pub fn find_routine(conn: &Connection, alias: &str) -> Result<Option<RoutineRecord>> {
    conn.query_row(
        &format!(r#"{ROUTINE_SELECT} WHERE "alias" = ?1"#),
        [alias],
        raw_routine_from_row,
    )
    .optional()?
    .map(RawRoutine::into_record)
    .transpose()
}

/// All routines, ordered by alias.
///
/// # Errors
///
/// Returns error if the query fails or stored field types are corrupt
pub fn list_routines(conn: &Connection) -> Result<Vec<RoutineRecord>> {
    let mut stmt = conn.prepare(&format!(r#"{ROUTINE_SELECT} ORDER BY "alias""#))?;
    let raw = stmt
        .query_map([], raw_routine_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    raw.into_iter().map(RawRoutine::into_record).collect()
}

/// Overwrite the descriptive metadata of a routine.
///
/// # Errors
///
/// Returns [`SchemaError::UnknownRoutine`] if the alias does not exist
pub fn update_routine_metadata(
    conn: &Connection,
    alias: &str,
    metadata: &RoutineMetadata,
) -> Result<()> {
    let changed = conn.execute(
        r#"UPDATE "routines"
           SET "full_name" = ?2, "description" = ?3, "sop" = ?4, "data_location" = ?5,
               "data_dimension" = ?6
           WHERE "alias" = ?1"#,
        params![
            alias,
            metadata.full_name,
            metadata.description,
            metadata.sop,
            metadata.data_location,
            metadata.data_dimension,
        ],
    )?;
    if changed == 0 {
        return Err(SchemaError::UnknownRoutine(alias.to_string()).into());
    }
    Ok(())
}

/// Overwrite the stored field types of a routine.
///
/// # Errors
///
/// Returns [`SchemaError::UnknownRoutine`] if the alias does not exist
pub fn update_routine_fields(conn: &Connection, alias: &str, fields: &FieldTypes) -> Result<()> {
    let changed = conn.execute(
        r#"UPDATE "routines" SET "data_fields" = ?2 WHERE "alias" = ?1"#,
        params![alias, fields.to_json()?],
    )?;
    if changed == 0 {
        return Err(SchemaError::UnknownRoutine(alias.to_string()).into());
    }
    Ok(())
}

/// Delete a routine row and every result that references it.
///
/// Returns the number of deleted results.
///
/// # Errors
///
/// Returns error if a delete fails
pub fn delete_routine(conn: &Connection, routine_id: i64) -> Result<usize> {
    let results = conn.execute(r#"DELETE FROM "results" WHERE "routine" = ?1"#, [routine_id])?;
    conn.execute(r#"DELETE FROM "routines" WHERE "rtn_id" = ?1"#, [routine_id])?;
    Ok(results)
}

// ============================================================================
// Results
// ============================================================================

/// Insert a result metadata row.
///
/// # Errors
///
/// Returns error if a foreign key is violated or the insert fails
pub fn insert_result(conn: &Connection, record: &ResultRecord) -> Result<i64> {
    conn.execute(
        r#"INSERT INTO "results" ("sample", "user", "date", "routine", "active", "raw_data_id")
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
        params![
            record.sample_id(),
            record.user_id(),
            Value::from(record.measured_at()),
            record.routine_id(),
            record.is_active(),
            record.raw_data_ref(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Results of a routine, in id order.
///
/// # Errors
///
/// Returns error if the query fails
pub fn results_for_routine(conn: &Connection, routine_id: i64) -> Result<Vec<ResultRecord>> {
    let mut stmt = conn.prepare(
        r#"SELECT "res_id", "sample", "user", "routine", "date", "active", "raw_data_id"
           FROM "results" WHERE "routine" = ?1 ORDER BY "res_id""#,
    )?;
    let records = stmt
        .query_map([routine_id], |row| {
            let date: Option<String> = row.get(4)?;
            let active: Option<bool> = row.get(5)?;
            Ok(ResultRecord::new(row.get(1)?, row.get(2)?, row.get(3)?)
                .date(date.as_deref().and_then(parse_stored_datetime))
                .active(active.unwrap_or(true))
                .raw_data_id(row.get(6)?)
                .with_id(row.get(0)?))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(records)
}
