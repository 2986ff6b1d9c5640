//! Schema registry: fixed entity tables, dynamic routine tables, reflection
//!
//! ## Layout
//!
//! ```text
//! users ──< routines (author → usr_name)
//!   │          │
//!   └──< results >── compounds
//!           │
//!           └──< <routine alias>   (one dynamic table per routine,
//!                                   link → results.res_id)
//! ```
//!
//! The [`Catalog`] is a reflection cache of the live database. It is the only
//! source of column information used by ingestion and queries, so it must be
//! refreshed after every DDL statement. Table and column lookups ignore ASCII
//! case, as SQLite identifiers do.

mod field_type;

pub use field_type::{FieldSpec, FieldType, FieldTypes, STRING_COLUMN_LENGTH};

use std::collections::BTreeMap;

use rusqlite::{Connection, OptionalExtension};
use tracing::debug;

use crate::error::SchemaError;
use crate::Result;

/// Table holding users.
pub const USERS_TABLE: &str = "users";
/// Table holding compounds.
pub const COMPOUNDS_TABLE: &str = "compounds";
/// Table holding routine definitions.
pub const ROUTINES_TABLE: &str = "routines";
/// Table holding result metadata.
pub const RESULTS_TABLE: &str = "results";

/// The four fixed tables, in creation order.
pub const FIXED_TABLES: [&str; 4] = [USERS_TABLE, COMPOUNDS_TABLE, ROUTINES_TABLE, RESULTS_TABLE];

/// System columns of every dynamic table.
pub const SYSTEM_COLUMNS: [&str; 2] = ["id", "link"];

/// Maximum routine alias length (matches `routines.alias`).
pub const MAX_ALIAS_LENGTH: usize = 20;

const FIXED_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS "users" (
    "usr_id" INTEGER PRIMARY KEY,
    "usr_name" VARCHAR(20) NOT NULL UNIQUE,
    "first_name" VARCHAR(50),
    "middle_name" VARCHAR(50),
    "last_name" VARCHAR(50),
    "e_mail" VARCHAR(100),
    "affiliation" VARCHAR(100),
    "degree" VARCHAR(50),
    "phone" VARCHAR(20),
    "working_directory" VARCHAR(200)
);
CREATE TABLE IF NOT EXISTS "compounds" (
    "cpd_id" INTEGER PRIMARY KEY,
    "name" VARCHAR(200) NOT NULL UNIQUE,
    "group" VARCHAR(200),
    "smiles" VARCHAR(50),
    "cas" VARCHAR(20),
    "formula" VARCHAR(50),
    "address" VARCHAR(50),
    "batch" VARCHAR(20)
);
CREATE TABLE IF NOT EXISTS "routines" (
    "rtn_id" INTEGER PRIMARY KEY,
    "alias" VARCHAR(20) NOT NULL UNIQUE COLLATE NOCASE,
    "author" VARCHAR(20) REFERENCES "users" ("usr_name"),
    "full_name" VARCHAR(200),
    "description" VARCHAR(200),
    "sop" VARCHAR(100),
    "data_location" VARCHAR(20),
    "data_dimension" INTEGER NOT NULL,
    "data_fields" TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS "results" (
    "res_id" INTEGER PRIMARY KEY,
    "sample" INTEGER REFERENCES "compounds" ("cpd_id"),
    "user" INTEGER REFERENCES "users" ("usr_id"),
    "date" DATETIME,
    "routine" INTEGER REFERENCES "routines" ("rtn_id"),
    "active" BOOLEAN,
    "raw_data_id" INTEGER
);
"#;

/// Quote an identifier for SQLite (`"name"`, embedded quotes doubled).
#[must_use]
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Check that a routine alias can name a table.
///
/// # Errors
///
/// Returns [`SchemaError::InvalidIdentifier`] if the alias is empty, too long,
/// not of the form `[A-Za-z_][A-Za-z0-9_]*`, or collides with a fixed table
pub fn validate_alias(alias: &str) -> std::result::Result<(), SchemaError> {
    let invalid = |reason: &str| SchemaError::InvalidIdentifier {
        name: alias.to_string(),
        reason: reason.to_string(),
    };

    let mut chars = alias.chars();
    match chars.next() {
        None => return Err(invalid("alias is empty")),
        Some(c) if !(c.is_ascii_alphabetic() || c == '_') => {
            return Err(invalid("alias must start with a letter or underscore"))
        }
        Some(_) => {}
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(invalid("alias may only contain letters, digits and underscores"));
    }
    if alias.len() > MAX_ALIAS_LENGTH {
        return Err(invalid("alias is longer than 20 characters"));
    }
    if FIXED_TABLES.iter().any(|t| t.eq_ignore_ascii_case(alias)) || alias.starts_with("sqlite_")
    {
        return Err(invalid("alias is reserved"));
    }
    Ok(())
}

/// Check that a field name can name a column of a dynamic table.
///
/// # Errors
///
/// Returns [`SchemaError::InvalidIdentifier`] if the name is blank, contains a
/// double quote, or is a system column
pub fn validate_field_name(name: &str) -> std::result::Result<(), SchemaError> {
    let invalid = |reason: &str| SchemaError::InvalidIdentifier {
        name: name.to_string(),
        reason: reason.to_string(),
    };
    if name.trim().is_empty() {
        return Err(invalid("field name is empty"));
    }
    if name.contains('"') {
        return Err(invalid("field name contains a double quote"));
    }
    if SYSTEM_COLUMNS.iter().any(|c| c.eq_ignore_ascii_case(name)) {
        return Err(invalid("field name is reserved"));
    }
    Ok(())
}

/// Reflected column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    /// Column name
    pub name: String,
    /// Declared SQL type
    pub declared_type: String,
    /// NOT NULL constraint
    pub not_null: bool,
    /// Part of the primary key
    pub primary_key: bool,
}

impl ColumnInfo {
    /// Field type implied by the declared SQL type.
    #[must_use]
    pub fn field_type(&self) -> FieldType {
        FieldType::from_sql_type(&self.declared_type)
    }
}

/// Reflected table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    /// Table name
    pub name: String,
    /// Columns in declaration order
    pub columns: Vec<ColumnInfo>,
}

impl TableInfo {
    /// Look up a column, ignoring ASCII case.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Whether the table has a column with this name, ignoring ASCII case.
    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Column names in declaration order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }
}

/// Reflection cache of the live schema, keyed by lowercased table name.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    tables: BTreeMap<String, TableInfo>,
}

fn catalog_key(name: &str) -> String {
    name.to_ascii_lowercase()
}

impl Catalog {
    /// Create an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reload every table from the database.
    ///
    /// # Errors
    ///
    /// Returns error if the schema cannot be read
    pub fn reflect(&mut self, conn: &Connection) -> Result<()> {
        let names: Vec<String> = {
            let mut stmt = conn.prepare(
                "SELECT name FROM sqlite_master \
                 WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
            )?;
            let rows = stmt.query_map([], |row| row.get(0))?;
            rows.collect::<rusqlite::Result<_>>()?
        };

        let mut tables = BTreeMap::new();
        for name in names {
            let info = reflect_table(conn, &name)?;
            tables.insert(catalog_key(&name), info);
        }
        debug!(tables = tables.len(), "schema reflected");
        self.tables = tables;
        Ok(())
    }

    /// Reload a single table (or forget it if it no longer exists).
    ///
    /// # Errors
    ///
    /// Returns error if the table definition cannot be read
    pub fn reflect_one(&mut self, conn: &Connection, name: &str) -> Result<()> {
        let stored: Option<String> = conn
            .query_row(
                "SELECT name FROM sqlite_master \
                 WHERE type = 'table' AND name = ?1 COLLATE NOCASE",
                [name],
                |row| row.get(0),
            )
            .optional()?;
        match stored {
            Some(stored) => {
                let info = reflect_table(conn, &stored)?;
                self.tables.insert(catalog_key(&stored), info);
            }
            None => {
                self.tables.remove(&catalog_key(name));
            }
        }
        Ok(())
    }

    /// Look up a table.
    #[must_use]
    pub fn table(&self, name: &str) -> Option<&TableInfo> {
        self.tables.get(&catalog_key(name))
    }

    /// Look up a table or fail with [`SchemaError::MissingTable`].
    ///
    /// # Errors
    ///
    /// Returns error if the table is not in the catalog
    pub fn require_table(&self, name: &str) -> std::result::Result<&TableInfo, SchemaError> {
        self.table(name)
            .ok_or_else(|| SchemaError::MissingTable(name.to_string()))
    }

    /// Whether a table is known, ignoring ASCII case.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(&catalog_key(name))
    }

    /// All table names as stored, sorted case-insensitively.
    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.values().map(|t| t.name.as_str())
    }

    /// Names of tables that are not fixed entity tables.
    pub fn dynamic_table_names(&self) -> impl Iterator<Item = &str> {
        self.table_names().filter(|t| !FIXED_TABLES.contains(t))
    }

    /// Number of known tables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Whether the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

fn reflect_table(conn: &Connection, name: &str) -> Result<TableInfo> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_ident(name)))?;
    let columns = stmt
        .query_map([], |row| {
            Ok(ColumnInfo {
                name: row.get(1)?,
                declared_type: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                not_null: row.get::<_, i64>(3)? != 0,
                primary_key: row.get::<_, i64>(5)? != 0,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(TableInfo {
        name: name.to_string(),
        columns,
    })
}

/// Create the four fixed tables. Safe to run repeatedly.
///
/// # Errors
///
/// Returns error if DDL execution fails
pub fn create_fixed_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(FIXED_SCHEMA)?;
    debug!("fixed tables ensured");
    Ok(())
}

/// `CREATE TABLE` statement for a routine's dynamic table.
///
/// # Errors
///
/// Returns error if the alias or a field name is invalid
pub fn dynamic_table_ddl(
    alias: &str,
    fields: &FieldTypes,
) -> std::result::Result<String, SchemaError> {
    validate_alias(alias)?;
    let mut columns = vec![
        format!("{} INTEGER PRIMARY KEY", quote_ident("id")),
        format!(
            "{} INTEGER REFERENCES {} ({})",
            quote_ident("link"),
            quote_ident(RESULTS_TABLE),
            quote_ident("res_id")
        ),
    ];
    for (i, spec) in fields.iter().enumerate() {
        validate_field_name(&spec.name)?;
        if fields
            .names()
            .take(i)
            .any(|earlier| earlier.eq_ignore_ascii_case(&spec.name))
        {
            return Err(SchemaError::InvalidIdentifier {
                name: spec.name.clone(),
                reason: "field name differs from another only in case".to_string(),
            });
        }
        columns.push(format!(
            "{} {}",
            quote_ident(&spec.name),
            spec.field_type.sql_type()
        ));
    }
    Ok(format!(
        "CREATE TABLE {} (\n    {}\n)",
        quote_ident(alias),
        columns.join(",\n    ")
    ))
}

/// Materialize a routine's dynamic table and register it in the catalog.
///
/// # Errors
///
/// Returns error if an identifier is invalid or DDL execution fails
pub fn create_dynamic_table(
    conn: &Connection,
    catalog: &mut Catalog,
    alias: &str,
    fields: &FieldTypes,
) -> Result<()> {
    let ddl = dynamic_table_ddl(alias, fields)?;
    debug!(%alias, %ddl, "creating dynamic table");
    conn.execute_batch(&ddl)?;
    catalog.reflect_one(conn, alias)
}

/// Add a column to a dynamic table and refresh its catalog entry.
///
/// # Errors
///
/// Returns error if the field name is invalid or DDL execution fails
pub fn add_column(
    conn: &Connection,
    catalog: &mut Catalog,
    alias: &str,
    name: &str,
    field_type: FieldType,
) -> Result<()> {
    validate_field_name(name)?;
    let ddl = format!(
        "ALTER TABLE {} ADD COLUMN {} {}",
        quote_ident(alias),
        quote_ident(name),
        field_type.sql_type()
    );
    debug!(%alias, %ddl, "adding column");
    conn.execute_batch(&ddl)?;
    catalog.reflect_one(conn, alias)
}

/// Drop a dynamic table and forget it.
///
/// # Errors
///
/// Returns error if DDL execution fails
pub fn drop_table(conn: &Connection, catalog: &mut Catalog, name: &str) -> Result<()> {
    conn.execute_batch(&format!("DROP TABLE IF EXISTS {}", quote_ident(name)))?;
    catalog.tables.remove(&catalog_key(name));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory() -> Connection {
        Connection::open_in_memory().unwrap()
    }

    #[test]
    fn test_fixed_tables_idempotent() {
        let conn = memory();
        create_fixed_tables(&conn).unwrap();
        let mut first = Catalog::new();
        first.reflect(&conn).unwrap();

        create_fixed_tables(&conn).unwrap();
        let mut second = Catalog::new();
        second.reflect(&conn).unwrap();

        let a: Vec<_> = first.table_names().collect();
        let b: Vec<_> = second.table_names().collect();
        assert_eq!(a, b);
        assert_eq!(a, vec!["compounds", "results", "routines", "users"]);
    }

    #[test]
    fn test_dynamic_table_columns() {
        let conn = memory();
        create_fixed_tables(&conn).unwrap();
        let mut catalog = Catalog::new();
        let fields = FieldTypes::new()
            .with("od600", FieldType::Float)
            .with("Plate 0", FieldType::String);

        create_dynamic_table(&conn, &mut catalog, "assay1", &fields).unwrap();

        let table = catalog.table("assay1").unwrap();
        let names: Vec<_> = table.column_names().collect();
        assert_eq!(names, vec!["id", "link", "od600", "Plate 0"]);
        assert_eq!(table.column("od600").unwrap().field_type(), FieldType::Float);
        assert!(table.column("id").unwrap().primary_key);
    }

    #[test]
    fn test_catalog_lookup_ignores_case() {
        let conn = memory();
        create_fixed_tables(&conn).unwrap();
        let mut catalog = Catalog::new();
        let fields = FieldTypes::new().with("od600", FieldType::Float);
        create_dynamic_table(&conn, &mut catalog, "Assay1", &fields).unwrap();

        assert!(catalog.contains("assay1"));
        assert!(catalog.contains("ASSAY1"));
        let table = catalog.table("assay1").unwrap();
        assert_eq!(table.name, "Assay1");
        assert!(table.has_column("OD600"));
        assert_eq!(table.column("Od600").unwrap().name, "od600");
        assert!(catalog.table_names().any(|t| t == "Assay1"));

        catalog.reflect(&conn).unwrap();
        assert!(catalog.contains("assay1"));
    }

    #[test]
    fn test_dynamic_table_collision_fails() {
        let conn = memory();
        create_fixed_tables(&conn).unwrap();
        let mut catalog = Catalog::new();
        let fields = FieldTypes::new().with("od600", FieldType::Float);
        create_dynamic_table(&conn, &mut catalog, "assay1", &fields).unwrap();

        let other = FieldTypes::new().with("ic50", FieldType::Float);
        assert!(create_dynamic_table(&conn, &mut catalog, "ASSAY1", &other).is_err());
        assert!(!catalog.table("assay1").unwrap().has_column("ic50"));
    }

    #[test]
    fn test_field_names_differing_in_case_rejected() {
        let fields = FieldTypes::new()
            .with("od600", FieldType::Float)
            .with("OD600", FieldType::Float);
        assert!(matches!(
            dynamic_table_ddl("assay1", &fields),
            Err(SchemaError::InvalidIdentifier { .. })
        ));
    }

    #[test]
    fn test_add_column() {
        let conn = memory();
        create_fixed_tables(&conn).unwrap();
        let mut catalog = Catalog::new();
        let fields = FieldTypes::new().with("od600", FieldType::Float);
        create_dynamic_table(&conn, &mut catalog, "assay1", &fields).unwrap();

        add_column(&conn, &mut catalog, "assay1", "valid", FieldType::Bool).unwrap();

        let table = catalog.table("assay1").unwrap();
        assert_eq!(table.column("valid").unwrap().field_type(), FieldType::Bool);
    }

    #[test]
    fn test_validate_alias() {
        assert!(validate_alias("assay1").is_ok());
        assert!(validate_alias("_x").is_ok());
        assert!(validate_alias("").is_err());
        assert!(validate_alias("1abc").is_err());
        assert!(validate_alias("a-b").is_err());
        assert!(validate_alias("Results").is_err());
        assert!(validate_alias("a_very_long_alias_name_x").is_err());
    }

    #[test]
    fn test_validate_field_name() {
        assert!(validate_field_name("Plate 0").is_ok());
        assert!(validate_field_name("id").is_err());
        assert!(validate_field_name("LINK").is_err());
        assert!(validate_field_name("a\"b").is_err());
        assert!(validate_field_name("  ").is_err());
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("group"), "\"group\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }
}
