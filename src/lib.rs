//! # screening-db: Laboratory Screening Data Manager
//!
//! Keeps the results of laboratory screening experiments in a relational
//! store. Each experiment type (a *routine*) declares its own data fields
//! and gets its own table; every measurement row is linked to a result that
//! records which sample was measured, by whom, when, and with which routine.
//!
//! ```text
//!   users ◄──┐          ┌──► compounds
//!            │          │
//!   routines ◄── results ──► <alias> (one dynamic table per routine)
//! ```
//!
//! ## Components
//!
//! - [`connection`]: dialect allow-list, URL construction, the [`Database`]
//!   handle and the recent-connections store
//! - [`schema`]: fixed tables, field types, dynamic table DDL, schema cache
//! - [`entity`]: compounds, users, routines and results
//! - [`routine`]: defining, extending and dropping routines
//! - [`ingest`]: result ingestion with per-row failure reports
//! - [`query`]: the filter language and its execution
//! - [`plugin`] and [`summary`]: routine modules, summaries and export
//! - [`config`] and [`logging`]: TOML configuration and log output
//!
//! ## Example
//!
//! ```
//! use screening_db::connection::Database;
//! use screening_db::entity::RoutineRecord;
//! use screening_db::ingest::Row;
//! use screening_db::schema::{FieldType, FieldTypes};
//!
//! # fn main() -> screening_db::Result<()> {
//! # let root = tempfile::tempdir()?;
//! let mut db = Database::in_memory()?.with_workspace_root(root.path());
//! db.initialize_schema()?;
//!
//! let fields = FieldTypes::new().with("od600", FieldType::Float);
//! db.define_routine(&RoutineRecord::builder("assay1", fields).author("alice").build(), None)?;
//!
//! let row = Row::new()
//!     .with("od600", 0.42)
//!     .with("sample", "CompoundX")
//!     .with("user", "alice")
//!     .with("date", "2020-01-05");
//! let report = db.ingest("assay1", &[row], &Row::new())?;
//! assert_eq!(report.committed, 1);
//!
//! let result = db.query_text(r#"Cpd.name == "CompoundX""#)?;
//! assert_eq!(result.total_rows(), 1);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod config;
pub mod connection;
pub mod entity;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod plugin;
pub mod query;
pub mod routine;
pub mod schema;
pub mod summary;
pub mod value;

pub use connection::Database;
pub use error::{Error, Result};
