//! Fixed entities: compounds, users, routines, results
//!
//! ## Schema Overview
//!
//! ```text
//! UserRecord (1) ──< RoutineRecord (N)
//!      │                  │
//!      └──< ResultRecord >┘
//!                │
//!          CompoundRecord (1)
//! ```
//!
//! Compounds and users are auto-vivified during ingestion through the
//! explicit [`Resolution`]-returning `resolve_or_create_*` steps, so callers
//! can tell creation from reuse.
//!
//! ## Usage
//!
//! ```rust
//! use screening_db::connection::Database;
//! use screening_db::entity::{CompoundRecord, UserRecord};
//!
//! let mut db = Database::in_memory()?;
//! db.initialize_schema()?;
//!
//! db.register_compound(&CompoundRecord::builder("CompoundX").group("kinase").build())?;
//! let first = db.resolve_or_create_compound("CompoundX")?;
//! assert!(!first.created);
//! # Ok::<(), screening_db::Error>(())
//! ```

mod compound_record;
mod result_record;
mod routine_record;
pub mod store;
mod user_record;

pub use compound_record::{CompoundRecord, CompoundRecordBuilder};
pub use result_record::ResultRecord;
pub use routine_record::{RoutineMetadata, RoutineRecord, RoutineRecordBuilder};
pub use store::Resolution;
pub use user_record::{UserRecord, UserRecordBuilder};

use crate::connection::Database;
use crate::error::SchemaError;
use crate::Result;

impl Database {
    /// Register a compound.
    ///
    /// # Errors
    ///
    /// Returns error if not connected or the name is already taken
    pub fn register_compound(&self, record: &CompoundRecord) -> Result<i64> {
        store::insert_compound(self.connection()?, record)
    }

    /// Register a user and create their working directory.
    ///
    /// # Errors
    ///
    /// Returns error if not connected or the user name is already taken
    pub fn register_user(&self, record: &UserRecord) -> Result<i64> {
        let id = store::insert_user(self.connection()?, record, self.workspace_root())?;
        store::create_working_directory(record, self.workspace_root());
        Ok(id)
    }

    /// Id of the compound with this name, created if absent.
    ///
    /// # Errors
    ///
    /// Returns error if not connected or the database fails
    pub fn resolve_or_create_compound(&self, name: &str) -> Result<Resolution> {
        store::resolve_or_create_compound(self.connection()?, name)
    }

    /// Id of the user with this name, created if absent.
    ///
    /// # Errors
    ///
    /// Returns error if not connected or the database fails
    pub fn resolve_or_create_user(&self, usr_name: &str) -> Result<Resolution> {
        let resolution =
            store::resolve_or_create_user(self.connection()?, self.workspace_root(), usr_name)?;
        if resolution.created {
            self.create_working_directories([usr_name])?;
        }
        Ok(resolution)
    }

    /// Create the working directories of users inserted by a committed
    /// transaction.
    pub(crate) fn create_working_directories<'a>(
        &self,
        usr_names: impl IntoIterator<Item = &'a str>,
    ) -> Result<()> {
        let conn = self.connection()?;
        for usr_name in usr_names {
            if let Some(user) = store::find_user(conn, usr_name)? {
                store::create_working_directory(&user, self.workspace_root());
            }
        }
        Ok(())
    }

    /// Look up a compound.
    ///
    /// # Errors
    ///
    /// Returns error if not connected or the database fails
    pub fn find_compound(&self, name: &str) -> Result<Option<CompoundRecord>> {
        store::find_compound(self.connection()?, name)
    }

    /// Look up a user.
    ///
    /// # Errors
    ///
    /// Returns error if not connected or the database fails
    pub fn find_user(&self, usr_name: &str) -> Result<Option<UserRecord>> {
        store::find_user(self.connection()?, usr_name)
    }

    /// Look up a routine.
    ///
    /// # Errors
    ///
    /// Returns error if not connected or the database fails
    pub fn find_routine(&self, alias: &str) -> Result<Option<RoutineRecord>> {
        store::find_routine(self.connection()?, alias)
    }

    /// Update a compound's optional columns. Returns `false` if it does not
    /// exist.
    ///
    /// # Errors
    ///
    /// Returns error if not connected or the database fails
    pub fn update_compound(&self, record: &CompoundRecord) -> Result<bool> {
        store::update_compound(self.connection()?, record)
    }

    /// Update a user's profile. Returns `false` if the user does not exist.
    ///
    /// # Errors
    ///
    /// Returns error if not connected or the database fails
    pub fn update_user(&self, record: &UserRecord) -> Result<bool> {
        store::update_user(self.connection()?, record)
    }

    /// All routines, ordered by alias.
    ///
    /// # Errors
    ///
    /// Returns error if not connected or the database fails
    pub fn list_routines(&self) -> Result<Vec<RoutineRecord>> {
        store::list_routines(self.connection()?)
    }

    /// Results of a routine, in id order.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::UnknownRoutine`] if the alias does not exist
    pub fn results_for_routine(&self, alias: &str) -> Result<Vec<ResultRecord>> {
        let conn = self.connection()?;
        let id = store::find_routine_id(conn, alias)?
            .ok_or_else(|| SchemaError::UnknownRoutine(alias.to_string()))?;
        store::results_for_routine(conn, id)
    }
}
