//! Connection manager
//!
//! Owns the database session and the schema reflection cache. A [`Database`]
//! moves through three states:
//!
//! ```text
//! Disconnected ──connect()──> Connected ──initialize_schema()──> SchemaInitialized
//!       ^                         │                                   │
//!       └─────────close()─────────┴───────────────────────────────────┘
//! ```
//!
//! Only `Connected` is required to ingest into or query a schema that already
//! exists. The session is a single mutable resource: callers sharing one
//! `Database` must serialize access themselves.

mod recent;
mod url;

pub use recent::{RecentConnection, RecentConnections, MAX_RECENT_CONNECTIONS};
pub use url::{ConnectParams, ConnectionUrl, Dialect};

use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{Connection, ErrorCode, OpenFlags, Transaction};
use tracing::{debug, info, warn};

use crate::error::ConnectionError;
use crate::schema::{self, Catalog, FIXED_TABLES};
use crate::Result;

/// Default timeout for reachability probes of server dialects.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Busy timeout applied to `SQLite` sessions.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Lifecycle state of a [`Database`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No session
    Disconnected,
    /// Session open, schema not (yet) ensured by this handle
    Connected,
    /// Session open and the fixed tables exist
    SchemaInitialized,
}

/// Handle to a screening database.
pub struct Database {
    params: ConnectParams,
    connect_timeout: Duration,
    create_if_missing: bool,
    workspace_root: PathBuf,
    state: ConnectionState,
    conn: Option<Connection>,
    catalog: Catalog,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("dialect", &self.params.dialect)
            .field("database", &self.params.database)
            .field("state", &self.state)
            .field("tables", &self.catalog.len())
            .finish_non_exhaustive()
    }
}

/// Connect in one step.
///
/// # Errors
///
/// Returns [`ConnectionError`] if the URL is malformed, the host is
/// unreachable, the database is unknown, or no driver exists for the dialect
pub fn connect(params: ConnectParams) -> Result<Database> {
    let mut db = Database::new(params);
    db.connect()?;
    Ok(db)
}

impl Database {
    /// Create a disconnected handle.
    ///
    /// User working directories default to the `HOME` directory.
    #[must_use]
    pub fn new(params: ConnectParams) -> Self {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        Self {
            params,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            create_if_missing: true,
            workspace_root: PathBuf::from(home),
            state: ConnectionState::Disconnected,
            conn: None,
            catalog: Catalog::new(),
        }
    }

    /// Open a connected in-memory `SQLite` database.
    ///
    /// # Errors
    ///
    /// Returns error if `SQLite` cannot allocate the database
    pub fn in_memory() -> Result<Self> {
        connect(ConnectParams::sqlite(""))
    }

    /// Set the timeout for reachability probes.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Whether a missing `SQLite` file is created (default) or reported.
    #[must_use]
    pub const fn with_create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }

    /// Directory under which user working directories are created.
    #[must_use]
    pub fn with_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = root.into();
        self
    }

    /// Connection parameters.
    #[must_use]
    pub const fn params(&self) -> &ConnectParams {
        &self.params
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether a session is open.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        !matches!(self.state, ConnectionState::Disconnected)
    }

    /// Root for user working directories.
    #[must_use]
    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// Default working directory of a user.
    #[must_use]
    pub fn default_user_directory(&self, usr_name: &str) -> PathBuf {
        self.workspace_root.join(usr_name)
    }

    /// Schema reflection cache.
    #[must_use]
    pub const fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Open the session and load the schema cache.
    ///
    /// Connecting an already connected handle is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError`] if the URL is malformed, the host is
    /// unreachable, the database is unknown, or no driver exists for the dialect
    pub fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }
        let url = self.params.url()?;
        debug!(%url, "connecting");

        let conn = match self.params.dialect {
            Dialect::Sqlite => self.open_sqlite()?,
            dialect => {
                self.probe_host()?;
                return Err(ConnectionError::DriverUnavailable(dialect.to_string()).into());
            }
        };

        let mut catalog = Catalog::new();
        catalog.reflect(&conn)?;
        self.conn = Some(conn);
        self.catalog = catalog;
        self.state = ConnectionState::Connected;
        info!(%url, tables = self.catalog.len(), "connection established");
        Ok(())
    }

    fn open_sqlite(&self) -> Result<Connection> {
        let path = self.params.database.trim();
        let conn = if path.is_empty() || path == ":memory:" {
            Connection::open_in_memory()?
        } else {
            if !self.create_if_missing && !Path::new(path).exists() {
                return Err(ConnectionError::UnknownDatabase(path.to_string()).into());
            }
            let mut flags = OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX;
            if self.create_if_missing {
                flags |= OpenFlags::SQLITE_OPEN_CREATE;
            }
            Connection::open_with_flags(path, flags).map_err(|e| open_error(path, e))?
        };
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(|e| open_error(path, e))?;
        Ok(conn)
    }

    fn probe_host(&self) -> Result<()> {
        let Some(target) = self.params.socket_target() else {
            return Ok(());
        };
        let unreachable = |reason: String| ConnectionError::Unreachable {
            host: target.clone(),
            reason,
        };
        let addrs: Vec<_> = target
            .to_socket_addrs()
            .map_err(|e| unreachable(e.to_string()))?
            .collect();
        let mut last_error = "no address resolved".to_string();
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.connect_timeout) {
                Ok(_) => return Ok(()),
                Err(e) => last_error = e.to_string(),
            }
        }
        Err(unreachable(last_error).into())
    }

    /// Close the session. The schema cache is cleared.
    pub fn close(&mut self) {
        if let Some(conn) = self.conn.take() {
            if let Err((_, e)) = conn.close() {
                warn!(error = %e, "error while closing connection");
            }
        }
        self.catalog = Catalog::new();
        self.state = ConnectionState::Disconnected;
        info!("connection closed");
    }

    /// Create the fixed tables (`users`, `compounds`, `routines`, `results`).
    ///
    /// Idempotent: existing tables are left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::NotConnected`] without a session, or a
    /// database error if DDL fails
    pub fn initialize_schema(&mut self) -> Result<()> {
        let conn = self.connection()?;
        schema::create_fixed_tables(conn)?;
        self.reflect()?;
        self.state = ConnectionState::SchemaInitialized;
        info!("database initialized");
        Ok(())
    }

    /// Refresh the schema cache from the live database.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::NotConnected`] without a session
    pub fn reflect(&mut self) -> Result<()> {
        let (conn, catalog) = self.session()?;
        catalog.reflect(conn)
    }

    /// Drop every table (dynamic tables first) and rebuild the fixed schema.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::NotConnected`] without a session, or a
    /// database error if DDL fails
    pub fn reset_schema(&mut self) -> Result<()> {
        self.reflect()?;
        let dropped = self.transaction(|tx, catalog, _| {
            let mut order: Vec<String> =
                catalog.dynamic_table_names().map(str::to_string).collect();
            order.extend(FIXED_TABLES.iter().rev().map(|t| (*t).to_string()));
            for table in &order {
                schema::drop_table(tx, catalog, table)?;
            }
            Ok(order.len())
        })?;
        info!(dropped, "database reset");
        self.initialize_schema()
    }

    /// Borrow the open session.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::NotConnected`] without a session
    pub fn connection(&self) -> Result<&Connection> {
        self.conn
            .as_ref()
            .ok_or_else(|| ConnectionError::NotConnected.into())
    }

    /// Borrow the session mutably together with the schema cache.
    pub(crate) fn session(&mut self) -> Result<(&mut Connection, &mut Catalog)> {
        match self.conn.as_mut() {
            Some(conn) => Ok((conn, &mut self.catalog)),
            None => Err(ConnectionError::NotConnected.into()),
        }
    }

    /// Run `f` in one transaction. On error the transaction is rolled back
    /// and the schema cache reloaded, since `f` may have issued DDL.
    pub(crate) fn transaction<T>(
        &mut self,
        f: impl FnOnce(&mut Transaction<'_>, &mut Catalog, &Path) -> Result<T>,
    ) -> Result<T> {
        let conn = self.conn.as_mut().ok_or(ConnectionError::NotConnected)?;
        let catalog = &mut self.catalog;
        let mut tx = conn.transaction()?;
        match f(&mut tx, catalog, &self.workspace_root) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback() {
                    warn!(error = %e, %rollback, "rollback failed");
                }
                if let Err(reflect) = catalog.reflect(conn) {
                    warn!(error = %e, %reflect, "could not reload schema after rollback");
                }
                Err(e)
            }
        }
    }
}

fn open_error(path: &str, err: rusqlite::Error) -> crate::Error {
    match err.sqlite_error_code() {
        Some(ErrorCode::CannotOpen | ErrorCode::NotADatabase) => {
            ConnectionError::UnknownDatabase(path.to_string()).into()
        }
        Some(ErrorCode::PermissionDenied | ErrorCode::AuthorizationForStatementDenied) => {
            ConnectionError::Authentication(err.to_string()).into()
        }
        _ => err.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_transitions() {
        let mut db = Database::new(ConnectParams::sqlite(":memory:"));
        assert_eq!(db.state(), ConnectionState::Disconnected);

        db.connect().unwrap();
        assert_eq!(db.state(), ConnectionState::Connected);

        db.initialize_schema().unwrap();
        assert_eq!(db.state(), ConnectionState::SchemaInitialized);

        db.close();
        assert_eq!(db.state(), ConnectionState::Disconnected);
        assert!(db.catalog().is_empty());
    }

    #[test]
    fn test_operations_require_connection() {
        let mut db = Database::new(ConnectParams::sqlite(""));
        let err = db.initialize_schema().unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Connection(ConnectionError::NotConnected)
        ));
    }

    #[test]
    fn test_reset_schema_drops_dynamic_tables() {
        let mut db = Database::in_memory().unwrap();
        db.initialize_schema().unwrap();
        {
            let (conn, catalog) = db.session().unwrap();
            let fields = schema::FieldTypes::new().with("x", schema::FieldType::Int);
            schema::create_dynamic_table(conn, catalog, "assay1", &fields).unwrap();
        }
        assert!(db.catalog().contains("assay1"));

        db.reset_schema().unwrap();
        assert!(!db.catalog().contains("assay1"));
        assert_eq!(db.catalog().len(), FIXED_TABLES.len());
    }

    #[test]
    fn test_failed_transaction_returns_its_own_error() {
        let mut db = Database::in_memory().unwrap();
        db.initialize_schema().unwrap();

        let err = db
            .transaction(|tx, catalog, _| -> crate::Result<()> {
                let fields = schema::FieldTypes::new().with("x", schema::FieldType::Int);
                schema::create_dynamic_table(tx, catalog, "assay1", &fields)?;
                Err(crate::Error::EmptyResult)
            })
            .unwrap_err();

        assert!(matches!(err, crate::Error::EmptyResult));
        assert!(!db.catalog().contains("assay1"));
    }
}
