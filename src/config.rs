//! Configuration file
//!
//! ```toml
//! [database]
//! dialect = "sqlite"                    # sqlite, postgresql, mysql, ...
//! database = "/data/screening.db"       # file path for sqlite, name otherwise
//! host = ""                             # host[:port] for server dialects
//! user = ""
//! password_env = "SCREENING_DB_PASSWORD" # variable holding the password
//! connect_timeout_secs = 3
//! create_if_missing = true
//! initialize_schema = true
//!
//! [workspace]
//! root = "/home/lab"                    # parent of user working directories
//!
//! [ingest]
//! auto_create_routines = false
//! date_mode = "1900"                    # or "1904"
//!
//! [logging]
//! level = "info"
//! format = "compact"                    # or "full"
//! targets = { "screening_db::ingest" = "debug" }
//!
//! [recent]
//! path = "/home/lab/.screening_db/recent.json"
//! ```
//!
//! Every key is optional.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::connection::{ConnectParams, Database, Dialect, RecentConnections};
use crate::ingest::IngestOptions;
use crate::{Error, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Connection settings
    pub database: DatabaseConfig,
    /// Filesystem layout
    pub workspace: WorkspaceConfig,
    /// Ingestion defaults
    pub ingest: IngestOptions,
    /// Log output
    pub logging: LoggingConfig,
    /// Recent-connections store
    pub recent: RecentConfig,
}

/// `[database]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Dialect from the allow-list
    pub dialect: Dialect,
    /// Host, optionally with `:port`
    pub host: String,
    /// User name
    pub user: String,
    /// Environment variable holding the password
    pub password_env: Option<String>,
    /// Database name or `SQLite` file
    pub database: String,
    /// Driver suffix (`dialect+driver://`)
    pub driver: Option<String>,
    /// `key=value&...` connection options
    pub options: Option<String>,
    /// Reachability probe timeout for server dialects
    pub connect_timeout_secs: u64,
    /// Create a missing `SQLite` file
    pub create_if_missing: bool,
    /// Create the fixed tables after connecting
    pub initialize_schema: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            dialect: Dialect::Sqlite,
            host: String::new(),
            user: String::new(),
            password_env: None,
            database: "screening.db".to_string(),
            driver: None,
            options: None,
            connect_timeout_secs: 3,
            create_if_missing: true,
            initialize_schema: true,
        }
    }
}

impl DatabaseConfig {
    /// Connection parameters, reading the password from `password_env`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the password variable is not set
    pub fn params(&self) -> Result<ConnectParams> {
        let password = match &self.password_env {
            Some(var) => std::env::var(var)
                .map_err(|_| Error::Config(format!("environment variable '{var}' is not set")))?,
            None => String::new(),
        };
        Ok(ConnectParams {
            dialect: self.dialect,
            host: self.host.clone(),
            user: self.user.clone(),
            password,
            database: self.database.clone(),
            driver: self.driver.clone(),
            options: self.options.clone(),
        })
    }
}

/// `[workspace]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Parent of user working directories; `HOME` when unset
    pub root: Option<PathBuf>,
}

/// Log line layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Single-line events
    #[default]
    Compact,
    /// Default `tracing-subscriber` layout with span context
    Full,
}

/// `[logging]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level (`error`, `warn`, `info`, `debug`, `trace`)
    pub level: String,
    /// Line layout
    pub format: LogFormat,
    /// Colored output
    pub ansi: bool,
    /// Per-target level overrides
    pub targets: BTreeMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
            ansi: true,
            targets: BTreeMap::new(),
        }
    }
}

impl LoggingConfig {
    /// Filter directive string, e.g. `info,screening_db::ingest=debug`.
    #[must_use]
    pub fn directives(&self) -> String {
        std::iter::once(self.level.clone())
            .chain(self.targets.iter().map(|(target, level)| format!("{target}={level}")))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// `[recent]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecentConfig {
    /// Store location; `<workspace root>/.screening_db/recent.json` when unset
    pub path: Option<PathBuf>,
}

impl Config {
    /// Parse configuration text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the text is not valid TOML for this schema
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    /// Read a configuration file. A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file exists but cannot be read, or
    /// [`Error::Config`] if it does not parse
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(path = %path.display(), "no configuration file, using defaults");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text).map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    /// Serialize to TOML.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if serialization fails
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    /// Open the configured database.
    ///
    /// # Errors
    ///
    /// Returns a connection error if the database cannot be reached, or a
    /// schema error if the fixed tables cannot be created
    pub fn connect(&self) -> Result<Database> {
        let params = self.database.params()?;
        let mut db = Database::new(params)
            .with_connect_timeout(Duration::from_secs(self.database.connect_timeout_secs))
            .with_create_if_missing(self.database.create_if_missing);
        if let Some(root) = &self.workspace.root {
            db = db.with_workspace_root(root);
        }
        db.connect()?;
        if self.database.initialize_schema {
            db.initialize_schema()?;
        }
        Ok(db)
    }

    /// Location of the recent-connections store.
    #[must_use]
    pub fn recent_path(&self) -> PathBuf {
        self.recent.path.clone().unwrap_or_else(|| {
            let root = self.workspace.root.clone().unwrap_or_else(|| {
                PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".to_string()))
            });
            root.join(".screening_db").join("recent.json")
        })
    }

    /// Load the recent-connections store.
    ///
    /// # Errors
    ///
    /// Returns error if the store exists but cannot be read
    pub fn recent_connections(&self) -> Result<RecentConnections> {
        RecentConnections::load(self.recent_path())
    }
}
