//! Recently used connections
//!
//! A short list of connection parameters, newest last, persisted as JSON.
//! Passwords are never stored.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ConnectParams, Dialect};
use crate::Result;

/// Maximum number of remembered connections.
pub const MAX_RECENT_CONNECTIONS: usize = 5;

/// Connection parameters without the password.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentConnection {
    /// Dialect
    pub dialect: Dialect,
    /// Host
    pub host: String,
    /// User name
    pub user: String,
    /// Database name or path
    pub database: String,
    /// Driver
    #[serde(default)]
    pub driver: Option<String>,
    /// Connection options
    #[serde(default)]
    pub options: Option<String>,
}

impl RecentConnection {
    /// Rebuild full parameters by supplying the password.
    #[must_use]
    pub fn with_password(&self, password: impl Into<String>) -> ConnectParams {
        ConnectParams {
            dialect: self.dialect,
            host: self.host.clone(),
            user: self.user.clone(),
            password: password.into(),
            database: self.database.clone(),
            driver: self.driver.clone(),
            options: self.options.clone(),
        }
    }
}

impl From<&ConnectParams> for RecentConnection {
    fn from(params: &ConnectParams) -> Self {
        Self {
            dialect: params.dialect,
            host: params.host.clone(),
            user: params.user.clone(),
            database: params.database.clone(),
            driver: params.driver.clone(),
            options: params.options.clone(),
        }
    }
}

/// Persistent list of recent connections.
#[derive(Debug, Clone)]
pub struct RecentConnections {
    path: PathBuf,
    entries: Vec<RecentConnection>,
}

impl RecentConnections {
    /// Load from `path`; a missing file yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            serde_json::from_str(&contents)?
        } else {
            Vec::new()
        };
        Ok(Self { path, entries })
    }

    /// Remembered connections, oldest first.
    #[must_use]
    pub fn entries(&self) -> &[RecentConnection] {
        &self.entries
    }

    /// Most recently used connection.
    #[must_use]
    pub fn latest(&self) -> Option<&RecentConnection> {
        self.entries.last()
    }

    /// Record a successful connection: moves an existing entry to the end
    /// and keeps at most [`MAX_RECENT_CONNECTIONS`].
    pub fn remember(&mut self, params: &ConnectParams) {
        let entry = RecentConnection::from(params);
        self.entries.retain(|e| e != &entry);
        self.entries.push(entry);
        if self.entries.len() > MAX_RECENT_CONNECTIONS {
            let excess = self.entries.len() - MAX_RECENT_CONNECTIONS;
            self.entries.drain(..excess);
        }
    }

    /// Write the list to disk, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be written
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(&self.entries)?)?;
        debug!(path = %self.path.display(), entries = self.entries.len(), "recent connections saved");
        Ok(())
    }
}
