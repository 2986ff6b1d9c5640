//! Connection parameters, dialect allow-list and URL construction

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConnectionError;

/// Supported database dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// Drizzle
    Drizzle,
    /// Firebird
    Firebird,
    /// Microsoft SQL Server
    Mssql,
    /// `MySQL`
    Mysql,
    /// Oracle
    Oracle,
    /// `PostgreSQL`
    Postgresql,
    /// `SQLite` (the only dialect with a built-in driver)
    Sqlite,
    /// Sybase
    Sybase,
}

impl Dialect {
    /// Every dialect in the allow-list.
    pub const ALL: [Self; 8] = [
        Self::Drizzle,
        Self::Firebird,
        Self::Mssql,
        Self::Mysql,
        Self::Oracle,
        Self::Postgresql,
        Self::Sqlite,
        Self::Sybase,
    ];

    /// URL scheme name.
    #[must_use]
    pub const fn scheme(self) -> &'static str {
        match self {
            Self::Drizzle => "drizzle",
            Self::Firebird => "firebird",
            Self::Mssql => "mssql",
            Self::Mysql => "mysql",
            Self::Oracle => "oracle",
            Self::Postgresql => "postgresql",
            Self::Sqlite => "sqlite",
            Self::Sybase => "sybase",
        }
    }

    /// Human-readable product name.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Drizzle => "Drizzle",
            Self::Firebird => "Firebird",
            Self::Mssql => "Microsoft SQL Server",
            Self::Mysql => "MySQL",
            Self::Oracle => "Oracle",
            Self::Postgresql => "PostgreSQL",
            Self::Sqlite => "SQLite",
            Self::Sybase => "Sybase",
        }
    }

    /// Default server port, `None` for file-based dialects.
    #[must_use]
    pub const fn default_port(self) -> Option<u16> {
        match self {
            Self::Drizzle => Some(4427),
            Self::Firebird => Some(3050),
            Self::Mssql => Some(1433),
            Self::Mysql => Some(3306),
            Self::Oracle => Some(1521),
            Self::Postgresql => Some(5432),
            Self::Sqlite => None,
            Self::Sybase => Some(5000),
        }
    }

    /// Whether this crate can open sessions for the dialect.
    #[must_use]
    pub const fn has_driver(self) -> bool {
        matches!(self, Self::Sqlite)
    }

    fn allow_list() -> String {
        Self::ALL
            .iter()
            .map(|d| d.scheme())
            .collect::<Vec<_>>()
            .join("', '")
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.scheme())
    }
}

impl FromStr for Dialect {
    type Err = ConnectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|d| {
                d.scheme().eq_ignore_ascii_case(wanted)
                    || d.display_name().eq_ignore_ascii_case(wanted)
            })
            .ok_or_else(|| ConnectionError::UnsupportedDialect {
                dialect: s.to_string(),
                supported: Self::allow_list(),
            })
    }
}

/// Parameters needed to open a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectParams {
    /// Database dialect
    pub dialect: Dialect,
    /// Host, optionally with `:port`
    pub host: String,
    /// User name
    pub user: String,
    /// Password (never persisted or displayed)
    pub password: String,
    /// Database name, or file path for `SQLite`
    pub database: String,
    /// Optional driver name (`dialect+driver://`)
    pub driver: Option<String>,
    /// Optional `key=value&key=value` connection options
    pub options: Option<String>,
}

impl ConnectParams {
    /// Parameters for a dialect given by name.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::UnsupportedDialect`] if the dialect is not in
    /// the allow-list
    pub fn new(
        dialect: &str,
        host: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
        database: impl Into<String>,
    ) -> Result<Self, ConnectionError> {
        Ok(Self {
            dialect: dialect.parse()?,
            host: host.into(),
            user: user.into(),
            password: password.into(),
            database: database.into(),
            driver: None,
            options: None,
        })
    }

    /// Parameters for a `SQLite` database file (empty path or `:memory:` for
    /// an in-memory database).
    #[must_use]
    pub fn sqlite(path: impl Into<String>) -> Self {
        Self {
            dialect: Dialect::Sqlite,
            host: String::new(),
            user: String::new(),
            password: String::new(),
            database: path.into(),
            driver: None,
            options: None,
        }
    }

    /// Set the driver.
    #[must_use]
    pub fn driver(mut self, driver: impl Into<String>) -> Self {
        let driver = driver.into();
        self.driver = (!driver.is_empty()).then_some(driver);
        self
    }

    /// Set the connection options.
    #[must_use]
    pub fn options(mut self, options: impl Into<String>) -> Self {
        let options = options.into();
        self.options = (!options.is_empty()).then_some(options);
        self
    }

    /// Build and validate the connection URL.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::MalformedUrl`] if a component cannot be
    /// embedded in a URL
    pub fn url(&self) -> Result<ConnectionUrl, ConnectionError> {
        let url = ConnectionUrl {
            params: self.clone(),
        };
        let malformed = |reason: String| ConnectionError::MalformedUrl {
            url: url.to_string(),
            reason,
        };

        if let Some(driver) = &self.driver {
            if !driver
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
            {
                return Err(malformed(format!("invalid driver '{driver}'")));
            }
        }
        for (label, value) in [("host", &self.host), ("user", &self.user)] {
            if let Some(bad) = value
                .chars()
                .find(|c| matches!(c, '/' | '@' | '?' | '#') || c.is_whitespace())
            {
                return Err(malformed(format!("{label} contains '{bad}'")));
            }
        }
        if let Some((_, port)) = self.host.rsplit_once(':') {
            if port.parse::<u16>().is_err() {
                return Err(malformed(format!("invalid port '{port}'")));
            }
        }
        // file-based dialects ignore the host and take a path as database
        if !self.dialect.has_driver() {
            if self.host.is_empty() {
                return Err(malformed("host is empty".to_string()));
            }
            if self.database.contains(['/', '?', '#']) {
                return Err(malformed(format!(
                    "invalid database name '{}'",
                    self.database
                )));
            }
        }
        if let Some(options) = &self.options {
            for pair in options.split('&') {
                match pair.split_once('=') {
                    Some((key, _)) if !key.is_empty() => {}
                    _ => return Err(malformed(format!("invalid option '{pair}'"))),
                }
            }
        }
        Ok(url)
    }

    /// Host and port to probe for server dialects.
    #[must_use]
    pub fn socket_target(&self) -> Option<String> {
        let port = self.dialect.default_port()?;
        if self.host.contains(':') {
            Some(self.host.clone())
        } else {
            Some(format!("{}:{port}", self.host))
        }
    }
}

/// A validated connection URL. `Display` redacts the password.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionUrl {
    params: ConnectParams,
}

impl ConnectionUrl {
    /// Parameters the URL was built from.
    #[must_use]
    pub const fn params(&self) -> &ConnectParams {
        &self.params
    }
}

impl fmt::Display for ConnectionUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let p = &self.params;
        write!(f, "{}", p.dialect.scheme())?;
        if let Some(driver) = &p.driver {
            write!(f, "+{driver}")?;
        }
        let password = if p.password.is_empty() { "" } else { "***" };
        write!(f, "://{}:{password}@{}/{}", p.user, p.host, p.database)?;
        if let Some(options) = &p.options {
            write!(f, "?{options}")?;
        }
        Ok(())
    }
}
