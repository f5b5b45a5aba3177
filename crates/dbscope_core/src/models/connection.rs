//! Connection configuration models.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Schema profiled when none is configured.
pub const DEFAULT_SCHEMA: &str = "public";

/// How catalog-discovered identifiers are written into generated SQL.
///
/// Table and column names come from the engine's catalog, not from callers.
/// `Verbatim` interpolates them as-is, which breaks on mixed-case names and
/// is unsafe wherever identifiers could be chosen by an adversary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentifierQuoting {
    /// Double-quote identifiers and schema-qualify table names.
    #[default]
    Quoted,
    /// Interpolate identifiers unchanged.
    Verbatim,
}

impl IdentifierQuoting {
    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Quoted => "quoted",
            Self::Verbatim => "verbatim",
        }
    }
}

/// Additional connection options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionOptions {
    /// Connection timeout in seconds
    pub connect_timeout_secs: u32,
    /// Per-statement timeout in seconds (None = no timeout)
    pub query_timeout_secs: Option<u32>,
    /// Application name sent to PostgreSQL
    pub application_name: String,
    /// Schema walked by the catalog queries
    pub schema: String,
    /// Identifier handling for generated profiling SQL
    pub identifier_quoting: IdentifierQuoting,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            query_timeout_secs: Some(30),
            application_name: "dbscope".to_string(),
            schema: DEFAULT_SCHEMA.to_string(),
            identifier_quoting: IdentifierQuoting::default(),
        }
    }
}

impl ConnectionOptions {
    /// Connection timeout as a `Duration`.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.connect_timeout_secs))
    }

    /// Per-statement timeout as a `Duration`, if any.
    pub fn query_timeout(&self) -> Option<Duration> {
        self.query_timeout_secs.map(|secs| Duration::from_secs(u64::from(secs)))
    }
}

/// Configuration for a database connection.
///
/// The password is deliberately not part of this struct; it is passed to
/// [`Session::open`](crate::services::Session::open) and kept only inside the
/// driver configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Server hostname or IP
    pub host: String,
    /// Server port (default 5432)
    pub port: u16,
    /// Database name (1-63 chars)
    pub database: String,
    /// Login username
    pub username: String,
    /// Additional options
    pub options: ConnectionOptions,
}

impl ConnectionConfig {
    /// Create a new connection configuration with required fields.
    pub fn new(
        host: impl Into<String>,
        port: u16,
        database: impl Into<String>,
        username: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            database: database.into(),
            username: username.into(),
            options: ConnectionOptions::default(),
        }
    }

    /// Create a builder for complex configurations.
    pub fn builder() -> ConnectionConfigBuilder {
        ConnectionConfigBuilder::default()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.host.is_empty() {
            return Err("Host is required".to_string());
        }
        if self.port == 0 {
            return Err("Port must be between 1 and 65535".to_string());
        }
        if self.database.is_empty() || self.database.len() > 63 {
            return Err("Database name must be 1-63 characters".to_string());
        }
        if self.username.is_empty() {
            return Err("Username is required".to_string());
        }
        if self.options.schema.is_empty() {
            return Err("Schema is required".to_string());
        }
        if self.options.connect_timeout_secs == 0 {
            return Err("Connect timeout must be at least one second".to_string());
        }
        if self.options.query_timeout_secs == Some(0) {
            return Err("Query timeout must be at least one second".to_string());
        }
        Ok(())
    }

    /// Get the display connection string (without password).
    pub fn display_url(&self) -> String {
        format!("postgresql://{}@{}:{}/{}", self.username, self.host, self.port, self.database)
    }
}

/// Builder for ConnectionConfig.
#[derive(Debug, Default)]
pub struct ConnectionConfigBuilder {
    host: Option<String>,
    port: u16,
    database: Option<String>,
    username: Option<String>,
    options: ConnectionOptions,
}

impl ConnectionConfigBuilder {
    /// Set the host.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Set the port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the database name.
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Set the username.
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Set connection options.
    pub fn options(mut self, options: ConnectionOptions) -> Self {
        self.options = options;
        self
    }

    /// Set the connection timeout.
    pub fn connect_timeout_secs(mut self, secs: u32) -> Self {
        self.options.connect_timeout_secs = secs;
        self
    }

    /// Set the per-statement timeout. `None` disables it.
    pub fn query_timeout_secs(mut self, secs: Option<u32>) -> Self {
        self.options.query_timeout_secs = secs;
        self
    }

    /// Set the schema to walk.
    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.options.schema = schema.into();
        self
    }

    /// Set identifier handling for profiling SQL.
    pub fn identifier_quoting(mut self, quoting: IdentifierQuoting) -> Self {
        self.options.identifier_quoting = quoting;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> Result<ConnectionConfig, String> {
        let config = ConnectionConfig {
            host: self.host.ok_or("Host is required")?,
            port: if self.port == 0 { 5432 } else { self.port },
            database: self.database.ok_or("Database is required")?,
            username: self.username.ok_or("Username is required")?,
            options: self.options,
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = ConnectionConfig::builder()
            .host("db.example.com")
            .database("uat_db")
            .username("admin")
            .build()
            .unwrap();

        assert_eq!(config.port, 5432);
        assert_eq!(config.options.schema, DEFAULT_SCHEMA);
        assert_eq!(config.options.identifier_quoting, IdentifierQuoting::Quoted);
        assert_eq!(config.options.query_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.display_url(), "postgresql://admin@db.example.com:5432/uat_db");
    }

    #[test]
    fn test_builder_requires_fields() {
        let err = ConnectionConfig::builder().host("localhost").username("u").build();
        assert_eq!(err.unwrap_err(), "Database is required");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = ConnectionConfig::new("localhost", 5432, "db", "user");
        assert!(config.validate().is_ok());

        config.options.query_timeout_secs = Some(0);
        assert!(config.validate().is_err());

        config.options.query_timeout_secs = None;
        config.database = "x".repeat(64);
        assert_eq!(config.validate().unwrap_err(), "Database name must be 1-63 characters");

        config.database = "db".to_string();
        config.options.schema.clear();
        assert_eq!(config.validate().unwrap_err(), "Schema is required");
    }

    #[test]
    fn test_identifier_quoting_as_str() {
        assert_eq!(IdentifierQuoting::default(), IdentifierQuoting::Quoted);
        assert_eq!(IdentifierQuoting::Quoted.as_str(), "quoted");
        assert_eq!(IdentifierQuoting::Verbatim.as_str(), "verbatim");
    }

    #[test]
    fn test_display_url_never_contains_password() {
        let config = ConnectionConfig::new("localhost", 5433, "db", "reader");
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("password"));
        assert_eq!(config.display_url(), "postgresql://reader@localhost:5433/db");
    }
}
