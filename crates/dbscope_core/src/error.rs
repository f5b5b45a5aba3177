//! Error types for dbscope.
//!
//! Errors keep the PostgreSQL diagnostic intact so callers of the ad-hoc query
//! path see exactly what the server reported. Column profiling never produces
//! one of these; it degrades to [`ColumnProfile::Unavailable`] instead.
//!
//! [`ColumnProfile::Unavailable`]: crate::models::ColumnProfile::Unavailable

use std::time::Duration;
use thiserror::Error;

/// SQLSTATE reported for statements cancelled by a timeout.
pub const QUERY_CANCELED_CODE: &str = "57014";

/// Main error type for dbscope.
#[derive(Debug, Error)]
pub enum DbScopeError {
    /// Could not establish or keep a database session.
    ///
    /// Covers unreachable hosts, rejected credentials, unknown databases, and
    /// sessions that were already closed.
    #[error("Connection error: {message}")]
    Connection {
        /// Human-readable error message.
        message: String,
        /// Actionable hint for the user.
        hint: Option<String>,
        /// Optional underlying error source.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Catalog lookup failed or referenced an object that no longer exists.
    #[error("Schema error: {message}")]
    Schema {
        /// Human-readable error message.
        message: String,
        /// Table the operation was about, if any.
        table: Option<String>,
        /// Optional underlying error source.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Statement failed with PostgreSQL-specific details.
    #[error("{message}")]
    Query {
        /// PostgreSQL error message.
        message: String,
        /// Additional detail from PostgreSQL.
        detail: Option<String>,
        /// PostgreSQL hint.
        hint: Option<String>,
        /// Position in query (1-indexed).
        position: Option<usize>,
        /// PostgreSQL error code (e.g., "42P01").
        code: Option<String>,
    },

    /// Snapshot build was cancelled by the caller.
    #[error("Snapshot build cancelled after {profiled} of {total} columns")]
    Cancelled {
        /// Columns profiled before cancellation was observed.
        profiled: usize,
        /// Columns discovered for the build.
        total: usize,
    },

    /// Invalid configuration.
    #[error("Config error: {message}")]
    Config {
        /// Human-readable error message.
        message: String,
    },

    /// Unexpected internal error.
    #[error("Internal error: {message}")]
    Internal {
        /// Human-readable error message.
        message: String,
        /// Optional underlying error source.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl DbScopeError {
    // ========== Constructors ==========

    /// Create a new connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection { message: message.into(), hint: None, source: None }
    }

    /// Create a new connection error with source.
    pub fn connection_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection { message: message.into(), hint: None, source: Some(Box::new(source)) }
    }

    /// Create a new connection error with a custom hint.
    pub fn connection_with_hint(message: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::Connection { message: message.into(), hint: Some(hint.into()), source: None }
    }

    /// Error returned by every operation on a closed session.
    pub fn session_closed() -> Self {
        Self::connection_with_hint("Session is closed", "Open a new session to continue")
    }

    /// Create a new schema error.
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema { message: message.into(), table: None, source: None }
    }

    /// Create a schema error for a table that is not in the catalog.
    pub fn table_not_found(schema: &str, table: &str) -> Self {
        Self::Schema {
            message: format!("Table \"{schema}\".\"{table}\" does not exist"),
            table: Some(table.to_string()),
            source: None,
        }
    }

    /// Wrap a failure of a catalog query. Connection errors pass through.
    pub fn schema_with_source(message: impl Into<String>, source: DbScopeError) -> Self {
        match source {
            err @ Self::Connection { .. } => err,
            other => Self::Schema {
                message: message.into(),
                table: None,
                source: Some(Box::new(other)),
            },
        }
    }

    /// Create a new query error with full PostgreSQL details.
    pub fn query(
        message: impl Into<String>,
        detail: Option<String>,
        hint: Option<String>,
        position: Option<usize>,
        code: Option<String>,
    ) -> Self {
        Self::Query { message: message.into(), detail, hint, position, code }
    }

    /// Create the query error reported when a statement exceeds its timeout.
    pub fn query_timeout(timeout: Duration) -> Self {
        Self::Query {
            message: format!("Query timed out after {}ms", timeout.as_millis()),
            detail: None,
            hint: Some("Increase the query timeout or narrow the query".to_string()),
            position: None,
            code: Some(QUERY_CANCELED_CODE.to_string()),
        }
    }

    /// Create a cancelled error.
    pub fn cancelled(profiled: usize, total: usize) -> Self {
        Self::Cancelled { profiled, total }
    }

    /// Create a new config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config { message: message.into() }
    }

    /// Create a new internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into(), source: None }
    }

    // ========== Methods ==========

    /// Check if this error came from the connection layer.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }

    /// Check if this error came from a catalog lookup.
    pub fn is_schema_error(&self) -> bool {
        matches!(self, Self::Schema { .. })
    }

    /// Check if this error is a statement failure (timeouts included).
    pub fn is_query_error(&self) -> bool {
        matches!(self, Self::Query { .. })
    }

    /// Check if this error represents a timed-out statement.
    pub fn is_timeout(&self) -> bool {
        self.pg_code() == Some(QUERY_CANCELED_CODE)
    }

    /// Check if this error represents a cancelled snapshot build.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Get the error category name.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connection { .. } => "Connection",
            Self::Schema { .. } => "Schema",
            Self::Query { .. } => "Query",
            Self::Cancelled { .. } => "Cancelled",
            Self::Config { .. } => "Config",
            Self::Internal { .. } => "Internal",
        }
    }

    /// Get actionable hint for the user.
    pub fn hint(&self) -> Option<&str> {
        match self {
            Self::Connection { hint, .. } => {
                hint.as_deref().or(Some("Check that the database server is running"))
            }
            Self::Schema { .. } => Some("Refresh the snapshot; the schema may have changed"),
            Self::Query { hint, .. } => hint.as_deref(),
            Self::Cancelled { .. } => None,
            Self::Config { .. } => None,
            Self::Internal { .. } => Some("Please report this issue"),
        }
    }

    /// Get PostgreSQL error code (if applicable).
    pub fn pg_code(&self) -> Option<&str> {
        match self {
            Self::Query { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// Get position in query (if applicable).
    pub fn position(&self) -> Option<usize> {
        match self {
            Self::Query { position, .. } => *position,
            _ => None,
        }
    }

    /// Convert to user-displayable error info.
    pub fn to_error_info(&self) -> ErrorInfo {
        let error_type = format!("{} Error", self.category());
        let message = self.to_string();
        let hint = self.hint().map(String::from);

        let technical_detail = match self {
            Self::Query { detail, code, position, .. } => {
                let mut parts = Vec::new();
                if let Some(code) = code {
                    parts.push(format!("Code: {code}"));
                }
                if let Some(pos) = position {
                    parts.push(format!("Position: {pos}"));
                }
                if let Some(detail) = detail {
                    parts.push(format!("Detail: {detail}"));
                }
                if parts.is_empty() {
                    None
                } else {
                    Some(parts.join("\n"))
                }
            }
            Self::Schema { table: Some(table), .. } => Some(format!("Table: {table}")),
            _ => None,
        };

        ErrorInfo { error_type, message, hint, technical_detail }
    }
}

/// User-displayable error information.
#[derive(Debug, Clone)]
pub struct ErrorInfo {
    /// Category name (e.g., "Connection Error").
    pub error_type: String,
    /// User-friendly message.
    pub message: String,
    /// Actionable suggestion.
    pub hint: Option<String>,
    /// Technical detail for verbose output.
    pub technical_detail: Option<String>,
}

// ========== Error Conversions ==========

/// Convert from tokio_postgres::Error to DbScopeError.
impl From<tokio_postgres::Error> for DbScopeError {
    fn from(err: tokio_postgres::Error) -> Self {
        if let Some(db_err) = err.as_db_error() {
            let message = db_err.message().to_string();
            let detail = db_err.detail().map(String::from);
            let hint = db_err.hint().map(String::from);
            let position = db_err.position().and_then(|p| match p {
                tokio_postgres::error::ErrorPosition::Original(pos) => Some(*pos as usize),
                tokio_postgres::error::ErrorPosition::Internal { .. } => None,
            });
            let code_str = db_err.code().code();
            let code = Some(code_str.to_string());

            match code_str {
                "28P01" => {
                    return DbScopeError::Connection {
                        message,
                        hint: Some("Invalid password - check your credentials".to_string()),
                        source: None,
                    }
                }
                _ if code_str.starts_with("28") => {
                    return DbScopeError::Connection {
                        message,
                        hint: Some(
                            "Authentication failed - check username and permissions".to_string(),
                        ),
                        source: None,
                    }
                }
                "3D000" => {
                    return DbScopeError::Connection {
                        message,
                        hint: Some("Check the database name".to_string()),
                        source: None,
                    }
                }
                _ if code_str.starts_with("08") => {
                    return DbScopeError::Connection {
                        message,
                        hint: None,
                        source: Some(Box::new(err)),
                    }
                }
                _ => return DbScopeError::Query { message, detail, hint, position, code },
            }
        }

        if err.is_closed() {
            return DbScopeError::Connection {
                message: "Connection closed".to_string(),
                hint: Some("The server closed the session - reconnect".to_string()),
                source: Some(Box::new(err)),
            };
        }

        DbScopeError::Connection { message: err.to_string(), hint: None, source: Some(Box::new(err)) }
    }
}

/// Convert from serde_json::Error to DbScopeError.
impl From<serde_json::Error> for DbScopeError {
    fn from(err: serde_json::Error) -> Self {
        DbScopeError::Internal {
            message: format!("JSON error: {err}"),
            source: Some(Box::new(err)),
        }
    }
}
