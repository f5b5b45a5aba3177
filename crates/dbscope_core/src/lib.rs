//! PostgreSQL schema discovery, column profiling, and ad-hoc queries.
//!
//! - **error**: Error handling with PostgreSQL-specific details
//! - **models**: Connection settings, profiles, snapshots, and query results
//! - **services**: Sessions, catalog walk, profiler, query executor
//! - **introspector**: The instance tying them together
//! - **logging**: Structured logging setup

pub mod error;
pub mod introspector;
pub mod logging;
pub mod models;
pub mod services;

pub use error::{DbScopeError, ErrorInfo};
pub use introspector::Introspector;
pub use models::{
    ColumnDescriptor, ColumnInfo, ColumnProfile, ConnectionConfig, ConnectionConfigBuilder,
    ConnectionOptions, IdentifierQuoting, NumericSummary, QueryResult, ResultColumn,
    SchemaSnapshot, TypeCategory, DEFAULT_SCHEMA, NO_SUMMARY_AVAILABLE,
};
pub use services::{
    ColumnProfiler, ProfilerOptions, QueryService, SchemaService, Session, SnapshotEvent,
    SqlExecutor,
};
