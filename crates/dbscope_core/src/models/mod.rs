//! Data models for dbscope.
//!
//! - `connection` - ConnectionConfig, ConnectionOptions, IdentifierQuoting
//! - `profile` - ColumnProfile, NumericSummary, TypeCategory
//! - `query` - QueryResult, ResultColumn, ColumnInfo
//! - `schema` - ColumnDescriptor, SchemaSnapshot

pub mod connection;
pub mod profile;
pub mod query;
pub mod schema;

pub use connection::{
    ConnectionConfig, ConnectionConfigBuilder, ConnectionOptions, IdentifierQuoting,
    DEFAULT_SCHEMA,
};
pub use profile::{ColumnProfile, NumericSummary, TypeCategory, NO_SUMMARY_AVAILABLE};
pub use query::{ColumnInfo, QueryResult, ResultColumn};
pub use schema::{ColumnDescriptor, SchemaSnapshot};
