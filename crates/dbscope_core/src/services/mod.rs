//! Service layer for dbscope.
//!
//! - `connection` - Sessions, worker pools, and the `SqlExecutor` seam
//! - `schema` - Catalog walk over `information_schema`
//! - `profiler` - Type-driven column profiling
//! - `query` - Ad-hoc query execution and value decoding
//! - `snapshot` - Snapshot builds with progress and cancellation

pub mod connection;
pub mod profiler;
pub mod query;
pub mod schema;
pub mod snapshot;

pub use connection::{PooledConnection, Session, SqlExecutor, WorkerPool};
pub use profiler::{ColumnProfiler, ProfilerOptions};
pub use query::QueryService;
pub use schema::SchemaService;
pub use snapshot::{SnapshotBuilder, SnapshotEvent};
