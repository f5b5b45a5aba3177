//! Snapshot building: schema walk followed by one profile per column.

use crate::error::DbScopeError;
use crate::models::{ColumnDescriptor, ColumnProfile, SchemaSnapshot};
use crate::services::connection::{Session, SqlExecutor, WorkerPool};
use crate::services::profiler::{ColumnProfiler, ProfilerOptions};
use crate::services::schema::SchemaService;

use futures_util::stream::{self, Stream, StreamExt};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Progress of a snapshot build.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SnapshotEvent {
    /// The schema walk finished.
    Discovered {
        /// Number of tables found.
        tables: usize,
        /// Number of columns to profile.
        columns: usize,
    },
    /// One column was profiled.
    ColumnProfiled {
        /// The column.
        descriptor: ColumnDescriptor,
        /// Its profile.
        profile: ColumnProfile,
        /// Columns profiled so far, this one included.
        completed: usize,
        /// Columns in the build.
        total: usize,
    },
    /// The snapshot is built.
    Complete {
        /// Columns profiled.
        columns: usize,
        /// Columns without a summary.
        unavailable: usize,
        /// Wall time of the whole build.
        elapsed_ms: u64,
    },
}

/// One snapshot build against a session.
pub struct SnapshotBuilder<'a> {
    session: &'a Session,
    options: &'a ProfilerOptions,
    cancel: CancellationToken,
    progress: Option<mpsc::Sender<SnapshotEvent>>,
}

impl<'a> SnapshotBuilder<'a> {
    /// Create a builder for `session`.
    pub fn new(session: &'a Session, options: &'a ProfilerOptions) -> Self {
        Self { session, options, cancel: CancellationToken::new(), progress: None }
    }

    /// Abort the build when `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Stream progress events to `tx`.
    pub fn with_progress(mut self, tx: mpsc::Sender<SnapshotEvent>) -> Self {
        self.progress = Some(tx);
        self
    }

    /// Walk the schema and profile every column.
    ///
    /// Profiling failures become `Unavailable` entries. Catalog failures and
    /// cancellation abort the build.
    pub async fn build(self) -> Result<SchemaSnapshot, DbScopeError> {
        let start = Instant::now();
        let schema = self.session.config().options.schema.clone();

        tracing::debug!(
            session_id = %self.session.id(),
            schema = %schema,
            workers = self.options.workers,
            "Building snapshot"
        );

        if self.cancel.is_cancelled() {
            return Err(DbScopeError::cancelled(0, 0));
        }

        let (tables, columns_by_table, descriptors) = self.discover(&schema).await?;
        let total = descriptors.len();

        self.emit(SnapshotEvent::Discovered { tables: tables.len(), columns: total }).await;

        let profiler = ColumnProfiler::new(&schema, self.session.config().options.identifier_quoting)
            .with_distinct_limit(self.options.distinct_limit);

        let profiles = if self.options.is_parallel() && total > 1 {
            let workers = self.options.workers.min(total);
            let pool = self.session.worker_pool(workers)?;
            let profiled = self
                .collect(
                    stream::iter(descriptors)
                        .map(|d| profile_pooled(&pool, &profiler, d))
                        .buffer_unordered(workers),
                    total,
                )
                .await;
            pool.close();
            profiled?
        } else {
            let session = self.session;
            let profiler = &profiler;
            let results = stream::iter(descriptors)
                .map(|d| async move {
                    let profile = profiler.profile(session, &d).await;
                    (d, profile)
                })
                .buffered(1);
            self.collect(results, total).await?
        };

        let snapshot = SchemaSnapshot::new(schema, tables, columns_by_table, profiles);
        let elapsed_ms = start.elapsed().as_millis() as u64;

        tracing::info!(
            session_id = %self.session.id(),
            tables = snapshot.tables().len(),
            columns = snapshot.column_count(),
            unavailable = snapshot.unavailable_count(),
            elapsed_ms,
            "Snapshot built"
        );

        self.emit(SnapshotEvent::Complete {
            columns: snapshot.column_count(),
            unavailable: snapshot.unavailable_count(),
            elapsed_ms,
        })
        .await;

        Ok(snapshot)
    }

    /// Tables, their columns, and the descriptors to profile.
    ///
    /// Descriptors of tables that appeared after the table listing are left
    /// out so every profiled column belongs to a listed table.
    async fn discover(
        &self,
        schema: &str,
    ) -> Result<(BTreeSet<String>, BTreeMap<String, Vec<String>>, Vec<ColumnDescriptor>), DbScopeError>
    {
        let exec: &dyn SqlExecutor = self.session;

        let tables = SchemaService::list_tables(exec, schema).await?;

        let mut columns_by_table = BTreeMap::new();
        for table in &tables {
            if self.cancel.is_cancelled() {
                return Err(DbScopeError::cancelled(0, 0));
            }
            let columns = SchemaService::list_columns(exec, schema, table).await?;
            columns_by_table.insert(table.clone(), columns);
        }

        let descriptors = SchemaService::list_column_types(exec, schema)
            .await?
            .into_iter()
            .filter(|d| tables.contains(&d.table))
            .collect();

        Ok((tables, columns_by_table, descriptors))
    }

    /// Drain profile results, emitting progress, until done or cancelled.
    async fn collect<S>(
        &self,
        results: S,
        total: usize,
    ) -> Result<BTreeMap<ColumnDescriptor, ColumnProfile>, DbScopeError>
    where
        S: Stream<Item = (ColumnDescriptor, ColumnProfile)>,
    {
        let mut results = std::pin::pin!(results);
        let mut profiles = BTreeMap::new();

        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    tracing::info!(profiled = profiles.len(), total, "Snapshot build cancelled");
                    return Err(DbScopeError::cancelled(profiles.len(), total));
                }
                next = results.next() => next,
            };
            let Some((descriptor, profile)) = next else {
                break;
            };

            if let Some(tx) = &self.progress {
                let event = SnapshotEvent::ColumnProfiled {
                    descriptor: descriptor.clone(),
                    profile: profile.clone(),
                    completed: profiles.len() + 1,
                    total,
                };
                // A dropped receiver only stops the reporting.
                let _ = tx.send(event).await;
            }
            profiles.insert(descriptor, profile);
        }

        Ok(profiles)
    }

    async fn emit(&self, event: SnapshotEvent) {
        if let Some(tx) = &self.progress {
            let _ = tx.send(event).await;
        }
    }
}

/// Profile one column on its own pooled connection.
async fn profile_pooled(
    pool: &WorkerPool,
    profiler: &ColumnProfiler,
    descriptor: ColumnDescriptor,
) -> (ColumnDescriptor, ColumnProfile) {
    let profile = match pool.get().await {
        Ok(conn) => profiler.profile(&conn, &descriptor).await,
        Err(e) => {
            tracing::warn!(
                column = %descriptor,
                error = %e,
                "No worker connection, no summary available"
            );
            ColumnProfile::unavailable()
        }
    };
    (descriptor, profile)
}
