//! The introspection instance.
//!
//! Owns one [`Session`] and the latest [`SchemaSnapshot`]. Snapshots are built
//! off to the side and swapped in whole, so readers only ever see a complete
//! snapshot or none.

use crate::error::DbScopeError;
use crate::models::{ColumnDescriptor, ColumnProfile, ConnectionConfig, QueryResult, SchemaSnapshot};
use crate::services::connection::Session;
use crate::services::profiler::{ColumnProfiler, ProfilerOptions};
use crate::services::query::QueryService;
use crate::services::schema::SchemaService;
use crate::services::snapshot::{SnapshotBuilder, SnapshotEvent};

use parking_lot::{Mutex, RwLock};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Schema discovery, column profiling, and ad-hoc queries over one session.
pub struct Introspector {
    session: Session,
    options: ProfilerOptions,
    snapshot: RwLock<Option<Arc<SchemaSnapshot>>>,
    build_token: Mutex<CancellationToken>,
}

impl Introspector {
    /// Connect without building a snapshot.
    pub async fn connect(config: ConnectionConfig, password: &str) -> Result<Self, DbScopeError> {
        let session = Session::open(config, password).await?;
        Ok(Self::with_session(session))
    }

    /// Connect and build the initial snapshot.
    ///
    /// The session is closed again if the build fails.
    pub async fn open(
        config: ConnectionConfig,
        password: &str,
        options: ProfilerOptions,
    ) -> Result<Self, DbScopeError> {
        let introspector = Self::connect(config, password).await?.with_options(options);
        if let Err(e) = introspector.build_snapshot().await {
            introspector.close().await;
            return Err(e);
        }
        Ok(introspector)
    }

    /// Wrap an open session.
    pub fn with_session(session: Session) -> Self {
        Self {
            session,
            options: ProfilerOptions::default(),
            snapshot: RwLock::new(None),
            build_token: Mutex::new(CancellationToken::new()),
        }
    }

    /// Set the profiling options used by later builds.
    pub fn with_options(mut self, options: ProfilerOptions) -> Self {
        self.options = options;
        self
    }

    /// Get the underlying session.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Get the profiling options.
    pub fn options(&self) -> &ProfilerOptions {
        &self.options
    }

    /// Get the current snapshot, if one has been built.
    pub fn snapshot(&self) -> Option<Arc<SchemaSnapshot>> {
        self.snapshot.read().clone()
    }

    /// Build a snapshot and make it current.
    pub async fn build_snapshot(&self) -> Result<Arc<SchemaSnapshot>, DbScopeError> {
        self.run_build(None, self.next_build_token()).await
    }

    /// Build a snapshot, streaming progress events to `tx`.
    pub async fn build_snapshot_with_progress(
        &self,
        tx: mpsc::Sender<SnapshotEvent>,
    ) -> Result<Arc<SchemaSnapshot>, DbScopeError> {
        self.run_build(Some(tx), self.next_build_token()).await
    }

    /// Build a snapshot that aborts when `cancel` fires.
    ///
    /// A cancelled build leaves the previous snapshot current.
    pub async fn build_snapshot_with_cancellation(
        &self,
        cancel: CancellationToken,
        progress: Option<mpsc::Sender<SnapshotEvent>>,
    ) -> Result<Arc<SchemaSnapshot>, DbScopeError> {
        *self.build_token.lock() = cancel.clone();
        self.run_build(progress, cancel).await
    }

    /// Cancel the build in progress, if any.
    pub fn cancel_build(&self) {
        self.build_token.lock().cancel();
    }

    /// Rebuild the snapshot after the schema or data changed.
    pub async fn refresh(&self) -> Result<Arc<SchemaSnapshot>, DbScopeError> {
        tracing::info!(session_id = %self.session.id(), "Refreshing snapshot");
        self.build_snapshot().await
    }

    fn next_build_token(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self.build_token.lock() = token.clone();
        token
    }

    async fn run_build(
        &self,
        progress: Option<mpsc::Sender<SnapshotEvent>>,
        cancel: CancellationToken,
    ) -> Result<Arc<SchemaSnapshot>, DbScopeError> {
        let mut builder =
            SnapshotBuilder::new(&self.session, &self.options).with_cancellation(cancel);
        if let Some(tx) = progress {
            builder = builder.with_progress(tx);
        }

        let snapshot = Arc::new(builder.build().await?);
        *self.snapshot.write() = Some(Arc::clone(&snapshot));
        Ok(snapshot)
    }

    /// List tables in the configured schema, live.
    pub async fn tables(&self) -> Result<BTreeSet<String>, DbScopeError> {
        SchemaService::list_tables(&self.session, self.schema()).await
    }

    /// List the columns of one table in declaration order, live.
    pub async fn columns(&self, table: &str) -> Result<Vec<String>, DbScopeError> {
        SchemaService::list_columns(&self.session, self.schema(), table).await
    }

    /// List every column with its declared type, live.
    pub async fn column_types(&self) -> Result<Vec<ColumnDescriptor>, DbScopeError> {
        SchemaService::list_column_types(&self.session, self.schema()).await
    }

    /// Profile a single column on the session.
    pub async fn profile(&self, descriptor: &ColumnDescriptor) -> ColumnProfile {
        self.profiler().profile(&self.session, descriptor).await
    }

    /// Look up a column by name and profile it.
    ///
    /// Fails with a schema error if the column does not exist.
    pub async fn profile_column(
        &self,
        table: &str,
        column: &str,
    ) -> Result<(ColumnDescriptor, ColumnProfile), DbScopeError> {
        let descriptor = self
            .column_types()
            .await?
            .into_iter()
            .find(|d| d.table == table && d.name == column)
            .ok_or_else(|| {
                DbScopeError::schema(format!(
                    "Column {column} not found in {}.{table}",
                    self.schema()
                ))
            })?;
        let profile = self.profile(&descriptor).await;
        Ok((descriptor, profile))
    }

    /// Execute caller-supplied SQL.
    pub async fn query(&self, sql: &str) -> Result<QueryResult, DbScopeError> {
        QueryService::execute(&self.session, sql).await
    }

    /// Close the session. Safe to call any number of times.
    pub async fn close(&self) {
        self.cancel_build();
        self.session.close().await;
    }

    /// Check if the session has been closed.
    pub fn is_closed(&self) -> bool {
        self.session.is_closed()
    }

    fn schema(&self) -> &str {
        &self.session.config().options.schema
    }

    fn profiler(&self) -> ColumnProfiler {
        let options = &self.session.config().options;
        ColumnProfiler::new(&options.schema, options.identifier_quoting)
            .with_distinct_limit(self.options.distinct_limit)
    }
}

impl std::fmt::Debug for Introspector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Introspector")
            .field("session", &self.session)
            .field("options", &self.options)
            .field("has_snapshot", &self.snapshot.read().is_some())
            .finish()
    }
}
