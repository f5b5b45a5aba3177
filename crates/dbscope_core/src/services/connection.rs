//! Database sessions.
//!
//! Provides:
//! - [`Session`]: one live connection, statements serialized through a mutex
//! - [`WorkerPool`]: deadpool-postgres pool handing one connection to each
//!   profiling worker
//! - [`SqlExecutor`]: the seam the schema walker, profiler, and query executor
//!   are written against
//!
//! Every statement runs under the configured query timeout. On expiry the
//! statement is cancelled server-side and the caller gets a query error.

use crate::error::DbScopeError;
use crate::models::ConnectionConfig;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod, Runtime};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_postgres::types::ToSql;
use tokio_postgres::{CancelToken, Client, NoTls, Row, SimpleQueryMessage, Statement};
use uuid::Uuid;

/// Statement execution shared by sessions and pooled worker connections.
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    /// Execute a query that returns rows.
    async fn query(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Vec<Row>, DbScopeError>;

    /// Prepare a statement, exposing its result columns before execution.
    async fn prepare(&self, sql: &str) -> Result<Statement, DbScopeError>;

    /// Run SQL over the simple protocol, receiving every value as text.
    async fn simple_query(&self, sql: &str) -> Result<Vec<SimpleQueryMessage>, DbScopeError>;
}

/// Build the driver configuration. The password lives only in here.
fn pg_config(config: &ConnectionConfig, password: &str) -> tokio_postgres::Config {
    let mut pg_config = tokio_postgres::Config::new();
    pg_config.host(&config.host);
    pg_config.port(config.port);
    pg_config.dbname(&config.database);
    pg_config.user(&config.username);
    pg_config.password(password);
    pg_config.application_name(&config.options.application_name);
    pg_config.connect_timeout(config.options.connect_timeout());
    pg_config.keepalives(true);
    pg_config.keepalives_idle(Duration::from_secs(60));
    pg_config
}

/// Failures while connecting are connection errors, whatever the SQLSTATE.
fn connect_error(err: tokio_postgres::Error) -> DbScopeError {
    match DbScopeError::from(err) {
        err @ DbScopeError::Connection { .. } => err,
        other => DbScopeError::Connection {
            message: other.to_string(),
            hint: None,
            source: Some(Box::new(other)),
        },
    }
}

/// Await a driver future under an optional timeout.
///
/// When the limit expires the statement is cancelled on the server so the
/// session is free for the next statement.
async fn run_with_timeout<T, F>(
    limit: Option<Duration>,
    cancel: CancelToken,
    fut: F,
) -> Result<T, DbScopeError>
where
    F: Future<Output = Result<T, tokio_postgres::Error>>,
{
    let Some(limit) = limit else {
        return fut.await.map_err(DbScopeError::from);
    };

    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(DbScopeError::from),
        Err(_) => {
            tracing::warn!(timeout_ms = limit.as_millis() as u64, "Statement timed out, cancelling");
            if let Err(e) = cancel.cancel_query(NoTls).await {
                tracing::warn!(error = %e, "Failed to cancel timed-out statement");
            }
            Err(DbScopeError::query_timeout(limit))
        }
    }
}

/// A single database session.
///
/// Statements are serialized: the client lock is held for exactly one
/// statement. `close` is idempotent, and dropping an open session releases
/// the connection as well.
pub struct Session {
    id: Uuid,
    config: Arc<ConnectionConfig>,
    pg_config: tokio_postgres::Config,
    client: tokio::sync::Mutex<Option<Client>>,
    driver: parking_lot::Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
    opened_at: DateTime<Utc>,
}

impl Session {
    /// Open a session and verify it with `SELECT 1`.
    ///
    /// Fails with a connection error on an unreachable host, rejected
    /// credentials, an unknown database, or connect timeout. Never retries.
    pub async fn open(config: ConnectionConfig, password: &str) -> Result<Self, DbScopeError> {
        config.validate().map_err(DbScopeError::config)?;

        let connect_timeout = config.options.connect_timeout();
        let pg_config = pg_config(&config, password);

        tracing::debug!(url = %config.display_url(), "Opening session");

        let (client, connection) =
            match tokio::time::timeout(connect_timeout, pg_config.connect(NoTls)).await {
                Ok(result) => result.map_err(connect_error)?,
                Err(_) => {
                    return Err(DbScopeError::connection_with_hint(
                        format!(
                            "Timed out connecting to {} after {}s",
                            config.display_url(),
                            connect_timeout.as_secs()
                        ),
                        "Check that the host and port are reachable",
                    ))
                }
            };

        let id = Uuid::new_v4();
        let driver = tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::warn!(session_id = %id, error = %e, "Connection ended with error");
            }
        });

        client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| DbScopeError::connection_with_source("Connection validation failed", e))?;

        tracing::info!(
            session_id = %id,
            host = %config.host,
            database = %config.database,
            "Session opened"
        );

        Ok(Self {
            id,
            config: Arc::new(config),
            pg_config,
            client: tokio::sync::Mutex::new(Some(client)),
            driver: parking_lot::Mutex::new(Some(driver)),
            closed: AtomicBool::new(false),
            opened_at: Utc::now(),
        })
    }

    /// Get the session's unique identifier.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Get the connection configuration.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Get when this session was opened.
    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    /// Per-statement timeout.
    pub fn query_timeout(&self) -> Option<Duration> {
        self.config.options.query_timeout()
    }

    /// Check if the session has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Close the session. Safe to call any number of times.
    pub async fn close(&self) {
        let client = self.client.lock().await.take();
        if client.is_none() {
            return;
        }
        self.closed.store(true, Ordering::Release);

        // Dropping the last client ends the connection future.
        drop(client);
        let driver = self.driver.lock().take();
        if let Some(driver) = driver {
            if let Err(e) = driver.await {
                tracing::warn!(session_id = %self.id, error = %e, "Connection task failed");
            }
        }

        tracing::info!(session_id = %self.id, "Session closed");
    }

    /// Create a pool of `size` extra connections with this session's settings.
    pub fn worker_pool(&self, size: usize) -> Result<WorkerPool, DbScopeError> {
        if self.is_closed() {
            return Err(DbScopeError::session_closed());
        }
        WorkerPool::new(self.pg_config.clone(), &self.config, size)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.client.get_mut().take().is_some() {
            tracing::debug!(session_id = %self.id, "Session dropped while open, releasing connection");
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("url", &self.config.display_url())
            .field("opened_at", &self.opened_at)
            .field("is_closed", &self.is_closed())
            .finish()
    }
}

#[async_trait]
impl SqlExecutor for Session {
    async fn query(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Vec<Row>, DbScopeError> {
        let guard = self.client.lock().await;
        let client = guard.as_ref().ok_or_else(DbScopeError::session_closed)?;
        run_with_timeout(self.query_timeout(), client.cancel_token(), client.query(sql, params))
            .await
    }

    async fn prepare(&self, sql: &str) -> Result<Statement, DbScopeError> {
        let guard = self.client.lock().await;
        let client = guard.as_ref().ok_or_else(DbScopeError::session_closed)?;
        run_with_timeout(self.query_timeout(), client.cancel_token(), client.prepare(sql)).await
    }

    async fn simple_query(&self, sql: &str) -> Result<Vec<SimpleQueryMessage>, DbScopeError> {
        let guard = self.client.lock().await;
        let client = guard.as_ref().ok_or_else(DbScopeError::session_closed)?;
        run_with_timeout(self.query_timeout(), client.cancel_token(), client.simple_query(sql))
            .await
    }
}

/// A pool of dedicated connections for parallel profiling.
///
/// Each worker holds its own connection for the duration of one column, so no
/// two workers ever interleave on a single session.
pub struct WorkerPool {
    pool: Pool,
    query_timeout: Option<Duration>,
}

impl WorkerPool {
    fn new(
        pg_config: tokio_postgres::Config,
        config: &ConnectionConfig,
        size: usize,
    ) -> Result<Self, DbScopeError> {
        let connect_timeout = config.options.connect_timeout();
        let manager = Manager::from_config(
            pg_config,
            NoTls,
            ManagerConfig { recycling_method: RecyclingMethod::Fast },
        );

        let pool = Pool::builder(manager)
            .max_size(size.max(1))
            .wait_timeout(Some(connect_timeout))
            .create_timeout(Some(connect_timeout))
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| DbScopeError::connection(format!("Failed to create worker pool: {e}")))?;

        tracing::debug!(size, "Worker pool created");

        Ok(Self { pool, query_timeout: config.options.query_timeout() })
    }

    /// Acquire a connection for one worker.
    pub async fn get(&self) -> Result<PooledConnection, DbScopeError> {
        let client = self.pool.get().await.map_err(|e| {
            DbScopeError::connection(format!("Failed to acquire worker connection: {e}"))
        })?;
        Ok(PooledConnection { client, query_timeout: self.query_timeout })
    }

    /// Maximum number of worker connections.
    pub fn max_size(&self) -> usize {
        self.pool.status().max_size
    }

    /// Close the pool, dropping all connections.
    pub fn close(&self) {
        self.pool.close();
        tracing::debug!("Worker pool closed");
    }
}

/// A connection acquired from a [`WorkerPool`].
///
/// Automatically returns to the pool when dropped.
pub struct PooledConnection {
    client: deadpool_postgres::Client,
    query_timeout: Option<Duration>,
}

#[async_trait]
impl SqlExecutor for PooledConnection {
    async fn query(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Vec<Row>, DbScopeError> {
        run_with_timeout(self.query_timeout, self.client.cancel_token(), self.client.query(sql, params))
            .await
    }

    async fn prepare(&self, sql: &str) -> Result<Statement, DbScopeError> {
        run_with_timeout(self.query_timeout, self.client.cancel_token(), self.client.prepare(sql))
            .await
    }

    async fn simple_query(&self, sql: &str) -> Result<Vec<SimpleQueryMessage>, DbScopeError> {
        run_with_timeout(self.query_timeout, self.client.cancel_token(), self.client.simple_query(sql))
            .await
    }
}
