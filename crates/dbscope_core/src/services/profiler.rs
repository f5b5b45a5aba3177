//! Column profiling.
//!
//! Each column is summarized by the strategy of its [`TypeCategory`]. Every
//! failure is absorbed here: the caller always gets a [`ColumnProfile`], with
//! `Unavailable` standing in for anything that could not be computed.

use crate::error::DbScopeError;
use crate::models::{
    ColumnDescriptor, ColumnProfile, IdentifierQuoting, NumericSummary, TypeCategory,
};
use crate::services::connection::SqlExecutor;

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

/// Options for a snapshot's profiling pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfilerOptions {
    /// Number of columns profiled concurrently. `1` profiles on the session.
    pub workers: usize,
    /// Cap on the distinct values kept per textual column (None = all).
    pub distinct_limit: Option<usize>,
}

impl Default for ProfilerOptions {
    fn default() -> Self {
        Self { workers: 1, distinct_limit: None }
    }
}

impl ProfilerOptions {
    /// Set the number of concurrent workers.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Cap the distinct values kept per textual column.
    pub fn with_distinct_limit(mut self, limit: usize) -> Self {
        self.distinct_limit = Some(limit);
        self
    }

    /// Check if profiling runs on a worker pool.
    pub fn is_parallel(&self) -> bool {
        self.workers > 1
    }
}

/// Quote an identifier for PostgreSQL, doubling embedded quotes.
pub fn quote_ident(ident: &str, quoting: IdentifierQuoting) -> String {
    match quoting {
        IdentifierQuoting::Quoted => format!("\"{}\"", ident.replace('"', "\"\"")),
        IdentifierQuoting::Verbatim => ident.to_string(),
    }
}

/// Table reference for generated SQL. Verbatim names are left unqualified.
pub fn qualified_table(schema: &str, table: &str, quoting: IdentifierQuoting) -> String {
    match quoting {
        IdentifierQuoting::Quoted => {
            format!("{}.{}", quote_ident(schema, quoting), quote_ident(table, quoting))
        }
        IdentifierQuoting::Verbatim => table.to_string(),
    }
}

/// Builds and runs the per-column profiling statements.
#[derive(Debug, Clone)]
pub struct ColumnProfiler {
    schema: String,
    quoting: IdentifierQuoting,
    distinct_limit: Option<usize>,
}

impl ColumnProfiler {
    /// Create a profiler for tables in `schema`.
    pub fn new(schema: impl Into<String>, quoting: IdentifierQuoting) -> Self {
        Self { schema: schema.into(), quoting, distinct_limit: None }
    }

    /// Cap the distinct values kept per textual column.
    pub fn with_distinct_limit(mut self, limit: Option<usize>) -> Self {
        self.distinct_limit = limit;
        self
    }

    /// SQL listing the distinct values of a textual column.
    pub fn distinct_sql(&self, descriptor: &ColumnDescriptor) -> String {
        let column = quote_ident(&descriptor.name, self.quoting);
        let mut sql = format!(
            "SELECT DISTINCT {column} FROM {} ORDER BY 1",
            qualified_table(&self.schema, &descriptor.table, self.quoting)
        );
        if let Some(limit) = self.distinct_limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        sql
    }

    /// SQL computing average, minimum, and maximum of a numeric column.
    ///
    /// MIN and MAX come back as text so `numeric` extremes arrive intact.
    pub fn summary_sql(&self, descriptor: &ColumnDescriptor) -> String {
        let column = quote_ident(&descriptor.name, self.quoting);
        format!(
            "SELECT AVG({column})::double precision AS avg, MIN({column})::text AS min, MAX({column})::text AS max FROM {}",
            qualified_table(&self.schema, &descriptor.table, self.quoting)
        )
    }

    /// Profile one column. Never fails.
    pub async fn profile(&self, exec: &dyn SqlExecutor, descriptor: &ColumnDescriptor) -> ColumnProfile {
        let category = descriptor.category();
        tracing::debug!(
            table = %descriptor.table,
            column = %descriptor.name,
            declared_type = %descriptor.declared_type,
            category = category.as_str(),
            quoting = self.quoting.as_str(),
            "Profiling column"
        );

        let result = match category {
            TypeCategory::Textual => self.distinct_values(exec, descriptor).await,
            TypeCategory::Numeric => self.numeric_summary(exec, descriptor).await,
            TypeCategory::Unclassified => return ColumnProfile::unavailable(),
        };

        match result {
            Ok(profile) => profile,
            Err(e) => {
                tracing::warn!(
                    table = %descriptor.table,
                    column = %descriptor.name,
                    error = %e,
                    code = ?e.pg_code(),
                    "Column profiling failed, no summary available"
                );
                ColumnProfile::unavailable()
            }
        }
    }

    async fn distinct_values(
        &self,
        exec: &dyn SqlExecutor,
        descriptor: &ColumnDescriptor,
    ) -> Result<ColumnProfile, DbScopeError> {
        let rows = exec.query(&self.distinct_sql(descriptor), &[]).await?;
        let values = rows
            .iter()
            .map(|row| row.try_get::<_, Option<String>>(0).map(|v| v.map_or(Value::Null, Value::String)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ColumnProfile::DistinctValues { values })
    }

    async fn numeric_summary(
        &self,
        exec: &dyn SqlExecutor,
        descriptor: &ColumnDescriptor,
    ) -> Result<ColumnProfile, DbScopeError> {
        let rows = exec.query(&self.summary_sql(descriptor), &[]).await?;
        let row = rows
            .first()
            .ok_or_else(|| DbScopeError::internal("Aggregate query returned no rows"))?;

        let avg: Option<f64> = row.try_get(0)?;
        if avg.is_some_and(|v| !v.is_finite()) {
            return Err(DbScopeError::internal("Average is not a finite number"));
        }

        let summary = NumericSummary {
            avg,
            min: row.try_get::<_, Option<String>>(1)?.as_deref().map(parse_aggregate).transpose()?,
            max: row.try_get::<_, Option<String>>(2)?.as_deref().map(parse_aggregate).transpose()?,
        };
        Ok(ColumnProfile::NumericSummary(summary))
    }
}

/// Parse a MIN or MAX rendered as text.
///
/// Integers stay exact while they fit in 64 bits. Larger or fractional values
/// become the nearest `f64`. NaN and infinities have no JSON form.
fn parse_aggregate(text: &str) -> Result<Number, DbScopeError> {
    if let Ok(n) = text.parse::<i64>() {
        return Ok(Number::from(n));
    }
    if let Ok(n) = text.parse::<u64>() {
        return Ok(Number::from(n));
    }
    text.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .ok_or_else(|| DbScopeError::internal(format!("Aggregate is not a finite number: {text}")))
}
