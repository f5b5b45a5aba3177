//! Ad-hoc query execution.
//!
//! SQL is sent verbatim. Column metadata comes from the prepared statement so
//! even an empty result knows its column names. Rows are fetched in text
//! format and converted per column type, so every type has a rendering and a
//! column's values share one JSON type.

use crate::error::DbScopeError;
use crate::models::{ColumnInfo, QueryResult};
use crate::services::connection::SqlExecutor;

use serde_json::{Number, Value};
use std::time::Instant;
use tokio_postgres::types::{Kind, Type};
use tokio_postgres::{SimpleQueryMessage, SimpleQueryRow};

/// Longest SQL prefix written to logs.
const LOGGED_SQL_CHARS: usize = 100;

/// Service for executing caller-supplied SQL.
pub struct QueryService;

impl QueryService {
    /// Execute `sql` and return its result set.
    ///
    /// Engine errors come back as query errors with the server's diagnostic
    /// untouched. No retry, no caching, no row limit.
    pub async fn execute(exec: &dyn SqlExecutor, sql: &str) -> Result<QueryResult, DbScopeError> {
        let start = Instant::now();
        let sql_preview = truncate_sql(sql, LOGGED_SQL_CHARS);

        tracing::debug!(sql = %sql_preview, "Executing query");

        match Self::run(exec, sql).await {
            Ok(mut result) => {
                result.execution_time_ms = start.elapsed().as_millis() as u64;
                tracing::debug!(
                    row_count = result.row_count(),
                    rows_affected = ?result.rows_affected,
                    execution_time_ms = result.execution_time_ms,
                    "Query completed"
                );
                Ok(result)
            }
            Err(e) => {
                tracing::warn!(
                    sql = %sql_preview,
                    error = %e,
                    code = ?e.pg_code(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Query failed"
                );
                Err(e)
            }
        }
    }

    async fn run(exec: &dyn SqlExecutor, sql: &str) -> Result<QueryResult, DbScopeError> {
        let statement = exec.prepare(sql).await?;

        let types: Vec<Type> = statement.columns().iter().map(|col| col.type_().clone()).collect();
        let columns: Vec<ColumnInfo> = statement
            .columns()
            .iter()
            .map(|col| ColumnInfo {
                name: col.name().to_string(),
                type_oid: col.type_().oid(),
                type_name: col.type_().name().to_string(),
            })
            .collect();
        let mut result = QueryResult::new(columns);

        // Prepare rejects multi-statement text, so exactly one statement runs here.
        let mut completed = None;
        for message in exec.simple_query(sql).await? {
            match message {
                SimpleQueryMessage::Row(row) => {
                    result.push_row(decode_row(&row, &types)).map_err(DbScopeError::internal)?;
                }
                SimpleQueryMessage::CommandComplete(count) => completed = Some(count),
                _ => {}
            }
        }

        if types.is_empty() {
            result.rows_affected = completed;
        }
        Ok(result)
    }
}

/// Truncate SQL for logging, on a character boundary.
fn truncate_sql(sql: &str, max_chars: usize) -> String {
    let sql = sql.trim();
    match sql.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &sql[..idx]),
        None => sql.to_string(),
    }
}

/// Convert one text-format row to JSON values, one per column.
fn decode_row(row: &SimpleQueryRow, types: &[Type]) -> Vec<Value> {
    types
        .iter()
        .take(row.len())
        .enumerate()
        .map(|(i, ty)| match row.get(i) {
            Some(text) => decode_text(ty, text),
            None => Value::Null,
        })
        .collect()
}

/// Convert the server's text rendering of a value to JSON.
///
/// Booleans, integers, floats, and json keep their JSON shape. `numeric` stays
/// an exact decimal string. Non-finite floats become null, as serde_json does
/// for `f64`. One-dimensional arrays of those types become JSON arrays.
/// Anything else is the server's own text, e.g. `\x00ff` for bytea.
fn decode_text(ty: &Type, text: &str) -> Value {
    match *ty {
        Type::BOOL => Value::Bool(text == "t"),
        Type::INT2 | Type::INT4 | Type::INT8 | Type::OID => text
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(text.to_string())),
        Type::FLOAT4 | Type::FLOAT8 => text
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map_or(Value::Null, Value::Number),
        Type::JSON | Type::JSONB => {
            serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
        }
        _ => match ty.kind() {
            Kind::Array(element) if has_array_form(element) => match parse_array(text) {
                Some(items) => Value::Array(
                    items
                        .into_iter()
                        .map(|item| item.map_or(Value::Null, |s| decode_text(element, &s)))
                        .collect(),
                ),
                None => Value::String(text.to_string()),
            },
            _ => Value::String(text.to_string()),
        },
    }
}

/// Element types whose arrays are returned as JSON arrays.
fn has_array_form(element: &Type) -> bool {
    matches!(
        *element,
        Type::BOOL
            | Type::INT2
            | Type::INT4
            | Type::INT8
            | Type::OID
            | Type::FLOAT4
            | Type::FLOAT8
            | Type::NUMERIC
            | Type::TEXT
            | Type::VARCHAR
            | Type::BPCHAR
            | Type::NAME
            | Type::UUID
            | Type::JSON
            | Type::JSONB
            | Type::DATE
            | Type::TIME
            | Type::TIMESTAMP
            | Type::TIMESTAMPTZ
    )
}

/// Split a one-dimensional array literal such as `{1,NULL,"a b"}`.
///
/// Returns `None` for nested arrays, explicit bounds, or malformed input.
fn parse_array(text: &str) -> Option<Vec<Option<String>>> {
    let inner = text.strip_prefix('{')?.strip_suffix('}')?;
    let mut items = Vec::new();
    if inner.is_empty() {
        return Some(items);
    }

    let mut chars = inner.chars().peekable();
    loop {
        let item = if chars.peek() == Some(&'"') {
            chars.next();
            let mut item = String::new();
            loop {
                match chars.next()? {
                    '\\' => item.push(chars.next()?),
                    '"' => break,
                    c => item.push(c),
                }
            }
            Some(item)
        } else {
            let mut item = String::new();
            while let Some(&c) = chars.peek() {
                match c {
                    ',' => break,
                    '{' | '}' | '"' => return None,
                    _ => {
                        item.push(c);
                        chars.next();
                    }
                }
            }
            // Unquoted NULL is the null element; a quoted "NULL" is text.
            (item != "NULL").then_some(item)
        };
        items.push(item);

        match chars.next() {
            None => return Some(items),
            Some(',') => continue,
            Some(_) => return None,
        }
    }
}
