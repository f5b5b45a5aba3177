//! Schema introspection service.
//!
//! Walks `information_schema` for one schema. Tables, per-table columns, and
//! the column type listing all read the same catalog views, so the two column
//! discovery paths always agree with each other.

use std::collections::BTreeSet;

use crate::error::DbScopeError;
use crate::models::ColumnDescriptor;
use crate::services::connection::SqlExecutor;

/// Schema introspection service.
pub struct SchemaService;

impl SchemaService {
    /// List every table in `schema`.
    ///
    /// Views are included, as the catalog reports them. An empty schema yields
    /// an empty set, not an error.
    pub async fn list_tables(
        exec: &dyn SqlExecutor,
        schema: &str,
    ) -> Result<BTreeSet<String>, DbScopeError> {
        tracing::debug!(schema, "Listing tables");

        let rows = exec
            .query(
                r#"
                SELECT table_name::text AS table_name
                FROM information_schema.tables
                WHERE table_schema = $1::text
                "#,
                &[&schema],
            )
            .await
            .map_err(|e| {
                tracing::warn!(schema, error = %e, "Table listing failed");
                DbScopeError::schema_with_source(format!("Failed to list tables in {schema}"), e)
            })?;

        Ok(rows.into_iter().map(|row| row.get::<_, String>("table_name")).collect())
    }

    /// List the column names of one table in declaration order.
    ///
    /// Fails with a schema error if the table is not in the catalog, e.g.
    /// because it was dropped after discovery.
    pub async fn list_columns(
        exec: &dyn SqlExecutor,
        schema: &str,
        table: &str,
    ) -> Result<Vec<String>, DbScopeError> {
        tracing::debug!(schema, table, "Listing columns");

        let exists = exec
            .query(
                r#"
                SELECT EXISTS (
                    SELECT 1 FROM information_schema.tables
                    WHERE table_schema = $1::text AND table_name = $2::text
                ) AS present
                "#,
                &[&schema, &table],
            )
            .await
            .map_err(|e| {
                DbScopeError::schema_with_source(format!("Failed to look up table {table}"), e)
            })?
            .first()
            .map(|row| row.get::<_, bool>("present"))
            .unwrap_or(false);

        if !exists {
            tracing::warn!(schema, table, "Table not found");
            return Err(DbScopeError::table_not_found(schema, table));
        }

        let rows = exec
            .query(
                r#"
                SELECT column_name::text AS column_name
                FROM information_schema.columns
                WHERE table_schema = $1::text AND table_name = $2::text
                ORDER BY ordinal_position
                "#,
                &[&schema, &table],
            )
            .await
            .map_err(|e| {
                DbScopeError::schema_with_source(format!("Failed to list columns of {table}"), e)
            })?;

        Ok(rows.into_iter().map(|row| row.get::<_, String>("column_name")).collect())
    }

    /// List every (table, column, declared type) triple in `schema`.
    ///
    /// Ordered bytewise by table name, then column name, then type, which is
    /// also the `Ord` of [`ColumnDescriptor`].
    pub async fn list_column_types(
        exec: &dyn SqlExecutor,
        schema: &str,
    ) -> Result<Vec<ColumnDescriptor>, DbScopeError> {
        tracing::debug!(schema, "Listing column types");

        let rows = exec
            .query(
                r#"
                SELECT
                    table_name::text AS table_name,
                    column_name::text AS column_name,
                    data_type::text AS data_type
                FROM information_schema.columns
                WHERE table_schema = $1::text
                ORDER BY
                    table_name::text COLLATE "C",
                    column_name::text COLLATE "C",
                    data_type::text COLLATE "C"
                "#,
                &[&schema],
            )
            .await
            .map_err(|e| {
                tracing::warn!(schema, error = %e, "Column type listing failed");
                DbScopeError::schema_with_source(format!("Failed to list columns in {schema}"), e)
            })?;

        Ok(rows
            .into_iter()
            .map(|row| ColumnDescriptor {
                table: row.get("table_name"),
                name: row.get("column_name"),
                declared_type: row.get("data_type"),
            })
            .collect())
    }
}
