//! Plain-text rendering of results.

use dbscope_core::{ColumnDescriptor, ColumnProfile, QueryResult, SchemaSnapshot};
use serde_json::Value;
use std::fmt::Write;

/// Render a scalar the way psql would show it.
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn format_optional(value: Option<String>) -> String {
    value.unwrap_or_else(|| "NULL".to_string())
}

/// One-line summary of a profile.
pub fn format_profile(profile: &ColumnProfile) -> String {
    match profile {
        ColumnProfile::DistinctValues { values } => {
            let rendered: Vec<String> = values.iter().map(format_value).collect();
            format!("{} distinct: {}", values.len(), rendered.join(", "))
        }
        ColumnProfile::NumericSummary(summary) => format!(
            "avg={} min={} max={}",
            format_optional(summary.avg.map(|v| v.to_string())),
            format_optional(summary.min.as_ref().map(|v| v.to_string())),
            format_optional(summary.max.as_ref().map(|v| v.to_string())),
        ),
        ColumnProfile::Unavailable { reason } => reason.clone(),
    }
}

/// Render one profiled column.
pub fn format_profiled_column(descriptor: &ColumnDescriptor, profile: &ColumnProfile) -> String {
    format!("{descriptor}: {}", format_profile(profile))
}

/// Render a snapshot grouped by table.
pub fn format_snapshot(snapshot: &SchemaSnapshot) -> String {
    let mut out = String::new();
    for table in snapshot.tables() {
        let _ = writeln!(out, "{table}");
        for column in snapshot.columns(table).unwrap_or_default() {
            match snapshot.find_profile(table, column) {
                Some((descriptor, profile)) => {
                    let _ = writeln!(
                        out,
                        "  {column} ({}): {}",
                        descriptor.declared_type,
                        format_profile(profile)
                    );
                }
                None => {
                    let _ = writeln!(out, "  {column}");
                }
            }
        }
    }
    let _ = write!(
        out,
        "{} tables, {} columns, {} without summary",
        snapshot.tables().len(),
        snapshot.column_count(),
        snapshot.unavailable_count()
    );
    out
}

/// Render a result as tab-separated lines with a header.
pub fn format_query_result(result: &QueryResult) -> String {
    if result.columns().is_empty() {
        return match result.rows_affected {
            Some(n) => format!("{n} rows affected"),
            None => "OK".to_string(),
        };
    }

    let mut out = result.column_names().join("\t");
    for row in result.rows() {
        out.push('\n');
        let cells: Vec<String> = row.into_iter().map(format_value).collect();
        out.push_str(&cells.join("\t"));
    }
    let _ = write!(
        out,
        "\n({} {}, {} ms)",
        result.row_count(),
        if result.row_count() == 1 { "row" } else { "rows" },
        result.execution_time_ms
    );
    out
}
