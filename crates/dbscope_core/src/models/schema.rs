//! Schema discovery models.
//!
//! A [`SchemaSnapshot`] is everything one build learned about a schema:
//! the table set, column names per table in declaration order, and one
//! [`ColumnProfile`] per discovered column.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};

use crate::models::profile::{ColumnProfile, TypeCategory};

/// A column as reported by the catalog.
///
/// Ordered by table, then column name, then declared type, which is the order
/// the catalog walk returns them in.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    /// Table containing the column.
    pub table: String,
    /// Column name.
    pub name: String,
    /// Engine-reported type name (e.g. "integer", "character varying").
    pub declared_type: String,
}

impl ColumnDescriptor {
    /// Create a new descriptor.
    pub fn new(
        table: impl Into<String>,
        name: impl Into<String>,
        declared_type: impl Into<String>,
    ) -> Self {
        Self { table: table.into(), name: name.into(), declared_type: declared_type.into() }
    }

    /// Profiling category of the declared type.
    pub fn category(&self) -> TypeCategory {
        TypeCategory::classify(&self.declared_type)
    }
}

impl std::fmt::Display for ColumnDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{} ({})", self.table, self.name, self.declared_type)
    }
}

/// Everything discovered about one schema at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    schema: String,
    tables: BTreeSet<String>,
    columns_by_table: BTreeMap<String, Vec<String>>,
    #[serde(serialize_with = "serialize_profiles", deserialize_with = "deserialize_profiles")]
    profiles: BTreeMap<ColumnDescriptor, ColumnProfile>,
    captured_at: DateTime<Utc>,
}

impl SchemaSnapshot {
    /// Assemble a snapshot from the results of a completed build.
    pub fn new(
        schema: impl Into<String>,
        tables: BTreeSet<String>,
        columns_by_table: BTreeMap<String, Vec<String>>,
        profiles: BTreeMap<ColumnDescriptor, ColumnProfile>,
    ) -> Self {
        Self { schema: schema.into(), tables, columns_by_table, profiles, captured_at: Utc::now() }
    }

    /// Schema the snapshot was taken from.
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// All table names.
    pub fn tables(&self) -> &BTreeSet<String> {
        &self.tables
    }

    /// Column names for every table, in declaration order.
    pub fn columns_by_table(&self) -> &BTreeMap<String, Vec<String>> {
        &self.columns_by_table
    }

    /// Column names for one table.
    pub fn columns(&self, table: &str) -> Option<&[String]> {
        self.columns_by_table.get(table).map(Vec::as_slice)
    }

    /// Profile of every discovered column.
    pub fn profiles(&self) -> &BTreeMap<ColumnDescriptor, ColumnProfile> {
        &self.profiles
    }

    /// Profile of one column.
    pub fn profile(&self, descriptor: &ColumnDescriptor) -> Option<&ColumnProfile> {
        self.profiles.get(descriptor)
    }

    /// Profile of a column looked up by table and column name.
    pub fn find_profile(&self, table: &str, column: &str) -> Option<(&ColumnDescriptor, &ColumnProfile)> {
        self.profiles.iter().find(|(d, _)| d.table == table && d.name == column)
    }

    /// Number of profiled columns.
    pub fn column_count(&self) -> usize {
        self.profiles.len()
    }

    /// Number of columns whose profile is unavailable.
    pub fn unavailable_count(&self) -> usize {
        self.profiles.values().filter(|p| !p.is_available()).count()
    }

    /// When the build completed.
    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }
}

#[derive(Serialize, Deserialize)]
struct ProfileEntry {
    #[serde(flatten)]
    column: ColumnDescriptor,
    profile: ColumnProfile,
}

// JSON object keys must be strings, so profiles travel as a list of entries.
fn serialize_profiles<S>(
    profiles: &BTreeMap<ColumnDescriptor, ColumnProfile>,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_seq(profiles.iter().map(|(column, profile)| ProfileEntry {
        column: column.clone(),
        profile: profile.clone(),
    }))
}

fn deserialize_profiles<'de, D>(
    deserializer: D,
) -> Result<BTreeMap<ColumnDescriptor, ColumnProfile>, D::Error>
where
    D: Deserializer<'de>,
{
    let entries = Vec::<ProfileEntry>::deserialize(deserializer)?;
    Ok(entries.into_iter().map(|e| (e.column, e.profile)).collect())
}
