//! Column profile models and the type classification table.

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

/// Reason recorded for every column that could not be summarized.
pub const NO_SUMMARY_AVAILABLE: &str = "No Summary Available";

/// Profiling strategy family for a declared column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeCategory {
    /// Distinct values are listed.
    Textual,
    /// Average, minimum, and maximum are computed.
    Numeric,
    /// No strategy applies.
    Unclassified,
}

/// Declared types with a profiling strategy. Matched case-insensitively.
pub const TYPE_CLASSIFICATION: &[(&str, TypeCategory)] = &[
    ("character varying", TypeCategory::Textual),
    ("text", TypeCategory::Textual),
    ("bigint", TypeCategory::Numeric),
    ("double precision", TypeCategory::Numeric),
    ("integer", TypeCategory::Numeric),
    ("numeric", TypeCategory::Numeric),
];

impl TypeCategory {
    /// Classify an engine-reported type name.
    ///
    /// Only exact names from [`TYPE_CLASSIFICATION`] are recognized, so
    /// `character varying(20)` or `int4` fall through to `Unclassified`.
    pub fn classify(declared_type: &str) -> Self {
        TYPE_CLASSIFICATION
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(declared_type))
            .map(|(_, category)| *category)
            .unwrap_or(Self::Unclassified)
    }

    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Textual => "textual",
            Self::Numeric => "numeric",
            Self::Unclassified => "unclassified",
        }
    }
}

/// Summary of a numeric column. Every field is `None` for an empty table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericSummary {
    /// Arithmetic mean.
    pub avg: Option<f64>,
    /// Smallest value, in the column's own numeric type.
    pub min: Option<Number>,
    /// Largest value, in the column's own numeric type.
    pub max: Option<Number>,
}

impl NumericSummary {
    /// Check that `min <= avg <= max` when all three are present.
    pub fn is_ordered(&self) -> bool {
        match (self.min.as_ref().and_then(Number::as_f64), self.avg, self.max.as_ref().and_then(Number::as_f64)) {
            (Some(min), Some(avg), Some(max)) => {
                // Averages are rounded to double precision, so allow an ulp or two.
                let slack = f64::EPSILON * avg.abs().max(1.0) * 4.0;
                min <= avg + slack && avg <= max + slack
            }
            _ => true,
        }
    }
}

/// Per-column summary, shape depending on the column's type category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ColumnProfile {
    /// Every distinct value of a textual column.
    DistinctValues {
        /// Distinct values, sorted by the engine.
        values: Vec<Value>,
    },
    /// Average, minimum, and maximum of a numeric column.
    NumericSummary(NumericSummary),
    /// The column could not be summarized.
    Unavailable {
        /// Why no summary exists.
        reason: String,
    },
}

impl ColumnProfile {
    /// The standard unavailable marker.
    pub fn unavailable() -> Self {
        Self::Unavailable { reason: NO_SUMMARY_AVAILABLE.to_string() }
    }

    /// Check if a summary was produced.
    pub fn is_available(&self) -> bool {
        !matches!(self, Self::Unavailable { .. })
    }

    /// Get the distinct values, if this is a textual profile.
    pub fn distinct_values(&self) -> Option<&[Value]> {
        match self {
            Self::DistinctValues { values } => Some(values),
            _ => None,
        }
    }

    /// Get the numeric summary, if this is a numeric profile.
    pub fn numeric_summary(&self) -> Option<&NumericSummary> {
        match self {
            Self::NumericSummary(summary) => Some(summary),
            _ => None,
        }
    }
}
