//! Grid, schema and table types shared by every pipeline stage.

use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A single untyped spreadsheet cell as read from the uploaded workbook.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CellValue {
    #[default]
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    Date(NaiveDateTime),
}

impl CellValue {
    /// Builds a text cell, collapsing whitespace-only input to [`CellValue::Empty`].
    pub fn text(value: impl Into<String>) -> Self {
        let value = value.into();
        if value.trim().is_empty() {
            CellValue::Empty
        } else {
            CellValue::Text(value)
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(value) => value.trim().is_empty(),
            _ => false,
        }
    }

    /// Lowercased, trimmed text used by every keyword comparison.
    pub fn match_text(&self) -> String {
        self.to_string().trim().to_lowercase()
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(value) => Some(*value),
            CellValue::Text(value) => value.trim().replace(',', "").parse().ok(),
            _ => None,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Text(value) => f.write_str(value),
            CellValue::Number(value) => {
                if value.fract() == 0.0 && value.abs() < 1e15 {
                    write!(f, "{}", *value as i64)
                } else {
                    write!(f, "{value}")
                }
            }
            CellValue::Bool(value) => write!(f, "{value}"),
            CellValue::Date(value) => write!(f, "{}", value.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}

/// The literal contents of an uploaded sheet with no assumed header.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawGrid {
    pub rows: Vec<Vec<CellValue>>,
}

impl RawGrid {
    pub fn new(rows: Vec<Vec<CellValue>>) -> Self {
        Self { rows }
    }

    /// Convenience constructor used heavily by tests: every non-empty string
    /// becomes a text cell and numeric-looking strings stay text.
    pub fn from_strings<R, S>(rows: impl IntoIterator<Item = R>) -> Self
    where
        R: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let rows = rows
            .into_iter()
            .map(|row| row.into_iter().map(|cell| CellValue::text(cell.as_ref())).collect())
            .collect();
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, index: usize) -> Option<&[CellValue]> {
        self.rows.get(index).map(Vec::as_slice)
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&CellValue> {
        self.rows.get(row).and_then(|cells| cells.get(col))
    }
}

/// How a canonical column obtains its values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    /// Read from the matching source column.
    #[default]
    Sourced,
    /// Filled by a post-processing step.
    Derived,
    /// Written as a live spreadsheet formula; `{row}` expands to the 1-based
    /// output row number.
    Formula {
        template: String,
        #[serde(default)]
        num_format: Option<String>,
    },
}

/// A canonical output column and the keyword fragments that recognise it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalColumn {
    pub name: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub kind: ColumnKind,
}

impl CanonicalColumn {
    /// A sourced column recognised by its own lowercase name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            keywords: Vec::new(),
            kind: ColumnKind::Sourced,
        }
    }

    pub fn with_keywords(name: impl Into<String>, keywords: &[&str]) -> Self {
        Self {
            name: name.into(),
            keywords: keywords.iter().map(|kw| kw.to_string()).collect(),
            kind: ColumnKind::Sourced,
        }
    }

    pub fn derived(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            keywords: Vec::new(),
            kind: ColumnKind::Derived,
        }
    }

    pub fn formula(name: impl Into<String>, template: &str, num_format: &str) -> Self {
        Self {
            name: name.into(),
            keywords: Vec::new(),
            kind: ColumnKind::Formula {
                template: template.to_string(),
                num_format: Some(num_format.to_string()),
            },
        }
    }

    /// Marks a derived column as also recognisable during header detection.
    pub fn detectable_by(mut self, keywords: &[&str]) -> Self {
        self.keywords = keywords.iter().map(|kw| kw.to_string()).collect();
        self
    }

    pub fn is_sourced(&self) -> bool {
        matches!(self.kind, ColumnKind::Sourced)
    }

    /// Lowercased, non-empty fragments. Sourced columns without explicit
    /// keywords fall back to their lowercase name.
    pub fn fragments(&self) -> Vec<String> {
        let fragments: Vec<String> = self
            .keywords
            .iter()
            .map(|kw| kw.trim().to_lowercase())
            .filter(|kw| !kw.is_empty())
            .collect();
        if fragments.is_empty() && self.is_sourced() {
            vec![self.name.trim().to_lowercase()]
        } else {
            fragments
        }
    }
}

/// Ordered set of canonical columns every reconciled table conforms to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetSchema {
    pub columns: Vec<CanonicalColumn>,
}

impl TargetSchema {
    pub fn new(columns: Vec<CanonicalColumn>) -> Self {
        Self { columns }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.columns.iter().map(|column| column.name.clone()).collect()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column.name == name)
    }
}

/// Result of header-row detection.
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderMatch {
    pub row: usize,
    /// Number of canonical columns that had at least one hit on `row`.
    pub hits: usize,
    /// Set when no row reached the threshold and row 0 was used instead.
    pub degraded: bool,
}

/// Canonical column position → source column index.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ColumnMapping {
    pub sources: Vec<Option<usize>>,
}

impl ColumnMapping {
    pub fn source_of(&self, canonical: usize) -> Option<usize> {
        self.sources.get(canonical).copied().flatten()
    }

    pub fn matched_count(&self) -> usize {
        self.sources.iter().filter(|source| source.is_some()).count()
    }

    /// Projects a raw row onto the canonical column order.
    pub fn project(&self, row: &[CellValue]) -> Vec<CellValue> {
        self.sources
            .iter()
            .map(|source| {
                source
                    .and_then(|idx| row.get(idx))
                    .cloned()
                    .unwrap_or_default()
            })
            .collect()
    }
}

/// Summary row kept apart from the body for distinct styling.
#[derive(Debug, Clone, PartialEq)]
pub struct FooterRecord {
    /// Index of the row in the raw grid.
    pub source_row: usize,
    /// Positional cells exactly as read, before remapping.
    pub raw: Vec<CellValue>,
    /// Cells remapped onto the canonical column order.
    pub cells: Vec<CellValue>,
}

/// The body rows conforming to a [`TargetSchema`], plus an optional footer.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciledTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
    pub footer: Option<FooterRecord>,
}

impl ReconciledTable {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    /// Values of one column across the body rows.
    pub fn column_values(&self, name: &str) -> Vec<&CellValue> {
        match self.column_index(name) {
            Some(idx) => self.rows.iter().filter_map(|row| row.get(idx)).collect(),
            None => Vec::new(),
        }
    }
}
