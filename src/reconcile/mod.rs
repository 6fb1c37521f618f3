//! Column reconciliation: binds header labels to canonical columns and
//! projects the body of a raw grid onto the target schema.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::detect::{FooterMarker, find_footer_row};
use crate::model::{
    CanonicalColumn, CellValue, ColumnMapping, FooterRecord, HeaderMatch, RawGrid,
    ReconciledTable, TargetSchema,
};

/// Which comparisons bind a header label to a canonical column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LabelMatch {
    /// A keyword fragment occurs inside the label.
    #[default]
    Keyword,
    /// Keyword matching with all whitespace removed from both sides.
    Compact,
    /// Keyword matching, plus label-inside-name and letters-only containment
    /// in either direction.
    Flexible,
}

/// How a label that matches several canonical columns is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CollisionPolicy {
    /// The first matching column in schema order wins.
    #[default]
    FirstDeclared,
    /// The column with the longest matching fragment wins; ties go to schema
    /// order.
    LongestFragment,
}

fn without_whitespace(value: &str) -> String {
    value.chars().filter(|ch| !ch.is_whitespace()).collect()
}

fn letters_only(value: &str) -> String {
    value.chars().filter(char::is_ascii_lowercase).collect()
}

/// Length of the strongest match between `label` (already lowercased and
/// trimmed) and `column`, or `None` if they do not match under `rule`.
pub fn match_strength(label: &str, column: &CanonicalColumn, rule: LabelMatch) -> Option<usize> {
    if label.is_empty() || !column.is_sourced() {
        return None;
    }

    let fragments = column.fragments();
    if rule == LabelMatch::Compact {
        let label = without_whitespace(label);
        return fragments
            .iter()
            .map(|fragment| without_whitespace(fragment))
            .filter(|fragment| !fragment.is_empty() && label.contains(fragment.as_str()))
            .map(|fragment| fragment.len())
            .max();
    }

    let mut best = fragments
        .iter()
        .filter(|fragment| label.contains(fragment.as_str()))
        .map(String::len)
        .max();

    if rule == LabelMatch::Flexible {
        let name = column.name.trim().to_lowercase();
        if name.contains(label) {
            best = best.max(Some(label.len()));
        }

        let label_letters = letters_only(label);
        if !label_letters.is_empty() {
            for fragment in fragments.iter().chain(std::iter::once(&name)) {
                let fragment_letters = letters_only(fragment);
                if fragment_letters.is_empty() {
                    continue;
                }
                if label_letters.contains(&fragment_letters)
                    || fragment_letters.contains(&label_letters)
                {
                    let strength = fragment_letters.len().min(label_letters.len());
                    best = best.max(Some(strength));
                }
            }
        }
    }

    best
}

/// Picks the canonical column a single header label binds to.
pub fn bind_label(
    label: &str,
    schema: &TargetSchema,
    rule: LabelMatch,
    policy: CollisionPolicy,
) -> Option<usize> {
    let mut candidates = schema
        .columns
        .iter()
        .enumerate()
        .filter_map(|(index, column)| match_strength(label, column, rule).map(|len| (index, len)));

    match policy {
        CollisionPolicy::FirstDeclared => candidates.next().map(|(index, _)| index),
        CollisionPolicy::LongestFragment => candidates
            .fold(None, |best: Option<(usize, usize)>, (index, len)| match best {
                Some((_, best_len)) if best_len >= len => best,
                _ => Some((index, len)),
            })
            .map(|(index, _)| index),
    }
}

/// Maps every canonical column to the lowest source column index whose header
/// label binds to it.
pub fn map_columns(
    header: &[CellValue],
    schema: &TargetSchema,
    rule: LabelMatch,
    policy: CollisionPolicy,
) -> ColumnMapping {
    let mut sources = vec![None; schema.len()];

    for (source_idx, cell) in header.iter().enumerate() {
        if cell.is_empty() {
            continue;
        }
        let label = cell.match_text();
        if let Some(canonical) = bind_label(&label, schema, rule, policy) {
            if sources[canonical].is_none() {
                sources[canonical] = Some(source_idx);
            }
        }
    }

    ColumnMapping { sources }
}

/// Sourced columns with no bound source column.
pub fn unmatched_columns(schema: &TargetSchema, mapping: &ColumnMapping) -> Vec<String> {
    schema
        .columns
        .iter()
        .enumerate()
        .filter(|(index, column)| column.is_sourced() && mapping.source_of(*index).is_none())
        .map(|(_, column)| column.name.clone())
        .collect()
}

fn trim_cells(cells: Vec<CellValue>) -> Vec<CellValue> {
    cells
        .into_iter()
        .map(|cell| match cell {
            CellValue::Text(value) => CellValue::text(value.trim()),
            other => other,
        })
        .collect()
}

/// Builds the reconciled table from the rows below the header.
///
/// Blank rows and rows matching `footer` are dropped from the body; the first
/// footer row anywhere in the grid is kept aside, remapped through the same
/// `mapping` as the body.
pub fn reconcile(
    grid: &RawGrid,
    header: &HeaderMatch,
    schema: &TargetSchema,
    mapping: &ColumnMapping,
    footer: &FooterMarker,
) -> ReconciledTable {
    let rows: Vec<Vec<CellValue>> = grid
        .rows
        .iter()
        .skip(header.row + 1)
        .filter(|row| row.iter().any(|cell| !cell.is_empty()))
        .filter(|row| !footer.matches(row))
        .map(|row| trim_cells(mapping.project(row)))
        .collect();

    let footer = find_footer_row(grid, footer, header.row).map(|source_row| {
        let raw = grid.rows[source_row].clone();
        let cells = trim_cells(mapping.project(&raw));
        FooterRecord {
            source_row,
            raw,
            cells,
        }
    });

    debug!(
        body_rows = rows.len(),
        has_footer = footer.is_some(),
        "reconciled table assembled"
    );

    ReconciledTable {
        columns: schema.names(),
        rows,
        footer,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> TargetSchema {
        TargetSchema::new(vec![
            CanonicalColumn::with_keywords("Shipment Days", &["shipment days", "days"]),
            CanonicalColumn::with_keywords("Order Days", &["order days", "days"]),
            CanonicalColumn::with_keywords("Net Wt", &["net wt"]),
            CanonicalColumn::derived("Karat"),
        ])
    }

    #[test]
    fn first_declared_wins_collisions() {
        let column = bind_label(
            "order days",
            &schema(),
            LabelMatch::Keyword,
            CollisionPolicy::FirstDeclared,
        );
        assert_eq!(column, Some(0));
    }

    #[test]
    fn longest_fragment_wins_when_requested() {
        let column = bind_label(
            "order days",
            &schema(),
            LabelMatch::Keyword,
            CollisionPolicy::LongestFragment,
        );
        assert_eq!(column, Some(1));
    }

    #[test]
    fn flexible_matching_handles_punctuation_variants() {
        let schema = TargetSchema::new(vec![CanonicalColumn::named("Pg Wastage Wt")]);
        assert_eq!(
            bind_label("pg-wastage-wt", &schema, LabelMatch::Flexible, CollisionPolicy::FirstDeclared),
            Some(0)
        );
        assert_eq!(
            bind_label("pg-wastage-wt", &schema, LabelMatch::Keyword, CollisionPolicy::FirstDeclared),
            None
        );
    }

    #[test]
    fn compact_matching_ignores_spacing_only() {
        let schema = TargetSchema::new(vec![
            CanonicalColumn::named("Issue Quantity Pg"),
            CanonicalColumn::named("Gain Pg"),
        ]);
        let bind = |label: &str| {
            bind_label(label, &schema, LabelMatch::Compact, CollisionPolicy::FirstDeclared)
        };
        assert_eq!(bind("issue  quantity pg"), Some(0));
        assert_eq!(bind("issuequantitypg"), Some(0));
        assert_eq!(bind("issue quantity"), None);
        assert_eq!(bind("gain pg (gm)"), Some(1));
    }

    #[test]
    fn derived_columns_are_never_bound() {
        let header = RawGrid::from_strings(vec![vec!["Karat", "Net Wt"]]);
        let mapping = map_columns(
            &header.rows[0],
            &schema(),
            LabelMatch::Flexible,
            CollisionPolicy::FirstDeclared,
        );
        assert_eq!(mapping.sources, vec![None, None, Some(1), None]);
        assert_eq!(unmatched_columns(&schema(), &mapping), vec!["Shipment Days", "Order Days"]);
    }

    #[test]
    fn footer_is_remapped_by_source_index() {
        let grid = RawGrid::from_strings(vec![
            vec!["Title", "", "", ""],
            vec!["Remark", "Net Wt", "Shipment Days", "Order Days"],
            vec!["a", "1.5", "3", "4"],
            vec!["Grand Total", "1.5", "", ""],
        ]);
        let schema = schema();
        let header = HeaderMatch {
            row: 1,
            hits: 3,
            degraded: false,
        };
        let mapping = map_columns(
            &grid.rows[1],
            &schema,
            LabelMatch::Keyword,
            CollisionPolicy::LongestFragment,
        );
        let table = reconcile(
            &grid,
            &header,
            &schema,
            &mapping,
            &FooterMarker::Contains("grand total".into()),
        );

        assert_eq!(table.rows.len(), 1);
        let footer = table.footer.expect("footer extracted");
        assert_eq!(footer.source_row, 3);
        assert_eq!(footer.raw[0], CellValue::text("Grand Total"));
        assert_eq!(footer.raw[1], CellValue::text("1.5"));
        let net_wt = schema.position("Net Wt").expect("declared");
        assert_eq!(footer.cells[net_wt], CellValue::Text("1.5".into()));
        assert_eq!(table.rows[0][net_wt], CellValue::Text("1.5".into()));
        assert_eq!(footer.cells[0], CellValue::Empty);
    }

    #[test]
    fn exact_schema_round_trips() {
        let grid = RawGrid::from_strings(vec![
            vec!["Shipment Days", "Order Days", "Net Wt", "Karat"],
            vec!["1", "2", "3", "18KT"],
            vec!["4", "5", "6", "22KT"],
        ]);
        let schema = TargetSchema::new(vec![
            CanonicalColumn::named("Shipment Days"),
            CanonicalColumn::named("Order Days"),
            CanonicalColumn::named("Net Wt"),
            CanonicalColumn::named("Karat"),
        ]);
        let header = HeaderMatch {
            row: 0,
            hits: 4,
            degraded: false,
        };
        let mapping = map_columns(
            &grid.rows[0],
            &schema,
            LabelMatch::Flexible,
            CollisionPolicy::FirstDeclared,
        );
        let table = reconcile(&grid, &header, &schema, &mapping, &FooterMarker::Disabled);

        assert_eq!(table.columns, schema.names());
        assert_eq!(table.rows, grid.rows[1..].to_vec());
        assert!(table.footer.is_none());
    }
}
