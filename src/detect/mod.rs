//! Header-row detection and grand-total extraction over a [`RawGrid`].
//!
//! Both operate on the raw positional grid before any column reconciliation
//! takes place.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::model::{CellValue, HeaderMatch, RawGrid, TargetSchema};

/// Minimum number of canonical columns a row must hit to count as the header.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Threshold {
    /// At least this fraction of the detectable columns.
    Fraction(f64),
    /// At least half of the detectable columns, rounded down.
    Half,
    /// Every detectable column.
    All,
    /// A fixed number of columns.
    AtLeast(usize),
}

impl Threshold {
    /// Whether `hits` out of `detectable` columns satisfies the threshold.
    /// A row with zero hits never qualifies.
    pub fn is_met(self, hits: usize, detectable: usize) -> bool {
        if hits == 0 {
            return false;
        }
        match self {
            Threshold::Fraction(fraction) => hits as f64 >= detectable as f64 * fraction,
            Threshold::Half => hits >= detectable / 2,
            Threshold::All => hits >= detectable,
            Threshold::AtLeast(count) => hits >= count,
        }
    }
}

/// Rule identifying the grand-total row of a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FooterMarker {
    /// Any cell's lowercased text contains the marker.
    Contains(String),
    /// The first cell's trimmed, lowercased text starts with the marker.
    FirstCellStartsWith(String),
    #[default]
    Disabled,
}

impl FooterMarker {
    pub fn matches(&self, row: &[CellValue]) -> bool {
        match self {
            FooterMarker::Contains(marker) => {
                let marker = marker.to_lowercase();
                row.iter()
                    .filter(|cell| !cell.is_empty())
                    .any(|cell| cell.match_text().contains(&marker))
            }
            FooterMarker::FirstCellStartsWith(marker) => row
                .first()
                .map(|cell| cell.match_text().starts_with(&marker.to_lowercase()))
                .unwrap_or(false),
            FooterMarker::Disabled => false,
        }
    }
}

/// Counts the canonical columns with at least one keyword hit in `row`.
pub fn count_hits(row: &[CellValue], schema: &TargetSchema) -> usize {
    let cells: Vec<String> = row
        .iter()
        .filter(|cell| !cell.is_empty())
        .map(CellValue::match_text)
        .collect();

    schema
        .columns
        .iter()
        .filter(|column| {
            let fragments = column.fragments();
            cells
                .iter()
                .any(|cell| fragments.iter().any(|fragment| cell.contains(fragment.as_str())))
        })
        .count()
}

/// Number of schema columns that can take part in detection.
pub fn detectable_columns(schema: &TargetSchema) -> usize {
    schema
        .columns
        .iter()
        .filter(|column| !column.fragments().is_empty())
        .count()
}

/// Scans the grid top-down and returns the first row meeting `threshold`.
///
/// When no row qualifies the result points at row 0 with `degraded` set.
pub fn detect_header(grid: &RawGrid, schema: &TargetSchema, threshold: Threshold) -> HeaderMatch {
    let detectable = detectable_columns(schema);

    for (index, row) in grid.rows.iter().enumerate() {
        let hits = count_hits(row, schema);
        if threshold.is_met(hits, detectable) {
            debug!(row = index, hits, detectable, "header row detected");
            return HeaderMatch {
                row: index,
                hits,
                degraded: false,
            };
        }
    }

    let hits = grid.row(0).map(|row| count_hits(row, schema)).unwrap_or(0);
    warn!(
        rows = grid.len(),
        detectable, "no row reached the header threshold, falling back to row 0"
    );
    HeaderMatch {
        row: 0,
        hits,
        degraded: true,
    }
}

/// Every row below the header that matches `marker`. Title rows above the
/// header are never considered.
pub fn footer_rows(grid: &RawGrid, marker: &FooterMarker, header_row: usize) -> Vec<usize> {
    grid.rows
        .iter()
        .enumerate()
        .skip(header_row + 1)
        .filter(|(_, row)| marker.matches(row))
        .map(|(index, _)| index)
        .collect()
}

/// The first grand-total row below the header.
pub fn find_footer_row(grid: &RawGrid, marker: &FooterMarker, header_row: usize) -> Option<usize> {
    footer_rows(grid, marker, header_row).first().copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CanonicalColumn;

    fn delay_schema() -> TargetSchema {
        TargetSchema::new(vec![
            CanonicalColumn::with_keywords("Order No", &["order no", "orderno", "order #"]),
            CanonicalColumn::with_keywords("Batch No", &["batch no", "batch"]),
            CanonicalColumn::with_keywords("Order Date", &["order date", "date"]),
            CanonicalColumn::with_keywords("Order Days", &["order days", "days"]),
        ])
    }

    #[test]
    fn detects_first_qualifying_row() {
        let grid = RawGrid::from_strings(vec![
            vec!["DELAY ORDER REPORT", "", ""],
            vec!["Status : OPEN", "", ""],
            vec!["", "", ""],
            vec!["Order No.", "Batch", "Order Days"],
            vec!["Order No", "Batch No", "Order Date"],
        ]);

        let header = detect_header(&grid, &delay_schema(), Threshold::Half);

        assert_eq!(header.row, 3);
        assert!(!header.degraded);
        // "Order Date" has no hit: "date" is not a fragment of "order days".
        assert_eq!(header.hits, 3);
    }

    #[test]
    fn falls_back_to_first_row_when_nothing_matches() {
        let grid = RawGrid::from_strings(vec![vec!["alpha", "beta"], vec!["1", "2"]]);

        let header = detect_header(&grid, &delay_schema(), Threshold::Fraction(0.6));

        assert_eq!(header.row, 0);
        assert!(header.degraded);
    }

    #[test]
    fn whitespace_cells_never_match() {
        let grid = RawGrid::new(vec![vec![
            CellValue::Text("   ".into()),
            CellValue::Empty,
        ]]);
        assert_eq!(count_hits(&grid.rows[0], &delay_schema()), 0);
    }

    #[test]
    fn formula_columns_are_not_detectable() {
        let schema = TargetSchema::new(vec![
            CanonicalColumn::named("Wc Name"),
            CanonicalColumn::formula("FINAL LOSS", "=G{row}+H{row}", "0.0000"),
        ]);
        assert_eq!(detectable_columns(&schema), 1);
    }

    #[test]
    fn thresholds_follow_their_rules() {
        assert!(Threshold::Fraction(0.6).is_met(7, 11));
        assert!(!Threshold::Fraction(0.6).is_met(6, 11));
        assert!(Threshold::Half.is_met(6, 12));
        assert!(!Threshold::All.is_met(5, 6));
        assert!(Threshold::AtLeast(2).is_met(2, 10));
        assert!(!Threshold::Half.is_met(0, 1));
    }

    #[test]
    fn footer_markers() {
        let grid = RawGrid::from_strings(vec![
            vec!["Order No", "Net Wt"],
            vec!["A1", "2"],
            vec!["", "GRAND TOTAL"],
            vec!["Total", "9"],
        ]);

        let contains = FooterMarker::Contains("grand total".into());
        assert_eq!(find_footer_row(&grid, &contains, 0), Some(2));

        let starts = FooterMarker::FirstCellStartsWith("total".into());
        assert_eq!(find_footer_row(&grid, &starts, 0), Some(3));

        assert_eq!(find_footer_row(&grid, &FooterMarker::Disabled, 0), None);
    }

    #[test]
    fn titles_above_the_header_are_never_the_footer() {
        let grid = RawGrid::from_strings(vec![
            vec!["Total Loss Statement", ""],
            vec!["Wc Name", "Gain Pg"],
            vec!["Casting", "1"],
            vec!["Total", "1"],
        ]);
        let marker = FooterMarker::FirstCellStartsWith("total".into());
        assert_eq!(find_footer_row(&grid, &marker, 1), Some(3));
        assert_eq!(footer_rows(&grid, &marker, 1), vec![3]);
    }

    #[test]
    fn every_total_row_below_the_header_is_listed() {
        let grid = RawGrid::from_strings(vec![
            vec!["Wc Name", "Gain Pg"],
            vec!["Casting", "1"],
            vec!["Total Casting", "1"],
            vec!["Filing", "2"],
            vec!["Total", "3"],
        ]);
        let marker = FooterMarker::FirstCellStartsWith("total".into());
        assert_eq!(footer_rows(&grid, &marker, 0), vec![2, 4]);
    }

    #[test]
    fn header_row_is_never_the_footer() {
        let grid = RawGrid::from_strings(vec![vec!["Wc Name", "Total Weight"], vec!["x", "1"]]);
        let marker = FooterMarker::Contains("total".into());
        assert_eq!(find_footer_row(&grid, &marker, 0), None);
    }
}
