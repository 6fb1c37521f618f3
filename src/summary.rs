//! Party/karat pivot over a previously generated goods-receipt report.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::detect::{FooterMarker, Threshold, detect_header};
use crate::error::{Result, ToolError};
use crate::model::{CanonicalColumn, CellValue, FooterRecord, RawGrid, ReconciledTable, TargetSchema};
use crate::profile::{Layout, TitleAlign};
use crate::reconcile::{CollisionPolicy, LabelMatch, map_columns, reconcile, unmatched_columns};

pub const SUMMARY_PROFILE: &str = "summary";
/// Sheet read from the input when present.
pub const SOURCE_SHEET: &str = "Report";

const PARTY: &str = "Party Name";
const KARAT: &str = "Karat";
const WEIGHTS: [&str; 4] = ["Net Wt", "Pg Wt", "Wastage Perc", "Pg Wastage Wt"];
const TOTAL_LABEL: &str = "TOTAL";

/// Columns looked up in the source report.
pub fn source_schema() -> TargetSchema {
    let mut columns = vec![CanonicalColumn::named(PARTY), CanonicalColumn::named(KARAT)];
    columns.extend(WEIGHTS.iter().map(|name| CanonicalColumn::named(*name)));
    TargetSchema::new(columns)
}

/// Columns of the pivot output.
pub fn pivot_schema() -> TargetSchema {
    let mut columns = vec![CanonicalColumn::named(PARTY), CanonicalColumn::named("KARAT")];
    columns.extend(
        WEIGHTS
            .iter()
            .map(|name| CanonicalColumn::named(format!("Sum of {name}"))),
    );
    TargetSchema::new(columns)
}

pub fn pivot_layout() -> Layout {
    Layout {
        sheet_name: "Pivot Table".into(),
        titles: Vec::new(),
        title_align: TitleAlign::Center,
        title_fill: None,
        header_fill: Some(0xD9E1F2),
        header_font_white: false,
        widths: BTreeMap::new(),
        default_width: None,
        max_auto_width: 50.0,
        header_row_height: None,
        body_row_height: None,
        footer_row_height: None,
        footer_fill: Some(0xFCE4D6),
        number_format: Some("#,##0.00".into()),
        file_name: "goods_receipt_pivot_table_{timestamp}.xlsx".into(),
    }
}

/// Grouped table plus any warnings raised while locating the source columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Pivot {
    pub table: ReconciledTable,
    pub warnings: Vec<String>,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Groups body rows by (party, karat) and sums the weight columns.
///
/// Subtotal rows whose party cell is exactly "total", and any "grand total"
/// row, are left out. The `TOTAL` footer holds the sums over every kept row.
pub fn build_pivot(grid: &RawGrid) -> Result<Pivot> {
    let schema = source_schema();
    let mut warnings = Vec::new();

    let header = detect_header(grid, &schema, Threshold::Fraction(0.5));
    if header.degraded {
        warnings.push("header row not recognised; using the first row".to_string());
    }

    let mapping = map_columns(
        grid.row(header.row).unwrap_or_default(),
        &schema,
        LabelMatch::Keyword,
        CollisionPolicy::LongestFragment,
    );
    if mapping.matched_count() == 0 {
        return Err(ToolError::NoColumnsMatched {
            profile: SUMMARY_PROFILE.into(),
            header_row: header.row,
        });
    }
    let missing = unmatched_columns(&schema, &mapping);
    if !missing.is_empty() {
        warn!(missing = ?missing, "summary columns not found; filling blanks");
        warnings.push(format!(
            "{} missing columns filled blank: {}",
            missing.len(),
            missing.join(", ")
        ));
    }

    let source = reconcile(
        grid,
        &header,
        &schema,
        &mapping,
        &FooterMarker::Contains("grand total".into()),
    );

    let mut groups: BTreeMap<(String, String), [f64; 4]> = BTreeMap::new();
    let mut totals = [0.0; 4];
    for row in &source.rows {
        let party = row[0].to_string();
        if party.trim().eq_ignore_ascii_case("total") {
            continue;
        }
        let sums = groups.entry((party, row[1].to_string())).or_insert([0.0; 4]);
        for (offset, sum) in sums.iter_mut().enumerate() {
            let value = row[2 + offset].as_number().unwrap_or(0.0);
            *sum += value;
            totals[offset] += value;
        }
    }
    debug!(groups = groups.len(), "pivot groups built");

    let rows = groups
        .into_iter()
        .map(|((party, karat), sums)| {
            let mut row = vec![CellValue::text(party), CellValue::text(karat)];
            row.extend(sums.iter().map(|sum| CellValue::Number(round2(*sum))));
            row
        })
        .collect();

    let mut total_cells = vec![CellValue::text(TOTAL_LABEL), CellValue::Empty];
    total_cells.extend(totals.iter().map(|sum| CellValue::Number(round2(*sum))));

    Ok(Pivot {
        table: ReconciledTable {
            columns: pivot_schema().names(),
            rows,
            footer: Some(FooterRecord {
                source_row: grid.len(),
                raw: Vec::new(),
                cells: total_cells,
            }),
        },
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> RawGrid {
        RawGrid::from_strings(vec![
            vec!["GOODS RECEIPT NOTE", "", "", "", "", ""],
            vec!["From 01/09/2025 To 02/09/2025", "", "", "", "", ""],
            vec!["Party Name", "Karat", "Net Wt", "Pg Wt", "Wastage Perc", "Pg Wastage Wt"],
            vec!["Beta", "22KT", "2.5", "2", "1", "0.25"],
            vec!["Alpha", "18KT", "1.25", "1", "0.5", "0.5"],
            vec!["Beta", "22KT", "1,000", "3", "1", "0.25"],
            vec!["Alpha", "22KT", "bad", "1", "", "1"],
            vec!["Grand Total", "", "1003.75", "7", "2.5", "2"],
        ])
    }

    #[test]
    fn groups_are_sorted_and_summed() {
        let pivot = build_pivot(&report()).expect("pivot built");
        let table = pivot.table;
        assert!(pivot.warnings.is_empty());

        let keys: Vec<(String, String)> = table
            .rows
            .iter()
            .map(|row| (row[0].to_string(), row[1].to_string()))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("Alpha".to_string(), "18KT".to_string()),
                ("Alpha".to_string(), "22KT".to_string()),
                ("Beta".to_string(), "22KT".to_string()),
            ]
        );
        assert_eq!(table.rows[2][2], CellValue::Number(1002.5));
        assert_eq!(table.rows[1][2], CellValue::Number(0.0));
    }

    #[test]
    fn total_row_equals_column_sums() {
        let table = build_pivot(&report()).expect("pivot built").table;
        let footer = table.footer.expect("total row");
        assert_eq!(footer.cells[0], CellValue::text("TOTAL"));
        for col in 2..6 {
            let sum: f64 = table
                .rows
                .iter()
                .filter_map(|row| row[col].as_number())
                .sum();
            assert_eq!(footer.cells[col].as_number(), Some(round2(sum)));
        }
    }

    #[test]
    fn parties_named_like_total_are_kept() {
        let grid = RawGrid::from_strings(vec![
            vec!["Party Name", "Karat", "Net Wt", "Pg Wt", "Wastage Perc", "Pg Wastage Wt"],
            vec!["Totalgold Jewellers", "22KT", "5", "1", "0", "0"],
            vec!["Acme", "22KT", "2", "1", "0", "0"],
            vec!["Total", "", "7", "2", "0", "0"],
        ]);
        let table = build_pivot(&grid).expect("pivot built").table;

        let parties: Vec<String> = table.rows.iter().map(|row| row[0].to_string()).collect();
        assert_eq!(parties, vec!["Acme", "Totalgold Jewellers"]);
        let footer = table.footer.expect("total row");
        assert_eq!(footer.cells[2], CellValue::Number(7.0));
    }

    #[test]
    fn missing_summary_columns_are_counted() {
        let grid = RawGrid::from_strings(vec![
            vec!["Party Name", "Karat", "Net Wt"],
            vec!["Acme", "22KT", "2"],
        ]);
        let pivot = build_pivot(&grid).expect("pivot built");
        assert_eq!(
            pivot.warnings,
            vec!["3 missing columns filled blank: Pg Wt, Wastage Perc, Pg Wastage Wt".to_string()]
        );
    }

    #[test]
    fn unrelated_sheet_is_rejected() {
        let grid = RawGrid::from_strings(vec![vec!["Lorem", "Ipsum"], vec!["1", "2"]]);
        assert!(matches!(
            build_pivot(&grid),
            Err(ToolError::NoColumnsMatched { .. })
        ));
    }
}
