//! Tool-specific post-processing applied to the body of a reconciled table.
//!
//! Steps never touch the footer record.

use std::cmp::Ordering;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dates;
use crate::error::{Result, ToolError};
use crate::model::{CellValue, ReconciledTable};

static KARAT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(18KT|22KT|24KT)\b").expect("karat pattern is valid")
});

/// One post-processing operation, referencing columns by canonical name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum Step {
    /// Drops rows whose trimmed text in `column` equals one of `values`.
    ExcludeValues { column: String, values: Vec<String> },
    /// Fills `into` with the karat code found in `from`.
    ExtractKarat { from: String, into: String },
    /// Re-renders parseable dates with `format`; unparseable cells become blank.
    NormalizeDate { column: String, format: String },
    /// Removes a trailing time-of-day portion.
    StripTime { column: String },
    /// Stable descending sort on the parenthesis-stripped numeric value.
    SortDescending { column: String },
    /// Rounds numeric cells in every column.
    RoundNumbers { digits: u32 },
}

impl Step {
    /// Canonical columns this step reads or writes.
    pub fn columns(&self) -> Vec<&str> {
        match self {
            Step::ExcludeValues { column, .. }
            | Step::NormalizeDate { column, .. }
            | Step::StripTime { column }
            | Step::SortDescending { column } => vec![column.as_str()],
            Step::ExtractKarat { from, into } => vec![from.as_str(), into.as_str()],
            Step::RoundNumbers { .. } => Vec::new(),
        }
    }
}

/// The karat code embedded in a style code, upper-cased, or `""`.
pub fn extract_karat(style: &CellValue) -> String {
    match style {
        CellValue::Text(value) => KARAT_PATTERN
            .captures(value)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_uppercase())
            .unwrap_or_default(),
        _ => String::new(),
    }
}

/// Numeric sort key: parentheses removed, then parsed as a float.
pub fn sort_key(cell: &CellValue) -> Option<f64> {
    match cell {
        CellValue::Number(value) => Some(*value),
        other => other
            .to_string()
            .replace(['(', ')'], "")
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|value| !value.is_nan()),
    }
}

/// Drops a time-of-day suffix from a date-like cell.
pub fn strip_time(cell: &CellValue) -> CellValue {
    match cell {
        CellValue::Date(value) => CellValue::Text(value.format("%Y-%m-%d").to_string()),
        CellValue::Text(value) if value.contains(' ') && value.contains(':') => {
            CellValue::text(value.split(' ').next().unwrap_or_default())
        }
        other => other.clone(),
    }
}

fn round_to(value: f64, digits: u32) -> f64 {
    let factor = 10f64.powi(digits as i32);
    (value * factor).round() / factor
}

fn column_of(table: &ReconciledTable, name: &str) -> Result<usize> {
    table
        .column_index(name)
        .ok_or_else(|| ToolError::InvalidProfile(format!("step references unknown column '{name}'")))
}

/// Applies `steps` in order to the body rows of `table`.
pub fn apply_steps(table: &mut ReconciledTable, steps: &[Step]) -> Result<()> {
    for step in steps {
        apply_step(table, step)?;
    }
    Ok(())
}

fn apply_step(table: &mut ReconciledTable, step: &Step) -> Result<()> {
    match step {
        Step::ExcludeValues { column, values } => {
            let idx = column_of(table, column)?;
            let before = table.rows.len();
            table.rows.retain(|row| {
                let text = row[idx].to_string();
                !values.iter().any(|value| value.trim() == text.trim())
            });
            debug!(column = %column, dropped = before - table.rows.len(), "excluded rows");
        }
        Step::ExtractKarat { from, into } => {
            let from_idx = column_of(table, from)?;
            let into_idx = column_of(table, into)?;
            for row in &mut table.rows {
                let karat = extract_karat(&row[from_idx]);
                row[into_idx] = CellValue::text(karat);
            }
        }
        Step::NormalizeDate { column, format } => {
            let idx = column_of(table, column)?;
            for row in &mut table.rows {
                row[idx] = match dates::parse_cell(&row[idx]) {
                    Some(date) => CellValue::Text(date.format(format).to_string()),
                    None => CellValue::Empty,
                };
            }
        }
        Step::StripTime { column } => {
            let idx = column_of(table, column)?;
            for row in &mut table.rows {
                row[idx] = strip_time(&row[idx]);
            }
        }
        Step::SortDescending { column } => {
            let idx = column_of(table, column)?;
            let mut keyed: Vec<(Option<f64>, Vec<CellValue>)> = table
                .rows
                .drain(..)
                .map(|row| (sort_key(&row[idx]), row))
                .collect();
            keyed.sort_by(|(lhs, _), (rhs, _)| match (lhs, rhs) {
                (Some(lhs), Some(rhs)) => rhs.partial_cmp(lhs).unwrap_or(Ordering::Equal),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            });
            table.rows = keyed.into_iter().map(|(_, row)| row).collect();
        }
        Step::RoundNumbers { digits } => {
            for row in &mut table.rows {
                for cell in row.iter_mut() {
                    if let CellValue::Number(value) = cell {
                        *value = round_to(*value, *digits);
                    }
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FooterRecord;

    fn table(rows: Vec<Vec<&str>>) -> ReconciledTable {
        ReconciledTable {
            columns: vec!["Style No".into(), "Karat".into(), "Order Days".into()],
            rows: rows
                .into_iter()
                .map(|row| row.into_iter().map(CellValue::text).collect())
                .collect(),
            footer: None,
        }
    }

    #[test]
    fn karat_is_extracted_from_style_codes() {
        assert_eq!(extract_karat(&CellValue::text("ABC-22KT-001")), "22KT");
        assert_eq!(extract_karat(&CellValue::text("ring 18kt")), "18KT");
        assert_eq!(extract_karat(&CellValue::text("ABC-XYZ")), "");
        assert_eq!(extract_karat(&CellValue::text("X122KT")), "");
        assert_eq!(extract_karat(&CellValue::Number(22.0)), "");
    }

    #[test]
    fn unwanted_order_days_are_excluded() {
        let mut table = table(vec![
            vec!["A", "", "(3.00)"],
            vec!["B", "", "(12.00)"],
            vec!["C", "", ""],
        ]);
        let step = Step::ExcludeValues {
            column: "Order Days".into(),
            values: vec!["".into(), "(3.00)".into()],
        };
        apply_steps(&mut table, &[step]).expect("step applied");

        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0][0], CellValue::text("B"));
    }

    #[test]
    fn sort_is_descending_and_stable() {
        let mut table = table(vec![
            vec!["A", "", "(3.00)"],
            vec!["B", "", "(12.00)"],
            vec!["C", "", "n/a"],
            vec!["D", "", "(3.00)"],
        ]);
        table.footer = Some(FooterRecord {
            source_row: 9,
            raw: Vec::new(),
            cells: vec![CellValue::text("Total"), CellValue::Empty, CellValue::text("(99.00)")],
        });
        let step = Step::SortDescending {
            column: "Order Days".into(),
        };
        apply_steps(&mut table, &[step]).expect("step applied");

        let order: Vec<String> = table.rows.iter().map(|row| row[0].to_string()).collect();
        assert_eq!(order, vec!["B", "A", "D", "C"]);
        assert_eq!(
            table.footer.as_ref().map(|footer| footer.cells[0].clone()),
            Some(CellValue::text("Total"))
        );
    }

    #[test]
    fn karat_step_fills_derived_column() {
        let mut table = table(vec![vec!["ABC-24KT", "", "1"], vec!["plain", "", "2"]]);
        let step = Step::ExtractKarat {
            from: "Style No".into(),
            into: "Karat".into(),
        };
        apply_steps(&mut table, &[step]).expect("step applied");

        assert_eq!(table.rows[0][1], CellValue::text("24KT"));
        assert_eq!(table.rows[1][1], CellValue::Empty);
    }

    #[test]
    fn dates_are_normalised_and_failures_blanked() {
        let mut table = table(vec![
            vec!["", "", "2025-09-03 00:00:00"],
            vec!["", "", "later"],
        ]);
        let step = Step::NormalizeDate {
            column: "Order Days".into(),
            format: "%d-%m-%Y".into(),
        };
        apply_steps(&mut table, &[step]).expect("step applied");

        assert_eq!(table.rows[0][2], CellValue::text("03-09-2025"));
        assert_eq!(table.rows[1][2], CellValue::Empty);
    }

    #[test]
    fn time_portion_is_stripped() {
        assert_eq!(
            strip_time(&CellValue::text("2025-09-01 00:00:00")),
            CellValue::text("2025-09-01")
        );
        assert_eq!(strip_time(&CellValue::text("01/09/2025")), CellValue::text("01/09/2025"));
    }

    #[test]
    fn unknown_columns_are_rejected() {
        let mut table = table(vec![]);
        let step = Step::StripTime {
            column: "Trans Date".into(),
        };
        assert!(matches!(
            apply_steps(&mut table, &[step]),
            Err(ToolError::InvalidProfile(_))
        ));
    }
}
