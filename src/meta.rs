//! Report title and date-range extraction, plus template rendering for title
//! rows and output file names.

use std::sync::LazyLock;

use chrono::NaiveDateTime;
use regex::Regex;

use crate::dates;
use crate::model::{CellValue, RawGrid, ReconciledTable};
use crate::profile::{DateSource, MetaRules};

static TRANS_TYPE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)trans type\s*[:-]*\s*(.+)").expect("trans type pattern is valid")
});

const TITLE_SCAN_ROWS: usize = 5;
const DATE_SCAN_ROWS: usize = 10;
const DISPLAY_DATE: &str = "%d/%m/%Y";

/// Strings substituted into title and file name templates.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportMeta {
    pub title: String,
    pub from_date: String,
    pub to_date: String,
    pub generated_at: NaiveDateTime,
}

impl ReportMeta {
    /// Expands `{title}`, `{from}`, `{to}`, `{date}` (dd-mm-yyyy), `{time}`
    /// (HH:MM), `{ymd}` and `{timestamp}`.
    pub fn render(&self, template: &str) -> String {
        template
            .replace("{title}", &self.title)
            .replace("{from}", &self.from_date)
            .replace("{to}", &self.to_date)
            .replace("{date}", &self.generated_at.format("%d-%m-%Y").to_string())
            .replace("{time}", &self.generated_at.format("%H:%M").to_string())
            .replace("{ymd}", &self.generated_at.format("%Y%m%d").to_string())
            .replace(
                "{timestamp}",
                &self.generated_at.format("%Y%m%d_%H%M%S").to_string(),
            )
    }

    /// Renders a file name template; spaces and path separators in the title
    /// become underscores.
    pub fn file_name(&self, template: &str) -> String {
        let safe_title: String = self
            .title
            .trim()
            .chars()
            .map(|ch| match ch {
                ' ' | '/' | '\\' | ':' => '_',
                other => other,
            })
            .collect();
        let meta = ReportMeta {
            title: safe_title,
            ..self.clone()
        };
        meta.render(template)
    }
}

/// Looks for a report title in the first few rows.
pub fn detect_title(grid: &RawGrid) -> Option<String> {
    for row in grid.rows.iter().take(TITLE_SCAN_ROWS) {
        for cell in row.iter().filter(|cell| !cell.is_empty()) {
            let text = cell.to_string();
            let lower = text.trim().to_lowercase();
            if lower.contains("sale invoice") {
                return Some("SALE INVOICE".into());
            }
            if lower.contains("goods receipt") {
                return Some("GOODS RECEIPT NOTE".into());
            }
            if lower.contains("trans type") {
                if let Some(found) = TRANS_TYPE_PATTERN
                    .captures(text.trim())
                    .and_then(|caps| caps.get(1))
                {
                    return Some(found.as_str().trim().to_string());
                }
            }
        }
    }
    None
}

fn display(cell: &CellValue) -> String {
    match cell {
        CellValue::Date(value) => value.format(DISPLAY_DATE).to_string(),
        other => other.to_string().trim().to_string(),
    }
}

fn value_after_label(text: &str, label: &str) -> Option<String> {
    let lower = text.to_lowercase();
    let start = lower.find(label)? + label.len();
    let rest = text.get(start..)?;
    let rest = rest.trim_start_matches(|ch: char| ch.is_whitespace() || ch == ':' || ch == '-');
    let end = rest
        .to_lowercase()
        .find("to date")
        .unwrap_or(rest.len());
    let value = rest.get(..end).unwrap_or(rest).trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn next_value(row: &[CellValue], index: usize) -> Option<String> {
    row.get(index + 1)
        .filter(|cell| !cell.is_empty())
        .map(display)
}

/// Reads "From Date" / "To Date" labels from the rows above the data. The
/// value is taken from the same cell after the label, or from the next cell.
pub fn scan_header_dates(grid: &RawGrid) -> (Option<String>, Option<String>) {
    let mut from = None;
    let mut to = None;

    for row in grid.rows.iter().take(DATE_SCAN_ROWS) {
        for (index, cell) in row.iter().enumerate() {
            if cell.is_empty() {
                continue;
            }
            let text = cell.to_string();
            let lower = text.to_lowercase();
            if lower.contains("from date") {
                if let Some(value) =
                    value_after_label(&text, "from date").or_else(|| next_value(row, index))
                {
                    from = Some(value);
                }
            }
            if lower.contains("to date") {
                if let Some(value) =
                    value_after_label(&text, "to date").or_else(|| next_value(row, index))
                {
                    to = Some(value);
                }
            }
        }
    }

    (from, to)
}

/// Earliest and latest parseable date in a body column.
pub fn column_date_range(table: &ReconciledTable, column: &str) -> Option<(String, String)> {
    let dates: Vec<NaiveDateTime> = table
        .column_values(column)
        .into_iter()
        .filter_map(dates::parse_cell)
        .collect();
    let min = dates.iter().min()?;
    let max = dates.iter().max()?;
    Some((
        min.format(DISPLAY_DATE).to_string(),
        max.format(DISPLAY_DATE).to_string(),
    ))
}

/// Explicit values that take precedence over anything extracted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetaOverrides {
    pub title: Option<String>,
    pub from_date: Option<String>,
    pub to_date: Option<String>,
}

/// Combines overrides, extracted values and fallbacks into a [`ReportMeta`].
pub fn resolve(
    grid: &RawGrid,
    table: &ReconciledTable,
    rules: &MetaRules,
    overrides: &MetaOverrides,
    now: NaiveDateTime,
) -> ReportMeta {
    let title = overrides
        .title
        .clone()
        .or_else(|| rules.detect_title.then(|| detect_title(grid)).flatten())
        .unwrap_or_else(|| rules.default_title.clone());

    let (found_from, found_to) = match &rules.dates {
        DateSource::Today => (None, None),
        DateSource::HeaderScan => scan_header_dates(grid),
        DateSource::ColumnRange(column) => match column_date_range(table, column) {
            Some((from, to)) => (Some(from), Some(to)),
            None => scan_header_dates(grid),
        },
    };

    let today = now.format(DISPLAY_DATE).to_string();
    ReportMeta {
        title,
        from_date: overrides
            .from_date
            .clone()
            .or(found_from)
            .unwrap_or_else(|| today.clone()),
        to_date: overrides.to_date.clone().or(found_to).unwrap_or(today),
        generated_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 9, 3)
            .and_then(|date| date.and_hms_opt(10, 10, 0))
            .expect("valid timestamp")
    }

    #[test]
    fn titles_are_recognised() {
        let grid = RawGrid::from_strings(vec![vec!["", "SR.FAC"], vec!["Trans Type :- SALE INVOICE"]]);
        assert_eq!(detect_title(&grid).as_deref(), Some("SALE INVOICE"));

        let grid = RawGrid::from_strings(vec![vec!["Trans Type : APPROVAL ISSUE"]]);
        assert_eq!(detect_title(&grid).as_deref(), Some("APPROVAL ISSUE"));

        let grid = RawGrid::from_strings(vec![vec!["Stock Statement"]]);
        assert_eq!(detect_title(&grid), None);
    }

    #[test]
    fn header_dates_come_from_label_cells_or_neighbours() {
        let grid = RawGrid::from_strings(vec![
            vec!["Stock MLS Statement", ""],
            vec!["From Date : 08/09/2025", ""],
            vec!["To Date", "09/09/2025"],
        ]);
        let (from, to) = scan_header_dates(&grid);
        assert_eq!(from.as_deref(), Some("08/09/2025"));
        assert_eq!(to.as_deref(), Some("09/09/2025"));
    }

    #[test]
    fn combined_label_cell_is_split() {
        let grid = RawGrid::from_strings(vec![vec!["From Date :- 01/09/2025   To Date :- 02/09/2025"]]);
        let (from, to) = scan_header_dates(&grid);
        assert_eq!(from.as_deref(), Some("01/09/2025"));
        assert_eq!(to.as_deref(), Some("02/09/2025"));
    }

    #[test]
    fn overrides_and_fallbacks() {
        let grid = RawGrid::from_strings(vec![vec!["nothing here"]]);
        let table = ReconciledTable {
            columns: vec!["Trans Date".into()],
            rows: vec![
                vec![CellValue::text("2025-09-02")],
                vec![CellValue::text("2025-09-01")],
                vec![CellValue::text("n/a")],
            ],
            footer: None,
        };
        let rules = MetaRules {
            detect_title: true,
            default_title: "GOODS RECEIPT NOTE".into(),
            dates: DateSource::ColumnRange("Trans Date".into()),
        };

        let meta = resolve(&grid, &table, &rules, &MetaOverrides::default(), now());
        assert_eq!(meta.title, "GOODS RECEIPT NOTE");
        assert_eq!(meta.from_date, "01/09/2025");
        assert_eq!(meta.to_date, "02/09/2025");

        let overrides = MetaOverrides {
            title: Some("SALE INVOICE".into()),
            from_date: None,
            to_date: Some("30/09/2025".into()),
        };
        let rules = MetaRules::default();
        let meta = resolve(&grid, &table, &rules, &overrides, now());
        assert_eq!(meta.title, "SALE INVOICE");
        assert_eq!(meta.from_date, "03/09/2025");
        assert_eq!(meta.to_date, "30/09/2025");
    }

    #[test]
    fn templates_render() {
        let meta = ReportMeta {
            title: "GOODS RECEIPT NOTE".into(),
            from_date: "01/09/2025".into(),
            to_date: "02/09/2025".into(),
            generated_at: now(),
        };
        assert_eq!(
            meta.render("Stock Status :- Scrap _ Date : {date}  Time : {time}"),
            "Stock Status :- Scrap _ Date : 03-09-2025  Time : 10:10"
        );
        assert_eq!(meta.file_name("{title}.xlsx"), "GOODS_RECEIPT_NOTE.xlsx");
        assert_eq!(meta.file_name("loss_report_{ymd}.xlsx"), "loss_report_20250903.xlsx");
    }
}
