use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime};
use tracing::{info, instrument, warn};

use crate::derive::apply_steps;
use crate::detect::{detect_header, footer_rows};
use crate::error::{Result, ToolError};
use crate::io::{excel_read, excel_write};
use crate::meta::{self, MetaOverrides, ReportMeta};
use crate::model::RawGrid;
use crate::profile::ToolProfile;
use crate::reconcile::{CollisionPolicy, map_columns, reconcile, unmatched_columns};
use crate::summary;

/// MIME type of every generated workbook.
pub const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

const BORDERED_FILE_NAME: &str = "formatted_excel.xlsx";

/// Per-request adjustments on top of a tool profile.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportOptions {
    pub title: Option<String>,
    pub from_date: Option<String>,
    pub to_date: Option<String>,
    /// Replaces the profile's collision policy.
    pub collision: Option<CollisionPolicy>,
}

impl ReportOptions {
    fn overrides(&self) -> MetaOverrides {
        MetaOverrides {
            title: self.title.clone(),
            from_date: self.from_date.clone(),
            to_date: self.to_date.clone(),
        }
    }
}

/// A generated workbook ready to be saved or served.
#[derive(Debug, Clone, PartialEq)]
pub struct ReshapeOutput {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub mime: &'static str,
    pub warnings: Vec<String>,
}

/// Reshapes an uploaded workbook according to `profile`.
#[instrument(level = "info", skip_all, fields(profile = %profile.name))]
pub fn reshape_bytes(
    bytes: &[u8],
    profile: &ToolProfile,
    options: &ReportOptions,
) -> Result<ReshapeOutput> {
    profile.validate()?;
    let grid = excel_read::read_grid_from_bytes(bytes)?;
    reshape_grid(&grid, profile, options, Local::now().naive_local())
}

/// Reads `input` from disk and reshapes it.
pub fn reshape_file(
    input: &Path,
    profile: &ToolProfile,
    options: &ReportOptions,
) -> Result<ReshapeOutput> {
    let bytes = read_input(input)?;
    reshape_bytes(&bytes, profile, options)
}

/// Runs detection, reconciliation, derivation and composition over an
/// already loaded grid, stamping the report with `now`.
pub fn reshape_grid(
    grid: &RawGrid,
    profile: &ToolProfile,
    options: &ReportOptions,
    now: NaiveDateTime,
) -> Result<ReshapeOutput> {
    let mut warnings = Vec::new();

    let header = detect_header(grid, &profile.schema, profile.threshold);
    if header.degraded {
        warnings.push(format!(
            "no row met the header threshold for '{}'; using the first row",
            profile.name
        ));
    }

    let collision = options.collision.unwrap_or(profile.collision);
    let header_cells = grid.row(header.row).unwrap_or_default();
    let mapping = map_columns(header_cells, &profile.schema, profile.label_match, collision);
    if mapping.matched_count() == 0 {
        return Err(ToolError::NoColumnsMatched {
            profile: profile.name.clone(),
            header_row: header.row,
        });
    }

    let missing = unmatched_columns(&profile.schema, &mapping);
    if !missing.is_empty() {
        warn!(missing = ?missing, "columns not found in header; filling blanks");
        warnings.push(format!(
            "{} missing columns filled blank: {}",
            missing.len(),
            missing.join(", ")
        ));
    }

    let extra_totals = footer_rows(grid, &profile.footer, header.row).len().saturating_sub(1);
    if extra_totals > 0 {
        warn!(extra_totals, "only the first total row is kept");
        warnings.push(format!("{extra_totals} extra total rows dropped"));
    }

    let mut table = reconcile(grid, &header, &profile.schema, &mapping, &profile.footer);
    apply_steps(&mut table, &profile.steps)?;

    let meta = meta::resolve(grid, &table, &profile.meta, &options.overrides(), now);
    let bytes = excel_write::write_report(&table, &profile.schema, &profile.layout, &meta)?;

    info!(
        header_row = header.row,
        matched = mapping.matched_count(),
        body_rows = table.rows.len(),
        "report generated"
    );

    Ok(ReshapeOutput {
        bytes,
        file_name: meta.file_name(&profile.layout.file_name),
        mime: XLSX_MIME,
        warnings,
    })
}

/// Builds the party/karat pivot of a goods-receipt report.
#[instrument(level = "info", skip_all)]
pub fn summarize_bytes(bytes: &[u8]) -> Result<ReshapeOutput> {
    let grid = excel_read::read_preferred_sheet(bytes, summary::SOURCE_SHEET)?;
    let pivot = summary::build_pivot(&grid)?;

    let layout = summary::pivot_layout();
    let now = Local::now().naive_local();
    let stamp = now.format("%d/%m/%Y").to_string();
    let meta = ReportMeta {
        title: String::new(),
        from_date: stamp.clone(),
        to_date: stamp,
        generated_at: now,
    };
    let bytes = excel_write::write_report(&pivot.table, &summary::pivot_schema(), &layout, &meta)?;

    info!(groups = pivot.table.rows.len(), "pivot generated");
    Ok(ReshapeOutput {
        bytes,
        file_name: meta.file_name(&layout.file_name),
        mime: XLSX_MIME,
        warnings: pivot.warnings,
    })
}

pub fn summarize_file(input: &Path) -> Result<ReshapeOutput> {
    let bytes = read_input(input)?;
    summarize_bytes(&bytes)
}

/// Re-emits every sheet with thin borders and left alignment.
#[instrument(level = "info", skip_all)]
pub fn border_bytes(bytes: &[u8]) -> Result<ReshapeOutput> {
    let sheets = excel_read::read_all_sheets(bytes)?;
    let bytes = excel_write::write_bordered_copy(&sheets)?;
    info!(sheets = sheets.len(), "bordered copy generated");
    Ok(ReshapeOutput {
        bytes,
        file_name: BORDERED_FILE_NAME.into(),
        mime: XLSX_MIME,
        warnings: Vec::new(),
    })
}

pub fn border_file(input: &Path) -> Result<ReshapeOutput> {
    let bytes = read_input(input)?;
    border_bytes(&bytes)
}

/// Saves `output` to `target`, or to its suggested file name in the current
/// directory.
pub fn write_output(output: &ReshapeOutput, target: Option<&Path>) -> Result<PathBuf> {
    let path = match target {
        Some(path) => path.to_path_buf(),
        None => PathBuf::from(&output.file_name),
    };
    fs::write(&path, &output.bytes)?;
    Ok(path)
}

fn read_input(input: &Path) -> Result<Vec<u8>> {
    if !input.exists() {
        return Err(ToolError::MissingInput(input.to_path_buf()));
    }
    Ok(fs::read(input)?)
}
