use rust_xlsxwriter::{Color, Format, FormatAlign, FormatBorder, Workbook, Worksheet};
use tracing::debug;

use crate::dates;
use crate::error::Result;
use crate::meta::ReportMeta;
use crate::model::{CellValue, ColumnKind, RawGrid, ReconciledTable, TargetSchema};
use crate::profile::{Layout, TitleAlign};

const FOOTER_YELLOW: u32 = 0xFFFF00;
const DATE_FORMAT: &str = "dd-mm-yyyy";
const AUTO_WIDTH_PADDING: f64 = 2.0;

struct ReportFormats {
    title: Format,
    subtitle: Format,
    header: Format,
    body: Format,
    body_number: Format,
    body_date: Format,
    footer: Format,
    footer_number: Format,
}

impl ReportFormats {
    fn new(layout: &Layout) -> Self {
        let align = match layout.title_align {
            TitleAlign::Left => FormatAlign::Left,
            TitleAlign::Center => FormatAlign::Center,
        };
        let mut title = Format::new()
            .set_bold()
            .set_font_size(14)
            .set_align(align)
            .set_align(FormatAlign::VerticalCenter);
        if let Some(fill) = layout.title_fill {
            title = title
                .set_background_color(Color::RGB(fill))
                .set_font_color(Color::White);
        }
        let subtitle = Format::new()
            .set_bold()
            .set_align(align)
            .set_align(FormatAlign::VerticalCenter);

        let mut header = Format::new()
            .set_bold()
            .set_text_wrap()
            .set_border(FormatBorder::Thin)
            .set_align(FormatAlign::Center)
            .set_align(FormatAlign::VerticalCenter);
        if let Some(fill) = layout.header_fill {
            header = header.set_background_color(Color::RGB(fill));
        }
        if layout.header_font_white {
            header = header.set_font_color(Color::White);
        }

        let body = Format::new()
            .set_border(FormatBorder::Thin)
            .set_align(FormatAlign::VerticalCenter);
        let body_number = match &layout.number_format {
            Some(pattern) => body.clone().set_num_format(pattern),
            None => body.clone(),
        };
        let body_date = body.clone().set_num_format(DATE_FORMAT);

        let footer = Format::new()
            .set_bold()
            .set_text_wrap()
            .set_border(FormatBorder::Thin)
            .set_align(FormatAlign::Center)
            .set_align(FormatAlign::VerticalCenter)
            .set_background_color(Color::RGB(layout.footer_fill.unwrap_or(FOOTER_YELLOW)));
        let footer_number = match &layout.number_format {
            Some(pattern) => footer.clone().set_num_format(pattern),
            None => footer.clone(),
        };

        Self {
            title,
            subtitle,
            header,
            body,
            body_number,
            body_date,
            footer,
            footer_number,
        }
    }
}

/// Renders a reconciled table as a formatted single-sheet workbook.
///
/// Layout, top to bottom: one merged row per title template, the header row,
/// the body, then the footer record when present. Formula columns receive a
/// live formula on every body row, with `{row}` replaced by the 1-based sheet
/// row; the footer carries plain values only.
pub fn write_report(
    table: &ReconciledTable,
    schema: &TargetSchema,
    layout: &Layout,
    meta: &ReportMeta,
) -> Result<Vec<u8>> {
    let formats = ReportFormats::new(layout);
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(sanitize_sheet_name(&layout.sheet_name))?;

    let last_col = schema.len().saturating_sub(1) as u16;
    for (idx, template) in layout.titles.iter().enumerate() {
        let text = meta.render(template);
        let format = if idx == 0 {
            &formats.title
        } else {
            &formats.subtitle
        };
        write_title_row(worksheet, idx as u32, last_col, &text, format)?;
    }

    let header_row = layout.titles.len() as u32;
    for (col_idx, name) in schema.names().iter().enumerate() {
        worksheet.write_string_with_format(header_row, col_idx as u16, name, &formats.header)?;
    }
    if let Some(height) = layout.header_row_height {
        worksheet.set_row_height(header_row, height)?;
    }

    let mut sheet_row = header_row + 1;
    for row in &table.rows {
        for (col_idx, column) in schema.columns.iter().enumerate() {
            let col = col_idx as u16;
            match &column.kind {
                ColumnKind::Formula {
                    template,
                    num_format,
                } => {
                    let formula = template.replace("{row}", &(sheet_row + 1).to_string());
                    let format = match num_format {
                        Some(pattern) => formats.body.clone().set_num_format(pattern),
                        None => formats.body_number.clone(),
                    };
                    worksheet.write_formula_with_format(sheet_row, col, formula.as_str(), &format)?;
                }
                _ => {
                    let cell = row.get(col_idx).unwrap_or(&CellValue::Empty);
                    write_cell(
                        worksheet,
                        sheet_row,
                        col,
                        cell,
                        &formats.body,
                        &formats.body_number,
                        &formats.body_date,
                    )?;
                }
            }
        }
        if let Some(height) = layout.body_row_height {
            worksheet.set_row_height(sheet_row, height)?;
        }
        sheet_row += 1;
    }

    if let Some(footer) = &table.footer {
        for col_idx in 0..schema.len() {
            let cell = footer.cells.get(col_idx).unwrap_or(&CellValue::Empty);
            write_cell(
                worksheet,
                sheet_row,
                col_idx as u16,
                cell,
                &formats.footer,
                &formats.footer_number,
                &formats.footer,
            )?;
        }
        if let Some(height) = layout.footer_row_height {
            worksheet.set_row_height(sheet_row, height)?;
        }
    }

    for (col_idx, name) in schema.names().iter().enumerate() {
        let width = column_width(table, layout, col_idx, name);
        worksheet.set_column_width(col_idx as u16, width)?;
    }

    debug!(
        sheet = %layout.sheet_name,
        body_rows = table.rows.len(),
        footer = table.footer.is_some(),
        "composed report sheet"
    );
    Ok(workbook.save_to_buffer()?)
}

/// Copies every sheet value-for-value, adding a thin border and left
/// alignment to each cell.
pub fn write_bordered_copy(sheets: &[(String, RawGrid)]) -> Result<Vec<u8>> {
    let format = Format::new()
        .set_border(FormatBorder::Thin)
        .set_align(FormatAlign::Left);
    let date_format = format.clone().set_num_format(DATE_FORMAT);

    let mut workbook = Workbook::new();
    for (name, grid) in sheets {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(sanitize_sheet_name(name))?;
        for (row_idx, row) in grid.rows.iter().enumerate() {
            for (col_idx, cell) in row.iter().enumerate() {
                write_cell(
                    worksheet,
                    row_idx as u32,
                    col_idx as u16,
                    cell,
                    &format,
                    &format,
                    &date_format,
                )?;
            }
        }
    }
    Ok(workbook.save_to_buffer()?)
}

fn write_title_row(
    worksheet: &mut Worksheet,
    row: u32,
    last_col: u16,
    text: &str,
    format: &Format,
) -> Result<()> {
    if last_col == 0 {
        worksheet.write_string_with_format(row, 0, text, format)?;
    } else {
        worksheet.merge_range(row, 0, row, last_col, text, format)?;
    }
    Ok(())
}

fn write_cell(
    worksheet: &mut Worksheet,
    row: u32,
    col: u16,
    cell: &CellValue,
    text_format: &Format,
    number_format: &Format,
    date_format: &Format,
) -> Result<()> {
    match cell {
        CellValue::Empty => {
            worksheet.write_blank(row, col, text_format)?;
        }
        CellValue::Text(value) => {
            worksheet.write_string_with_format(row, col, value, text_format)?;
        }
        CellValue::Number(value) => {
            worksheet.write_number_with_format(row, col, *value, number_format)?;
        }
        CellValue::Bool(value) => {
            worksheet.write_boolean_with_format(row, col, *value, text_format)?;
        }
        CellValue::Date(value) => {
            worksheet.write_number_with_format(
                row,
                col,
                dates::to_excel_serial(*value),
                date_format,
            )?;
        }
    }
    Ok(())
}

fn column_width(table: &ReconciledTable, layout: &Layout, col_idx: usize, name: &str) -> f64 {
    if let Some(width) = layout.widths.get(name) {
        return *width;
    }
    if let Some(width) = layout.default_width {
        return width;
    }

    let longest = table
        .rows
        .iter()
        .filter_map(|row| row.get(col_idx))
        .map(|cell| cell.to_string().chars().count())
        .chain(std::iter::once(name.chars().count()))
        .max()
        .unwrap_or_default();
    (longest as f64 + AUTO_WIDTH_PADDING).min(layout.max_auto_width)
}

/// Makes `raw` acceptable as an Excel sheet name.
pub fn sanitize_sheet_name(raw: &str) -> String {
    let invalid = [':', '\\', '/', '?', '*', '[', ']'];
    let sanitized: String = raw
        .chars()
        .map(|ch| {
            if invalid.contains(&ch) || ch.is_control() {
                '_'
            } else {
                ch
            }
        })
        .collect();

    let trimmed = sanitized.trim().trim_matches('\'');
    if trimmed.is_empty() {
        return "Sheet1".to_string();
    }
    trimmed.chars().take(31).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sheet_names_are_made_valid() {
        assert_eq!(sanitize_sheet_name("Loss / Gain [Sep]"), "Loss _ Gain _Sep_");
        assert_eq!(sanitize_sheet_name("   "), "Sheet1");
        assert_eq!(
            sanitize_sheet_name("A very long worksheet name that overflows").chars().count(),
            31
        );
    }
}
