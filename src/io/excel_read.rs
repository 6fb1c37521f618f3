use std::io::Cursor;
use std::path::Path;

use calamine::{DataType, Range, Reader, Xlsx};
use tracing::debug;

use crate::dates;
use crate::error::{Result, ToolError};
use crate::model::{CellValue, RawGrid};

/// Reads the first worksheet of an `.xlsx` payload as a cell grid.
pub fn read_grid_from_bytes(bytes: &[u8]) -> Result<RawGrid> {
    let mut workbook = open_bytes(bytes)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| ToolError::InvalidWorkbook("workbook has no sheets".into()))?
        .map_err(ToolError::from)?;
    let grid = range_to_grid(&range);
    if grid.is_empty() {
        return Err(ToolError::InvalidWorkbook("first sheet is empty".into()));
    }
    debug!(rows = grid.len(), "loaded first sheet");
    Ok(grid)
}

/// Reads the first worksheet of the workbook at `path`.
pub fn read_grid(path: &Path) -> Result<RawGrid> {
    let bytes = std::fs::read(path)?;
    read_grid_from_bytes(&bytes)
}

/// Reads the named sheet when present, otherwise the first one.
pub fn read_preferred_sheet(bytes: &[u8], name: &str) -> Result<RawGrid> {
    let mut workbook = open_bytes(bytes)?;
    let has_sheet = workbook.sheet_names().iter().any(|sheet| sheet == name);
    if !has_sheet {
        return read_grid_from_bytes(bytes);
    }
    let range = read_required_sheet(&mut workbook, name)?;
    let grid = range_to_grid(&range);
    if grid.is_empty() {
        return Err(ToolError::InvalidWorkbook(format!("sheet '{name}' is empty")));
    }
    Ok(grid)
}

/// Reads every worksheet, in workbook order, with its name.
pub fn read_all_sheets(bytes: &[u8]) -> Result<Vec<(String, RawGrid)>> {
    let mut workbook = open_bytes(bytes)?;
    let names = workbook.sheet_names().to_owned();
    if names.is_empty() {
        return Err(ToolError::InvalidWorkbook("workbook has no sheets".into()));
    }

    let mut sheets = Vec::with_capacity(names.len());
    for name in names {
        let range = read_required_sheet(&mut workbook, &name)?;
        sheets.push((name, range_to_grid(&range)));
    }
    Ok(sheets)
}

fn open_bytes(bytes: &[u8]) -> Result<Xlsx<Cursor<&[u8]>>> {
    Ok(Xlsx::new(Cursor::new(bytes))?)
}

fn read_required_sheet<R: std::io::Read + std::io::Seek>(
    workbook: &mut Xlsx<R>,
    name: &str,
) -> Result<Range<DataType>> {
    let range_result = workbook
        .worksheet_range(name)
        .ok_or_else(|| ToolError::InvalidWorkbook(format!("missing sheet '{name}'")))?;
    let range = range_result.map_err(ToolError::from)?;
    Ok(range)
}

/// Converts a used range into a grid anchored at A1, so leading blank rows
/// and columns keep their positions.
fn range_to_grid(range: &Range<DataType>) -> RawGrid {
    let (row_offset, col_offset) = range
        .start()
        .map(|(row, col)| (row as usize, col as usize))
        .unwrap_or((0, 0));

    let mut rows = vec![Vec::new(); row_offset];
    for row in range.rows() {
        let mut cells = vec![CellValue::Empty; col_offset];
        cells.extend(row.iter().map(cell_to_value));
        rows.push(cells);
    }
    RawGrid::new(rows)
}

fn cell_to_value(cell: &DataType) -> CellValue {
    match cell {
        DataType::String(value) => CellValue::text(value.as_str()),
        DataType::Float(value) => CellValue::Number(*value),
        DataType::Int(value) => CellValue::Number(*value as f64),
        DataType::Bool(value) => CellValue::Bool(*value),
        DataType::DateTime(serial) => dates::from_excel_serial(*serial)
            .map(CellValue::Date)
            .unwrap_or(CellValue::Number(*serial)),
        DataType::Empty | DataType::Error(_) => CellValue::Empty,
        other => CellValue::text(other.to_string()),
    }
}
