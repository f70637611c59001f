use crate::cell::{Bounds, Cell, CellValue, MAX_COLS, MAX_ROWS, bounds_of};
use crate::error::ExportError;
use crate::spreadsheet::{Document, Sheet};
use lazy_static::lazy_static;
use regex::Regex;
use rust_xlsxwriter::{Workbook, XlsxError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

lazy_static! {
    static ref INVALID_SHEET_NAME_CHARS: Regex = Regex::new(r"[\[\]:*?/\\]").unwrap();
}

/// File stem used for every download.
pub const EXPORT_FILE_STEM: &str = "exported_file";

/// Largest number of grid positions a TXT or CSV export writes, summed over sheets.
pub const MAX_TEXT_EXPORT_CELLS: u64 = 10_000_000;

const MAX_SHEET_NAME_LEN: usize = 31;

/// Target format of an export.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// Pipe-delimited text, the SPED layout.
    #[serde(alias = "txt")]
    Text,
    Csv,
    Xlsx,
}

impl Format {
    pub fn extension(&self) -> &'static str {
        match self {
            Format::Text => "txt",
            Format::Csv => "csv",
            Format::Xlsx => "xlsx",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Format::Text => "text/plain; charset=utf-8",
            Format::Csv => "text/csv; charset=utf-8",
            Format::Xlsx => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        }
    }
}

impl FromStr for Format {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "txt" | "text" => Ok(Format::Text),
            "csv" => Ok(Format::Csv),
            "xlsx" => Ok(Format::Xlsx),
            other => Err(ExportError::UnknownFormat(other.to_string())),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// A file ready to hand to the browser.
#[derive(Clone, Debug, PartialEq)]
pub struct Download {
    pub file_name: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

/// Export the current sheets of a document
///
/// This is the single entry point behind the TXT/CSV/XLSX export buttons. It
/// works on whatever the document holds right now, so edits are included.
///
/// # Arguments
/// * `document` - The document whose sheets are exported
/// * `format` - Target file format
///
/// # Returns
/// * `Result<Download, ExportError>` - The file, or `ExportError::NoSheets`
///   when there is nothing loaded (no empty file is ever produced)
///
/// # Examples
/// ```
/// use sped_sheets::downloader::{export, Format};
/// use sped_sheets::normalizer::normalize;
/// use sped_sheets::spreadsheet::Document;
///
/// let sheets = normalize(&serde_json::json!([{ "data": [["A", "B"]] }]));
/// let file = export(&Document::new(None, sheets), Format::Text).unwrap();
/// assert_eq!(file.file_name, "exported_file.txt");
/// assert_eq!(file.bytes, b"|A|B|");
/// ```
pub fn export(document: &Document, format: Format) -> Result<Download, ExportError> {
    export_sheets(&document.sheets, format)
}

/// Same as [`export`] for a bare list of sheets.
///
/// Refuses with `ExportError::TooLarge` when a sheet's grid exceeds the
/// worksheet limits, or when a TXT/CSV export would write more than
/// [`MAX_TEXT_EXPORT_CELLS`] positions.
pub fn export_sheets(sheets: &[Sheet], format: Format) -> Result<Download, ExportError> {
    if sheets.is_empty() {
        return Err(ExportError::NoSheets);
    }
    check_size(sheets, format)?;

    let bytes = match format {
        Format::Text => to_text(sheets).into_bytes(),
        Format::Csv => to_csv(sheets).into_bytes(),
        Format::Xlsx => to_xlsx(sheets)?,
    };

    log::info!(
        "Exported {} sheet(s) as {} ({} bytes)",
        sheets.len(),
        format,
        bytes.len()
    );

    Ok(Download {
        file_name: format!("{}.{}", EXPORT_FILE_STEM, format.extension()),
        content_type: format.content_type(),
        bytes,
    })
}

/// Export only the sheets whose name is in `selected`, in document order.
///
/// An empty selection exports every sheet. A selection matching no sheet is
/// `ExportError::NoSheets`.
pub fn export_selected(
    sheets: &[Sheet],
    format: Format,
    selected: &[String],
) -> Result<Download, ExportError> {
    if selected.is_empty() {
        return export_sheets(sheets, format);
    }
    let chosen: Vec<Sheet> = sheets
        .iter()
        .filter(|sheet| sheet.name.as_ref().is_some_and(|name| selected.contains(name)))
        .cloned()
        .collect();
    export_sheets(&chosen, format)
}

fn check_size(sheets: &[Sheet], format: Format) -> Result<(), ExportError> {
    let mut positions: u64 = 0;
    for sheet in sheets {
        let bounds = grid_bounds(sheet);
        positions += u64::from(bounds.rows) * u64::from(bounds.cols);

        let too_large = bounds.rows > MAX_ROWS
            || bounds.cols > MAX_COLS
            || (format != Format::Xlsx && positions > MAX_TEXT_EXPORT_CELLS);
        if too_large {
            log::warn!(
                "Refusing to export a {} x {} sheet as {}",
                bounds.rows,
                bounds.cols,
                format
            );
            return Err(ExportError::TooLarge {
                rows: bounds.rows,
                cols: bounds.cols,
            });
        }
    }
    Ok(())
}

/// Extent of the grid an export writes for a sheet
///
/// The declared size, widened to the data actually present.
pub fn grid_bounds(sheet: &Sheet) -> Bounds {
    let mut bounds = sheet.bounds();
    if !sheet.cells.is_empty() {
        let present = bounds_of(&sheet.cells);
        bounds.rows = bounds.rows.max(present.rows);
        bounds.cols = bounds.cols.max(present.cols);
    }
    bounds
}

/// Row-major walk over the grid of a sheet, one row of strings at a time.
///
/// Only the current row is materialized; gaps are `""`.
pub struct DenseRows<'a> {
    cells: Vec<&'a Cell>,
    next_cell: usize,
    row: u32,
    bounds: Bounds,
}

impl<'a> Iterator for DenseRows<'a> {
    type Item = Vec<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.row >= self.bounds.rows {
            return None;
        }

        let mut values = vec![String::new(); self.bounds.cols as usize];
        while let Some(cell) = self.cells.get(self.next_cell).copied() {
            if cell.row != self.row {
                break;
            }
            if let Some(slot) = values.get_mut(cell.col as usize) {
                *slot = cell.value.to_string();
            }
            self.next_cell += 1;
        }
        self.row += 1;
        Some(values)
    }
}

/// The grid of a sheet as rows of strings
///
/// Iterates every row `0..rows` of [`grid_bounds`], each with `cols` values.
///
/// # Arguments
/// * `sheet` - The sheet to expand
///
/// # Returns
/// * `DenseRows` - One `Vec<String>` per row
pub fn dense_rows(sheet: &Sheet) -> DenseRows<'_> {
    let mut cells: Vec<&Cell> = sheet.cells.iter().collect();
    cells.sort_by_key(|cell| (cell.row, cell.col));
    DenseRows {
        cells,
        next_cell: 0,
        row: 0,
        bounds: grid_bounds(sheet),
    }
}

/// Convert sheets to pipe-delimited text
///
/// Each row becomes `|v1|v2|...|`, rows are joined with newlines and sheets
/// are separated by a blank line. No row is skipped: a header row present in
/// the data is exported like any other.
///
/// # Arguments
/// * `sheets` - Sheets to convert, in document order
///
/// # Returns
/// * `String` - The text content
///
/// # Examples
/// ```
/// use sped_sheets::cell::Cell;
/// use sped_sheets::downloader::to_text;
/// use sped_sheets::spreadsheet::Sheet;
///
/// let sheet = Sheet::from_cells(None, vec![Cell::new(0, 0, "C100"), Cell::new(0, 2, "1")], None);
/// assert_eq!(to_text(&[sheet]), "|C100||1|");
/// ```
pub fn to_text(sheets: &[Sheet]) -> String {
    sheets
        .iter()
        .map(|sheet| {
            dense_rows(sheet)
                .map(|row| format!("|{}|", row.join("|")))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Convert sheets to CSV format
///
/// Every value is wrapped in double quotes (embedded quotes are doubled),
/// values are comma-separated and every row ends with a newline. Sheets are
/// separated by a blank line. No header row is synthesized.
///
/// # Arguments
/// * `sheets` - Sheets to convert, in document order
///
/// # Returns
/// * `String` - CSV content
pub fn to_csv(sheets: &[Sheet]) -> String {
    let mut lines = Vec::new();

    for sheet in sheets {
        for row in dense_rows(sheet) {
            let quoted: Vec<String> = row
                .iter()
                .map(|value| format!("\"{}\"", value.replace('"', "\"\"")))
                .collect();
            lines.push(quoted.join(","));
        }
        // Separate sheets with a blank line
        lines.push(String::new());
    }

    lines.join("\n")
}

/// Convert sheets to an XLSX workbook
///
/// One worksheet per sheet, in order. Numbers are written as numbers, text as
/// strings, and gaps are left blank.
///
/// # Arguments
/// * `sheets` - Sheets to convert, in document order
///
/// # Returns
/// * `Result<Vec<u8>, ExportError>` - Workbook bytes, or the writer's error
pub fn to_xlsx(sheets: &[Sheet]) -> Result<Vec<u8>, ExportError> {
    let mut workbook = Workbook::new();

    for (sheet, name) in sheets.iter().zip(worksheet_names(sheets)) {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(&name)?;

        for cell in &sheet.cells {
            let col_num = u16::try_from(cell.col).map_err(|_| XlsxError::RowColumnLimitError)?;
            match &cell.value {
                CellValue::Number(n) if n.is_finite() => {
                    worksheet.write_number(cell.row, col_num, *n)?;
                }
                CellValue::Null => {}
                value => {
                    let text = value.to_string();
                    if !text.is_empty() {
                        worksheet.write_string(cell.row, col_num, &text)?;
                    }
                }
            }
        }
    }

    let buffer = workbook.save_to_buffer()?;

    Ok(buffer)
}

/// Worksheet names: the sheet's own name when Excel accepts it, else `Sheet{n}`.
fn worksheet_names(sheets: &[Sheet]) -> Vec<String> {
    let mut taken = HashSet::new();
    let mut names = Vec::with_capacity(sheets.len());

    for (i, sheet) in sheets.iter().enumerate() {
        let own = sheet
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| is_valid_sheet_name(n) && !taken.contains(&n.to_lowercase()));

        let name = match own {
            Some(n) => n.to_string(),
            None => {
                let mut n = i + 1;
                while taken.contains(&format!("sheet{}", n)) {
                    n += 1;
                }
                format!("Sheet{}", n)
            }
        };
        taken.insert(name.to_lowercase());
        names.push(name);
    }
    names
}

fn is_valid_sheet_name(name: &str) -> bool {
    !name.is_empty()
        && name.chars().count() <= MAX_SHEET_NAME_LEN
        && !INVALID_SHEET_NAME_CHARS.is_match(name)
        && !name.starts_with('\'')
        && !name.ends_with('\'')
        && !name.eq_ignore_ascii_case("history")
}
