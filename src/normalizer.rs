//! Turns any sheet payload the application meets (upload responses, stored
//! documents, cached files, grid widget change events) into canonical [`Sheet`]s.
//!
//! Every upstream shape goes through one path:
//!
//! 1. a non-empty sparse `celldata` list is canonicalized cell by cell,
//! 2. otherwise a dense `data` row/column array is flattened, skipping blanks,
//! 3. otherwise raw text becomes a single cell at `(0, 0)`,
//! 4. anything else is an empty sheet.
//!
//! Bounds only ever grow: a declared `row`/`column` larger than the data is kept.
//! Running the output back through [`normalize`] yields the same sheets.

use crate::cell::{Bounds, Cell, cell_position, to_canonical};
use crate::spreadsheet::{Sheet, default_config};
use log::{debug, warn};
use serde_json::{Map, Value};

/// Keys consumed by the normalizer; everything else on a sheet passes through.
const CONSUMED_KEYS: &[&str] = &[
    "name", "celldata", "data", "row", "column", "rowCount", "colCount", "config", "rawText",
];

const RAW_TEXT_KEY: &str = "rawText";

/// A sheet payload classified by structural inspection.
#[derive(Debug, Clone, PartialEq)]
pub enum SheetInput<'a> {
    /// Populated positions only, each entry carrying `r`/`c`.
    Sparse {
        fields: &'a Map<String, Value>,
        cells: &'a [Value],
    },
    /// Row-major 2D array with explicit blanks.
    Dense {
        fields: &'a Map<String, Value>,
        rows: &'a [Value],
    },
    /// Non-tabular content, shown as one cell.
    RawText {
        name: Option<String>,
        text: String,
    },
    /// A sheet object without any recognizable content.
    Blank { fields: &'a Map<String, Value> },
}

impl<'a> SheetInput<'a> {
    /// Classifies one element of a sheets array. `None` for entries that cannot
    /// become a sheet at all (`null`).
    pub fn detect(raw: &'a Value) -> Option<Self> {
        match raw {
            Value::Null => None,
            Value::String(text) => Some(SheetInput::RawText {
                name: None,
                text: text.clone(),
            }),
            Value::Object(fields) => Some(Self::detect_object(fields)),
            Value::Array(_) => {
                warn!("Skipping sheet entry that is a bare array");
                None
            }
            scalar => Some(SheetInput::RawText {
                name: None,
                text: scalar.to_string(),
            }),
        }
    }

    fn detect_object(fields: &'a Map<String, Value>) -> Self {
        if let Some(Value::Array(cells)) = fields.get("celldata") {
            if !cells.is_empty() {
                return SheetInput::Sparse { fields, cells };
            }
        }
        if let Some(Value::Array(rows)) = fields.get("data") {
            if !rows.is_empty() {
                return SheetInput::Dense { fields, rows };
            }
        }
        if let Some(Value::String(text)) = fields.get(RAW_TEXT_KEY) {
            return SheetInput::RawText {
                name: sheet_name(fields),
                text: text.clone(),
            };
        }
        SheetInput::Blank { fields }
    }

    fn into_sheet(self, position: usize) -> Sheet {
        match self {
            SheetInput::Sparse { fields, cells } => {
                let cells = sparse_cells(cells);
                finish(fields, cells)
            }
            SheetInput::Dense { fields, rows } => {
                let cells = dense_cells(rows);
                finish(fields, cells)
            }
            SheetInput::RawText { name, text } => raw_text_sheet(name, text, position),
            SheetInput::Blank { fields } => finish(fields, Vec::new()),
        }
    }
}

/// Normalizes an untyped sheets payload into canonical sheets.
///
/// Never fails: a payload that is not a sequence logs a diagnostic and yields
/// no sheets, so callers can render an empty state. A bare string (or a
/// `{rawText}` object) is the one non-sequence accepted, as a single text sheet.
pub fn normalize(input: &Value) -> Vec<Sheet> {
    match input {
        Value::Array(items) => {
            let sheets: Vec<Sheet> = items
                .iter()
                .filter_map(SheetInput::detect)
                .enumerate()
                .map(|(i, sheet)| sheet.into_sheet(i))
                .collect();
            debug!("Normalized {} sheet(s) from {} entries", sheets.len(), items.len());
            sheets
        }
        Value::String(text) => vec![raw_text_sheet(None, text.clone(), 0)],
        Value::Object(fields) if fields.get(RAW_TEXT_KEY).is_some_and(Value::is_string) => {
            vec![SheetInput::detect_object(fields).into_sheet(0)]
        }
        other => {
            warn!("'sheets' is not an array: {}", describe(other));
            Vec::new()
        }
    }
}

fn sparse_cells(entries: &[Value]) -> Vec<Cell> {
    let mut cells = Vec::with_capacity(entries.len());
    for entry in entries {
        if entry.is_null() {
            continue;
        }
        match cell_position(entry) {
            Some((row, col)) => cells.push(to_canonical(row, col, entry)),
            None => warn!(
                "Dropping cell with a missing or out-of-range position: {}",
                describe(entry)
            ),
        }
    }
    cells
}

fn dense_cells(rows: &[Value]) -> Vec<Cell> {
    let mut cells = Vec::new();
    for (r, row) in rows.iter().enumerate() {
        let Value::Array(columns) = row else {
            if !row.is_null() {
                warn!("Skipping dense row {} that is not an array", r);
            }
            continue;
        };
        for (c, raw) in columns.iter().enumerate() {
            if raw.is_null() {
                continue;
            }
            let (Ok(row), Ok(col)) = (u32::try_from(r), u32::try_from(c)) else {
                continue;
            };
            cells.push(to_canonical(row, col, raw));
        }
    }
    cells
}

fn raw_text_sheet(name: Option<String>, text: String, position: usize) -> Sheet {
    let name = name.unwrap_or_else(|| format!("Sheet{}", position + 1));
    Sheet::from_cells(Some(name), vec![Cell::new(0, 0, text)], None)
}

fn finish(fields: &Map<String, Value>, cells: Vec<Cell>) -> Sheet {
    let mut sheet = Sheet::from_cells(sheet_name(fields), cells, declared_bounds(fields));

    if let Some(config) = fields.get("config").filter(|c| !c.is_null()) {
        sheet.config = config.clone();
    } else {
        sheet.config = default_config();
    }

    sheet.extra = fields
        .iter()
        .filter(|(key, _)| !CONSUMED_KEYS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    sheet
}

fn sheet_name(fields: &Map<String, Value>) -> Option<String> {
    match fields.get("name") {
        Some(Value::String(name)) => Some(name.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

fn declared_bounds(fields: &Map<String, Value>) -> Option<Bounds> {
    let rows = declared(fields, "row").or_else(|| declared(fields, "rowCount"));
    let cols = declared(fields, "column").or_else(|| declared(fields, "colCount"));
    if rows.is_none() && cols.is_none() {
        return None;
    }
    Some(Bounds {
        rows: rows.unwrap_or(0),
        cols: cols.unwrap_or(0),
    })
}

fn declared(fields: &Map<String, Value>, key: &str) -> Option<u32> {
    let raw = fields.get(key)?;
    if let Some(n) = raw.as_u64() {
        return Some(u32::try_from(n).unwrap_or(u32::MAX));
    }
    raw.as_f64()
        .filter(|f| f.is_finite() && *f >= 0.0)
        .map(|f| f.min(u32::MAX as f64) as u32)
}

fn describe(value: &Value) -> String {
    let text = value.to_string();
    if text.len() > 80 {
        let cut = (0..=80).rev().find(|i| text.is_char_boundary(*i)).unwrap_or(0);
        format!("{}...", &text[..cut])
    } else {
        text
    }
}
