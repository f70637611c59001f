use crate::cell::{Bounds, Cell, MAX_COLS, MAX_ROWS, bounds_of, within_limits};
use log::warn;
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;

/// One tab of tabular data, in the shape the grid widget consumes.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Sheet {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "celldata")]
    pub cells: Vec<Cell>,
    #[serde(rename = "row")]
    pub row_count: u32,
    #[serde(rename = "column")]
    pub col_count: u32,
    pub config: Value,
    /// Widget keys this crate does not interpret (`status`, `order`, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn clamped(declared: Bounds) -> Bounds {
    if declared.rows > MAX_ROWS || declared.cols > MAX_COLS {
        warn!(
            "Declared size {} x {} exceeds the sheet limits, clamping",
            declared.rows, declared.cols
        );
    }
    Bounds {
        rows: declared.rows.min(MAX_ROWS),
        cols: declared.cols.min(MAX_COLS),
    }
}

/// Per-sheet settings synthesized when the source carries none.
pub fn default_config() -> Value {
    json!({
        "authority": { "sheet": 0, "cell": 0 },
        "merge": {},
        "rowlen": {},
        "columnlen": {},
    })
}

impl Sheet {
    /// Builds a sheet from cells, deduplicating positions (last one wins) and
    /// sizing the grid to at least `declared`.
    ///
    /// Cells beyond [`MAX_ROWS`] x [`MAX_COLS`] are dropped and a larger
    /// declared size is clamped to it.
    pub fn from_cells(name: Option<String>, cells: Vec<Cell>, declared: Option<Bounds>) -> Self {
        let mut by_position: BTreeMap<(u32, u32), Cell> = BTreeMap::new();
        for cell in cells {
            if !within_limits(cell.row, cell.col) {
                warn!("Dropping cell at ({}, {}) beyond the sheet limits", cell.row, cell.col);
                continue;
            }
            by_position.insert((cell.row, cell.col), cell);
        }
        let cells: Vec<Cell> = by_position.into_values().collect();

        let computed = bounds_of(&cells);
        let (row_count, col_count) = match declared.map(clamped) {
            Some(d) => (computed.rows.max(d.rows), computed.cols.max(d.cols)),
            None => (computed.rows, computed.cols),
        };

        Sheet {
            name,
            cells,
            row_count,
            col_count,
            config: default_config(),
            extra: Map::new(),
        }
    }

    pub fn bounds(&self) -> Bounds {
        Bounds {
            rows: self.row_count,
            cols: self.col_count,
        }
    }

    pub fn get(&self, row: u32, col: u32) -> Option<&Cell> {
        self.cells
            .binary_search_by(|c| (c.row, c.col).cmp(&(row, col)))
            .ok()
            .map(|i| &self.cells[i])
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// The persisted or transient aggregate the page edits. `id` is present only
/// when the sheets are backed by server storage.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Document {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub sheets: Vec<Sheet>,
}

impl Document {
    pub fn new(id: Option<String>, sheets: Vec<Sheet>) -> Self {
        Document { id, sheets }
    }

    pub fn empty() -> Self {
        Document::default()
    }

    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.sheets.is_empty()
    }

    /// The sheets as the JSON array handed to the grid widget and the store.
    pub fn sheets_value(&self) -> Value {
        serde_json::to_value(&self.sheets).unwrap_or_else(|_| Value::Array(Vec::new()))
    }
}
