use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};
use std::fmt;

/// Grid height used when a sheet has no cells at all.
pub const DEFAULT_ROWS: u32 = 100;
/// Grid width used when a sheet has no cells at all.
pub const DEFAULT_COLS: u32 = 26;
/// Largest grid a sheet may describe, the XLSX worksheet limit.
pub const MAX_ROWS: u32 = 1_048_576;
pub const MAX_COLS: u32 = 16_384;

// Keys that describe the cell itself rather than its style.
const VALUE_KEY: &str = "v";
const DISPLAY_KEY: &str = "m";
const STYLE_KEY: &str = "style";

#[derive(Clone, Debug, PartialEq)]
pub enum CellValue {
    Text(String),
    Number(f64),
    Null,
}

impl CellValue {
    /// Converts a JSON scalar. Booleans and nested arrays are kept as text.
    pub fn from_scalar(raw: &Value) -> Self {
        match raw {
            Value::Null => CellValue::Null,
            Value::String(s) => CellValue::Text(s.clone()),
            Value::Number(n) => match n.as_f64() {
                Some(f) => CellValue::Number(f),
                None => CellValue::Text(n.to_string()),
            },
            Value::Bool(b) => CellValue::Text(b.to_string()),
            other => CellValue::Text(other.to_string()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Text(s) => f.write_str(s),
            CellValue::Number(n) => write!(f, "{}", n),
            CellValue::Null => Ok(()),
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

impl Serialize for CellValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CellValue::Text(s) => serializer.serialize_str(s),
            CellValue::Number(n) => serializer.serialize_f64(*n),
            CellValue::Null => serializer.serialize_unit(),
        }
    }
}

/// One populated grid position, 0-based.
#[derive(Clone, Debug, PartialEq)]
pub struct Cell {
    pub row: u32,
    pub col: u32,
    pub value: CellValue,
    pub display: String,
    pub style: Option<Map<String, Value>>,
}

impl Cell {
    pub fn new(row: u32, col: u32, value: impl Into<CellValue>) -> Self {
        let value = value.into();
        Cell {
            row,
            col,
            display: value.to_string(),
            value,
            style: None,
        }
    }

    pub fn with_style(mut self, style: Map<String, Value>) -> Self {
        self.style = if style.is_empty() { None } else { Some(style) };
        self
    }
}

// Serialized in the grid widget's own shape: {"r", "c", "v": {"v", "m", ...style}}
impl Serialize for Cell {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut inner = Map::new();
        if let Some(style) = &self.style {
            for (key, value) in style {
                inner.insert(key.clone(), value.clone());
            }
        }
        inner.insert(
            VALUE_KEY.to_string(),
            serde_json::to_value(&self.value).unwrap_or(Value::Null),
        );
        inner.insert(DISPLAY_KEY.to_string(), Value::String(self.display.clone()));

        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry("r", &self.row)?;
        map.serialize_entry("c", &self.col)?;
        map.serialize_entry("v", &inner)?;
        map.end()
    }
}

/// Wraps anything cell-like into a canonical [`Cell`] at `(row, col)`.
///
/// Bare scalars become `{value, display: value}`. Objects may be flat
/// (`{v, m, ct, ...}`) or nested any number of times under `v`; every level is
/// unwrapped and the remaining attributes become the style.
pub fn to_canonical(row: u32, col: u32, raw: &Value) -> Cell {
    let fields = match raw {
        Value::Object(fields) => fields,
        scalar => return Cell::new(row, col, CellValue::from_scalar(scalar)),
    };

    let mut value = None;
    let mut display = None;
    let mut style = Map::new();
    absorb(fields, true, &mut value, &mut display, &mut style);

    let value = match (value, &display) {
        (Some(v), _) => v,
        (None, Some(m)) => CellValue::Text(m.clone()),
        (None, None) => CellValue::Null,
    };
    let display = display.unwrap_or_else(|| value.to_string());

    Cell {
        row,
        col,
        value,
        display,
        style: None,
    }
    .with_style(style)
}

fn absorb(
    fields: &Map<String, Value>,
    top_level: bool,
    value: &mut Option<CellValue>,
    display: &mut Option<String>,
    style: &mut Map<String, Value>,
) {
    for (key, raw) in fields {
        match key.as_str() {
            "r" | "c" if top_level => {}
            VALUE_KEY => match raw {
                Value::Object(inner) => absorb(inner, false, value, display, style),
                scalar => {
                    if value.is_none() {
                        *value = Some(CellValue::from_scalar(scalar));
                    }
                }
            },
            DISPLAY_KEY => {
                if display.is_none() && !raw.is_null() {
                    *display = Some(CellValue::from_scalar(raw).to_string());
                }
            }
            STYLE_KEY => {
                // Only a keyed mapping counts as style; null or scalars are noise.
                if let Value::Object(entries) = raw {
                    for (name, attr) in entries {
                        if !matches!(name.as_str(), VALUE_KEY | DISPLAY_KEY | STYLE_KEY) {
                            style.entry(name.clone()).or_insert_with(|| attr.clone());
                        }
                    }
                }
            }
            _ => {
                style.entry(key.clone()).or_insert_with(|| raw.clone());
            }
        }
    }
}

/// Reads the `r`/`c` position of a sparse cell entry. Positions outside
/// [`MAX_ROWS`] x [`MAX_COLS`] are rejected.
pub fn cell_position(raw: &Value) -> Option<(u32, u32)> {
    let row = index_of(raw.get("r")?)?;
    let col = index_of(raw.get("c")?)?;
    within_limits(row, col).then_some((row, col))
}

pub fn within_limits(row: u32, col: u32) -> bool {
    row < MAX_ROWS && col < MAX_COLS
}

fn index_of(raw: &Value) -> Option<u32> {
    if let Some(n) = raw.as_u64() {
        return u32::try_from(n).ok();
    }
    let f = raw.as_f64()?;
    if f >= 0.0 && f.fract() == 0.0 && f <= u32::MAX as f64 {
        Some(f as u32)
    } else {
        None
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Bounds {
    pub rows: u32,
    pub cols: u32,
}

/// Grid extent needed to show every cell; an empty sheet still gets a usable blank grid.
pub fn bounds_of(cells: &[Cell]) -> Bounds {
    if cells.is_empty() {
        return Bounds {
            rows: DEFAULT_ROWS,
            cols: DEFAULT_COLS,
        };
    }

    let rows = cells.iter().map(|c| c.row).max().unwrap_or(0);
    let cols = cells.iter().map(|c| c.col).max().unwrap_or(0);
    Bounds {
        rows: rows.saturating_add(1),
        cols: cols.saturating_add(1),
    }
}
