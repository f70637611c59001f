//! Browser bindings: the page normalizes and exports without a round trip.

use serde_json::Value;
use wasm_bindgen::prelude::*;

use crate::downloader::{self, Format};
use crate::normalizer::normalize;

fn to_js_error(err: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&err.to_string())
}

/// Canonical sheets for any accepted sheets payload, as JSON.
#[wasm_bindgen(js_name = "normalizeSheets")]
pub fn normalize_sheets(json: &str) -> Result<String, JsValue> {
    let raw: Value = serde_json::from_str(json).map_err(to_js_error)?;
    serde_json::to_string(&normalize(&raw)).map_err(to_js_error)
}

/// File bytes for a sheets payload in `txt`, `csv` or `xlsx`.
#[wasm_bindgen(js_name = "exportSheets")]
pub fn export_sheets(json: &str, format: &str) -> Result<Vec<u8>, JsValue> {
    let format: Format = format.parse().map_err(to_js_error)?;
    let raw: Value = serde_json::from_str(json).map_err(to_js_error)?;
    let download = downloader::export_sheets(&normalize(&raw), format).map_err(to_js_error)?;
    Ok(download.bytes)
}
