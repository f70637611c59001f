//! Reads exported TXT/CSV content back into sheet payloads the normalizer
//! accepts, one dense `data` sheet per blank-line separated block.

use serde_json::{Value, json};

/// Parse pipe-delimited text
///
/// Each line `|v1|v2|` yields one row; the outer pipes are optional. A blank
/// line starts a new sheet.
///
/// # Arguments
/// * `text` - Content produced by [`crate::downloader::to_text`] or a SPED file
///
/// # Returns
/// * `Value` - A sheets array of dense sheets
///
/// # Examples
/// ```
/// use sped_sheets::loader::from_text;
///
/// let sheets = from_text("|A|B|\n|1||");
/// assert_eq!(sheets[0]["data"][1], serde_json::json!(["1", ""]));
/// ```
pub fn from_text(text: &str) -> Value {
    let mut blocks: Vec<Vec<Vec<String>>> = vec![Vec::new()];

    for line in text.lines() {
        if line.trim().is_empty() {
            blocks.push(Vec::new());
            continue;
        }
        let inner = line.strip_prefix('|').unwrap_or(line);
        let inner = inner.strip_suffix('|').unwrap_or(inner);
        let fields = inner.split('|').map(str::to_string).collect();
        if let Some(block) = blocks.last_mut() {
            block.push(fields);
        }
    }

    to_sheets(blocks)
}

/// Parse CSV content
///
/// Fields may be quoted; quoted fields may contain commas, doubled quotes and
/// newlines. A blank line between records starts a new sheet.
///
/// # Arguments
/// * `text` - Content produced by [`crate::downloader::to_csv`]
///
/// # Returns
/// * `Value` - A sheets array of dense sheets
pub fn from_csv(text: &str) -> Value {
    let mut blocks: Vec<Vec<Vec<String>>> = vec![Vec::new()];
    let mut record: Vec<String> = Vec::new();
    let mut current_field = String::new();
    let mut in_quotes = false;
    let mut line_has_content = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                line_has_content = true;
                if in_quotes && chars.peek() == Some(&'"') {
                    // Double quote inside quoted field - add a single quote
                    current_field.push('"');
                    chars.next();
                } else {
                    in_quotes = !in_quotes;
                }
            }
            ',' if !in_quotes => {
                line_has_content = true;
                record.push(std::mem::take(&mut current_field));
            }
            '\r' if !in_quotes => {}
            '\n' if !in_quotes => {
                if line_has_content {
                    record.push(std::mem::take(&mut current_field));
                    if let Some(block) = blocks.last_mut() {
                        block.push(std::mem::take(&mut record));
                    }
                } else {
                    blocks.push(Vec::new());
                }
                line_has_content = false;
            }
            _ => {
                line_has_content = true;
                current_field.push(c);
            }
        }
    }

    // Add the last record
    if line_has_content {
        record.push(current_field);
        if let Some(block) = blocks.last_mut() {
            block.push(record);
        }
    }

    to_sheets(blocks)
}

fn to_sheets(blocks: Vec<Vec<Vec<String>>>) -> Value {
    let sheets: Vec<Value> = blocks
        .into_iter()
        .filter(|rows| !rows.is_empty())
        .enumerate()
        .map(|(i, rows)| json!({ "name": format!("Sheet{}", i + 1), "data": rows }))
        .collect();
    Value::Array(sheets)
}
