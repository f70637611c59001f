//! Local fallback store for previously uploaded files ("saved files").
//!
//! The store itself is an untyped key-value collaborator ([`LocalCache`]);
//! [`SavedFiles`] reads and writes the one key the application uses. Records come
//! in two shapes, grouped uploads and legacy flat files, and both are read.

use chrono::{DateTime, Utc};
use crate::error::CacheError;
use crate::normalizer::normalize;
use crate::spreadsheet::Sheet;
use log::{info, warn};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// Key holding the ordered list of saved-file records.
pub const SAVED_FILES_KEY: &str = "savedFiles";

pub trait LocalCache {
    fn get(&self, key: &str) -> Result<Option<Value>, CacheError>;
    fn put(&self, key: &str, entry: Value) -> Result<(), CacheError>;
    fn delete(&self, key: &str) -> Result<(), CacheError>;
}

/// In-process cache, lost on restart.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Value>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalCache for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn put(&self, key: &str, entry: Value) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), entry);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
        Ok(())
    }
}

/// One JSON file per key under a directory; survives restarts.
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, CacheError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(FileCache { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let safe: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", safe))
    }
}

impl LocalCache for FileCache {
    fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&text)?))
    }

    fn put(&self, key: &str, entry: Value) -> Result<(), CacheError> {
        let text = serde_json::to_string(&entry)?;
        fs::write(self.path_for(key), text)?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), CacheError> {
        let path = self.path_for(key);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CachedFile {
    pub name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub content: Value,
    #[serde(
        rename = "companyId",
        alias = "groupId",
        default,
        deserialize_with = "optional_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub group_id: Option<String>,
}

impl CachedFile {
    /// Builds a record from uploaded text: JSON content is kept structured,
    /// anything else is stored as `{rawText}`.
    pub fn from_text(name: &str, text: &str, group_id: Option<&str>) -> Self {
        let content =
            serde_json::from_str::<Value>(text).unwrap_or_else(|_| json!({ "rawText": text }));
        CachedFile {
            name: name.to_string(),
            size: text.len() as u64,
            content,
            group_id: group_id.map(str::to_string),
        }
    }

    /// The file's content as canonical sheets. Raw text becomes one sheet named
    /// after the file.
    pub fn sheets(&self) -> Vec<Sheet> {
        let prepared = match &self.content {
            Value::String(text) => serde_json::from_str::<Value>(text)
                .unwrap_or_else(|_| json!({ "name": self.name, "rawText": text })),
            Value::Object(fields) if fields.get("rawText").is_some_and(Value::is_string) => {
                let mut fields = fields.clone();
                fields
                    .entry("name")
                    .or_insert_with(|| Value::String(self.name.clone()));
                Value::Object(fields)
            }
            other => other.clone(),
        };
        normalize(&sheets_payload(prepared))
    }
}

// Cached content may be a sheets array, a whole document, or a single sheet.
fn sheets_payload(content: Value) -> Value {
    match content {
        Value::Object(mut fields) => match fields.remove("sheets") {
            Some(sheets @ Value::Array(_)) => sheets,
            Some(other) => {
                fields.insert("sheets".to_string(), other);
                Value::Array(vec![Value::Object(fields)])
            }
            None if fields.contains_key("rawText") => Value::Object(fields),
            None => Value::Array(vec![Value::Object(fields)]),
        },
        other => other,
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CacheRecord {
    Group {
        #[serde(rename = "companyId", alias = "groupId", deserialize_with = "required_id")]
        group_id: String,
        files: Vec<CachedFile>,
        #[serde(rename = "savedAt", default, skip_serializing_if = "Option::is_none")]
        saved_at: Option<DateTime<Utc>>,
    },
    Legacy(CachedFile),
}

impl CacheRecord {
    fn files_for(&self, group: &str) -> &[CachedFile] {
        match self {
            CacheRecord::Group { group_id, files, .. } if group_id == group => files,
            CacheRecord::Legacy(file) if file.group_id.as_deref() == Some(group) => {
                std::slice::from_ref(file)
            }
            _ => &[],
        }
    }
}

/// Typed view over the saved-files list in a [`LocalCache`].
pub struct SavedFiles<'a, C: LocalCache + ?Sized> {
    cache: &'a C,
}

impl<'a, C: LocalCache + ?Sized> SavedFiles<'a, C> {
    pub fn new(cache: &'a C) -> Self {
        SavedFiles { cache }
    }

    /// All readable records in insertion order. Records of unknown shape are skipped.
    pub fn list(&self) -> Result<Vec<CacheRecord>, CacheError> {
        let raw = match self.cache.get(SAVED_FILES_KEY)? {
            Some(Value::Array(items)) => items,
            Some(other) => {
                warn!("Saved files entry is not a list, ignoring it: {}", other);
                return Ok(Vec::new());
            }
            None => return Ok(Vec::new()),
        };

        let mut records = Vec::with_capacity(raw.len());
        for item in raw {
            match serde_json::from_value::<CacheRecord>(item) {
                Ok(record) => records.push(record),
                Err(e) => warn!("Skipping unreadable saved file record: {}", e),
            }
        }
        Ok(records)
    }

    /// Appends one grouped record for a batch of uploaded files.
    pub fn record_upload(&self, group_id: &str, files: Vec<CachedFile>) -> Result<(), CacheError> {
        let mut records = self.list()?;
        info!("Saving {} file(s) locally for group {}", files.len(), group_id);
        records.push(CacheRecord::Group {
            group_id: group_id.to_string(),
            files,
            saved_at: Some(Utc::now()),
        });
        self.cache.put(SAVED_FILES_KEY, serde_json::to_value(&records)?)
    }

    /// Removes the record at `index`. Returns false when there is none.
    pub fn remove(&self, index: usize) -> Result<bool, CacheError> {
        let mut records = self.list()?;
        if index >= records.len() {
            return Ok(false);
        }
        records.remove(index);
        if records.is_empty() {
            self.cache.delete(SAVED_FILES_KEY)?;
        } else {
            self.cache.put(SAVED_FILES_KEY, serde_json::to_value(&records)?)?;
        }
        Ok(true)
    }

    /// Every file saved for `group`, grouped and legacy records alike.
    pub fn files_for_group(&self, group: &str) -> Result<Vec<CachedFile>, CacheError> {
        Ok(self
            .list()?
            .iter()
            .flat_map(|record| record.files_for(group).iter().cloned())
            .collect())
    }
}

fn required_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!("invalid group id: {}", other))),
    }
}

fn optional_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::String(s) if s.is_empty() => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) => Ok(Some(n.to_string())),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_content_unwraps_to_its_sheets() {
        let payload = sheets_payload(json!({ "id": "x", "sheets": [{ "name": "A" }] }));
        assert_eq!(payload, json!([{ "name": "A" }]));
    }

    #[test]
    fn single_sheet_content_is_wrapped() {
        let payload = sheets_payload(json!({ "name": "A", "celldata": [] }));
        assert_eq!(payload, json!([{ "name": "A", "celldata": [] }]));
    }

    #[test]
    fn file_cache_keys_are_sanitized() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::open(dir.path()).unwrap();
        assert_eq!(cache.path_for("../x y"), dir.path().join("___x_y.json"));
    }
}
