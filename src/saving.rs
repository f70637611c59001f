//! Persistence collaborator: documents addressed by id, holding the sheets
//! payload exactly as the grid widget produced it.

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fs::{self, File};
use std::future::Future;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use uuid::Uuid;

use crate::error::StoreError;

/// A document as the store returns it: `GET /documents/{id}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RemoteDocument {
    pub id: String,
    #[serde(rename = "company_id", default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    pub sheets: Value,
}

pub trait DocumentStore {
    fn fetch(&self, id: &str) -> impl Future<Output = Result<RemoteDocument, StoreError>> + Send;

    /// Replaces the sheets of an existing document: `PUT /documents/{id}`.
    fn update(
        &self,
        id: &str,
        sheets: Value,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Stores sheets for a group, appending them to the group's document when
    /// one already exists.
    fn create(
        &self,
        group_id: &str,
        sheets: Value,
    ) -> impl Future<Output = Result<RemoteDocument, StoreError>> + Send;

    /// Removes one sheet from the group's document and returns the remaining sheets.
    fn delete_sheet(
        &self,
        group_id: &str,
        index: usize,
    ) -> impl Future<Output = Result<Value, StoreError>> + Send;
}

impl<T: DocumentStore> DocumentStore for Arc<T> {
    fn fetch(&self, id: &str) -> impl Future<Output = Result<RemoteDocument, StoreError>> + Send {
        (**self).fetch(id)
    }

    fn update(
        &self,
        id: &str,
        sheets: Value,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        (**self).update(id, sheets)
    }

    fn create(
        &self,
        group_id: &str,
        sheets: Value,
    ) -> impl Future<Output = Result<RemoteDocument, StoreError>> + Send {
        (**self).create(group_id, sheets)
    }

    fn delete_sheet(
        &self,
        group_id: &str,
        index: usize,
    ) -> impl Future<Output = Result<Value, StoreError>> + Send {
        (**self).delete_sheet(group_id, index)
    }
}

fn require_sheets(sheets: &Value) -> Result<&Vec<Value>, StoreError> {
    match sheets {
        Value::Array(items) if !items.is_empty() => Ok(items),
        _ => Err(StoreError::MissingSheets),
    }
}

fn appended(existing: &Value, sheets: &[Value]) -> Value {
    let mut merged = existing.as_array().cloned().unwrap_or_default();
    merged.extend(sheets.iter().cloned());
    Value::Array(merged)
}

fn without_sheet(doc: &RemoteDocument, index: usize) -> Result<Value, StoreError> {
    let mut sheets = doc.sheets.as_array().cloned().unwrap_or_default();
    if index >= sheets.len() {
        return Err(StoreError::SheetIndex {
            group: doc.group_id.clone().unwrap_or_default(),
            index,
        });
    }
    sheets.remove(index);
    Ok(Value::Array(sheets))
}

fn new_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Documents kept in memory. Used by tests and as a scratch backend.
#[derive(Default)]
pub struct MemoryDocumentStore {
    docs: Mutex<HashMap<String, RemoteDocument>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a document under a fixed id.
    pub fn insert(&self, id: &str, sheets: Value) {
        let mut docs = self.docs.lock().unwrap_or_else(PoisonError::into_inner);
        docs.insert(
            id.to_string(),
            RemoteDocument {
                id: id.to_string(),
                group_id: None,
                sheets,
            },
        );
    }

    pub fn get(&self, id: &str) -> Option<RemoteDocument> {
        let docs = self.docs.lock().unwrap_or_else(PoisonError::into_inner);
        docs.get(id).cloned()
    }
}

impl DocumentStore for MemoryDocumentStore {
    async fn fetch(&self, id: &str) -> Result<RemoteDocument, StoreError> {
        self.get(id).ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn update(&self, id: &str, sheets: Value) -> Result<(), StoreError> {
        require_sheets(&sheets)?;
        let mut docs = self.docs.lock().unwrap_or_else(PoisonError::into_inner);
        let doc = docs
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        doc.sheets = sheets;
        Ok(())
    }

    async fn create(&self, group_id: &str, sheets: Value) -> Result<RemoteDocument, StoreError> {
        let items = require_sheets(&sheets)?;
        let mut docs = self.docs.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(doc) = docs
            .values_mut()
            .find(|d| d.group_id.as_deref() == Some(group_id))
        {
            doc.sheets = appended(&doc.sheets, items);
            return Ok(doc.clone());
        }
        let doc = RemoteDocument {
            id: new_id(),
            group_id: Some(group_id.to_string()),
            sheets,
        };
        docs.insert(doc.id.clone(), doc.clone());
        Ok(doc)
    }

    async fn delete_sheet(&self, group_id: &str, index: usize) -> Result<Value, StoreError> {
        let mut docs = self.docs.lock().unwrap_or_else(PoisonError::into_inner);
        let doc = docs
            .values_mut()
            .find(|d| d.group_id.as_deref() == Some(group_id))
            .ok_or_else(|| StoreError::NotFound(group_id.to_string()))?;
        doc.sheets = without_sheet(doc, index)?;
        Ok(doc.sheets.clone())
    }
}

/// Documents stored as gzip-compressed JSON files, one per id.
#[derive(Clone)]
pub struct FileDocumentStore {
    dir: PathBuf,
}

const DOCUMENT_EXTENSION: &str = ".json.gz";

impl FileDocumentStore {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(FileDocumentStore { dir })
    }

    fn path_for(&self, id: &str) -> Result<PathBuf, StoreError> {
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(StoreError::InvalidId(id.to_string()));
        }
        Ok(self.dir.join(format!("{}{}", id, DOCUMENT_EXTENSION)))
    }

    fn read(&self, id: &str) -> Result<RemoteDocument, StoreError> {
        let path = self.path_for(id)?;
        if !path.exists() {
            return Err(StoreError::NotFound(id.to_string()));
        }
        load_document(&path)
    }

    fn find_group(&self, group_id: &str) -> Result<Option<RemoteDocument>, StoreError> {
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let is_document = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(DOCUMENT_EXTENSION));
            if !is_document {
                continue;
            }
            let doc = load_document(&path)?;
            if doc.group_id.as_deref() == Some(group_id) {
                return Ok(Some(doc));
            }
        }
        Ok(None)
    }

    fn write(&self, doc: &RemoteDocument) -> Result<(), StoreError> {
        let path = self.path_for(&doc.id)?;
        save_document(doc, &path)?;
        debug!("Wrote document {} to {}", doc.id, path.display());
        Ok(())
    }

    async fn blocking<T, F>(&self, job: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(FileDocumentStore) -> Result<T, StoreError> + Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || job(store))
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?
    }
}

impl DocumentStore for FileDocumentStore {
    async fn fetch(&self, id: &str) -> Result<RemoteDocument, StoreError> {
        let id = id.to_string();
        self.blocking(move |store| store.read(&id)).await
    }

    async fn update(&self, id: &str, sheets: Value) -> Result<(), StoreError> {
        require_sheets(&sheets)?;
        let id = id.to_string();
        self.blocking(move |store| {
            let mut doc = store.read(&id)?;
            doc.sheets = sheets;
            store.write(&doc)
        })
        .await
    }

    async fn create(&self, group_id: &str, sheets: Value) -> Result<RemoteDocument, StoreError> {
        require_sheets(&sheets)?;
        let group_id = group_id.to_string();
        self.blocking(move |store| {
            let doc = match store.find_group(&group_id)? {
                Some(mut existing) => {
                    existing.sheets = appended(&existing.sheets, require_sheets(&sheets)?);
                    existing
                }
                None => RemoteDocument {
                    id: new_id(),
                    group_id: Some(group_id.clone()),
                    sheets,
                },
            };
            store.write(&doc)?;
            info!("Stored document {} for group {}", doc.id, group_id);
            Ok(doc)
        })
        .await
    }

    async fn delete_sheet(&self, group_id: &str, index: usize) -> Result<Value, StoreError> {
        let group_id = group_id.to_string();
        self.blocking(move |store| {
            let mut doc = store
                .find_group(&group_id)?
                .ok_or_else(|| StoreError::NotFound(group_id.clone()))?;
            doc.sheets = without_sheet(&doc, index)?;
            store.write(&doc)?;
            Ok(doc.sheets)
        })
        .await
    }
}

pub fn save_document(doc: &RemoteDocument, path: &Path) -> Result<(), StoreError> {
    let file = File::create(path)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut writer = BufWriter::new(encoder);

    serde_json::to_writer(&mut writer, doc)?;
    writer.flush()?;
    let encoder = writer.into_inner().map_err(std::io::Error::from)?;
    encoder.finish()?;

    Ok(())
}

pub fn load_document(path: &Path) -> Result<RemoteDocument, StoreError> {
    let file = File::open(path)?;
    let decoder = GzDecoder::new(file);
    let reader = BufReader::new(decoder);

    let doc: RemoteDocument = serde_json::from_reader(reader)?;

    Ok(doc)
}
