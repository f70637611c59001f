//! Decides where the sheets for a page load come from.
//!
//! Exactly one source wins, in this order: a document payload carried by the
//! navigation, a bare sheets array carried by the navigation, a document id
//! fetched from the store, and finally the local saved-files cache.

use crate::cache::{CachedFile, LocalCache, SavedFiles};
use crate::error::{LoadError, UploadError};
use crate::normalizer::normalize;
use crate::notify::{Notice, Notifier};
use crate::saving::DocumentStore;
use crate::spreadsheet::Document;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Listing view a page falls back to when its document cannot be loaded.
pub const DEFAULT_FALLBACK_ROUTE: &str = "/BusinessManagement";

/// What the navigation handed to the table page.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryContext {
    /// A whole document, `{id, sheets}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<Value>,
    /// A bare sheets array.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(rename = "docId", default, skip_serializing_if = "Option::is_none")]
    pub doc_id: Option<String>,
    /// Business the sheets belong to; keys the local cache.
    #[serde(
        rename = "companyId",
        alias = "groupId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub group_id: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Source<'a> {
    Payload(&'a Value),
    RawSheets(&'a Value),
    Remote(&'a str),
    LocalCache(Option<&'a str>),
}

impl EntryContext {
    pub fn with_doc_id(id: &str) -> Self {
        EntryContext {
            doc_id: Some(id.to_string()),
            ..Default::default()
        }
    }

    pub fn with_sheets(sheets: Value) -> Self {
        EntryContext {
            data: Some(sheets),
            ..Default::default()
        }
    }

    /// The winning source for this context.
    pub fn source(&self) -> Source<'_> {
        if let Some(doc) = self.doc.as_ref().filter(|d| !d.is_null()) {
            return Source::Payload(doc);
        }
        if let Some(data) = self.data.as_ref().filter(|d| !d.is_null()) {
            return Source::RawSheets(data);
        }
        if let Some(id) = self.doc_id.as_deref().filter(|id| !id.is_empty()) {
            return Source::Remote(id);
        }
        Source::LocalCache(self.group_id.as_deref().filter(|g| !g.is_empty()))
    }
}

pub struct Resolver<'a, S, C: ?Sized, N: ?Sized> {
    store: &'a S,
    cache: &'a C,
    notifier: &'a N,
    fallback_route: String,
}

impl<'a, S, C, N> Resolver<'a, S, C, N>
where
    S: DocumentStore,
    C: LocalCache + ?Sized,
    N: Notifier + ?Sized,
{
    pub fn new(store: &'a S, cache: &'a C, notifier: &'a N) -> Self {
        Resolver {
            store,
            cache,
            notifier,
            fallback_route: DEFAULT_FALLBACK_ROUTE.to_string(),
        }
    }

    pub fn with_fallback_route(mut self, route: &str) -> Self {
        self.fallback_route = route.to_string();
        self
    }

    /// Produces the document for a page load.
    ///
    /// Only a failed fetch-by-id is an error; the user has already been
    /// notified when it is returned and the page should move to
    /// [`LoadError::fallback_route`]. A context with nothing usable yields an
    /// empty document.
    pub async fn resolve(&self, ctx: &EntryContext) -> Result<Document, LoadError> {
        match ctx.source() {
            Source::Payload(doc) => {
                let id = payload_id(doc).or_else(|| ctx.doc_id.clone());
                let sheets = match doc {
                    Value::Object(fields) => {
                        normalize(fields.get("sheets").unwrap_or(&Value::Null))
                    }
                    other => normalize(other),
                };
                debug!("Loaded {} sheet(s) from navigation payload", sheets.len());
                Ok(Document::new(id, sheets))
            }
            Source::RawSheets(data) => {
                let sheets = normalize(unwrap_upload_envelope(data));
                debug!("Loaded {} sheet(s) from navigation data", sheets.len());
                Ok(Document::new(None, sheets))
            }
            Source::Remote(id) => match self.store.fetch(id).await {
                Ok(remote) => {
                    let sheets = normalize(&remote.sheets);
                    info!("Fetched document {} with {} sheet(s)", remote.id, sheets.len());
                    Ok(Document::new(Some(remote.id), sheets))
                }
                Err(source) => {
                    self.notifier.notify(Notice::LoadFailed(source.to_string()));
                    Err(LoadError {
                        id: id.to_string(),
                        source,
                        fallback_route: self.fallback_route.clone(),
                    })
                }
            },
            Source::LocalCache(group) => Ok(self.from_cache(group)),
        }
    }

    fn from_cache(&self, group: Option<&str>) -> Document {
        let Some(group) = group else {
            debug!("No document source and no group id, starting empty");
            return Document::empty();
        };
        match SavedFiles::new(self.cache).files_for_group(group) {
            Ok(files) => {
                let sheets: Vec<_> = files.iter().flat_map(CachedFile::sheets).collect();
                info!(
                    "Loaded {} sheet(s) from {} locally saved file(s) for group {}",
                    sheets.len(),
                    files.len(),
                    group
                );
                Document::new(None, sheets)
            }
            Err(e) => {
                warn!("Could not read saved files for group {}: {}", group, e);
                Document::empty()
            }
        }
    }
}

fn payload_id(doc: &Value) -> Option<String> {
    match doc.get("id")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Navigation from the upload page may carry the upload envelope list
/// (`[{sheets, ...}]`) instead of sheets; its first entry's sheets are the data.
fn unwrap_upload_envelope(data: &Value) -> &Value {
    let envelope_sheets = data
        .as_array()
        .and_then(|items| items.first())
        .filter(|first| first.get("celldata").is_none() && first.get("data").is_none())
        .and_then(|first| first.get("sheets"))
        .filter(|sheets| sheets.is_array());
    envelope_sheets.unwrap_or(data)
}

/// Response of the upload endpoint.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UploadResponse {
    #[serde(default)]
    pub data: Vec<Value>,
    #[serde(default)]
    pub errors: Vec<Value>,
}

impl UploadResponse {
    /// `data[0].sheets`, unless the upload reported errors.
    pub fn accept(&self) -> Result<&Value, UploadError> {
        if !self.errors.is_empty() {
            return Err(UploadError::Rejected(self.errors.len()));
        }
        self.data
            .first()
            .and_then(|d| d.get("sheets"))
            .filter(|s| s.as_array().is_some_and(|a| !a.is_empty()))
            .ok_or(UploadError::Empty)
    }

    /// Id of the stored document the upload produced, when reported.
    pub fn document_id(&self) -> Option<String> {
        let first = self.data.first()?;
        first
            .get("mongo_inserted_id")
            .or_else(|| first.get("id"))
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}

/// Handles a finished upload: on success the files are saved locally and the
/// navigation context for the table page is returned; on failure the user is
/// notified and there is no navigation.
pub fn accept_upload<C, N>(
    response: &UploadResponse,
    group_id: &str,
    files: Vec<CachedFile>,
    cache: &C,
    notifier: &N,
) -> Option<EntryContext>
where
    C: LocalCache + ?Sized,
    N: Notifier + ?Sized,
{
    let sheets = match response.accept() {
        Ok(sheets) => sheets.clone(),
        Err(e) => {
            notifier.notify(Notice::UploadFailed(e.to_string()));
            return None;
        }
    };

    if let Err(e) = SavedFiles::new(cache).record_upload(group_id, files) {
        warn!("Could not save uploaded files locally: {}", e);
    }

    Some(EntryContext {
        data: Some(sheets),
        group_id: Some(group_id.to_string()),
        ..Default::default()
    })
}
