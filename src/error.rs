use thiserror::Error;

/// Failures reported by a [`crate::saving::DocumentStore`].
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Document not found: {0}")]
    NotFound(String),
    #[error("Invalid doc id format: {0}")]
    InvalidId(String),
    #[error("Missing sheets data")]
    MissingSheets,
    #[error("Sheet index {index} out of range for group {group}")]
    SheetIndex { group: String, index: usize },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Failures of the local cache store.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("No data available for export")]
    NoSheets,
    #[error("Unknown export format: {0}")]
    UnknownFormat(String),
    #[error("Sheet too large to export: {rows} x {cols}")]
    TooLarge { rows: u32, cols: u32 },
    #[error("XLSX error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A document id could not be loaded. Fatal for the current page load only.
#[derive(Error, Debug)]
#[error("Failed to load document {id}: {source}")]
pub struct LoadError {
    pub id: String,
    #[source]
    pub source: StoreError,
    /// Listing view the page falls back to.
    pub fallback_route: String,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum UploadError {
    #[error("Upload reported {0} error(s)")]
    Rejected(usize),
    #[error("Upload response carried no sheets")]
    Empty,
}
