/*!
# SPED Sheets

Import, view, edit and export SPED fiscal documents as spreadsheets, in Rust.

## Overview

SPED files reach the application in many shapes: structured sheets coming back
from the upload service, documents fetched from storage, raw pipe-delimited text
kept in a local cache, or whatever the grid widget emits after an edit. This
crate turns every one of them into a single canonical sheet model, lets a page
edit it, saves it back when it has a server id, and exports it as TXT, CSV or
XLSX.

## Architecture

### Data Model
- **Cell**: a positioned value with an optional display string and style
- **Sheet**: name, sparse cells, grid size and widget configuration
- **Document**: ordered sheets plus the persistence id, when there is one

### Loading
- Normalizer - accepts sparse, dense, raw-text and blank sheet inputs
- Resolver - picks exactly one source per page load (payload, raw sheets,
  document id, local cache)
- Local cache - saved uploads grouped by business, with legacy flat records

### Editing
- Edit session - the widget's change callback, explicit save, Ctrl/Cmd+S
- Notifier - user-facing messages for every save, load and export outcome

### Data Persistence Layer
- Document store with gzip compressed JSON files
- TXT/CSV/XLSX export and TXT/CSV re-import

## Modules

- **cell**: Cell struct and the canonical conversion of raw widget cells
- **spreadsheet**: Sheet and Document
- **normalizer**: Any accepted sheet input to canonical sheets
- **resolver**: Source selection for a page load, upload hand-off
- **cache**: Saved files in a local key-value store
- **session**: Live document of one table page
- **notify**: User notices
- **saving**: Document store trait, memory and file backends
- **downloader**: Export functionality (TXT, CSV, XLSX)
- **loader**: TXT/CSV import back into sheet payloads
- **app**: Routing and middleware (feature `web`)
- **wasm**: Browser bindings (feature `wasm`)

## REST API Endpoints

- `GET /documents/{id}`, `PUT /documents/{id}` - Fetch and replace a stored document
- `POST /documents` - Store uploaded sheets for a business
- `DELETE /documents/{group}/sheet/{index}` - Remove one sheet
- `POST /api/sessions` - Open a table page from a navigation context
- `POST /api/sessions/{sid}/change`, `/save`, `/key` - Widget edits, save, shortcuts
- `GET /api/sessions/{sid}/export/{format}` - Download the current sheets
- `GET /api/saved-files`, `POST /api/saved-files/{group}` - Local saved files
*/

pub mod cache;
pub mod cell;
pub mod downloader;
pub mod error;
pub mod loader;
pub mod normalizer;
pub mod notify;
pub mod resolver;
pub mod saving;
pub mod session;
pub mod spreadsheet;

#[cfg(feature = "web")]
pub mod app;
#[cfg(feature = "web")]
pub mod config;

#[cfg(feature = "wasm")]
pub mod wasm;

/// Re-export the types most callers need
pub use cache::{CacheRecord, CachedFile, FileCache, LocalCache, MemoryCache, SavedFiles};
pub use cell::{Bounds, Cell, CellValue, bounds_of, to_canonical};
pub use downloader::{Download, Format, export};
pub use error::{CacheError, ExportError, LoadError, StoreError, UploadError};
pub use normalizer::normalize;
pub use notify::{LogNotifier, Notice, NoticeLog, Notifier};
pub use resolver::{EntryContext, Resolver, UploadResponse, accept_upload};
pub use saving::{DocumentStore, FileDocumentStore, MemoryDocumentStore, RemoteDocument};
pub use session::{EditSession, KeyChord, SaveOutcome};
pub use spreadsheet::{Document, Sheet};
