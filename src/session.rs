//! The live document behind one table page.
//!
//! The grid widget reports every edit as a full replacement of the sheets;
//! [`EditSession::apply_change`] is the only way the in-memory sheets change.
//! Saving is explicit and never writes back into the session.

use crate::downloader::{Download, Format, export};
use crate::error::ExportError;
use crate::normalizer::normalize;
use crate::notify::{Notice, Notifier};
use crate::saving::DocumentStore;
use crate::spreadsheet::{Document, Sheet};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Result of a save attempt, already reported to the user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "message", rename_all = "snake_case")]
pub enum SaveOutcome {
    Saved,
    /// No persistence id; nothing was sent.
    NotPersisted,
    Failed(String),
}

/// A key press forwarded from the page.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyChord {
    pub key: String,
    #[serde(default, rename = "ctrlKey")]
    pub ctrl: bool,
    #[serde(default, rename = "metaKey")]
    pub meta: bool,
}

impl KeyChord {
    pub fn ctrl(key: &str) -> Self {
        KeyChord {
            key: key.to_string(),
            ctrl: true,
            meta: false,
        }
    }

    /// Ctrl+S, or Cmd+S on macOS.
    pub fn is_save(&self) -> bool {
        (self.ctrl || self.meta) && self.key.eq_ignore_ascii_case("s")
    }
}

/// Options handed to the grid widget alongside the sheets.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetOptions<'a> {
    pub data: &'a [Sheet],
    pub allow_edit: bool,
    pub show_toolbar: bool,
    pub show_grid: bool,
    pub show_contextmenu: bool,
}

pub struct EditSession<S, N> {
    document: Document,
    store: S,
    notifier: N,
}

impl<S: DocumentStore, N: Notifier> EditSession<S, N> {
    pub fn new(document: Document, store: S, notifier: N) -> Self {
        EditSession {
            document,
            store,
            notifier,
        }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn sheets(&self) -> &[Sheet] {
        &self.document.sheets
    }

    pub fn id(&self) -> Option<&str> {
        self.document.id.as_deref()
    }

    /// True while there is nothing to show; the page renders its own empty state.
    pub fn is_empty(&self) -> bool {
        self.document.is_empty()
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub fn widget_options(&self) -> WidgetOptions<'_> {
        WidgetOptions {
            data: &self.document.sheets,
            allow_edit: true,
            show_toolbar: true,
            show_grid: true,
            show_contextmenu: true,
        }
    }

    /// The widget's change callback: re-normalizes the emitted sheets and
    /// replaces the in-memory ones.
    pub fn apply_change(&mut self, changed: &Value) {
        self.document.sheets = normalize(changed);
        debug!(
            "Applied widget change, {} sheet(s) in session",
            self.document.sheets.len()
        );
    }

    /// Sends the current sheets to the store under the document id.
    ///
    /// Without an id nothing is sent and [`Notice::NotPersisted`] is reported.
    /// The outcome is reported to the user either way; the session's sheets
    /// are left untouched.
    pub async fn save(&self) -> SaveOutcome {
        let Some(id) = self.document.id.as_deref() else {
            self.notifier.notify(Notice::NotPersisted);
            return SaveOutcome::NotPersisted;
        };

        let sheets = self.document.sheets_value();
        match self.store.update(id, sheets).await {
            Ok(()) => {
                info!("Saved document {}", id);
                self.notifier.notify(Notice::Saved);
                SaveOutcome::Saved
            }
            Err(e) => {
                let reason = e.to_string();
                self.notifier.notify(Notice::SaveFailed(reason.clone()));
                SaveOutcome::Failed(reason)
            }
        }
    }

    /// Keyboard accelerator: the save chord goes through [`EditSession::save`],
    /// anything else is ignored.
    pub async fn handle_key(&self, chord: &KeyChord) -> Option<SaveOutcome> {
        if chord.is_save() {
            Some(self.save().await)
        } else {
            None
        }
    }

    /// Exports the current sheets. With nothing loaded the user is told so and
    /// no file is produced.
    pub fn export(&self, format: Format) -> Result<Download, ExportError> {
        let result = export(&self.document, format);
        if let Err(ExportError::NoSheets) = result {
            self.notifier.notify(Notice::NothingToExport);
        }
        result
    }
}
