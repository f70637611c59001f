use serde_json::{Value, json};
use sped_sheets::downloader::Format;
use sped_sheets::error::{ExportError, StoreError};
use sped_sheets::normalizer::normalize;
use sped_sheets::notify::{Notice, NoticeLog};
use sped_sheets::saving::{DocumentStore, MemoryDocumentStore, RemoteDocument};
use sped_sheets::session::{EditSession, KeyChord, SaveOutcome};
use sped_sheets::spreadsheet::Document;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Store that records every call and can be told to fail.
#[derive(Default)]
struct SpyStore {
    inner: MemoryDocumentStore,
    calls: AtomicUsize,
    failing: bool,
}

impl DocumentStore for SpyStore {
    async fn fetch(&self, id: &str) -> Result<RemoteDocument, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.fetch(id).await
    }

    async fn update(&self, id: &str, sheets: Value) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing {
            return Err(StoreError::Backend("connection refused".to_string()));
        }
        self.inner.update(id, sheets).await
    }

    async fn create(&self, group_id: &str, sheets: Value) -> Result<RemoteDocument, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.create(group_id, sheets).await
    }

    async fn delete_sheet(&self, group_id: &str, index: usize) -> Result<Value, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.delete_sheet(group_id, index).await
    }
}

fn document(id: Option<&str>) -> Document {
    let sheets = normalize(&json!([{ "name": "C100", "data": [["A", "B"], ["1"]] }]));
    Document::new(id.map(str::to_string), sheets)
}

fn session(id: Option<&str>, store: &Arc<SpyStore>) -> EditSession<Arc<SpyStore>, NoticeLog> {
    EditSession::new(document(id), store.clone(), NoticeLog::new())
}

#[tokio::test]
async fn save_without_id_makes_no_calls() {
    let store = Arc::new(SpyStore::default());
    let session = session(None, &store);
    assert!(!session.document().is_persisted());

    assert_eq!(session.save().await, SaveOutcome::NotPersisted);
    assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    assert_eq!(session.notifier().notices(), vec![Notice::NotPersisted]);

    // Exactly once per call
    session.save().await;
    assert_eq!(session.notifier().notices().len(), 2);
    assert_eq!(store.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn save_sends_current_sheets() {
    let store = Arc::new(SpyStore::default());
    store.inner.insert("doc1", json!([{ "data": [["stale"]] }]));
    let mut session = session(Some("doc1"), &store);

    session.apply_change(&json!([{ "name": "C100", "data": [["edited"]] }]));
    assert_eq!(session.save().await, SaveOutcome::Saved);

    let saved = store.inner.get("doc1").unwrap();
    assert_eq!(normalize(&saved.sheets), session.sheets());
    assert_eq!(session.notifier().notices(), vec![Notice::Saved]);
}

#[tokio::test]
async fn failed_save_keeps_edits() {
    let store = Arc::new(SpyStore {
        failing: true,
        ..Default::default()
    });
    let mut session = session(Some("doc1"), &store);
    session.apply_change(&json!([{ "data": [["mine"]] }]));

    let outcome = session.save().await;
    assert!(matches!(
        outcome,
        SaveOutcome::Failed(ref reason) if reason.contains("connection refused")
    ));
    assert_eq!(session.sheets()[0].cells[0].display, "mine");
    assert!(matches!(session.notifier().notices().as_slice(), [Notice::SaveFailed(_)]));
}

#[tokio::test]
async fn ctrl_s_saves() {
    let store = Arc::new(SpyStore::default());
    store.inner.insert("doc1", json!([{ "data": [["x"]] }]));
    let session = session(Some("doc1"), &store);

    assert_eq!(session.handle_key(&KeyChord::ctrl("s")).await, Some(SaveOutcome::Saved));

    let cmd_s = KeyChord {
        key: "S".to_string(),
        ctrl: false,
        meta: true,
    };
    assert_eq!(session.handle_key(&cmd_s).await, Some(SaveOutcome::Saved));

    let plain_s = KeyChord {
        key: "s".to_string(),
        ..Default::default()
    };
    assert_eq!(session.handle_key(&plain_s).await, None);
    assert_eq!(session.handle_key(&KeyChord::ctrl("p")).await, None);
    assert_eq!(store.calls.load(Ordering::SeqCst), 2);
}

#[test]
fn key_chords_from_browser_events() {
    let chord: KeyChord = serde_json::from_value(json!({ "key": "s", "metaKey": true })).unwrap();
    assert!(chord.is_save());
}

#[test]
fn apply_change_renormalizes() {
    let store = Arc::new(SpyStore::default());
    let mut session = session(None, &store);

    session.apply_change(&json!([
        { "name": "one", "celldata": [{ "r": 0, "c": 0, "v": { "v": { "v": "deep" } } }] },
        { "name": "two", "data": [[null, "b"]] }
    ]));

    assert_eq!(session.sheets().len(), 2);
    assert_eq!(session.sheets()[0].cells[0].display, "deep");
    assert_eq!(session.sheets()[1].cells.len(), 1);
    assert_eq!(store.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn export_uses_edited_sheets() {
    let store = Arc::new(SpyStore::default());
    let mut session = session(None, &store);
    session.apply_change(&json!([{ "data": [["new"]] }]));

    let file = session.export(Format::Text).unwrap();
    assert_eq!(file.bytes, b"|new|");
    assert!(session.notifier().notices().is_empty());
}

#[test]
fn export_with_nothing_loaded_notifies() {
    let store = Arc::new(SpyStore::default());
    let session = EditSession::new(Document::empty(), store, NoticeLog::new());

    assert!(session.is_empty());
    assert!(matches!(session.export(Format::Xlsx), Err(ExportError::NoSheets)));
    assert_eq!(session.notifier().notices(), vec![Notice::NothingToExport]);
}

#[test]
fn widget_options_allow_editing() {
    let store = Arc::new(SpyStore::default());
    let session = session(Some("doc1"), &store);

    let options = serde_json::to_value(session.widget_options()).unwrap();
    assert_eq!(options["allowEdit"], json!(true));
    assert_eq!(options["data"][0]["name"], json!("C100"));
    assert_eq!(options["data"][0]["celldata"].as_array().map(Vec::len), Some(3));
}
