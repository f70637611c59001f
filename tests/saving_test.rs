use serde_json::json;
use sped_sheets::error::StoreError;
use sped_sheets::saving::{
    DocumentStore, FileDocumentStore, MemoryDocumentStore, RemoteDocument, load_document,
    save_document,
};
use tempfile::tempdir;

#[tokio::test]
async fn file_store_round_trip() {
    let dir = tempdir().unwrap();
    let store = FileDocumentStore::open(dir.path()).unwrap();

    let sheets = json!([{ "name": "C100", "celldata": [
        { "r": 0, "c": 0, "v": { "v": "REG", "m": "REG" } }
    ] }]);
    let created = store.create("42", sheets.clone()).await.unwrap();
    assert_eq!(created.group_id.as_deref(), Some("42"));

    let fetched = store.fetch(&created.id).await.unwrap();
    assert_eq!(fetched, created);
    assert_eq!(fetched.sheets, sheets);

    // A second store on the same directory sees the same documents
    let reopened = FileDocumentStore::open(dir.path()).unwrap();
    assert_eq!(reopened.fetch(&created.id).await.unwrap().sheets, sheets);
}

#[tokio::test]
async fn update_replaces_sheets() {
    let dir = tempdir().unwrap();
    let store = FileDocumentStore::open(dir.path()).unwrap();
    let created = store.create("7", json!([{ "data": [["old"]] }])).await.unwrap();

    store.update(&created.id, json!([{ "data": [["new"]] }])).await.unwrap();
    let fetched = store.fetch(&created.id).await.unwrap();
    assert_eq!(fetched.sheets, json!([{ "data": [["new"]] }]));
}

#[tokio::test]
async fn update_requires_sheets() {
    let store = MemoryDocumentStore::new();
    store.insert("doc1", json!([{ "data": [["a"]] }]));

    assert!(matches!(store.update("doc1", json!([])).await, Err(StoreError::MissingSheets)));
    assert!(matches!(store.update("doc1", json!(null)).await, Err(StoreError::MissingSheets)));
    assert!(matches!(
        store.update("missing", json!([{}])).await,
        Err(StoreError::NotFound(_))
    ));
}

#[tokio::test]
async fn create_appends_to_the_group_document() {
    let store = MemoryDocumentStore::new();
    let first = store.create("g1", json!([{ "name": "one" }])).await.unwrap();
    let second = store.create("g1", json!([{ "name": "two" }])).await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.sheets, json!([{ "name": "one" }, { "name": "two" }]));

    let other = store.create("g2", json!([{ "name": "three" }])).await.unwrap();
    assert_ne!(other.id, first.id);
}

#[tokio::test]
async fn delete_sheet_by_index() {
    let dir = tempdir().unwrap();
    let store = FileDocumentStore::open(dir.path()).unwrap();
    store
        .create("g1", json!([{ "name": "a" }, { "name": "b" }, { "name": "c" }]))
        .await
        .unwrap();

    let remaining = store.delete_sheet("g1", 1).await.unwrap();
    assert_eq!(remaining, json!([{ "name": "a" }, { "name": "c" }]));

    assert!(matches!(
        store.delete_sheet("g1", 5).await,
        Err(StoreError::SheetIndex { index: 5, .. })
    ));
    assert!(matches!(store.delete_sheet("nobody", 0).await, Err(StoreError::NotFound(_))));
}

#[tokio::test]
async fn rejects_path_like_ids() {
    let dir = tempdir().unwrap();
    let store = FileDocumentStore::open(dir.path()).unwrap();

    assert!(matches!(store.fetch("../etc/passwd").await, Err(StoreError::InvalidId(_))));
    assert!(matches!(store.fetch("").await, Err(StoreError::InvalidId(_))));
    assert!(matches!(store.fetch("abc123").await, Err(StoreError::NotFound(_))));
}

#[test]
fn documents_are_gzip_json() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("doc.json.gz");
    let doc = RemoteDocument {
        id: "doc".to_string(),
        group_id: None,
        sheets: json!([{ "rawText": "|0000|" }]),
    };

    save_document(&doc, &path).unwrap();
    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(&bytes[..2], &[0x1f_u8, 0x8b]);

    assert_eq!(load_document(&path).unwrap(), doc);
}
