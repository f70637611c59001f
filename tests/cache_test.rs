use serde_json::json;
use sped_sheets::cache::{
    CacheRecord, CachedFile, FileCache, LocalCache, MemoryCache, SAVED_FILES_KEY, SavedFiles,
};
use sped_sheets::cell::CellValue;
use tempfile::tempdir;

fn legacy_and_grouped() -> serde_json::Value {
    json!([
        { "name": "old.txt", "size": 6, "content": "|0000|", "companyId": 3 },
        { "companyId": "3", "files": [
            { "name": "new.json", "size": 10, "content": [{ "name": "C100", "data": [["REG"]] }] }
        ] },
        { "companyId": "9", "files": [
            { "name": "other.txt", "content": { "rawText": "|9999|" } }
        ] },
        "garbage"
    ])
}

#[test]
fn reads_both_record_shapes() {
    let cache = MemoryCache::new();
    cache.put(SAVED_FILES_KEY, legacy_and_grouped()).unwrap();

    let records = SavedFiles::new(&cache).list().unwrap();
    assert_eq!(records.len(), 3, "the unreadable record is skipped");
    assert!(matches!(records[0], CacheRecord::Legacy(_)));
    assert!(matches!(records[1], CacheRecord::Group { .. }));
}

#[test]
fn files_for_group_collects_every_record() {
    let cache = MemoryCache::new();
    cache.put(SAVED_FILES_KEY, legacy_and_grouped()).unwrap();

    let files = SavedFiles::new(&cache).files_for_group("3").unwrap();
    let names: Vec<_> = files.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["old.txt", "new.json"]);
}

#[test]
fn cached_content_becomes_sheets() {
    let cache = MemoryCache::new();
    cache.put(SAVED_FILES_KEY, legacy_and_grouped()).unwrap();
    let files = SavedFiles::new(&cache).files_for_group("3").unwrap();

    let legacy = files[0].sheets();
    assert_eq!(legacy.len(), 1);
    assert_eq!(legacy[0].name.as_deref(), Some("old.txt"));
    assert_eq!(legacy[0].cells[0].value, CellValue::Text("|0000|".into()));

    let grouped = files[1].sheets();
    assert_eq!(grouped[0].name.as_deref(), Some("C100"));
    assert_eq!(grouped[0].cells[0].display, "REG");
}

#[test]
fn text_files_are_stored_raw() {
    let file = CachedFile::from_text("EFD.txt", "|0000|LECD|", Some("5"));
    assert_eq!(file.content, json!({ "rawText": "|0000|LECD|" }));
    assert_eq!(file.size, 11);

    let json_file = CachedFile::from_text("doc.json", r#"{"sheets":[{"data":[["x"]]}]}"#, None);
    assert_eq!(json_file.sheets()[0].cells[0].display, "x");
}

#[test]
fn record_upload_appends_a_group() {
    let dir = tempdir().unwrap();
    let cache = FileCache::open(dir.path()).unwrap();
    let saved = SavedFiles::new(&cache);

    saved
        .record_upload("12", vec![CachedFile::from_text("a.txt", "|A|", Some("12"))])
        .unwrap();
    saved
        .record_upload("12", vec![CachedFile::from_text("b.txt", "|B|", Some("12"))])
        .unwrap();

    // Survives a fresh handle on the same directory
    let reopened = FileCache::open(dir.path()).unwrap();
    let records = SavedFiles::new(&reopened).list().unwrap();
    assert_eq!(records.len(), 2);
    match &records[0] {
        CacheRecord::Group { group_id, files, saved_at } => {
            assert_eq!(group_id, "12");
            assert_eq!(files[0].name, "a.txt");
            assert!(saved_at.is_some());
        }
        other => panic!("expected a grouped record, got {:?}", other),
    }
}

#[test]
fn remove_deletes_the_key_when_empty() {
    let cache = MemoryCache::new();
    let saved = SavedFiles::new(&cache);
    saved
        .record_upload("1", vec![CachedFile::from_text("a.txt", "|A|", None)])
        .unwrap();

    assert!(!saved.remove(3).unwrap());
    assert!(saved.remove(0).unwrap());
    assert_eq!(cache.get(SAVED_FILES_KEY).unwrap(), None);
}

#[test]
fn non_list_entry_reads_as_empty() {
    let cache = MemoryCache::new();
    cache.put(SAVED_FILES_KEY, json!({ "oops": true })).unwrap();
    assert!(SavedFiles::new(&cache).list().unwrap().is_empty());
}
