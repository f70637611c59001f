#![cfg(feature = "web")]

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use serde_json::{Value, json};
use sped_sheets::app::{AppState, router};
use sped_sheets::config::ServerConfig;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

fn test_app() -> (Router, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let config = ServerConfig {
        data_dir: dir.path().to_path_buf(),
        ..Default::default()
    };
    let state = AppState::open(&config).unwrap();
    (router(Arc::new(state)), dir)
}

async fn call(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Vec<u8>) {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            request = request.header(header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    let response = app.clone().oneshot(request.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, bytes.to_vec())
}

async fn call_json(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let (status, bytes) = call(app, method, uri, body).await;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn edit_and_save_a_stored_document() {
    let (app, _dir) = test_app();

    let (status, doc) = call_json(
        &app,
        "POST",
        "/documents",
        Some(json!({ "companyId": "3", "sheets": [{ "name": "C100", "data": [["A"]] }] })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = doc["id"].as_str().unwrap().to_string();

    let (status, view) =
        call_json(&app, "POST", "/api/sessions", Some(json!({ "docId": id }))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(view["id"], json!(id));
    assert_eq!(view["persisted"], json!(true));
    assert_eq!(view["options"]["allowEdit"], json!(true));
    let sid = view["session"].as_str().unwrap().to_string();

    let (status, _) = call_json(
        &app,
        "POST",
        &format!("/api/sessions/{}/change", sid),
        Some(json!([{ "name": "C100", "data": [["B"]] }])),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let save_uri = format!("/api/sessions/{}/save", sid);
    let (status, saved) = call_json(&app, "POST", &save_uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(saved["status"], json!("saved"));
    assert_eq!(saved["notices"], json!(["Changes saved to the server"]));

    let (_, stored) = call_json(&app, "GET", &format!("/documents/{}", id), None).await;
    assert_eq!(stored["sheets"][0]["celldata"][0]["v"]["v"], json!("B"));

    let export_uri = format!("/api/sessions/{}/export/csv", sid);
    let (status, bytes) = call(&app, "GET", &export_uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(bytes, b"\"B\"\n");
}

#[tokio::test]
async fn save_without_id_is_reported() {
    let (app, _dir) = test_app();

    let body = json!({ "data": [{ "data": [["x"]] }] });
    let (_, view) = call_json(&app, "POST", "/api/sessions", Some(body)).await;
    assert_eq!(view["persisted"], json!(false));
    let sid = view["session"].as_str().unwrap().to_string();

    let (_, saved) = call_json(
        &app,
        "POST",
        &format!("/api/sessions/{}/key", sid),
        Some(json!({ "key": "s", "ctrlKey": true })),
    )
    .await;
    assert_eq!(saved["status"], json!("not_persisted"));
    assert_eq!(saved["notices"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn missing_document_points_back() {
    let (app, _dir) = test_app();

    let (status, body) =
        call_json(&app, "POST", "/api/sessions", Some(json!({ "docId": "nope" }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["redirect"], json!("/BusinessManagement"));
}

#[tokio::test]
async fn stateless_export() {
    let (app, _dir) = test_app();

    let body = json!([{ "data": [["A", "B"]] }]);
    let (status, bytes) = call(&app, "POST", "/export/txt", Some(body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(bytes, b"|A|B|");

    let (status, _) = call(&app, "POST", "/export/csv", Some(json!([]))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(&app, "POST", "/export/pdf", Some(json!([{ "data": [["A"]] }]))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn saved_files_feed_a_session() {
    let (app, _dir) = test_app();

    let (status, _) = call_json(
        &app,
        "POST",
        "/api/saved-files/8",
        Some(json!([{ "name": "EFD.txt", "text": "|0000|LECD|" }])),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, list) = call_json(&app, "GET", "/api/saved-files", None).await;
    assert_eq!(list.as_array().map(Vec::len), Some(1));

    let (_, view) =
        call_json(&app, "POST", "/api/sessions", Some(json!({ "companyId": "8" }))).await;
    assert_eq!(view["options"]["data"][0]["name"], json!("EFD.txt"));

    let (status, _) = call(&app, "DELETE", "/api/saved-files/0", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = call(&app, "DELETE", "/api/saved-files/0", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn export_keeps_selected_blocks() {
    let (app, _dir) = test_app();
    let sheets = json!([
        { "name": "C100", "data": [["a"]] },
        { "name": "E110", "data": [["b"]] }
    ]);

    let body = json!({ "sheets": sheets, "selectedBlocks": ["E110"] });
    let (status, bytes) = call(&app, "POST", "/export/txt", Some(body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(bytes, b"|b|");

    let body = json!({ "sheets": sheets });
    let (_, bytes) = call(&app, "POST", "/export/txt", Some(body)).await;
    assert_eq!(bytes, b"|a|\n\n|b|");

    let body = json!({ "sheets": sheets, "selectedBlocks": ["H010"] });
    let (status, _) = call(&app, "POST", "/export/csv", Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn oversized_export_is_rejected() {
    let body = json!([{ "data": [["A"]], "row": 4294967295u32, "column": 4294967295u32 }]);
    let (app, _dir) = test_app();

    let (status, body) = call_json(&app, "POST", "/export/csv", Some(body)).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["status"], json!("error"));
}
