use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::cache::{CacheRecord, CachedFile, FileCache, SavedFiles};
use crate::config::ServerConfig;
use crate::downloader::{Download, Format, export_selected};
use crate::error::{CacheError, ExportError, LoadError, StoreError};
use crate::normalizer::normalize;
use crate::notify::NoticeLog;
use crate::resolver::{EntryContext, Resolver, UploadResponse, accept_upload};
use crate::saving::{DocumentStore, FileDocumentStore, RemoteDocument};
use crate::session::{EditSession, KeyChord, SaveOutcome};

type Session = EditSession<Arc<FileDocumentStore>, NoticeLog>;

pub struct AppState {
    store: Arc<FileDocumentStore>,
    cache: FileCache,
    sessions: Mutex<HashMap<Uuid, Arc<RwLock<Session>>>>,
    fallback_route: String,
}

impl AppState {
    pub fn open(config: &ServerConfig) -> Result<Self, Box<dyn std::error::Error>> {
        Ok(AppState {
            store: Arc::new(FileDocumentStore::open(config.documents_dir())?),
            cache: FileCache::open(config.cache_dir())?,
            sessions: Mutex::new(HashMap::new()),
            fallback_route: config.fallback_route.clone(),
        })
    }

    fn session(&self, sid: Uuid) -> Result<Arc<RwLock<Session>>, ApiError> {
        let sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        sessions.get(&sid).cloned().ok_or_else(|| {
            ApiError::new(StatusCode::NOT_FOUND, format!("Session not found: {}", sid))
        })
    }
}

#[derive(Serialize)]
struct StatusResponse {
    status: String,
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    redirect: Option<String>,
}

/// Error body returned by every endpoint.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    redirect: Option<String>,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        ApiError {
            status,
            message: message.into(),
            redirect: None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = StatusResponse {
            status: "error".to_string(),
            message: Some(self.message),
            redirect: self.redirect,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        let status = match e {
            StoreError::NotFound(_) => StatusCode::NOT_FOUND,
            StoreError::InvalidId(_)
            | StoreError::MissingSheets
            | StoreError::SheetIndex { .. } => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError::new(status, e.to_string())
    }
}

impl From<ExportError> for ApiError {
    fn from(e: ExportError) -> Self {
        let status = match e {
            ExportError::NoSheets | ExportError::UnknownFormat(_) => StatusCode::BAD_REQUEST,
            ExportError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError::new(status, e.to_string())
    }
}

impl From<CacheError> for ApiError {
    fn from(e: CacheError) -> Self {
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    }
}

impl From<LoadError> for ApiError {
    fn from(e: LoadError) -> Self {
        let status = match e.source {
            StoreError::NotFound(_) => StatusCode::NOT_FOUND,
            StoreError::InvalidId(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::BAD_GATEWAY,
        };
        ApiError {
            status,
            message: e.to_string(),
            redirect: Some(e.fallback_route),
        }
    }
}

#[derive(Deserialize)]
struct SheetsBody {
    sheets: Value,
}

/// Body of `/export/:format`: a bare sheets payload, or one with a
/// `selectedBlocks` list of sheet names to keep.
#[derive(Deserialize)]
#[serde(untagged)]
enum ExportBody {
    Selected {
        sheets: Value,
        #[serde(default, rename = "selectedBlocks")]
        selected_blocks: Option<Vec<String>>,
    },
    Sheets(Value),
}

#[derive(Deserialize)]
struct NewDocument {
    #[serde(rename = "companyId", alias = "company_id")]
    group_id: String,
    sheets: Value,
}

#[derive(Deserialize)]
struct UploadedFile {
    name: String,
    text: String,
}

#[derive(Deserialize)]
struct FinishedUpload {
    response: UploadResponse,
    #[serde(default)]
    files: Vec<UploadedFile>,
}

pub async fn run(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let state = Arc::new(AppState::open(&config)?);

    let cors = CorsLayer::new()
        .allow_origin(config.cors_origin.parse::<HeaderValue>()?)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = router(state).layer(cors).layer(TraceLayer::new_for_http());

    let addr = config.addr()?;
    let listener = TcpListener::bind(addr).await?;
    info!("Listening on http://{}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/documents", post(create_document))
        .route("/documents/:id", get(get_document).put(update_document))
        .route("/documents/:id/sheet/:index", delete(delete_sheet))
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/:sid", get(get_session).delete(close_session))
        .route("/api/sessions/:sid/change", post(change_session))
        .route("/api/sessions/:sid/save", post(save_session))
        .route("/api/sessions/:sid/key", post(key_session))
        .route("/api/sessions/:sid/export/:format", get(export_session))
        .route("/api/uploads/:group", post(finish_upload))
        .route("/api/saved-files", get(list_saved_files))
        .route("/api/saved-files/:key", post(save_files).delete(remove_saved_file))
        .route("/export/:format", post(export_payload))
        .with_state(state)
}

async fn get_document(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<RemoteDocument>, ApiError> {
    Ok(Json(state.store.fetch(&id).await?))
}

async fn update_document(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
    Json(body): Json<SheetsBody>,
) -> Result<Json<StatusResponse>, ApiError> {
    state.store.update(&id, body.sheets).await?;
    Ok(Json(StatusResponse {
        status: "ok".to_string(),
        message: Some("Document updated".to_string()),
        redirect: None,
    }))
}

async fn create_document(
    State(state): State<Arc<AppState>>,
    Json(body): Json<NewDocument>,
) -> Result<impl IntoResponse, ApiError> {
    let doc = state.store.create(&body.group_id, body.sheets).await?;
    Ok((StatusCode::CREATED, Json(doc)))
}

async fn delete_sheet(
    Path((group, index)): Path<(String, usize)>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, ApiError> {
    let sheets = state.store.delete_sheet(&group, index).await?;
    Ok(Json(json!({ "sheets": sheets })))
}

/// Resolves the entry context and registers a session for the page.
async fn open_session(state: &AppState, ctx: &EntryContext) -> Result<Value, ApiError> {
    let notices = NoticeLog::new();
    let document = Resolver::new(&state.store, &state.cache, &notices)
        .with_fallback_route(&state.fallback_route)
        .resolve(ctx)
        .await?;

    let session = EditSession::new(document, state.store.clone(), notices);
    let sid = Uuid::new_v4();
    let view = session_view(sid, &session);
    info!("Opened session {} with {} sheet(s)", sid, session.sheets().len());

    let mut sessions = state.sessions.lock().unwrap_or_else(PoisonError::into_inner);
    sessions.insert(sid, Arc::new(RwLock::new(session)));
    Ok(view)
}

fn session_view(sid: Uuid, session: &Session) -> Value {
    json!({
        "session": sid,
        "id": session.id(),
        "persisted": session.document().is_persisted(),
        "empty": session.is_empty(),
        "options": session.widget_options(),
        "notices": drained(session),
    })
}

fn drained(session: &Session) -> Vec<String> {
    session
        .notifier()
        .drain()
        .iter()
        .map(ToString::to_string)
        .collect()
}

async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(ctx): Json<EntryContext>,
) -> Result<impl IntoResponse, ApiError> {
    let view = open_session(&state, &ctx).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

async fn get_session(
    Path(sid): Path<Uuid>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, ApiError> {
    let session = state.session(sid)?;
    let session = session.read().await;
    Ok(Json(session_view(sid, &session)))
}

async fn close_session(
    Path(sid): Path<Uuid>,
    State(state): State<Arc<AppState>>,
) -> StatusCode {
    let mut sessions = state.sessions.lock().unwrap_or_else(PoisonError::into_inner);
    match sessions.remove(&sid) {
        Some(_) => StatusCode::NO_CONTENT,
        None => StatusCode::NOT_FOUND,
    }
}

async fn change_session(
    Path(sid): Path<Uuid>,
    State(state): State<Arc<AppState>>,
    Json(changed): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let session = state.session(sid)?;
    let mut session = session.write().await;
    session.apply_change(&changed);
    Ok(Json(json!({ "sheets": session.sheets().len() })))
}

#[derive(Serialize)]
struct SaveResponse {
    #[serde(flatten)]
    outcome: Option<SaveOutcome>,
    notices: Vec<String>,
}

async fn save_session(
    Path(sid): Path<Uuid>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<SaveResponse>, ApiError> {
    let session = state.session(sid)?;
    let session = session.read().await;
    let outcome = session.save().await;
    Ok(Json(SaveResponse {
        outcome: Some(outcome),
        notices: drained(&session),
    }))
}

async fn key_session(
    Path(sid): Path<Uuid>,
    State(state): State<Arc<AppState>>,
    Json(chord): Json<KeyChord>,
) -> Result<Json<SaveResponse>, ApiError> {
    let session = state.session(sid)?;
    let session = session.read().await;
    let outcome = session.handle_key(&chord).await;
    Ok(Json(SaveResponse {
        outcome,
        notices: drained(&session),
    }))
}

async fn export_session(
    Path((sid, format)): Path<(Uuid, String)>,
    State(state): State<Arc<AppState>>,
) -> Result<Response, ApiError> {
    let format: Format = format.parse()?;
    let session = state.session(sid)?;
    let session = session.read().await;
    let download = session.export(format);
    // The notice is already in the log; clear it so the next response starts clean.
    session.notifier().drain();
    Ok(attachment(download?))
}

async fn export_payload(
    Path(format): Path<String>,
    Json(body): Json<ExportBody>,
) -> Result<Response, ApiError> {
    let format: Format = format.parse()?;
    let (sheets, selected) = match body {
        ExportBody::Selected {
            sheets,
            selected_blocks,
        } => (sheets, selected_blocks.unwrap_or_default()),
        ExportBody::Sheets(sheets) => (sheets, Vec::new()),
    };
    let sheets = normalize(&sheets);
    Ok(attachment(export_selected(&sheets, format, &selected)?))
}

fn attachment(download: Download) -> Response {
    (
        [
            (header::CONTENT_TYPE, download.content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", download.file_name),
            ),
        ],
        download.bytes,
    )
        .into_response()
}

async fn finish_upload(
    Path(group): Path<String>,
    State(state): State<Arc<AppState>>,
    Json(body): Json<FinishedUpload>,
) -> Result<Response, ApiError> {
    let files = body
        .files
        .iter()
        .map(|f| CachedFile::from_text(&f.name, &f.text, Some(&group)))
        .collect();
    let notices = NoticeLog::new();

    match accept_upload(&body.response, &group, files, &state.cache, &notices) {
        Some(ctx) => {
            let view = open_session(&state, &ctx).await?;
            Ok((StatusCode::CREATED, Json(view)).into_response())
        }
        None => {
            let message = notices
                .drain()
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            Err(ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, message))
        }
    }
}

async fn list_saved_files(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<CacheRecord>>, ApiError> {
    Ok(Json(SavedFiles::new(&state.cache).list()?))
}

async fn save_files(
    Path(group): Path<String>,
    State(state): State<Arc<AppState>>,
    Json(files): Json<Vec<UploadedFile>>,
) -> Result<impl IntoResponse, ApiError> {
    let files: Vec<CachedFile> = files
        .iter()
        .map(|f| CachedFile::from_text(&f.name, &f.text, Some(&group)))
        .collect();
    let count = files.len();
    SavedFiles::new(&state.cache).record_upload(&group, files)?;
    Ok((StatusCode::CREATED, Json(json!({ "saved": count }))))
}

async fn remove_saved_file(
    Path(index): Path<usize>,
    State(state): State<Arc<AppState>>,
) -> Result<StatusCode, ApiError> {
    if SavedFiles::new(&state.cache).remove(index)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        warn!("No saved file record at index {}", index);
        Err(ApiError::new(
            StatusCode::NOT_FOUND,
            format!("No saved file at index {}", index),
        ))
    }
}
