//! HTTP surface: import, single-file ingest, page lifecycle and asset serving.
use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Multipart, Path, Request, State},
    http::{header, HeaderMap, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::{info, instrument, warn};

use crate::import::{ImportError, Importer};
use crate::ingest::ingest_files;
use crate::model::{extension_of, normalize_filename, ImportReport, ImportResult, UploadedFile};
use crate::sniff::resolve_media_type;
use crate::store::{FsPageStore, PageNode, PageStore, StoreError};
use crate::worker::ASSET_ROUTE;

pub const SECRET_HEADER: &str = "x-shared-secret";

/// Query parameter carrying the secret on asset reads, for clients such as
/// `<img>` tags that cannot set headers.
pub const SECRET_QUERY_PARAM: &str = "secret";

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<FsPageStore>,
    pub importer: Arc<Importer>,
    pub shared_secret: String,
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized,
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl From<ImportError> for ApiError {
    fn from(err: ImportError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidPath(_) => ApiError::BadRequest(err.to_string()),
            StoreError::NotFound(_) => ApiError::NotFound(err.to_string()),
            StoreError::AlreadyExists(_) => ApiError::Conflict(err.to_string()),
            StoreError::Io { .. } => ApiError::Internal(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "invalid or missing shared secret".to_string(),
            ),
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            ApiError::Conflict(m) => (StatusCode::CONFLICT, m),
            ApiError::Internal(m) => {
                warn!(error = %m, "internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, m)
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/api/import", post(import_files))
        .route("/api/ingest", post(ingest_upload))
        .route("/api/pages", get(list_pages).post(create_page))
        .route("/api/pages/move", post(move_page))
        .route(
            "/api/pages/{*slug}",
            get(read_page).put(save_page).delete(delete_page),
        )
        .route(&format!("{}/{{*path}}", ASSET_ROUTE), get(read_asset))
        .layer(middleware::from_fn_with_state(state.clone(), require_secret))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}

fn presented_secret(headers: &HeaderMap) -> Option<&str> {
    if let Some(value) = headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok()) {
        return Some(value);
    }
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

pub fn secret_matches(expected: &str, presented: Option<&str>) -> bool {
    match presented {
        Some(given) if !expected.is_empty() => {
            bool::from(given.trim().as_bytes().ct_eq(expected.as_bytes()))
        }
        _ => false,
    }
}

fn query_secret(request: &Request) -> Option<String> {
    request.uri().query()?.split('&').find_map(|pair| {
        let value = pair.strip_prefix(SECRET_QUERY_PARAM)?.strip_prefix('=')?;
        percent_decode_str(value)
            .decode_utf8()
            .ok()
            .map(|v| v.into_owned())
    })
}

fn is_asset_read(request: &Request) -> bool {
    request.method() == Method::GET
        && request
            .uri()
            .path()
            .strip_prefix(ASSET_ROUTE)
            .is_some_and(|rest| rest.starts_with('/'))
}

async fn require_secret(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let expected = &state.shared_secret;
    let authorized = secret_matches(expected, presented_secret(request.headers()))
        || (is_asset_read(&request)
            && secret_matches(expected, query_secret(&request).as_deref()));
    if !authorized {
        return Err(ApiError::Unauthorized);
    }
    Ok(next.run(request).await)
}

/// Collect `file` parts and the optional `instructions` text part.
async fn read_upload(
    mut multipart: Multipart,
) -> Result<(Vec<UploadedFile>, Option<String>), ApiError> {
    let mut files = Vec::new();
    let mut instructions = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("failed to read multipart: {}", e)))?
    {
        let field_name = field.name().map(|s| s.to_string()).unwrap_or_default();
        match field_name.as_str() {
            "instructions" => {
                let text = field.text().await.map_err(|e| {
                    ApiError::BadRequest(format!("failed to read instructions: {}", e))
                })?;
                instructions = Some(text).filter(|t| !t.trim().is_empty());
            }
            "file" | "files" => {
                let filename = field
                    .file_name()
                    .map(normalize_filename)
                    .filter(|n| !n.is_empty())
                    .unwrap_or_else(|| "unnamed".to_string());
                let bytes = field.bytes().await.map_err(|e| {
                    ApiError::BadRequest(format!("failed to read {}: {}", filename, e))
                })?;
                files.push(UploadedFile::new(filename, bytes));
            }
            _ => {}
        }
    }
    Ok((files, instructions))
}

#[instrument(skip_all)]
async fn import_files(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<ImportReport>, ApiError> {
    let (files, instructions) = read_upload(multipart).await?;
    info!(files = files.len(), "import requested");
    let report = state.importer.import(files, instructions.as_deref()).await?;
    Ok(Json(report))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IngestResponse {
    pub results: Vec<ImportResult>,
}

#[instrument(skip_all)]
async fn ingest_upload(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<IngestResponse>, ApiError> {
    let (files, _) = read_upload(multipart).await?;
    if files.is_empty() {
        return Err(ImportError::NoFiles.into());
    }
    let results = ingest_files(state.store.as_ref(), &files).await;
    Ok(Json(IngestResponse { results }))
}

async fn list_pages(State(state): State<AppState>) -> Result<Json<Vec<PageNode>>, ApiError> {
    Ok(Json(state.store.list_pages().await?))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PageBody {
    pub slug: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct CreatePage {
    pub slug: String,
}

async fn create_page(
    State(state): State<AppState>,
    Json(body): Json<CreatePage>,
) -> Result<(StatusCode, Json<PageBody>), ApiError> {
    state.store.create_page(&body.slug).await?;
    let content = state.store.read_page_content(&body.slug).await?;
    Ok((
        StatusCode::CREATED,
        Json(PageBody {
            slug: body.slug,
            content,
        }),
    ))
}

async fn read_page(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<PageBody>, ApiError> {
    let content = state.store.read_page_content(&slug).await?;
    Ok(Json(PageBody { slug, content }))
}

#[derive(Debug, Deserialize)]
pub struct SaveContent {
    pub content: String,
}

async fn save_page(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Json(body): Json<SaveContent>,
) -> Result<StatusCode, ApiError> {
    state.store.save_page_content(&slug, &body.content).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_page(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.store.delete_page(&slug).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct MovePage {
    pub slug: String,
    #[serde(default)]
    pub new_parent: Option<String>,
    #[serde(default)]
    pub new_name: Option<String>,
}

/// Rename and/or move. Without `new_parent` the page stays under its parent;
/// an empty `new_parent` moves it to the root.
async fn move_page(
    State(state): State<AppState>,
    Json(body): Json<MovePage>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut slug = body.slug.clone();
    if let Some(name) = body.new_name.as_deref() {
        slug = state.store.rename_page(&slug, name).await?;
    }
    if let Some(parent) = body.new_parent.as_deref() {
        let parent = Some(parent).filter(|p| !p.trim_matches('/').is_empty());
        slug = state.store.move_page(&slug, parent).await?;
    }
    Ok(Json(json!({ "slug": slug })))
}

async fn read_asset(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Response, ApiError> {
    let (slug, filename) = path
        .rsplit_once('/')
        .ok_or_else(|| ApiError::BadRequest(format!("invalid asset path: {}", path)))?;
    let bytes = state.store.read_asset(slug, filename).await?;
    let content_type = resolve_media_type(&bytes, extension_of(filename).as_deref());
    Ok(([(header::CONTENT_TYPE, content_type)], Body::from(bytes)).into_response())
}
