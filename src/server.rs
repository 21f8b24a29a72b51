//! HTTP surface: upload endpoint, health probe and service info.

use crate::config::ServerConfig;
use crate::languages::LanguageSet;
use crate::pipeline::{DocumentKind, DocumentProcessor};
use crate::redaction::RedactionRequest;
use axum::{
    extract::{DefaultBodyLimit, Multipart, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::io::Write;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

pub const SERVICE_NAME: &str = "ocr-service";

/// Extensions accepted by `POST /ocr`, lowercase and without the dot.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "pdf", "bmp", "tif", "tiff", "webp"];

const MIB: usize = 1024 * 1024;

/// Room for multipart framing and the `lang` field on top of the file itself.
const MULTIPART_OVERHEAD: usize = MIB;

type ApiError = (StatusCode, Json<Value>);

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    processor: Arc<DocumentProcessor>,
    max_upload_bytes: usize,
}

impl AppState {
    pub fn new(processor: Arc<DocumentProcessor>, config: &ServerConfig) -> Self {
        Self {
            processor,
            max_upload_bytes: config.max_upload_bytes,
        }
    }
}

pub fn router(state: AppState) -> Router {
    let body_limit = state.max_upload_bytes.saturating_add(MULTIPART_OVERHEAD);
    Router::new()
        .route("/", get(service_info))
        .route("/health", get(health))
        .route("/ocr", post(ocr_document))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ============================================================================
// Handlers
// ============================================================================

/// Service description and current reader cache contents.
async fn service_info(State(state): State<AppState>) -> Json<Value> {
    let readers = state.processor.readers();
    let extensions: Vec<String> = SUPPORTED_EXTENSIONS.iter().map(|e| format!(".{}", e)).collect();
    Json(json!({
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "/": "GET - service information",
            "/health": "GET - health check",
            "/ocr": "POST - multipart upload (file, lang); ?output=blocks|pii_request",
        },
        "supported_file_types": extensions,
        "max_upload_bytes": state.max_upload_bytes,
        "reader_cache": {
            "size": readers.len(),
            "capacity": readers.capacity(),
            "cached_languages": readers.cached_languages(),
        },
    }))
}

/// Health check; probes the engine on the blocking pool.
async fn health(State(state): State<AppState>) -> Json<Value> {
    let processor = state.processor.clone();
    let available = tokio::task::spawn_blocking(move || processor.readers().engine_available())
        .await
        .unwrap_or(false);

    Json(json!({
        "status": "healthy",
        "service": SERVICE_NAME,
        "ocr_status": if available { "ready" } else { "unavailable" },
    }))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Blocks,
    PiiRequest,
}

#[derive(Debug, Deserialize)]
struct OcrQuery {
    output: Option<OutputFormat>,
}

/// Upload a document and recognize its text.
async fn ocr_document(
    State(state): State<AppState>,
    Query(query): Query<OcrQuery>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let mut upload: Option<(String, Vec<u8>)> = None;
    let mut lang: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("Invalid multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| bad_request(format!("Failed to read file: {}", e)))?;
                upload = Some((filename, data.to_vec()));
            }
            "lang" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| bad_request(format!("Failed to read lang: {}", e)))?;
                lang = Some(value);
            }
            _ => {}
        }
    }

    let (raw_filename, data) = match upload {
        Some((name, data)) if !(name.is_empty() && data.is_empty()) => (name, data),
        _ => return Err(bad_request("No file uploaded")),
    };

    let filename = sanitize_filename(&raw_filename);
    let extension = match supported_extension(&filename) {
        Some(ext) => ext,
        None => {
            let allowed: Vec<String> = SUPPORTED_EXTENSIONS.iter().map(|e| format!(".{}", e)).collect();
            return Err(bad_request(format!(
                "Unsupported file type. Allowed: {}",
                allowed.join(", ")
            )));
        }
    };

    if data.len() > state.max_upload_bytes {
        return Err(bad_request(format!(
            "File too large (max {})",
            format_size(state.max_upload_bytes)
        )));
    }

    let languages = LanguageSet::parse_list(lang.as_deref());
    let primary_language = lang.as_deref().and_then(first_language);
    let output = query.output.unwrap_or_default();
    info!(
        "Received {} ({} bytes), languages {}, output {:?}",
        filename,
        data.len(),
        languages,
        output
    );

    let processor = state.processor.clone();
    let task_languages = languages.clone();
    let suffix = format!(".{}", extension);
    let outcome = tokio::task::spawn_blocking(move || -> Result<_, String> {
        let mut upload = tempfile::Builder::new()
            .prefix("ocr-upload-")
            .suffix(&suffix)
            .tempfile()
            .map_err(|e| format!("Failed to stage upload: {}", e))?;
        upload
            .write_all(&data)
            .and_then(|_| upload.flush())
            .map_err(|e| format!("Failed to stage upload: {}", e))?;

        let kind = DocumentKind::from_path(upload.path());
        let result = processor
            .process(upload.path(), &task_languages)
            .map_err(|e| e.to_string());

        let path = upload.path().to_path_buf();
        if let Err(e) = upload.close() {
            warn!("Failed to remove upload {}: {}", path.display(), e);
        }
        result.map(|doc| (kind, doc))
    })
    .await
    .map_err(|e| e.to_string())
    .and_then(|r| r);

    let (kind, document) = outcome.map_err(|details| {
        error!("OCR processing failed for {}: {}", filename, details);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "OCR processing failed", "details": details })),
        )
    })?;

    let response = match output {
        OutputFormat::Blocks => Json(document).into_response(),
        OutputFormat::PiiRequest => {
            let request = RedactionRequest::from_document(
                &document,
                document_id(&filename),
                kind,
                primary_language.as_deref(),
                &languages,
            );
            info!(
                "Built redaction request {} with {} spans",
                request.document_id,
                request.span_count()
            );
            Json(request).into_response()
        }
    };
    Ok(response)
}

// ============================================================================
// Helper functions
// ============================================================================

fn bad_request(message: impl Into<String>) -> ApiError {
    let message = message.into();
    warn!("Rejected upload: {}", message);
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message })))
}

/// Strip directory components and anything outside `[A-Za-z0-9._-]`.
pub fn sanitize_filename(raw: &str) -> String {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .filter_map(|c| match c {
            c if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') => Some(c),
            c if c.is_whitespace() => Some('_'),
            _ => None,
        })
        .collect();
    cleaned.trim_start_matches('.').to_string()
}

/// Lowercase extension of `filename` if it is one we accept.
fn supported_extension(filename: &str) -> Option<String> {
    let (stem, ext) = filename.rsplit_once('.')?;
    if stem.is_empty() {
        return None;
    }
    let ext = ext.to_ascii_lowercase();
    SUPPORTED_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

/// First non-blank code of the raw `lang` field, in request order.
fn first_language(raw: &str) -> Option<String> {
    raw.split(',')
        .map(|c| c.trim().to_lowercase())
        .find(|c| !c.is_empty())
}

fn document_id(filename: &str) -> String {
    match filename.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => uuid::Uuid::new_v4().to_string(),
    }
}

fn format_size(bytes: usize) -> String {
    if bytes >= MIB && bytes % MIB == 0 {
        format!("{}MB", bytes / MIB)
    } else {
        format!("{} bytes", bytes)
    }
}
