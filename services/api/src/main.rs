//! API Service - HTTP front end for the Airlink workbook pipeline
//!
//! Endpoints:
//! - GET  /health - Health check
//! - POST /upload - Process a departure workbook (field `departure_file`)
//! - POST /analyze - Process a base workbook (field `base_file`)
//! - GET  /search - Search stored flight records
//! - GET  /stats - Per-operator or per-airport statistics
//! - GET  /download_dashboard_pdf - Dashboard report for one analysis

use anyhow::Context;
use axum::{
    extract::{
        multipart::{Multipart, MultipartRejection},
        DefaultBodyLimit, Query, State,
    },
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};

use airlink_parser::query::{group_stats, search, GroupBy, SearchQuery};
use airlink_parser::report::{dashboard_report, CONTENT_TYPE as XLSX_CONTENT_TYPE};
use airlink_parser::store::connect_store;
use airlink_parser::{
    process_workbook, telemetry, Clock, Config, DocumentStore, FileType, Persister, ProcessingRun,
    QueryError, ReportError, SystemClock, WorkbookError, WorkbookReport,
};

// ============================================================================
// State
// ============================================================================

#[derive(Clone)]
struct AppState {
    store: Arc<dyn DocumentStore>,
    persister: Persister,
    clock: Arc<dyn Clock>,
    max_upload_bytes: usize,
}

// ============================================================================
// Response types
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    ok: bool,
    version: &'static str,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

#[derive(Serialize)]
struct UploadResponse<'a> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    doc_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sheets: Option<&'a WorkbookReport>,
}

impl UploadResponse<'_> {
    fn failed(error: impl Into<String>, details: Option<String>) -> Self {
        Self {
            success: false,
            doc_id: None,
            error: Some(error.into()),
            details,
            sheets: None,
        }
    }
}

fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            details: None,
        }),
    )
        .into_response()
}

/// Log the full error chain and answer 500 with it as `details`.
fn internal_error(err: anyhow::Error) -> Response {
    error!("{:?}", err);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: err.to_string(),
            details: Some(format!("{:?}", err)),
        }),
    )
        .into_response()
}

// ============================================================================
// Query params
// ============================================================================

#[derive(Deserialize)]
struct SearchParams {
    doc_id: Option<String>,
    query: Option<String>,
    page: Option<usize>,
    limit: Option<usize>,
}

#[derive(Deserialize)]
struct StatsParams {
    doc_id: Option<String>,
    group_by: Option<String>,
}

#[derive(Deserialize)]
struct DashboardParams {
    doc_id: Option<String>,
}

fn required_doc_id(doc_id: Option<String>) -> Result<String, Response> {
    match doc_id.map(|d| d.trim().to_string()) {
        Some(d) if !d.is_empty() => Ok(d),
        _ => Err(error_response(StatusCode::BAD_REQUEST, "doc_id is required")),
    }
}

// ============================================================================
// Handlers
// ============================================================================

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        version: env!("CARGO_PKG_VERSION"),
    })
}

fn is_excel_filename(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower.ends_with(".xlsx") || lower.ends_with(".xls")
}

/// Pull the workbook out of the form field the file type expects.
async fn read_upload(
    multipart: &mut Multipart,
    file_type: FileType,
) -> anyhow::Result<Option<(String, Vec<u8>)>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .context("Malformed multipart body")?
    {
        if field.name() != Some(file_type.upload_field()) {
            continue;
        }
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };
        if !is_excel_filename(&filename) {
            continue;
        }
        let bytes = field.bytes().await.context("Failed to read uploaded file")?;
        return Ok(Some((filename, bytes.to_vec())));
    }
    Ok(None)
}

async fn ingest(
    state: &AppState,
    multipart: Result<Multipart, MultipartRejection>,
    file_type: FileType,
) -> Response {
    let required = format!("Valid {} Excel file is required", file_type);

    let upload = match multipart {
        Ok(mut multipart) => read_upload(&mut multipart, file_type).await,
        Err(rejection) => {
            warn!(%file_type, "rejected upload: {}", rejection);
            Ok(None)
        }
    };
    let (filename, bytes) = match upload {
        Ok(Some(file)) => file,
        Ok(None) => {
            return (StatusCode::BAD_REQUEST, Json(UploadResponse::failed(required, None))).into_response()
        }
        Err(e) => {
            warn!(%file_type, "unreadable upload: {:?}", e);
            return (
                StatusCode::BAD_REQUEST,
                Json(UploadResponse::failed(required, Some(format!("{:#}", e)))),
            )
                .into_response();
        }
    };

    let run = ProcessingRun::start(state.clock.as_ref());
    match process_workbook(&bytes, file_type, &filename, &run, &state.persister).await {
        Ok(report) if report.has_errors() => {
            warn!(%filename, "workbook processed with sheet errors");
            (
                StatusCode::BAD_REQUEST,
                Json(UploadResponse {
                    success: false,
                    doc_id: None,
                    error: None,
                    details: None,
                    sheets: Some(&report),
                }),
            )
                .into_response()
        }
        Ok(report) => {
            info!(%filename, sheets = report.sheets.len(), "workbook processed");
            Json(UploadResponse {
                success: true,
                doc_id: report.first_doc_id(),
                error: None,
                details: None,
                sheets: Some(&report),
            })
            .into_response()
        }
        Err(e @ (WorkbookError::Storage(_) | WorkbookError::Worker(_))) => {
            let err = anyhow::Error::new(e).context(format!("Failed to process {}", filename));
            error!("{:?}", err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(UploadResponse::failed(err.to_string(), Some(format!("{:?}", err)))),
            )
                .into_response()
        }
        Err(e) => {
            warn!(%filename, "rejected workbook: {}", e);
            (
                StatusCode::BAD_REQUEST,
                Json(UploadResponse::failed(e.to_string(), Some(format!("{:?}", e)))),
            )
                .into_response()
        }
    }
}

async fn upload_handler(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    ingest(&state, multipart, FileType::Departure).await
}

async fn analyze_handler(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    ingest(&state, multipart, FileType::Base).await
}

fn query_error_response(err: QueryError) -> Response {
    match err {
        QueryError::NotFound(_) => {
            warn!("{}", err);
            error_response(StatusCode::NOT_FOUND, err.to_string())
        }
        QueryError::InvalidGroupBy(_) => error_response(StatusCode::BAD_REQUEST, err.to_string()),
        QueryError::Store(_) => internal_error(anyhow::Error::new(err).context("Store query failed")),
    }
}

async fn search_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> Response {
    let doc_id = match required_doc_id(params.doc_id) {
        Ok(d) => d,
        Err(resp) => return resp,
    };
    let defaults = SearchQuery::default();
    let query = SearchQuery {
        query: params.query.unwrap_or_default(),
        page: params.page.unwrap_or(defaults.page),
        limit: params.limit.unwrap_or(defaults.limit),
    };

    match search(state.store.as_ref(), &doc_id, &query).await {
        Ok(hits) => Json(hits).into_response(),
        Err(e) => query_error_response(e),
    }
}

async fn stats_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<StatsParams>,
) -> Response {
    let doc_id = match required_doc_id(params.doc_id) {
        Ok(d) => d,
        Err(resp) => return resp,
    };
    let group_by = match params.group_by.as_deref().map(str::parse::<GroupBy>) {
        None => GroupBy::default(),
        Some(Ok(g)) => g,
        Some(Err(e)) => return query_error_response(e),
    };

    match group_stats(state.store.as_ref(), &doc_id, group_by).await {
        Ok(groups) => Json(groups).into_response(),
        Err(e) => query_error_response(e),
    }
}

/// Attachment header with an ASCII fallback name plus the RFC 5987
/// `filename*` form, since doc ids carry raw sheet names.
fn content_disposition(filename: &str) -> String {
    let fallback: String = filename
        .chars()
        .map(|c| {
            if c.is_ascii_graphic() && c != '"' && c != '\\' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        utf8_percent_encode(filename, NON_ALPHANUMERIC)
    )
}

async fn dashboard_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DashboardParams>,
) -> Response {
    let doc_id = match required_doc_id(params.doc_id) {
        Ok(d) => d,
        Err(resp) => return resp,
    };

    match dashboard_report(state.store.as_ref(), &doc_id, state.clock.as_ref()).await {
        Ok(report) => {
            match HeaderValue::from_str(&content_disposition(&report.filename)) {
                Ok(disposition) => (
                    [
                        (header::CONTENT_TYPE, HeaderValue::from_static(XLSX_CONTENT_TYPE)),
                        (header::CONTENT_DISPOSITION, disposition),
                    ],
                    report.bytes,
                )
                    .into_response(),
                Err(e) => internal_error(anyhow::Error::new(e).context("Invalid report filename")),
            }
        }
        Err(ReportError::NotFound(id)) => {
            warn!(doc_id = %id, "no analysis for report");
            error_response(StatusCode::NOT_FOUND, format!("No data found for doc_id {}", id))
        }
        Err(e) => internal_error(anyhow::Error::new(e).context("Failed to build dashboard report")),
    }
}

// ============================================================================
// Router
// ============================================================================

fn build_router(state: Arc<AppState>) -> Router {
    // Preflight answers mirror the caller's Origin.
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health_handler))
        .route("/upload", post(upload_handler))
        .route("/analyze", post(analyze_handler))
        .route("/search", get(search_handler))
        .route("/stats", get(stats_handler))
        .route("/download_dashboard_pdf", get(dashboard_handler))
        .layer(DefaultBodyLimit::max(state.max_upload_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init("info,tower_http=info");

    let config = Config::from_env().context("Invalid configuration")?;

    println!("=== Airlink API ===");
    println!("Connecting to document store...");

    let store = connect_store(&config)
        .await
        .context("Failed to connect to document store")?;

    println!("Document store connected");

    let state = Arc::new(AppState {
        persister: Persister::new(store.clone(), config.retry),
        store,
        clock: Arc::new(SystemClock),
        max_upload_bytes: config.max_upload_bytes,
    });

    let app = build_router(state);

    println!("API listening on http://{}", config.api_bind);
    println!("\nEndpoints:");
    println!("  GET  /health");
    println!("  POST /upload (departure_file)");
    println!("  POST /analyze (base_file)");
    println!("  GET  /search?doc_id=&query=&page=&limit=");
    println!("  GET  /stats?doc_id=&group_by=operator|airport");
    println!("  GET  /download_dashboard_pdf?doc_id=");

    let listener = tokio::net::TcpListener::bind(&config.api_bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.api_bind))?;
    axum::serve(listener, app).await?;

    Ok(())
}
