//! HTTP server for the sheetload API.
//!
//! # API Endpoints
//!
//! | Method | Path            | Description                               |
//! |--------|-----------------|-------------------------------------------|
//! | GET    | `/health`       | Health check                              |
//! | POST   | `/api/upload`   | Upload CSV, get rows and default mappings |
//! | POST   | `/api/validate` | Validate rows against mappings            |
//! | POST   | `/api/compile`  | Full script + validation report           |
//! | POST   | `/api/preview`  | Script for the first rows only            |
//! | POST   | `/api/execute`  | Run an UPDATE job row by row              |
//! | GET    | `/api/history`  | Most recent operations                    |
//! | GET    | `/api/logs`     | SSE stream for real-time logs             |
//!
//! Configuration problems answer 400, everything else 500.

use axum::{
    extract::{Multipart, Query, State},
    http::{header, Method, StatusCode},
    response::{sse::Event, Json, Sse},
    routing::{get, post},
    Router,
};
use futures::stream::Stream;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use std::{convert::Infallible, net::SocketAddr, time::Duration};
use tokio::sync::Mutex;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;

use super::logs::{log_error, log_info, log_success, LOG_BROADCASTER};
use super::types::{
    error_response, CompileRequest, CompileResponse, ExecuteRequest, HistoryQuery,
    PreviewRequest, PreviewResponse, UploadResponse, ValidateRequest,
};
use crate::compile::{compile, preview, PREVIEW_ROWS};
use crate::config::{JobConfig, Settings};
use crate::error::{JobError, ServerError, ServerResult};
use crate::execute::{execute, HttpEndpoint};
use crate::history::{
    HistoryStore, JsonHistoryStore, MemoryHistory, OperationRecord, DEFAULT_RECENT_LIMIT,
};
use crate::models::{OperationSummary, ValidationResult};
use crate::parser::parse_bytes_auto;
use crate::validation::validate;

/// Shared server state
pub struct AppState {
    pub settings: Settings,
    /// Held only for single reads and appends, never across a pass
    pub history: Mutex<Box<dyn HistoryStore + Send>>,
}

impl AppState {
    pub fn new(settings: Settings, history: Box<dyn HistoryStore + Send>) -> Self {
        Self {
            settings,
            history: Mutex::new(history),
        }
    }
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<Value>)>;

/// Map a server error to its status code and JSON body.
fn reject(err: ServerError) -> (StatusCode, Json<Value>) {
    let status = match &err {
        ServerError::Config(_)
        | ServerError::Job(_)
        | ServerError::Source(_)
        | ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
        ServerError::Endpoint(_) | ServerError::History(_) | ServerError::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, Json(error_response(&err.to_string())))
}

fn parse_job(value: Value) -> ServerResult<JobConfig> {
    JobConfig::from_value(value).map_err(|e| match e {
        JobError::Io(io) => ServerError::Internal(io.to_string()),
        other => ServerError::Job(other),
    })
}

/// Build the router over shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/upload", post(upload_csv))
        .route("/api/validate", post(validate_rows))
        .route("/api/compile", post(compile_script))
        .route("/api/preview", post(preview_script))
        .route("/api/execute", post(execute_job))
        .route("/api/history", get(recent_history))
        .route("/api/logs", get(sse_logs))
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server with a JSON history store from `settings`.
pub async fn start_server(settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
    let port = settings.port;
    let history = JsonHistoryStore::with_dir(&settings.history_dir);
    let state = Arc::new(AppState::new(settings, Box::new(history)));
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    println!("🚀 Sheetload server running on http://localhost:{}", port);
    println!("   POST /api/upload   - Upload CSV file");
    println!("   POST /api/compile  - Generate SQL script");
    println!("   POST /api/execute  - Execute UPDATE job");
    println!("   GET  /api/history  - Recent operations");
    println!("   GET  /api/logs     - SSE log stream");
    println!("   GET  /health       - Health check");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check endpoint
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "sheetload",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// SSE endpoint for real-time log streaming
async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = LOG_BROADCASTER.subscribe();

    // lagged receivers just drop the missed entries
    let stream = BroadcastStream::new(rx).filter_map(|result| {
        let entry = result.ok()?;
        let json = serde_json::to_string(&entry).ok()?;
        Some(Ok(Event::default().data(json)))
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

async fn upload_csv(mut multipart: Multipart) -> ApiResult<UploadResponse> {
    let mut file_data: Option<Vec<u8>> = None;
    let mut file_name: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        reject(ServerError::BadRequest(format!("Multipart error: {}", e)))
    })? {
        if field.name() == Some("file") {
            file_name = field.file_name().map(|s| s.to_string());
            let bytes = field.bytes().await.map_err(|e| {
                reject(ServerError::BadRequest(format!("Read error: {}", e)))
            })?;
            file_data = Some(bytes.to_vec());
        }
    }

    let bytes = file_data.ok_or_else(|| reject(ServerError::BadRequest("No file provided".into())))?;

    log_info(format!(
        "📄 Upload: {} ({} bytes)",
        file_name.as_deref().unwrap_or("unknown"),
        bytes.len()
    ));

    let mut sheet = parse_bytes_auto(&bytes).map_err(|e| reject(e.into()))?;
    if let Some(stem) = file_name
        .as_deref()
        .and_then(|n| Path::new(n).file_stem())
        .and_then(|s| s.to_str())
    {
        sheet.sheet_names = vec![stem.to_string()];
    }

    log_success(format!(
        "Read {} rows, {} columns (encoding {}, delimiter '{}')",
        sheet.rows.len(),
        sheet.columns.len(),
        sheet.encoding,
        sheet.delimiter.escape_default()
    ));

    Ok(Json(UploadResponse::new(sheet, file_name)))
}

async fn validate_rows(Json(req): Json<ValidateRequest>) -> Json<ValidationResult> {
    Json(validate(&req.rows, &req.mappings))
}

async fn compile_script(Json(req): Json<CompileRequest>) -> ApiResult<CompileResponse> {
    let job = parse_job(req.job).map_err(reject)?;
    let validation = validate(&req.rows, &job.mappings);
    let script = compile(&req.rows, &job).map_err(|e| reject(e.into()))?;

    log_success(format!(
        "Compiled {} statement(s) for {} ({})",
        script.statements.len(),
        job.table,
        validation.summary()
    ));

    Ok(Json(CompileResponse::new(&script, validation)))
}

async fn preview_script(Json(req): Json<PreviewRequest>) -> ApiResult<PreviewResponse> {
    let job = parse_job(req.job).map_err(reject)?;
    let limit = req.limit.unwrap_or(PREVIEW_ROWS);
    let preview = preview(&req.rows, &job, limit).map_err(|e| reject(e.into()))?;
    Ok(Json(PreviewResponse::from(&preview)))
}

async fn execute_job(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ExecuteRequest>,
) -> ApiResult<OperationSummary> {
    let job = parse_job(req.job).map_err(reject)?;
    let endpoint = HttpEndpoint::from_settings(&state.settings).map_err(|e| reject(e.into()))?;
    let source_label = req.source_label.unwrap_or_else(|| "api".to_string());

    let mut pass_history = MemoryHistory::new();
    let summary = execute(&endpoint, &mut pass_history, &job, &req.rows, &source_label)
        .await
        .map_err(|e| reject(e.into()))?;

    let mut history = state.history.lock().await;
    for record in pass_history.into_records() {
        if let Err(e) = history.append(record) {
            log_error(format!("Failed to record operation history: {}", e));
        }
    }

    Ok(Json(summary))
}

async fn recent_history(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Vec<OperationRecord>> {
    let limit = query.limit.unwrap_or(DEFAULT_RECENT_LIMIT);
    let history = state.history.lock().await;
    let records = history.recent(limit).map_err(|e| reject(e.into()))?;
    Ok(Json(records))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::MemoryHistory;
    use crate::models::{OperationType, RowFailure};
    use crate::mapping::MappingSet;

    fn rows() -> Vec<crate::models::Row> {
        serde_json::from_value(json!([
            { "id": "1", "preco": "10,5" },
            { "id": "", "preco": "3" }
        ]))
        .unwrap()
    }

    fn job_json() -> Value {
        json!({
            "table": "produtos",
            "operation": "update",
            "mappings": {
                "columns": [
                    { "sourceColumn": "id", "targetColumn": "id" },
                    { "sourceColumn": "preco", "targetColumn": "preco", "type": "number" }
                ],
                "keyColumn": "id"
            }
        })
    }

    fn state() -> Arc<AppState> {
        Arc::new(AppState::new(Settings::default(), Box::new(MemoryHistory::new())))
    }

    #[tokio::test]
    async fn test_compile_returns_script_and_validation() {
        let Json(response) = compile_script(Json(CompileRequest {
            rows: rows(),
            job: job_json(),
        }))
        .await
        .unwrap();

        assert_eq!(response.status, "warning");
        assert_eq!(response.statement_count, 1);
        assert_eq!(response.skipped_rows, 1);
        assert!(response.script.contains("UPDATE produtos SET preco = 10.5 WHERE id = '1';"));
    }

    #[tokio::test]
    async fn test_invalid_job_is_bad_request() {
        let err = compile_script(Json(CompileRequest {
            rows: rows(),
            job: json!({ "table": "" }),
        }))
        .await
        .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
        assert_eq!(err.1 .0["status"], "error");
    }

    #[tokio::test]
    async fn test_preview_limit() {
        let Json(response) = preview_script(Json(PreviewRequest {
            rows: rows(),
            job: job_json(),
            limit: Some(1),
        }))
        .await
        .unwrap();
        assert_eq!(response.statement_count, 1);
        assert_eq!(response.remaining_rows, 1);
    }

    #[tokio::test]
    async fn test_validate_without_key() {
        let Json(result) = validate_rows(Json(ValidateRequest {
            rows: rows(),
            mappings: MappingSet::from_columns(&["id", "preco"]),
        }))
        .await;
        assert!(!result.is_valid);
    }

    #[tokio::test]
    async fn test_execute_without_endpoint_is_server_error() {
        let err = execute_job(
            State(state()),
            Json(ExecuteRequest {
                rows: rows(),
                job: job_json(),
                source_label: None,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_history_limit() {
        let state = state();
        {
            let mut history = state.history.lock().await;
            for failed in 0..3 {
                let summary = OperationSummary {
                    total: 3,
                    succeeded: 3 - failed,
                    failed,
                    errors: vec![RowFailure { row_index: 0, message: "x".into() }; failed],
                };
                let record = OperationRecord::from_summary(
                    &summary,
                    OperationType::Update,
                    "produtos",
                    "a.csv",
                    &MappingSet::new(),
                );
                history.append(record).unwrap();
            }
        }

        let Json(records) = recent_history(State(state), Query(HistoryQuery { limit: Some(2) }))
            .await
            .unwrap();
        assert_eq!(records.len(), 2);
    }

    #[tokio::test]
    async fn test_history_readable_during_stalled_execution() {
        // accepts connections, never answers
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let mut open = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                open.push(socket);
            }
        });

        let settings = Settings {
            endpoint_url: Some(format!("http://{}", addr)),
            endpoint_key: Some("key".into()),
            request_timeout: Duration::from_secs(1),
            ..Settings::default()
        };
        let state = Arc::new(AppState::new(settings, Box::new(MemoryHistory::new())));

        let running = tokio::spawn(execute_job(
            State(state.clone()),
            Json(ExecuteRequest {
                rows: rows(),
                job: job_json(),
                source_label: Some("a.csv".into()),
            }),
        ));
        tokio::time::sleep(Duration::from_millis(100)).await;

        let read = tokio::time::timeout(
            Duration::from_millis(500),
            recent_history(State(state.clone()), Query(HistoryQuery { limit: None })),
        )
        .await;
        assert!(read.is_ok(), "history read blocked by a running execution");

        let Json(summary) = running.await.unwrap().unwrap();
        assert_eq!((summary.total, summary.failed), (2, 2));

        let Json(records) = recent_history(State(state), Query(HistoryQuery { limit: None }))
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].source_label, "a.csv");
        server.abort();
    }
}
