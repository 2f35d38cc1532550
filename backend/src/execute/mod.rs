//! Execution loop: submit one UPDATE per row, continue on error, record
//! the outcome in the history store.
//!
//! Rows are submitted strictly in order; the next submission starts only
//! after the previous one resolved. A failing row never aborts the pass
//! and is never retried.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sheetload::execute::{execute, HttpEndpoint};
//! use sheetload::history::JsonHistoryStore;
//!
//! let endpoint = HttpEndpoint::from_settings(&settings)?;
//! let mut history = JsonHistoryStore::with_dir(&settings.history_dir);
//! let summary = execute(&endpoint, &mut history, &job, &sheet.rows, "clientes.csv").await?;
//! println!("{} ok, {} failed", summary.succeeded, summary.failed);
//! ```

use serde::Deserialize;
use std::future::Future;
use std::time::Duration;

use crate::api::logs::{log_error, log_info, log_success, log_warning, log_warning_indent};
use crate::compile::StatementPlan;
use crate::config::{JobConfig, Settings};
use crate::error::{ConfigError, ConfigResult, EndpointError};
use crate::history::{HistoryStore, OperationRecord};
use crate::models::{OperationSummary, OperationType, Row, RowFailure};

/// Failure message for rows whose key cell is empty.
pub const MSG_EMPTY_KEY: &str = "key value is empty";

/// RPC path appended to the endpoint base URL.
const RPC_PATH: &str = "/rest/v1/rpc/execute_sql";

/// Something that runs one SQL statement.
pub trait StatementEndpoint {
    fn submit(&self, sql: &str) -> impl Future<Output = Result<(), EndpointError>> + Send;
}

/// Run every row of an UPDATE job against `endpoint`.
///
/// Configuration problems fail before any submission. Per-row failures
/// end up in the returned summary.
pub async fn execute<E, H>(
    endpoint: &E,
    history: &mut H,
    job: &JobConfig,
    rows: &[Row],
    source_label: &str,
) -> ConfigResult<OperationSummary>
where
    E: StatementEndpoint,
    H: HistoryStore + ?Sized,
{
    if job.operation != OperationType::Update {
        return Err(ConfigError::UnsupportedOperation);
    }
    let plan = StatementPlan::new(job)?;

    log_info(format!(
        "Executing {} row(s) against table {}...",
        rows.len(),
        job.table
    ));

    let mut summary = OperationSummary {
        total: rows.len(),
        ..Default::default()
    };

    for (row_index, row) in rows.iter().enumerate() {
        let outcome = match plan.statement_for_row(row, row_index)? {
            Some(sql) => endpoint.submit(&sql).await.map_err(|e| e.to_string()),
            None => Err(MSG_EMPTY_KEY.to_string()),
        };

        match outcome {
            Ok(()) => summary.succeeded += 1,
            Err(message) => {
                log_warning_indent(format!("Row {}: {}", row_index + 2, message), 1);
                summary.failed += 1;
                summary.errors.push(RowFailure { row_index, message });
            }
        }
    }

    if summary.is_success() {
        log_success(format!("{} row(s) updated", summary.succeeded));
    } else {
        log_warning(format!(
            "{} row(s) updated, {} failed",
            summary.succeeded, summary.failed
        ));
    }

    let record = OperationRecord::from_summary(
        &summary,
        job.operation,
        &job.table,
        source_label,
        &job.mappings,
    );
    if let Err(e) = history.append(record) {
        log_error(format!("Failed to record operation history: {}", e));
    }

    Ok(summary)
}

// =============================================================================
// HTTP endpoint
// =============================================================================

/// Submits statements to a PostgREST-style `execute_sql` RPC.
#[derive(Clone)]
pub struct HttpEndpoint {
    client: reqwest::Client,
    url: String,
    api_key: String,
}

/// Error body returned by the endpoint
#[derive(Debug, Deserialize)]
struct RejectionBody {
    message: String,
}

impl HttpEndpoint {
    /// Create an endpoint for a base URL such as `https://db.example.com`.
    ///
    /// A submission that takes longer than `timeout` fails as
    /// [`EndpointError::Request`].
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, EndpointError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EndpointError::NotConfigured(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: format!("{}{}", base_url.trim_end_matches('/'), RPC_PATH),
            api_key: api_key.into(),
        })
    }

    /// Create from runtime settings. Both URL and key are required.
    pub fn from_settings(settings: &Settings) -> Result<Self, EndpointError> {
        let url = settings.endpoint_url.as_deref().ok_or_else(|| {
            EndpointError::NotConfigured("SHEETLOAD_ENDPOINT_URL not set".to_string())
        })?;
        let key = settings.endpoint_key.as_deref().ok_or_else(|| {
            EndpointError::NotConfigured("SHEETLOAD_ENDPOINT_KEY not set".to_string())
        })?;
        Self::new(url, key, settings.request_timeout)
    }

    /// Full RPC URL
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl StatementEndpoint for HttpEndpoint {
    async fn submit(&self, sql: &str) -> Result<(), EndpointError> {
        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({ "query": sql }))
            .send()
            .await
            .map_err(|e| EndpointError::Request(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response
            .text()
            .await
            .map_err(|e| EndpointError::Request(e.to_string()))?;
        Err(EndpointError::Rejected(rejection_message(status.as_u16(), &body)))
    }
}

/// Best message for a non-2xx response: the JSON `message` field, the raw
/// body, or the status code.
fn rejection_message(status: u16, body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<RejectionBody>(body) {
        return parsed.message;
    }
    let body = body.trim();
    if body.is_empty() {
        format!("HTTP {}", status)
    } else {
        body.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::MemoryHistory;
    use crate::models::{CellValue, FixedColumn};
    use std::sync::Mutex;

    /// Records submissions; fails statements containing a marker.
    struct ScriptedEndpoint {
        fail_marker: Option<&'static str>,
        submitted: Mutex<Vec<String>>,
    }

    impl ScriptedEndpoint {
        fn new(fail_marker: Option<&'static str>) -> Self {
            Self {
                fail_marker,
                submitted: Mutex::new(Vec::new()),
            }
        }

        fn submitted(&self) -> Vec<String> {
            self.submitted.lock().unwrap().clone()
        }
    }

    impl StatementEndpoint for ScriptedEndpoint {
        async fn submit(&self, sql: &str) -> Result<(), EndpointError> {
            self.submitted.lock().unwrap().push(sql.to_string());
            match self.fail_marker {
                Some(marker) if sql.contains(marker) => {
                    Err(EndpointError::Rejected("constraint violated".into()))
                }
                _ => Ok(()),
            }
        }
    }

    struct BrokenHistory;

    impl HistoryStore for BrokenHistory {
        fn append(&mut self, _record: OperationRecord) -> crate::error::HistoryResult<()> {
            Err(std::io::Error::other("disk full").into())
        }

        fn recent(&self, _limit: usize) -> crate::error::HistoryResult<Vec<OperationRecord>> {
            Ok(Vec::new())
        }
    }

    fn rows(keys: &[&str]) -> Vec<Row> {
        keys.iter()
            .map(|k| {
                [
                    ("id".to_string(), CellValue::from(*k)),
                    ("status".to_string(), CellValue::from("ok")),
                ]
                .into_iter()
                .collect()
            })
            .collect()
    }

    fn job() -> JobConfig {
        let mut job = JobConfig::for_columns("clientes", OperationType::Update, &["id", "status"]);
        job.mappings.set_key("id").unwrap();
        job
    }

    #[tokio::test]
    async fn test_continues_after_failure() {
        let endpoint = ScriptedEndpoint::new(Some("'k3'"));
        let mut history = MemoryHistory::new();
        let rows = rows(&["k1", "k2", "k3", "k4", "k5"]);

        let summary = execute(&endpoint, &mut history, &job(), &rows, "clientes.csv")
            .await
            .unwrap();

        assert_eq!((summary.total, summary.succeeded, summary.failed), (5, 4, 1));
        assert_eq!(summary.errors.len(), 1);
        assert_eq!(summary.errors[0].row_index, 2);
        assert_eq!(summary.errors[0].message, "constraint violated");

        let submitted = endpoint.submitted();
        assert_eq!(submitted.len(), 5);
        assert!(submitted[3].contains("'k4'"));
        assert!(submitted[4].contains("'k5'"));

        let records = history.recent(10).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].failed, 1);
        assert_eq!(records[0].source_label, "clientes.csv");
    }

    #[tokio::test]
    async fn test_empty_key_fails_without_round_trip() {
        let endpoint = ScriptedEndpoint::new(None);
        let mut history = MemoryHistory::new();
        let rows = rows(&["k1", "", "k3"]);

        let summary = execute(&endpoint, &mut history, &job(), &rows, "x.csv")
            .await
            .unwrap();

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.errors[0].row_index, 1);
        assert_eq!(summary.errors[0].message, MSG_EMPTY_KEY);
        assert_eq!(endpoint.submitted().len(), 2);
    }

    #[tokio::test]
    async fn test_submitted_sql_matches_compiled_script() {
        let endpoint = ScriptedEndpoint::new(None);
        let mut history = MemoryHistory::new();
        let mut job = job();
        job.fixed_columns.push(FixedColumn::new("updated_by", "import"));
        let rows = rows(&["k1", "k2"]);

        execute(&endpoint, &mut history, &job, &rows, "x.csv").await.unwrap();

        let script = crate::compile::compile(&rows, &job).unwrap();
        assert_eq!(endpoint.submitted(), script.statements);
        assert!(history.recent(1).unwrap()[0].errors.is_none());
    }

    #[tokio::test]
    async fn test_preconditions() {
        let endpoint = ScriptedEndpoint::new(None);
        let mut history = MemoryHistory::new();
        let rows = rows(&["k1"]);

        let mut insert = job();
        insert.operation = OperationType::Insert;
        let err = execute(&endpoint, &mut history, &insert, &rows, "x").await;
        assert_eq!(err, Err(ConfigError::UnsupportedOperation));

        let mut no_key = job();
        no_key.mappings.clear_key();
        let err = execute(&endpoint, &mut history, &no_key, &rows, "x").await;
        assert_eq!(err, Err(ConfigError::MissingKeyColumn));

        let mut no_table = job();
        no_table.table = String::new();
        let err = execute(&endpoint, &mut history, &no_table, &rows, "x").await;
        assert_eq!(err, Err(ConfigError::EmptyTableName));

        assert!(endpoint.submitted().is_empty());
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn test_history_failure_still_returns_summary() {
        let endpoint = ScriptedEndpoint::new(None);
        let mut history = BrokenHistory;
        let summary = execute(&endpoint, &mut history, &job(), &rows(&["k1"]), "x")
            .await
            .unwrap();
        assert!(summary.is_success());
    }

    #[test]
    fn test_rejection_message() {
        assert_eq!(
            rejection_message(400, r#"{"message":"syntax error at or near \"SET\"","code":"42601"}"#),
            "syntax error at or near \"SET\""
        );
        assert_eq!(rejection_message(502, "Bad Gateway"), "Bad Gateway");
        assert_eq!(rejection_message(500, "  "), "HTTP 500");
    }

    #[test]
    fn test_endpoint_url_and_settings() {
        let endpoint =
            HttpEndpoint::new("https://db.example.com/", "key", Duration::from_secs(1)).unwrap();
        assert_eq!(endpoint.url(), "https://db.example.com/rest/v1/rpc/execute_sql");

        let settings = Settings {
            endpoint_url: Some("https://db.example.com".into()),
            ..Settings::default()
        };
        assert!(matches!(
            HttpEndpoint::from_settings(&settings),
            Err(EndpointError::NotConfigured(_))
        ));
    }

    /// Base URL of a local port nothing listens on.
    fn closed_port_url() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        format!("http://127.0.0.1:{}", port)
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_fails_each_row() {
        let endpoint =
            HttpEndpoint::new(&closed_port_url(), "key", Duration::from_secs(5)).unwrap();
        let mut history = MemoryHistory::new();
        let rows = rows(&["k1", "k2"]);

        let summary = execute(&endpoint, &mut history, &job(), &rows, "x.csv")
            .await
            .unwrap();

        assert_eq!((summary.total, summary.succeeded, summary.failed), (2, 0, 2));
        let failed_rows: Vec<_> = summary.errors.iter().map(|f| f.row_index).collect();
        assert_eq!(failed_rows, vec![0, 1]);
        assert!(summary.errors[0].message.starts_with("HTTP request failed"));
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn test_silent_endpoint_times_out_per_row() {
        // accepts connections, never answers
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let mut open = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                open.push(socket);
            }
        });

        let endpoint =
            HttpEndpoint::new(&format!("http://{}", addr), "key", Duration::from_millis(200))
                .unwrap();
        let mut history = MemoryHistory::new();
        let rows = rows(&["k1", "k2"]);

        let summary = tokio::time::timeout(
            Duration::from_secs(10),
            execute(&endpoint, &mut history, &job(), &rows, "x.csv"),
        )
        .await
        .expect("execution stalled")
        .unwrap();

        assert_eq!(summary.failed, 2);
        assert_eq!(summary.errors[1].row_index, 1);
        server.abort();
    }
}
