//! Shared test utilities for integration tests.
//!
//! `TestClient` drives the full router against a ledger stored in a fresh
//! temporary directory (or an in-memory SQLite database). Methods are
//! intentionally broad to support various test scenarios across test files.

#![allow(dead_code)]

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use reftrack::config::{Config, StorageBackend, DEFAULT_MAX_UPLOAD_BYTES};
use reftrack::db::{create_in_memory_pool, migrations, CsvFileStore, LedgerStore, SqliteStore};
use reftrack::server;
use reftrack::services::ledger::{Ledger, LoadPolicy};
use reftrack::state::AppState;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "reftrack-test-boundary";

pub struct TestClient {
    state: AppState,
    dir: TempDir,
}

impl TestClient {
    /// A client over an empty CSV ledger in a temporary directory.
    pub fn new() -> Self {
        Self::with_policy(LoadPolicy::Lenient)
    }

    pub fn with_policy(policy: LoadPolicy) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("referrals.csv");
        let store = CsvFileStore::new(&path);
        Self::build(dir, Box::new(store), path, StorageBackend::Csv, policy)
    }

    /// A client whose CSV ledger starts with `content`.
    pub fn with_ledger_file(content: &str, policy: LoadPolicy) -> Self {
        let client = Self::with_policy(policy);
        std::fs::write(client.ledger_path(), content).expect("Failed to seed ledger");
        client
    }

    /// A client over an in-memory SQLite ledger.
    pub fn sqlite() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let pool = create_in_memory_pool().expect("Failed to create in-memory pool");
        {
            let mut conn = pool.get().expect("Failed to get connection");
            migrations::run_migrations(&mut conn, Path::new("migrations"))
                .expect("Failed to run migrations");
        }
        let store = SqliteStore::new(pool, ":memory:");
        Self::build(
            dir,
            Box::new(store),
            PathBuf::from(":memory:"),
            StorageBackend::Sqlite,
            LoadPolicy::Lenient,
        )
    }

    fn build(
        dir: TempDir,
        store: Box<dyn LedgerStore>,
        ledger_path: PathBuf,
        storage: StorageBackend,
        load_policy: LoadPolicy,
    ) -> Self {
        let config = Config {
            host: "127.0.0.1".into(),
            port: 7070,
            ledger_path,
            storage,
            migrations_path: PathBuf::from("migrations"),
            load_policy,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        };

        let state = AppState {
            ledger: Arc::new(Ledger::new(store, load_policy)),
            config: Arc::new(config),
        };

        Self { state, dir }
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.dir.path().join("referrals.csv")
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn router(&self) -> Router {
        server::router(self.state.clone())
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, String) {
        let response = self.router().oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8_lossy(&body).to_string())
    }

    /// Make a GET request and return status and body.
    pub async fn get(&self, uri: &str) -> (StatusCode, String) {
        self.send(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
    }

    /// Get JSON from an endpoint and parse it.
    pub async fn get_json(&self, uri: &str) -> (StatusCode, Value) {
        let (status, body) = self.get(uri).await;
        (status, parse(&body))
    }

    pub async fn post_json(&self, uri: &str, payload: &Value) -> (StatusCode, Value) {
        let (status, body) = self
            .send(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("Content-Type", "application/json")
                    .body(Body::from(payload.to_string()))
                    .unwrap(),
            )
            .await;
        (status, parse(&body))
    }

    pub async fn delete(&self, uri: &str) -> (StatusCode, Value) {
        let (status, body) = self
            .send(
                Request::builder()
                    .method("DELETE")
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        (status, parse(&body))
    }

    /// POST a multipart form with one file field named `file` plus text fields.
    pub async fn post_upload(
        &self,
        uri: &str,
        file_name: &str,
        content: &[u8],
        fields: &[(&str, &str)],
    ) -> (StatusCode, Value) {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        let (status, body) = self
            .send(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header(
                        "Content-Type",
                        format!("multipart/form-data; boundary={BOUNDARY}"),
                    )
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await;
        (status, parse(&body))
    }

    // =========================================================================
    // Helpers for putting rows into the ledger through the API
    // =========================================================================

    /// Append `(person, source, month)` rows as one batch and return its id.
    pub async fn append_rows(&self, rows: &[(&str, &str, &str)]) -> String {
        let payload = json!({
            "columns": ["Name", "Source", "Month"],
            "rows": rows
                .iter()
                .map(|(p, s, m)| json!([p, s, m]))
                .collect::<Vec<_>>(),
            "mapping": {
                "person_column": "Name",
                "source_column": "Source",
                "month_mode": "column",
                "month_column": "Month"
            }
        });
        let (status, body) = self.post_json("/api/ledger/append", &payload).await;
        assert_eq!(status, StatusCode::OK, "append failed: {body}");
        body["batch_id"].as_str().unwrap().to_string()
    }

    pub async fn ledger_rows(&self) -> Vec<Value> {
        let (status, body) = self.get_json("/api/ledger").await;
        assert_eq!(status, StatusCode::OK);
        body["rows"].as_array().cloned().unwrap_or_default()
    }
}

fn parse(body: &str) -> Value {
    serde_json::from_str(body).unwrap_or(Value::String(body.to_string()))
}
