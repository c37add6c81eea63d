//! Common test utilities for in-process API testing.
//!
//! This module provides a test fixture that builds the full router over a
//! temporary database, with the analyzer injected so triage outcomes are
//! deterministic.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use triage_core::{
    analysis::MockAnalyzer, load_config_from_str, Analyzer, Authenticator, EventBus,
    LiveUpdateGateway, NoneAuthenticator, QueueConfig, SqliteJobStore, SqliteTicketStore,
    TicketService, TicketStore, TriageQueue, TriageWorkerPool, WorkerConfig,
};
use triage_server::state::AppState;

/// Re-export fixtures for test convenience
pub use triage_core::testing::fixtures;

/// Who a request is sent as (development-mode identity headers).
#[derive(Debug, Clone)]
pub struct Caller {
    pub user_id: String,
    pub role: &'static str,
}

pub fn agent() -> Caller {
    Caller {
        user_id: "agent-1".to_string(),
        role: "agent",
    }
}

pub fn customer(user_id: &str) -> Caller {
    Caller {
        user_id: user_id.to_string(),
        role: "customer",
    }
}

/// Test fixture for API testing.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_ticket_creation() {
///     let fixture = TestFixture::new().await;
///
///     let response = fixture.post(&customer("c1"), "/api/v1/tickets", json!({
///         "title": "Charged twice",
///         "description": "My card was billed two times."
///     })).await;
///
///     assert_eq!(response.status, 201);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    pub state: Arc<AppState>,
    pub worker_pool: Option<Arc<TriageWorkerPool>>,
    /// Temporary directory for the test database
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

/// Configuration for test fixture.
pub struct TestConfig {
    /// Start the triage worker pool
    pub enable_worker: bool,
    /// Analyzer used by the worker
    pub analyzer: Arc<dyn Analyzer>,
    /// Override the authenticator (defaults to header identities)
    pub authenticator: Option<Arc<dyn Authenticator>>,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            enable_worker: false,
            analyzer: Arc::new(MockAnalyzer::new()),
            authenticator: None,
        }
    }
}

impl TestConfig {
    /// Worker enabled with the deterministic mock analyzer.
    pub fn with_worker() -> Self {
        Self {
            enable_worker: true,
            ..Default::default()
        }
    }

    /// Worker enabled with a custom analyzer.
    pub fn with_analyzer(analyzer: Arc<dyn Analyzer>) -> Self {
        Self {
            enable_worker: true,
            analyzer,
            authenticator: None,
        }
    }
}

impl TestFixture {
    /// Create a new test fixture without a worker.
    pub async fn new() -> Self {
        Self::with_config(TestConfig::default()).await
    }

    /// Create a test fixture with custom configuration.
    pub async fn with_config(test_config: TestConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");

        let mut config =
            load_config_from_str("[auth]\nmethod = \"none\"\n").expect("Failed to parse config");
        config.database.path = db_path.clone();
        config.queue = QueueConfig {
            backoff_base_ms: 20,
            poll_interval_ms: 20,
            ..Default::default()
        };
        config.worker = WorkerConfig {
            enabled: test_config.enable_worker,
            rate_limit_max: 1000,
            analysis_timeout_ms: 500,
            shutdown_grace_ms: 1000,
            ..Default::default()
        };

        let ticket_store: Arc<dyn TicketStore> = Arc::new(
            SqliteTicketStore::new(&db_path).expect("Failed to create ticket store"),
        );
        let job_store =
            Arc::new(SqliteJobStore::new(&db_path).expect("Failed to create job store"));
        let queue = Arc::new(TriageQueue::new(job_store, &config.queue));
        let bus = Arc::new(EventBus::new(64));
        let gateway = Arc::new(LiveUpdateGateway::new(Arc::clone(&bus), 16));
        let service = Arc::new(TicketService::new(
            Arc::clone(&ticket_store),
            Arc::clone(&queue),
            Arc::clone(&bus),
        ));

        let worker_pool = if test_config.enable_worker {
            let pool = Arc::new(TriageWorkerPool::new(
                config.worker.clone(),
                Arc::clone(&ticket_store),
                Arc::clone(&queue),
                test_config.analyzer,
                Arc::clone(&bus),
            ));
            pool.start().await;
            Some(pool)
        } else {
            None
        };

        let authenticator = test_config
            .authenticator
            .unwrap_or_else(|| Arc::new(NoneAuthenticator::new()));

        let state = Arc::new(AppState::new(
            config,
            authenticator,
            service,
            queue,
            gateway,
            worker_pool.clone(),
        ));

        let router = triage_server::api::create_router(Arc::clone(&state));

        Self {
            router,
            state,
            worker_pool,
            temp_dir,
        }
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, caller: &Caller, path: &str) -> TestResponse {
        self.request(Some(caller), "GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, caller: &Caller, path: &str, body: Value) -> TestResponse {
        self.request(Some(caller), "POST", path, Some(body)).await
    }

    /// Send a POST request without a body.
    pub async fn post_empty(&self, caller: &Caller, path: &str) -> TestResponse {
        self.request(Some(caller), "POST", path, None).await
    }

    /// Send a PATCH request with JSON body.
    pub async fn patch(&self, caller: &Caller, path: &str, body: Value) -> TestResponse {
        self.request(Some(caller), "PATCH", path, Some(body)).await
    }

    /// Send a GET request without identity headers.
    pub async fn get_anonymous(&self, path: &str) -> TestResponse {
        self.request(None, "GET", path, None).await
    }

    /// Send a request with arbitrary extra headers.
    pub async fn get_with_headers(&self, path: &str, headers: &[(&str, &str)]) -> TestResponse {
        let mut builder = Request::builder().method("GET").uri(path);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    /// Send a POST request with raw string body (for testing malformed JSON).
    pub async fn post_raw(&self, caller: &Caller, path: &str, body: &str) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header("Content-Type", "application/json")
            .header("X-User-Id", &caller.user_id)
            .header("X-User-Role", caller.role)
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    /// Submit a valid ticket as `caller` and return its id.
    pub async fn submit(&self, caller: &Caller, title: &str, description: &str) -> String {
        let response = self
            .post(
                caller,
                "/api/v1/tickets",
                serde_json::json!({ "title": title, "description": description }),
            )
            .await;
        assert_eq!(
            response.status,
            StatusCode::CREATED,
            "submit failed: {}",
            response.body
        );
        response.body["id"].as_str().unwrap().to_string()
    }

    /// Poll a ticket as an agent until it reaches `status`.
    pub async fn wait_for_status(&self, ticket_id: &str, status: &str) -> Value {
        let path = format!("/api/v1/tickets/{}", ticket_id);
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);

        loop {
            let response = self.get(&agent(), &path).await;
            if response.body["status"] == status {
                return response.body;
            }
            if tokio::time::Instant::now() > deadline {
                panic!(
                    "ticket {} never reached {}; last seen {}",
                    ticket_id, status, response.body
                );
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    /// Stop the worker pool, if one was started.
    pub async fn shutdown(&self) {
        if let Some(pool) = &self.worker_pool {
            pool.stop().await;
        }
    }

    /// Send a request to the test server.
    async fn request(
        &self,
        caller: Option<&Caller>,
        method: &str,
        path: &str,
        body: Option<Value>,
    ) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        if let Some(caller) = caller {
            request_builder = request_builder
                .header("X-User-Id", &caller.user_id)
                .header("X-User-Role", caller.role);
        }

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        self.send(request_builder.body(body).unwrap()).await
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&body_bytes).into()))
        };

        TestResponse { status, body }
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}

/// Helper to assert a JSON path equals expected value.
#[macro_export]
macro_rules! assert_json_path {
    ($json:expr, $path:expr, $expected:expr) => {
        let actual = &$json[$path];
        assert_eq!(
            actual, &$expected,
            "Path '{}' expected {:?}, got {:?}",
            $path, $expected, actual
        );
    };
}
