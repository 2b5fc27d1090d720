//! Common test utilities for API testing with mocks.
//!
//! This module provides a test fixture that creates an in-process router
//! with mock collaborators injected, so import sessions can be driven over
//! HTTP without MusicBrainz, a library database or a music directory.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use futures::stream::{self, StreamExt};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use webimport_core::{
    create_event_system, Config, ImportServices, ImportTask, SessionManager, SessionOptions,
    SqliteEventStore,
    testing::{MockLibrary, MockLookup, MockPlacer},
};
use webimport_server::state::AppState;

/// Re-export fixtures for test convenience
pub use webimport_core::testing::fixtures;

/// Test fixture for API testing with mock dependencies.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_list_tasks() {
///     let fixture = TestFixture::new().await;
///     let session = fixture.start_session(vec![fixtures::album_task(..)]).await;
///
///     let response = fixture.get(&format!("/api/v1/imports/{}/tasks", session)).await;
///     assert_eq!(response.status, 200);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    pub state: Arc<AppState>,
    /// Mock lookup - configure proposals
    pub lookup: Arc<MockLookup>,
    /// Mock library - seed items, inspect commits
    pub library: Arc<MockLibrary>,
    /// Mock placer - inspect placements
    pub placer: Arc<MockPlacer>,
    pub event_store: Arc<SqliteEventStore>,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestFixture {
    /// Create a new test fixture with default mocks.
    pub async fn new() -> Self {
        Self::with_config(TestConfig::default()).await
    }

    /// Create a test fixture with custom configuration.
    pub async fn with_config(test_config: TestConfig) -> Self {
        let lookup = Arc::new(MockLookup::new());
        let library = Arc::new(MockLibrary::new());
        let placer = Arc::new(MockPlacer::new());

        let mut config = Config::default();
        config.server.include_paths = test_config.include_paths;
        config.import.quiet = test_config.quiet;
        config.server.cors = test_config.cors;
        config.server.cors_supports_credentials = test_config.cors_supports_credentials;
        config.server.reverse_proxy = test_config.reverse_proxy;

        let event_store =
            Arc::new(SqliteEventStore::in_memory().expect("Failed to create event store"));
        let (events, event_writer) = create_event_system(event_store.clone(), 100);
        tokio::spawn(event_writer.run());

        let services = ImportServices::new(lookup.clone(), library.clone(), placer.clone())
            .with_events(events);
        let sessions =
            SessionManager::new(services, SessionOptions::from_config(&config).sequential());

        let state = Arc::new(AppState::new(
            config,
            sessions,
            library.clone(),
            event_store.clone(),
        ));
        let router = webimport_server::api::create_router(Arc::clone(&state));

        Self {
            router,
            state,
            lookup,
            library,
            placer,
            event_store,
        }
    }

    /// Start a session over `tasks`, wait for its initial run and return
    /// its handle.
    pub async fn start_session(&self, tasks: Vec<ImportTask>) -> String {
        let handle = self
            .state
            .sessions()
            .start_import_from(vec![PathBuf::from("/in")], stream::iter(tasks).boxed());
        let session = self
            .state
            .sessions()
            .session(handle.as_str())
            .expect("Session was not installed");
        session.wait().await;
        handle.as_str().to_string()
    }

    /// Ids of the tasks pending in `session`, in registration order.
    pub async fn pending_ids(&self, session: &str) -> Vec<String> {
        let response = self.get(&format!("/api/v1/imports/{}/tasks", session)).await;
        response.body["tasks"]
            .as_array()
            .map(|tasks| {
                tasks
                    .iter()
                    .filter_map(|t| t["id"].as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a PUT request with JSON body.
    pub async fn put(&self, path: &str, body: Value) -> TestResponse {
        self.request("PUT", path, Some(body)).await
    }

    /// Send a PUT request without a body.
    pub async fn put_empty(&self, path: &str) -> TestResponse {
        self.request("PUT", path, None).await
    }

    /// Send a request with extra headers and no body.
    pub async fn send(&self, method: &str, path: &str, headers: &[(&str, &str)]) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);
        for (name, value) in headers {
            request_builder = request_builder.header(*name, *value);
        }
        self.dispatch(request_builder.body(Body::empty()).unwrap())
            .await
    }

    /// Send a GET request and return the raw body as text.
    pub async fn get_text(&self, path: &str) -> (StatusCode, String) {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .unwrap();
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Send a request to the test server.
    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        let request = request_builder.body(body).unwrap();
        self.dispatch(request).await
    }

    async fn dispatch(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let headers = response.headers().clone();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse {
            status,
            headers,
            body,
        }
    }
}

/// Configuration for test fixture.
#[derive(Debug, Clone, Default)]
pub struct TestConfig {
    /// Include source paths in task summaries
    pub include_paths: bool,
    /// Skip tasks with duplicates instead of asking
    pub quiet: bool,
    /// Allowed cross-origin request origins
    pub cors: Vec<String>,
    pub cors_supports_credentials: bool,
    /// Strip the `X-Script-Name` prefix before routing
    pub reverse_proxy: bool,
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
