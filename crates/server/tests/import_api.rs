//! Import session API tests with mocked collaborators.

mod common;

use std::time::Duration;

use axum::http::StatusCode;
use serde_json::{json, Value};
use webimport_core::{LookupError, Recommendation};

use common::{fixtures, TestConfig, TestFixture};

const DIR: &str = "/in/Low/Secret Name";

async fn ambiguous_fixture(config: TestConfig) -> TestFixture {
    let fixture = TestFixture::with_config(config).await;
    fixture
        .lookup
        .set_default(fixtures::proposal(
            vec![fixtures::album_candidate("Low", "Secret Name", 3, 0.2)],
            Recommendation::Ambiguous,
        ))
        .await;
    fixture
}

/// One session with one parked album. Returns (session, task id).
async fn parked_album(fixture: &TestFixture) -> (String, String) {
    let session = fixture
        .start_session(vec![fixtures::album_task(DIR, "Low", "Secret Name", 3)])
        .await;
    let ids = fixture.pending_ids(&session).await;
    assert_eq!(ids.len(), 1);
    (session, ids[0].clone())
}

fn task_url(session: &str, id: &str, command: &str) -> String {
    format!("/api/v1/imports/{}/tasks/{}/{}", session, id, command)
}

// =============================================================================
// Basic API Tests
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let fixture = TestFixture::new().await;
    let response = fixture.get("/api/v1/health").await;
    assert_status!(response, StatusCode::OK);
    assert_json_path!(response.body, "status", json!("ok"));
}

#[tokio::test]
async fn test_config_endpoint_is_sanitized() {
    let fixture = TestFixture::new().await;
    let response = fixture.get("/api/v1/config").await;

    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["server"]["port"], 8337);
    assert_eq!(response.body["import"]["mode"], "copy");
    assert_eq!(response.body["musicbrainz"]["user_agent_configured"], false);
    assert!(response.body["musicbrainz"].get("user_agent").is_none());
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let fixture = TestFixture::new().await;
    fixture.get("/api/v1/health").await;

    let (status, body) = fixture.get_text("/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("webimport_http_requests_total"));
    assert!(body.contains("webimport_library_items"));
}

// =============================================================================
// CORS and reverse proxy
// =============================================================================

const ALLOWED_ORIGIN: &str = "http://localhost:3000";

fn cors_config(credentials: bool) -> TestConfig {
    TestConfig {
        cors: vec![ALLOWED_ORIGIN.to_string()],
        cors_supports_credentials: credentials,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_cors_allows_configured_origin() {
    let fixture = TestFixture::with_config(cors_config(true)).await;
    let response = fixture
        .send("GET", "/api/v1/health", &[("Origin", ALLOWED_ORIGIN)])
        .await;

    assert_status!(response, StatusCode::OK);
    assert_eq!(
        response.headers["access-control-allow-origin"],
        ALLOWED_ORIGIN
    );
    assert_eq!(response.headers["access-control-allow-credentials"], "true");
}

#[tokio::test]
async fn test_cors_preflight_for_configured_origin() {
    let fixture = TestFixture::with_config(cors_config(false)).await;
    let response = fixture
        .send(
            "OPTIONS",
            "/api/v1/imports",
            &[
                ("Origin", ALLOWED_ORIGIN),
                ("Access-Control-Request-Method", "POST"),
                ("Access-Control-Request-Headers", "content-type"),
            ],
        )
        .await;

    assert_status!(response, StatusCode::OK);
    assert_eq!(
        response.headers["access-control-allow-origin"],
        ALLOWED_ORIGIN
    );
    assert!(response
        .headers
        .get("access-control-allow-credentials")
        .is_none());
}

#[tokio::test]
async fn test_cors_rejects_other_origins() {
    let fixture = TestFixture::with_config(cors_config(false)).await;
    let response = fixture
        .send("GET", "/api/v1/health", &[("Origin", "http://evil.example")])
        .await;

    assert_status!(response, StatusCode::OK);
    assert!(response.headers.get("access-control-allow-origin").is_none());
}

#[tokio::test]
async fn test_cors_disabled_by_default() {
    let fixture = TestFixture::new().await;
    let response = fixture
        .send("GET", "/api/v1/health", &[("Origin", ALLOWED_ORIGIN)])
        .await;

    assert_status!(response, StatusCode::OK);
    assert!(response.headers.get("access-control-allow-origin").is_none());
}

#[tokio::test]
async fn test_reverse_proxy_strips_script_name() {
    let fixture = TestFixture::with_config(TestConfig {
        reverse_proxy: true,
        ..Default::default()
    })
    .await;

    let response = fixture
        .send("GET", "/music/api/v1/health", &[("X-Script-Name", "/music")])
        .await;
    assert_status!(response, StatusCode::OK);
    assert_json_path!(response.body, "status", json!("ok"));

    // Direct requests still work behind the proxy setting.
    let response = fixture.get("/api/v1/health").await;
    assert_status!(response, StatusCode::OK);
}

#[tokio::test]
async fn test_script_name_ignored_without_reverse_proxy() {
    let fixture = TestFixture::new().await;
    let response = fixture
        .send("GET", "/music/api/v1/health", &[("X-Script-Name", "/music")])
        .await;
    assert_status!(response, StatusCode::NOT_FOUND);
}

// =============================================================================
// Sessions
// =============================================================================

#[tokio::test]
async fn test_start_import_requires_paths() {
    let fixture = TestFixture::new().await;

    let response = fixture.post("/api/v1/imports", json!({ "paths": [] })).await;
    assert_status!(response, StatusCode::BAD_REQUEST);
    assert!(response.body["error"].is_string());

    let response = fixture.post("/api/v1/imports", json!({})).await;
    assert_status!(response, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_start_import_runs_in_background() {
    let fixture = TestFixture::new().await;
    let missing = tempfile::TempDir::new().unwrap().path().join("nothing-here");

    let response = fixture
        .post("/api/v1/imports", json!({ "paths": [missing] }))
        .await;
    assert_status!(response, StatusCode::ACCEPTED);
    let session = response.body["session"].as_str().unwrap().to_string();

    let mut status = Value::Null;
    for _ in 0..100 {
        status = fixture.get(&format!("/api/v1/imports/{}", session)).await.body;
        if status["state"] == "finished" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(status["state"], "finished");
    assert_eq!(status["session_id"], session.as_str());
    assert_eq!(status["pending_tasks"], 0);
    assert_eq!(status["summary"]["tasks_read"], 0);

    let current = fixture.get("/api/v1/imports").await;
    assert_status!(current, StatusCode::OK);
    assert_eq!(current.body["session_id"], session.as_str());
}

#[tokio::test]
async fn test_no_current_session() {
    let fixture = TestFixture::new().await;
    let response = fixture.get("/api/v1/imports").await;
    assert_status!(response, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unknown_and_superseded_sessions_are_not_found() {
    let fixture = ambiguous_fixture(TestConfig::default()).await;
    let (first, id) = parked_album(&fixture).await;

    let response = fixture.get("/api/v1/imports/not-a-session/tasks").await;
    assert_status!(response, StatusCode::NOT_FOUND);

    fixture.start_session(vec![]).await;
    let response = fixture.get(&format!("/api/v1/imports/{}/tasks/{}", first, id)).await;
    assert_status!(response, StatusCode::NOT_FOUND);
}

// =============================================================================
// Tasks
// =============================================================================

#[tokio::test]
async fn test_list_and_get_pending_tasks() {
    let fixture = ambiguous_fixture(TestConfig::default()).await;
    let (session, id) = parked_album(&fixture).await;

    let response = fixture
        .get(&format!("/api/v1/imports/{}/tasks", session))
        .await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["total"], 1);
    let summary = &response.body["tasks"][0];
    assert_eq!(summary["kind"], "album");
    assert_eq!(summary["cur_artist"], "Low");
    assert_eq!(summary["item_count"], 3);
    assert_eq!(summary["recommendation"], "ambiguous");
    assert_eq!(summary["choice"]["type"], "skip");
    assert_eq!(summary["candidates"]["count"], 1);
    assert_eq!(summary["has_duplicates"], false);
    assert!(summary.get("paths").is_none());

    let response = fixture
        .get(&format!("/api/v1/imports/{}/tasks/{}", session, id))
        .await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["id"], id.as_str());
    assert_eq!(response.body["kind"], "album");
    assert_eq!(response.body["items"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_task_summaries_include_paths_when_configured() {
    let fixture = ambiguous_fixture(TestConfig {
        include_paths: true,
        ..Default::default()
    })
    .await;
    let (session, _) = parked_album(&fixture).await;

    let response = fixture
        .get(&format!("/api/v1/imports/{}/tasks", session))
        .await;
    assert_eq!(
        response.body["tasks"][0]["paths"].as_array().unwrap().len(),
        3
    );
}

#[tokio::test]
async fn test_choose_and_finalize() {
    let fixture = ambiguous_fixture(TestConfig::default()).await;
    let (session, id) = parked_album(&fixture).await;

    let response = fixture
        .put(&task_url(&session, &id, "candidate"), json!({ "index": 0 }))
        .await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["choice"]["type"], "use_candidate");
    assert_eq!(response.body["choice"]["index"], 0);

    let response = fixture.put_empty(&task_url(&session, &id, "finalize")).await;
    assert_status!(response, StatusCode::OK);
    assert_json_path!(response.body, "disposition", json!("committed"));
    assert_eq!(fixture.library.commit_count(), 1);
    assert_eq!(fixture.placer.placement_count().await, 1);

    // Gone, and a second finalize commits nothing.
    let response = fixture.put_empty(&task_url(&session, &id, "finalize")).await;
    assert_status!(response, StatusCode::NOT_FOUND);
    assert_eq!(fixture.library.commit_count(), 1);
}

#[tokio::test]
async fn test_candidate_index_out_of_range() {
    let fixture = ambiguous_fixture(TestConfig::default()).await;
    let (session, id) = parked_album(&fixture).await;

    let response = fixture
        .put(&task_url(&session, &id, "candidate"), json!({ "index": 7 }))
        .await;
    assert_status!(response, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_malformed_body_is_rejected() {
    let fixture = ambiguous_fixture(TestConfig::default()).await;
    let (session, id) = parked_album(&fixture).await;

    let response = fixture
        .put(&task_url(&session, &id, "candidate"), json!({ "index": "first" }))
        .await;
    assert!(response.status.is_client_error());

    let response = fixture
        .put(
            &task_url(&session, &id, "resolve-duplicates"),
            json!({ "action": "explode" }),
        )
        .await;
    assert!(response.status.is_client_error());
    assert_eq!(fixture.pending_ids(&session).await, vec![id]);
}

#[tokio::test]
async fn test_unknown_task_is_not_found() {
    let fixture = ambiguous_fixture(TestConfig::default()).await;
    let (session, _) = parked_album(&fixture).await;

    for command in ["skip", "as-is", "as-tracks", "apply", "finalize"] {
        let response = fixture.put_empty(&task_url(&session, "999", command)).await;
        assert_status!(response, StatusCode::NOT_FOUND);
    }
    assert_eq!(fixture.pending_ids(&session).await.len(), 1);
}

#[tokio::test]
async fn test_task_id_must_match_exactly() {
    let fixture = ambiguous_fixture(TestConfig::default()).await;
    let (session, id) = parked_album(&fixture).await;
    assert_eq!(id, "1");

    for alias in ["01", "+1", "%2B1"] {
        let response = fixture
            .get(&format!("/api/v1/imports/{}/tasks/{}", session, alias))
            .await;
        assert_status!(response, StatusCode::NOT_FOUND);
        let response = fixture.put_empty(&task_url(&session, alias, "skip")).await;
        assert_status!(response, StatusCode::NOT_FOUND);
    }
    assert_eq!(fixture.pending_ids(&session).await, vec![id]);
}

#[tokio::test]
async fn test_skip() {
    let fixture = ambiguous_fixture(TestConfig::default()).await;
    let (session, id) = parked_album(&fixture).await;

    let response = fixture.put_empty(&task_url(&session, &id, "skip")).await;
    assert_status!(response, StatusCode::OK);
    assert_json_path!(response.body, "disposition", json!("skipped"));
    assert!(fixture.pending_ids(&session).await.is_empty());
    assert_eq!(fixture.library.commit_count(), 0);
}

#[tokio::test]
async fn test_apply_without_candidates_conflicts() {
    let fixture = TestFixture::new().await;
    let (session, id) = parked_album(&fixture).await;

    let response = fixture.put_empty(&task_url(&session, &id, "apply")).await;
    assert_status!(response, StatusCode::CONFLICT);
    assert!(response.body["error"]
        .as_str()
        .unwrap()
        .contains("no candidates"));
}

#[tokio::test]
async fn test_as_is() {
    let fixture = ambiguous_fixture(TestConfig::default()).await;
    let (session, id) = parked_album(&fixture).await;

    let response = fixture.put_empty(&task_url(&session, &id, "as-is")).await;
    assert_status!(response, StatusCode::OK);
    assert_json_path!(response.body, "disposition", json!("committed"));
    let committed = &fixture.library.commits()[0];
    assert!(committed.media().unwrap().items[0].mb_trackid.is_none());
}

#[tokio::test]
async fn test_as_tracks() {
    let fixture = ambiguous_fixture(TestConfig::default()).await;
    let (session, id) = parked_album(&fixture).await;

    let response = fixture.put_empty(&task_url(&session, &id, "as-tracks")).await;
    assert_status!(response, StatusCode::OK);
    assert_json_path!(response.body, "disposition", json!("split"));

    let response = fixture
        .get(&format!("/api/v1/imports/{}/tasks", session))
        .await;
    assert_eq!(response.body["total"], 3);
    assert_eq!(response.body["tasks"][0]["kind"], "singleton");
}

// =============================================================================
// Re-search
// =============================================================================

#[tokio::test]
async fn test_search_by_id() {
    let fixture = ambiguous_fixture(TestConfig::default()).await;
    let (session, id) = parked_album(&fixture).await;
    fixture
        .lookup
        .set_id_proposal(
            "mb-secret-name",
            fixtures::proposal(
                vec![
                    fixtures::album_candidate("Low", "Secret Name", 3, 0.01),
                    fixtures::album_candidate("Low", "Secret Name (Live)", 3, 0.2),
                ],
                Recommendation::Strong,
            ),
        )
        .await;

    let response = fixture
        .put(
            &task_url(&session, &id, "search-id"),
            json!({ "ids": ["mb-secret-name"] }),
        )
        .await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["candidates"].as_array().unwrap().len(), 2);
    assert_eq!(response.body["recommendation"], "strong");

    let response = fixture
        .put(&task_url(&session, &id, "search-id"), json!({ "ids": [" "] }))
        .await;
    assert_status!(response, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_search_by_name_lookup_failure() {
    let fixture = ambiguous_fixture(TestConfig::default()).await;
    let (session, id) = parked_album(&fixture).await;
    fixture.lookup.set_next_error(LookupError::RateLimited).await;

    let response = fixture
        .put(
            &task_url(&session, &id, "search-name"),
            json!({ "artist": "Low", "title": "Secret Name" }),
        )
        .await;
    assert_status!(response, StatusCode::BAD_GATEWAY);

    let response = fixture
        .get(&format!("/api/v1/imports/{}/tasks/{}", session, id))
        .await;
    assert_eq!(response.body["candidates"].as_array().unwrap().len(), 1);
}

// =============================================================================
// Duplicates
// =============================================================================

#[tokio::test]
async fn test_duplicate_flow() {
    let fixture = ambiguous_fixture(TestConfig::default()).await;
    fixture.library.seed(fixtures::album_items(
        "/lib/Low/Secret Name",
        "Low",
        "Secret Name",
        2,
    ));
    let (session, id) = parked_album(&fixture).await;

    let response = fixture
        .put_empty(&task_url(&session, &id, "check-duplicates"))
        .await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["resolved"], false);
    assert_eq!(
        response.body["task"]["duplicates"].as_array().unwrap().len(),
        2
    );

    // apply stops at the duplicate question.
    let response = fixture.put_empty(&task_url(&session, &id, "apply")).await;
    assert_json_path!(response.body, "disposition", json!("pending"));

    let response = fixture
        .put(
            &task_url(&session, &id, "resolve-duplicates"),
            json!({ "action": "remove" }),
        )
        .await;
    assert_status!(response, StatusCode::OK);
    assert_json_path!(response.body, "disposition", json!("committed"));
    assert_eq!(fixture.library.items().len(), 3);
}

#[tokio::test]
async fn test_merge_via_resolve_duplicates() {
    let fixture = ambiguous_fixture(TestConfig::default()).await;
    fixture.library.seed(fixtures::album_items(
        "/lib/Low/Secret Name",
        "Low",
        "Secret Name",
        2,
    ));
    let (session, id) = parked_album(&fixture).await;

    let response = fixture
        .put(
            &task_url(&session, &id, "resolve-duplicates"),
            json!({ "action": "merge" }),
        )
        .await;
    assert_status!(response, StatusCode::OK);
    assert_json_path!(response.body, "disposition", json!("merged"));

    let status = fixture.get(&format!("/api/v1/imports/{}", session)).await;
    assert_eq!(status.body["merged_paths"], 2);
    let pending = fixture.pending_ids(&session).await;
    assert_eq!(pending.len(), 1);
    assert_ne!(pending[0], id);
}

// =============================================================================
// Events
// =============================================================================

#[tokio::test]
async fn test_events_endpoint() {
    let fixture = ambiguous_fixture(TestConfig::default()).await;
    let (session, id) = parked_album(&fixture).await;
    fixture.put_empty(&task_url(&session, &id, "skip")).await;

    let url = format!("/api/v1/events?session_id={}", session);
    let mut response = fixture.get(&url).await;
    for _ in 0..100 {
        if response.body["total"].as_i64().unwrap_or(0) >= 4 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        response = fixture.get(&url).await;
    }

    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["total"], 4);
    assert_eq!(response.body["events"][0]["event_type"], "task_skipped");
    assert_eq!(response.body["events"][0]["data"]["reason"], "operator");

    let response = fixture
        .get(&format!("{}&event_type=task_registered&limit=1", url))
        .await;
    assert_eq!(response.body["total"], 1);
    assert_eq!(response.body["limit"], 1);
    assert_eq!(response.body["events"][0]["task_id"], id.as_str());
}
