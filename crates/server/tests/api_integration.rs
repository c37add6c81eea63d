//! API integration tests.
//!
//! Requests go through the full router (auth, metrics, handlers) over a
//! temporary SQLite database. Tests that need triage start the real worker
//! pool with a deterministic analyzer.

mod common;

use std::sync::Arc;

use axum::http::StatusCode;
use serde_json::{json, Value};

use common::{agent, customer, TestConfig, TestFixture};
use triage_core::config::ApiToken;
use triage_core::testing::{Script, ScriptedAnalyzer};
use triage_core::{AnalysisError, ApiKeyAuthenticator, Role};

// =============================================================================
// Health, config, metrics
// =============================================================================

#[tokio::test]
async fn test_health_is_public() {
    let fixture = TestFixture::new().await;

    let response = fixture.get_anonymous("/api/v1/health").await;

    assert_status!(response, StatusCode::OK);
    assert_json_path!(response.body, "status", json!("ok"));
    assert_json_path!(response.body, "worker_running", json!(false));
}

#[tokio::test]
async fn test_config_is_sanitized() {
    let fixture = TestFixture::new().await;

    let response = fixture.get(&agent(), "/api/v1/config").await;

    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["auth"]["method"], "none");
    assert_eq!(response.body["ai"]["provider"], "mock");
    assert_eq!(response.body["ai"]["api_key_configured"], false);
    assert!(response.body["ai"].get("api_key").is_none());
}

#[tokio::test]
async fn test_metrics_endpoint_reports_ticket_gauges() {
    let fixture = TestFixture::new().await;
    fixture
        .submit(&customer("customer-1"), "Charged twice", "My card was billed two times.")
        .await;

    let response = fixture.get_anonymous("/api/v1/metrics").await;

    assert_status!(response, StatusCode::OK);
    let text = response.body.as_str().unwrap();
    assert!(text.contains("triage_tickets_by_status"));
    assert!(text.contains("triage_queue_jobs"));
    assert!(text.contains("triage_http_requests_total"));
}

// =============================================================================
// Authentication
// =============================================================================

#[tokio::test]
async fn test_unknown_role_header_is_rejected() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .get_with_headers("/api/v1/tickets", &[("X-User-Role", "admin")])
        .await;

    assert_status!(response, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_api_key_auth_requires_token() {
    let authenticator = Arc::new(ApiKeyAuthenticator::new(vec![ApiToken {
        token: "agent-token".to_string(),
        user_id: "agent-9".to_string(),
        role: Role::Agent,
    }]));
    let fixture = TestFixture::with_config(TestConfig {
        authenticator: Some(authenticator),
        ..Default::default()
    })
    .await;

    let missing = fixture.get_anonymous("/api/v1/tickets").await;
    assert_status!(missing, StatusCode::UNAUTHORIZED);

    let wrong = fixture
        .get_with_headers("/api/v1/tickets", &[("Authorization", "Bearer nope")])
        .await;
    assert_status!(wrong, StatusCode::UNAUTHORIZED);

    let ok = fixture
        .get_with_headers("/api/v1/jobs", &[("Authorization", "Bearer agent-token")])
        .await;
    assert_status!(ok, StatusCode::OK);

    // The stream authenticates before attempting the upgrade.
    let stream = fixture.get_anonymous("/api/v1/tickets/stream").await;
    assert_status!(stream, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_stream_requires_websocket_upgrade() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .get(&customer("customer-1"), "/api/v1/tickets/stream")
        .await;

    assert!(
        response.status.is_client_error(),
        "expected upgrade rejection, got {}",
        response.status
    );
}

// =============================================================================
// Submission
// =============================================================================

#[tokio::test]
async fn test_submit_returns_pending_ticket() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post(
            &customer("customer-1"),
            "/api/v1/tickets",
            json!({
                "title": "  Charged twice  ",
                "description": "My card was billed two times this month."
            }),
        )
        .await;

    assert_status!(response, StatusCode::CREATED);
    assert_json_path!(response.body, "status", json!("PENDING"));
    assert_json_path!(response.body, "customer_id", json!("customer-1"));
    assert_json_path!(response.body, "title", json!("Charged twice"));
    assert_json_path!(response.body, "urgency", Value::Null);

    let jobs = fixture.get(&agent(), "/api/v1/jobs").await;
    assert_eq!(jobs.body["counts"]["waiting"], 1);
    assert_eq!(jobs.body["jobs"][0]["ticket_id"], response.body["id"]);
}

#[tokio::test]
async fn test_submit_validation_errors() {
    let fixture = TestFixture::new().await;
    let caller = customer("customer-1");

    let short_title = fixture
        .post(
            &caller,
            "/api/v1/tickets",
            json!({ "title": "Hi", "description": "This description is long enough." }),
        )
        .await;
    assert_status!(short_title, StatusCode::BAD_REQUEST);
    assert!(short_title.body["error"].as_str().unwrap().contains("title"));

    let short_description = fixture
        .post(
            &caller,
            "/api/v1/tickets",
            json!({ "title": "Charged twice", "description": "short" }),
        )
        .await;
    assert_status!(short_description, StatusCode::BAD_REQUEST);

    let malformed = fixture
        .post_raw(&caller, "/api/v1/tickets", "{not json")
        .await;
    assert_status!(malformed, StatusCode::BAD_REQUEST);

    let jobs = fixture.get(&agent(), "/api/v1/jobs").await;
    assert_eq!(jobs.body["counts"]["waiting"], 0);
}

#[tokio::test]
async fn test_customer_cannot_submit_for_someone_else() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post(
            &customer("customer-1"),
            "/api/v1/tickets",
            json!({
                "title": "Charged twice",
                "description": "My card was billed two times.",
                "customer_id": "customer-2"
            }),
        )
        .await;

    assert_status!(response, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_agent_submits_on_behalf_of_customer() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post(
            &agent(),
            "/api/v1/tickets",
            json!({
                "title": "Phone request",
                "description": "Customer called about a missing invoice.",
                "customer_id": "customer-7"
            }),
        )
        .await;

    assert_status!(response, StatusCode::CREATED);
    assert_json_path!(response.body, "customer_id", json!("customer-7"));

    let id = response.body["id"].as_str().unwrap();
    let owner_view = fixture
        .get(&customer("customer-7"), &format!("/api/v1/tickets/{}", id))
        .await;
    assert_status!(owner_view, StatusCode::OK);
}

// =============================================================================
// Visibility
// =============================================================================

#[tokio::test]
async fn test_other_customers_ticket_is_not_found() {
    let fixture = TestFixture::new().await;
    let id = fixture
        .submit(&customer("customer-1"), "Charged twice", "My card was billed two times.")
        .await;

    let response = fixture
        .get(&customer("customer-2"), &format!("/api/v1/tickets/{}", id))
        .await;
    assert_status!(response, StatusCode::NOT_FOUND);

    let cancel = fixture
        .post_empty(&customer("customer-2"), &format!("/api/v1/tickets/{}/cancel", id))
        .await;
    assert_status!(cancel, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_is_scoped_for_customers() {
    let fixture = TestFixture::new().await;
    fixture
        .submit(&customer("customer-1"), "Charged twice", "My card was billed two times.")
        .await;
    fixture
        .submit(&customer("customer-1"), "Refund status", "Where is the refund for my order?")
        .await;
    fixture
        .submit(&customer("customer-2"), "Login broken", "I cannot log in since yesterday.")
        .await;

    let own = fixture.get(&customer("customer-1"), "/api/v1/tickets").await;
    assert_status!(own, StatusCode::OK);
    assert_eq!(own.body["total"], 2);
    assert!(own.body["tickets"]
        .as_array()
        .unwrap()
        .iter()
        .all(|t| t["customer_id"] == "customer-1"));

    let all = fixture.get(&agent(), "/api/v1/tickets").await;
    assert_eq!(all.body["total"], 3);

    let by_customer = fixture
        .get(&agent(), "/api/v1/tickets?customer_id=customer-2")
        .await;
    assert_eq!(by_customer.body["total"], 1);

    let searched = fixture
        .get(&agent(), "/api/v1/tickets?search=refund")
        .await;
    assert_eq!(searched.body["total"], 1);
    assert_eq!(searched.body["tickets"][0]["title"], "Refund status");

    let paged = fixture
        .get(&agent(), "/api/v1/tickets?limit=2&offset=2")
        .await;
    assert_eq!(paged.body["tickets"].as_array().unwrap().len(), 1);
    assert_eq!(paged.body["total"], 3);
    assert_eq!(paged.body["limit"], 2);
}

#[tokio::test]
async fn test_invalid_status_filter_is_bad_request() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .get(&agent(), "/api/v1/tickets?status=ARCHIVED")
        .await;

    assert_status!(response, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_summary_is_scoped() {
    let fixture = TestFixture::new().await;
    let id = fixture
        .submit(&customer("customer-1"), "Charged twice", "My card was billed two times.")
        .await;
    fixture
        .submit(&customer("customer-2"), "Login broken", "I cannot log in since yesterday.")
        .await;
    fixture
        .post_empty(&customer("customer-1"), &format!("/api/v1/tickets/{}/cancel", id))
        .await;

    let own = fixture
        .get(&customer("customer-1"), "/api/v1/tickets/summary")
        .await;
    assert_status!(own, StatusCode::OK);
    assert_eq!(own.body, json!({ "total": 1, "resolved": 0, "unresolved": 1 }));

    let all = fixture.get(&agent(), "/api/v1/tickets/summary").await;
    assert_eq!(all.body["total"], 2);
}

// =============================================================================
// Cancellation and agent actions
// =============================================================================

#[tokio::test]
async fn test_cancel_pending_then_conflict() {
    let fixture = TestFixture::new().await;
    let caller = customer("customer-1");
    let id = fixture
        .submit(&caller, "Charged twice", "My card was billed two times.")
        .await;
    let path = format!("/api/v1/tickets/{}/cancel", id);

    let first = fixture.post_empty(&caller, &path).await;
    assert_status!(first, StatusCode::OK);
    assert_json_path!(first.body, "status", json!("CANCELLED"));

    let second = fixture.post_empty(&caller, &path).await;
    assert_status!(second, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_agent_actions_forbidden_for_customers() {
    let fixture = TestFixture::new().await;
    let caller = customer("customer-1");
    let id = fixture
        .submit(&caller, "Charged twice", "My card was billed two times.")
        .await;

    let resolve = fixture
        .post_empty(&caller, &format!("/api/v1/tickets/{}/resolve", id))
        .await;
    assert_status!(resolve, StatusCode::FORBIDDEN);

    let edit = fixture
        .patch(
            &caller,
            &format!("/api/v1/tickets/{}", id),
            json!({ "urgency": "LOW" }),
        )
        .await;
    assert_status!(edit, StatusCode::FORBIDDEN);

    let jobs = fixture.get(&caller, "/api/v1/jobs").await;
    assert_status!(jobs, StatusCode::FORBIDDEN);

    let worker = fixture.get(&caller, "/api/v1/worker/status").await;
    assert_status!(worker, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_resolve_and_edit_require_completed() {
    let fixture = TestFixture::new().await;
    let id = fixture
        .submit(&customer("customer-1"), "Charged twice", "My card was billed two times.")
        .await;

    let resolve = fixture
        .post_empty(&agent(), &format!("/api/v1/tickets/{}/resolve", id))
        .await;
    assert_status!(resolve, StatusCode::CONFLICT);

    let edit = fixture
        .patch(
            &agent(),
            &format!("/api/v1/tickets/{}", id),
            json!({ "urgency": "LOW" }),
        )
        .await;
    assert_status!(edit, StatusCode::CONFLICT);

    let missing = fixture
        .post_empty(&agent(), "/api/v1/tickets/does-not-exist/resolve")
        .await;
    assert_status!(missing, StatusCode::NOT_FOUND);
}

// =============================================================================
// Triage through the worker
// =============================================================================

#[tokio::test]
async fn test_full_triage_lifecycle() {
    let fixture = TestFixture::with_config(TestConfig::with_worker()).await;
    let owner = customer("customer-1");

    let id = fixture
        .submit(&owner, "URGENT: app crashes", "There is a bug when I open settings.")
        .await;

    let triaged = fixture.wait_for_status(&id, "COMPLETED").await;
    assert_json_path!(triaged, "urgency", json!("HIGH"));
    assert_json_path!(triaged, "category", json!("TECHNICAL"));
    assert_json_path!(triaged, "sentiment", json!(5));
    assert!(triaged["resolution_response"].as_str().is_some());

    // The customer still sees a pending ticket with no triage output.
    let path = format!("/api/v1/tickets/{}", id);
    let masked = fixture.get(&owner, &path).await;
    assert_json_path!(masked.body, "status", json!("PENDING"));
    assert_json_path!(masked.body, "urgency", Value::Null);
    assert_json_path!(masked.body, "resolution_response", Value::Null);

    let edited = fixture
        .patch(
            &agent(),
            &path,
            json!({
                "urgency": "MEDIUM",
                "resolution_response": "We found the crash and shipped a fix today."
            }),
        )
        .await;
    assert_status!(edited, StatusCode::OK);
    assert_json_path!(edited.body, "urgency", json!("MEDIUM"));
    assert_json_path!(edited.body, "draft_updated_by", json!("agent-1"));

    let resolved = fixture
        .post_empty(&agent(), &format!("/api/v1/tickets/{}/resolve", id))
        .await;
    assert_status!(resolved, StatusCode::OK);
    assert_json_path!(resolved.body, "status", json!("RESOLVED"));

    let final_view = fixture.get(&owner, &path).await;
    assert_json_path!(final_view.body, "status", json!("RESOLVED"));
    assert_json_path!(
        final_view.body,
        "resolution_response",
        json!("We found the crash and shipped a fix today.")
    );
    assert_json_path!(final_view.body, "urgency", Value::Null);

    let summary = fixture.get(&owner, "/api/v1/tickets/summary").await;
    assert_eq!(summary.body, json!({ "total": 1, "resolved": 1, "unresolved": 0 }));

    fixture.shutdown().await;
}

#[tokio::test]
async fn test_provider_errors_exhaust_to_failed() {
    let analyzer = Arc::new(ScriptedAnalyzer::always(Script::Err(
        AnalysisError::Provider("503 - overloaded".to_string()),
    )));
    let fixture =
        TestFixture::with_config(TestConfig::with_analyzer(Arc::clone(&analyzer) as _)).await;

    let id = fixture
        .submit(&customer("customer-1"), "Charged twice", "My card was billed two times.")
        .await;

    fixture.wait_for_status(&id, "FAILED").await;
    assert_eq!(analyzer.call_count(), 3);

    let jobs = fixture
        .get(&agent(), &format!("/api/v1/jobs?ticket_id={}", id))
        .await;
    let job = &jobs.body["jobs"][0];
    assert_eq!(job["state"], "failed");
    assert_eq!(job["attempts_made"], 3);
    assert!(job["last_error"].as_str().unwrap().contains("overloaded"));

    // Customers never see the failure itself.
    let masked = fixture
        .get(&customer("customer-1"), &format!("/api/v1/tickets/{}", id))
        .await;
    assert_json_path!(masked.body, "status", json!("PENDING"));

    fixture.shutdown().await;
}

#[tokio::test]
async fn test_worker_status_reports_pool() {
    let fixture = TestFixture::with_config(TestConfig::with_worker()).await;

    let response = fixture.get(&agent(), "/api/v1/worker/status").await;

    assert_status!(response, StatusCode::OK);
    assert_json_path!(response.body, "running", json!(true));
    assert_json_path!(response.body, "concurrency", json!(5));

    let health = fixture.get_anonymous("/api/v1/health").await;
    assert_json_path!(health.body, "worker_running", json!(true));

    fixture.shutdown().await;

    let stopped = fixture.get(&agent(), "/api/v1/worker/status").await;
    assert_json_path!(stopped.body, "running", json!(false));
}
