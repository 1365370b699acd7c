//! API Integration Tests for the sqlmon server
//!
//! Tests the REST API endpoints using axum-test against in-memory SQLite
//! and a scripted monitored server.

mod common;

use axum::Router;
use axum_test::TestServer;
use common::{fragmented, harness, harness_with, options, slow_query, CannedAdvisor, Harness};
use serde_json::{json, Value};
use sqlmon::api;

fn server(h: &Harness) -> TestServer {
    let app = Router::new()
        .merge(api::routes())
        .with_state(h.state.clone());
    TestServer::new(app).expect("Failed to create test server")
}

// ============================================================================
// Status
// ============================================================================

#[tokio::test]
async fn test_health_reports_store_and_advisor() {
    let h = harness(&["X"]).await;
    let server = server(&h);

    let response = server.get("/health").await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["history_store"], true);
    assert_eq!(body["ai_configured"], false);
    assert!(body["last_cycle"].is_null());
}

// ============================================================================
// Slow queries
// ============================================================================

#[tokio::test]
async fn test_detect_then_browse_and_resolve() {
    let h = harness(&["X", "Y"]).await;
    h.target.set_live(
        "X",
        vec![
            slow_query("X", "SELECT * FROM T", 6000.0),
            slow_query("X", "SELECT * FROM U", 1500.0),
        ],
    );
    h.target
        .set_live("Y", vec![slow_query("Y", "SELECT * FROM V", 2500.0)]);
    let server = server(&h);

    let response = server.post("/slow-queries/detect").await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["detected"], 3);

    let listed: Vec<Value> = server
        .get("/slow-queries")
        .add_query_param("database", "X")
        .await
        .json();
    assert_eq!(listed.len(), 2);

    let critical = listed
        .iter()
        .find(|r| r["query_text"] == "SELECT * FROM T")
        .unwrap();
    assert_eq!(critical["severity"], "critical");
    let id = critical["id"].as_i64().unwrap();

    let response = server
        .post(&format!("/slow-queries/{}/resolve", id))
        .json(&json!({ "resolution": "Added covering index" }))
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["is_resolved"], true);

    // Resolving twice is a validation error
    let response = server
        .post(&format!("/slow-queries/{}/resolve", id))
        .json(&json!({ "resolution": "again" }))
        .await;
    response.assert_status_bad_request();
    assert_eq!(response.json::<Value>()["error"]["code"], "VALIDATION_ERROR");

    let open: Vec<Value> = server
        .get("/slow-queries")
        .add_query_param("database", "X")
        .await
        .json();
    assert_eq!(open.len(), 1);

    let all: Vec<Value> = server
        .get("/slow-queries")
        .add_query_param("database", "X")
        .add_query_param("include_resolved", "true")
        .await
        .json();
    assert_eq!(all.len(), 2);
}

#[tokio::test]
async fn test_unknown_slow_query_is_not_found() {
    let h = harness(&["X"]).await;
    let server = server(&h);

    let response = server.get("/slow-queries/999").await;
    response.assert_status_not_found();
    assert_eq!(response.json::<Value>()["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_inverted_window_is_rejected() {
    let h = harness(&["X"]).await;
    let server = server(&h);

    let response = server
        .get("/slow-queries")
        .add_query_param("since", "2024-03-02T00:00:00Z")
        .add_query_param("until", "2024-03-01T00:00:00Z")
        .await;
    response.assert_status_bad_request();
}

#[tokio::test]
async fn test_analyze_with_canned_advisor() {
    let advisor = CannedAdvisor::new("SELECT 1", "Nothing to improve.");
    let h = harness_with(advisor, options(&["X"])).await;
    let server = server(&h);

    let response = server
        .post("/slow-queries/analyze")
        .json(&json!({ "query": "SELECT 1", "database_name": "X" }))
        .await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(body["explanation"], "Nothing to improve.");
    assert_eq!(body["is_simulated"], false);
}

#[tokio::test]
async fn test_analyze_requires_query() {
    let h = harness(&["X"]).await;
    let server = server(&h);

    let response = server
        .post("/slow-queries/analyze")
        .json(&json!({ "query": " ", "database_name": "X" }))
        .await;
    response.assert_status_bad_request();
}

// ============================================================================
// Databases
// ============================================================================

#[tokio::test]
async fn test_list_databases() {
    let h = harness(&[]).await;
    h.target.add_database("Sales", "ONLINE");
    let server = server(&h);

    let body: Vec<Value> = server.get("/databases").await.json();
    assert_eq!(body.len(), 1);
    assert_eq!(body[0]["name"], "Sales");
    assert_eq!(body[0]["state"], "ONLINE");
}

#[tokio::test]
async fn test_optimize_without_provider_is_simulated() {
    let h = harness(&["Sales"]).await;
    let server = server(&h);

    let response = server
        .post("/databases/Sales/optimize")
        .json(&json!({ "query": "SELECT * FROM Orders" }))
        .await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(body["is_simulated"], true);
    assert_eq!(body["optimized_query"], "SELECT * FROM Orders");
}

#[tokio::test]
async fn test_apply_fix_endpoint() {
    let advisor = CannedAdvisor::new("SELECT OrderId FROM Orders", "Narrower projection.");
    let h = harness_with(advisor, options(&["Sales"])).await;
    let server = server(&h);

    let response = server
        .post("/databases/Sales/queries/adhoc/fix")
        .json(&json!({ "fix_type": "ai", "query": "SELECT * FROM Orders" }))
        .await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(body["ai_powered"], true);
    assert_eq!(body["optimized_query"], "SELECT OrderId FROM Orders");
    assert_eq!(body["optimized_query_works"], true);
    assert!(body["performance_after"]["execution_time_ms"].is_number());
}

#[tokio::test]
async fn test_missing_indexes_include_create_statement() {
    let h = harness(&["Sales"]).await;
    h.target.set_missing(
        "Sales",
        vec![sqlmon::models::MissingIndex {
            database_name: "Sales".into(),
            table: "[Sales].[dbo].[Orders]".into(),
            equality_columns: Some("[CustomerId]".into()),
            inequality_columns: None,
            included_columns: None,
            improvement_percent: 62.0,
            user_seeks: 40,
        }],
    );
    let server = server(&h);

    let body: Vec<Value> = server.get("/databases/Sales/missing-indexes").await.json();
    assert_eq!(body.len(), 1);
    assert!(body[0]["create_statement"]
        .as_str()
        .unwrap()
        .starts_with("CREATE NONCLUSTERED INDEX"));
    assert_eq!(body[0]["user_seeks"], 40);
}

// ============================================================================
// Indexes
// ============================================================================

#[tokio::test]
async fn test_detect_and_reindex() {
    let h = harness(&["Sales"]).await;
    h.target.set_indexes(
        "Sales",
        vec![fragmented("Sales", "Orders", "IX_Orders_Date", 45.0, 500)],
    );
    let server = server(&h);

    let detected: Vec<Value> = server
        .post("/indexes/detect")
        .add_query_param("database", "Sales")
        .await
        .json();
    assert_eq!(detected.len(), 1);
    assert_eq!(detected[0]["reindex_type"], "REBUILD");
    assert_eq!(detected[0]["index_name"], "IX_Orders_Date");

    let response = server.post("/indexes/reindex").json(&detected[0]).await;
    response.assert_status_ok();
    let op: Value = response.json();
    assert_eq!(op["success"], true);
    assert_eq!(op["operation_type"], "REBUILD");

    let ops: Vec<Value> = server
        .get("/indexes/operations")
        .add_query_param("database", "Sales")
        .await
        .json();
    assert_eq!(ops.len(), 1);
}

#[tokio::test]
async fn test_reindex_of_healthy_index_is_rejected() {
    let h = harness(&["Sales"]).await;
    let server = server(&h);

    let response = server
        .post("/indexes/reindex")
        .json(&fragmented("Sales", "Orders", "IX_Orders_Date", 5.0, 500))
        .await;
    response.assert_status_bad_request();
    assert!(h.target.executed().is_empty());
}

// ============================================================================
// Monitor
// ============================================================================

#[tokio::test]
async fn test_manual_cycle_and_last_report() {
    let h = harness(&["X"]).await;
    h.target
        .set_live("X", vec![slow_query("X", "SELECT * FROM T", 2500.0)]);
    let server = server(&h);

    server.get("/monitor/last").await.assert_status_not_found();

    let response = server.post("/monitor/run").await;
    response.assert_status_ok();
    let report: Value = response.json();
    assert_eq!(report["cancelled"], false);
    assert_eq!(report["databases"][0]["database"], "X");
    assert_eq!(report["databases"][0]["slow_queries"], 1);

    let last: Value = server.get("/monitor/last").await.json();
    assert_eq!(last["cycle_id"], report["cycle_id"]);

    let health: Value = server.get("/health").await.json();
    assert_eq!(health["last_cycle"]["cycle_id"], report["cycle_id"]);
}
