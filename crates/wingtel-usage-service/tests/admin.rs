//! Aggregate maintenance integration tests.

mod common;

use common::TestHarness;

#[tokio::test]
async fn rebuild_requires_admin_key() {
    let harness = TestHarness::new();

    harness
        .server
        .post("/v1/admin/aggregates/rebuild")
        .await
        .assert_status_unauthorized();

    harness
        .server
        .post("/v1/admin/aggregates/rebuild")
        .add_header("x-api-key", &harness.service_api_key)
        .await
        .assert_status_unauthorized();
}

#[tokio::test]
async fn audit_reports_consistent_rollup() {
    let harness = TestHarness::new();
    harness.record_data(7, "2024-01-01T09:00:00Z", "50", 200).await;
    harness.record_voice(7, "2024-01-01T09:00:00Z", "30", 60).await;

    let response = harness
        .server
        .get("/v1/admin/aggregates/audit")
        .add_header("x-admin-key", &harness.admin_api_key)
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["consistent"], true);
    assert!(body["drift"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn rebuild_is_idempotent() {
    let harness = TestHarness::new();
    harness.record_data(7, "2024-01-01T09:00:00Z", "50", 200).await;
    harness.record_data(7, "2024-01-02T09:00:00Z", "5", 20).await;
    harness.record_voice(8, "2024-01-01T09:00:00Z", "30", 60).await;

    for _ in 0..2 {
        let response = harness
            .server
            .post("/v1/admin/aggregates/rebuild")
            .add_header("x-admin-key", &harness.admin_api_key)
            .add_header("x-admin-id", "ops")
            .await;

        response.assert_status_ok();
        let body: serde_json::Value = response.json();
        assert_eq!(body["rows_written"], 3);
    }

    let response = harness
        .server
        .get("/v1/usage/usage_metrics/7")
        .await;
    let body: serde_json::Value = response.json();
    assert_eq!(body[0]["total_price"], "55.00");
    assert_eq!(body[0]["total_used"], 220);
}
