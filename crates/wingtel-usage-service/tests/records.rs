//! Raw record integration tests.
//!
//! Each write is checked against the rollup it should have produced.

mod common;

use axum::http::StatusCode;
use common::TestHarness;
use serde_json::json;

use wingtel_usage_store::Store;

async fn metrics(harness: &TestHarness, subscription_id: u64, query: &[(&str, &str)]) -> serde_json::Value {
    let mut request = harness
        .server
        .get(&format!("/v1/usage/usage_metrics/{subscription_id}"));
    for (key, value) in query {
        request = request.add_query_param(key, value);
    }
    let response = request.await;
    response.assert_status_ok();
    response.json()
}

// ============================================================================
// Create / Get
// ============================================================================

#[tokio::test]
async fn create_record_returns_record() {
    let harness = TestHarness::new();

    let body = harness.record_data(7, "2024-01-01T09:00:00Z", "50", 200).await;

    assert_eq!(body["subscription_id"], 7);
    assert_eq!(body["type_of_usage"], "data");
    assert_eq!(body["price"], "50.00");
    assert_eq!(body["kilobytes_used"], 200);
    assert!(body.get("seconds_used").is_none());

    let id = body["id"].as_str().unwrap();
    let response = harness.server.get(&format!("/v1/records/{id}")).await;
    response.assert_status_ok();
    let fetched: serde_json::Value = response.json();
    assert_eq!(fetched, body);
}

#[tokio::test]
async fn create_record_accepts_numeric_price_and_carrier() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .post("/v1/records/voice")
        .add_header("x-api-key", &harness.service_api_key)
        .json(&json!({
            "subscription_id": 9,
            "carrier": "sprint",
            "usage_date": "2024-03-10T12:00:00Z",
            "price": 1.25,
            "seconds_used": 42
        }))
        .await;

    response.assert_status(StatusCode::CREATED);
    let body: serde_json::Value = response.json();
    assert_eq!(body["price"], "1.25");
    assert_eq!(body["carrier"], "sprint");
    assert_eq!(body["seconds_used"], 42);
}

#[tokio::test]
async fn create_record_without_api_key_fails() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .post("/v1/records/data")
        .json(&json!({
            "subscription_id": 7,
            "usage_date": "2024-01-01T09:00:00Z",
            "price": "1",
            "kilobytes_used": 1
        }))
        .await;

    response.assert_status_unauthorized();
    let body = metrics(&harness, 7, &[]).await;
    assert!(body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn create_record_with_wrong_api_key_fails() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .post("/v1/records/data")
        .add_header("x-api-key", "not-the-key")
        .json(&json!({
            "subscription_id": 7,
            "usage_date": "2024-01-01T09:00:00Z",
            "price": "1",
            "kilobytes_used": 1
        }))
        .await;

    response.assert_status_unauthorized();
}

#[tokio::test]
async fn create_record_rejects_invalid_input() {
    let harness = TestHarness::new();

    let cases = [
        ("data", json!({"subscription_id": 1, "usage_date": "2024-01-01T00:00:00Z", "price": "-1", "kilobytes_used": 1}), "price"),
        ("data", json!({"subscription_id": 1, "usage_date": "2024-01-01T00:00:00Z", "price": "1.234", "kilobytes_used": 1}), "price"),
        ("data", json!({"subscription_id": 1, "usage_date": "2024-01-01T00:00:00Z", "price": "1", "kilobytes_used": -1}), "kilobytes_used"),
        ("voice", json!({"subscription_id": 1, "usage_date": "2024-01-01T00:00:00Z", "price": "1", "kilobytes_used": 1}), "seconds_used"),
        ("sms", json!({"subscription_id": 1, "usage_date": "2024-01-01T00:00:00Z", "price": "1", "kilobytes_used": 1}), "type_of_usage"),
        ("data", json!({"subscription_id": 1, "carrier": "verizon", "usage_date": "2024-01-01T00:00:00Z", "price": "1", "kilobytes_used": 1}), "carrier"),
    ];

    for (kind, body, field) in cases {
        let response = harness
            .server
            .post(&format!("/v1/records/{kind}"))
            .add_header("x-api-key", &harness.service_api_key)
            .json(&body)
            .await;

        response.assert_status_bad_request();
        let error: serde_json::Value = response.json();
        assert_eq!(error["error"]["details"]["field"], field, "case {kind} {body}");
    }

    let body = metrics(&harness, 1, &[]).await;
    assert!(body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn get_unknown_record_is_not_found() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .get("/v1/records/01ARZ3NDEKTSV4RRFFQ69G5FAV")
        .await;
    response.assert_status_not_found();

    let response = harness.server.get("/v1/records/not-a-ulid").await;
    response.assert_status_not_found();
}

// ============================================================================
// Update
// ============================================================================

#[tokio::test]
async fn update_record_replaces_contribution() {
    let harness = TestHarness::new();
    harness.record_data(7, "2024-01-01T08:00:00Z", "5", 10).await;
    let record = harness.record_data(7, "2024-01-01T09:00:00Z", "50", 200).await;
    let id = record["id"].as_str().unwrap();

    let response = harness
        .server
        .put(&format!("/v1/records/{id}"))
        .add_header("x-api-key", &harness.service_api_key)
        .json(&json!({
            "subscription_id": 7,
            "usage_date": "2024-01-01T09:00:00Z",
            "price": "20.50",
            "kilobytes_used": 100
        }))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["id"], id);
    assert_eq!(body["price"], "20.50");

    let totals = metrics(&harness, 7, &[]).await;
    assert_eq!(totals[0]["total_price"], "25.50");
    assert_eq!(totals[0]["total_used"], 110);
}

#[tokio::test]
async fn update_record_moving_day_moves_contribution() {
    let harness = TestHarness::new();
    let record = harness.record_voice(7, "2024-01-01T09:00:00Z", "30", 60).await;
    let id = record["id"].as_str().unwrap();

    harness
        .server
        .put(&format!("/v1/records/{id}"))
        .add_header("x-api-key", &harness.service_api_key)
        .json(&json!({
            "subscription_id": 7,
            "usage_date": "2024-01-05T09:00:00Z",
            "price": "30",
            "seconds_used": 60
        }))
        .await
        .assert_status_ok();

    let old_day = metrics(&harness, 7, &[("usage_date__lte", "2024-01-01")]).await;
    assert_eq!(old_day[0]["total_price"], "0.00");
    assert_eq!(old_day[0]["total_used"], 0);

    let new_day = metrics(&harness, 7, &[("usage_date__gte", "2024-01-05")]).await;
    assert_eq!(new_day[0]["total_price"], "30.00");
    assert_eq!(new_day[0]["total_used"], 60);
}

#[tokio::test]
async fn update_record_moving_subscription_moves_contribution() {
    let harness = TestHarness::new();
    let record = harness.record_data(1, "2024-01-01T09:00:00Z", "12", 3).await;
    let id = record["id"].as_str().unwrap();

    harness
        .server
        .put(&format!("/v1/records/{id}"))
        .add_header("x-api-key", &harness.service_api_key)
        .json(&json!({
            "subscription_id": 2,
            "usage_date": "2024-01-01T09:00:00Z",
            "price": "12",
            "kilobytes_used": 3
        }))
        .await
        .assert_status_ok();

    let from = metrics(&harness, 1, &[]).await;
    assert_eq!(from[0]["total_price"], "0.00");
    let to = metrics(&harness, 2, &[]).await;
    assert_eq!(to[0]["total_price"], "12.00");
}

#[tokio::test]
async fn update_record_cannot_change_usage_type() {
    let harness = TestHarness::new();
    let record = harness.record_data(7, "2024-01-01T09:00:00Z", "50", 200).await;
    let id = record["id"].as_str().unwrap();

    let response = harness
        .server
        .put(&format!("/v1/records/{id}"))
        .add_header("x-api-key", &harness.service_api_key)
        .json(&json!({
            "subscription_id": 7,
            "usage_date": "2024-01-01T09:00:00Z",
            "price": "50",
            "seconds_used": 200
        }))
        .await;

    response.assert_status_bad_request();
    let totals = metrics(&harness, 7, &[("type_of_usage", "data")]).await;
    assert_eq!(totals[0]["total_price"], "50.00");
}

#[tokio::test]
async fn update_unknown_record_is_not_found() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .put("/v1/records/01ARZ3NDEKTSV4RRFFQ69G5FAV")
        .add_header("x-api-key", &harness.service_api_key)
        .json(&json!({
            "subscription_id": 7,
            "usage_date": "2024-01-01T09:00:00Z",
            "price": "1",
            "kilobytes_used": 1
        }))
        .await;

    response.assert_status_not_found();
}

// ============================================================================
// Delete / List
// ============================================================================

#[tokio::test]
async fn delete_last_record_leaves_zero_row() {
    let harness = TestHarness::new();
    let record = harness.record_data(7, "2024-01-01T09:00:00Z", "50", 200).await;
    let id = record["id"].as_str().unwrap();

    let response = harness
        .server
        .delete(&format!("/v1/records/{id}"))
        .add_header("x-api-key", &harness.service_api_key)
        .await;
    response.assert_status(StatusCode::NO_CONTENT);

    harness
        .server
        .get(&format!("/v1/records/{id}"))
        .await
        .assert_status_not_found();

    let totals = metrics(&harness, 7, &[]).await;
    assert_eq!(totals[0]["total_price"], "0.00");
    assert_eq!(totals[0]["total_used"], 0);

    let response = harness
        .server
        .delete(&format!("/v1/records/{id}"))
        .add_header("x-api-key", &harness.service_api_key)
        .await;
    response.assert_status_not_found();
}

#[tokio::test]
async fn list_records_paginates() {
    let harness = TestHarness::new();
    for price in ["1", "2", "3"] {
        harness.record_data(1, "2024-01-01T09:00:00Z", price, 1).await;
    }

    let response = harness
        .server
        .get("/v1/records")
        .add_query_param("limit", 2)
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["records"].as_array().unwrap().len(), 2);
    assert_eq!(body["has_more"], true);

    let response = harness
        .server
        .get("/v1/records")
        .add_query_param("limit", 2)
        .add_query_param("offset", 2)
        .await;
    let body: serde_json::Value = response.json();
    assert_eq!(body["records"].as_array().unwrap().len(), 1);
    assert_eq!(body["has_more"], false);
}

#[tokio::test]
async fn every_write_keeps_rollup_consistent() {
    let harness = TestHarness::new();
    let a = harness.record_data(5, "2024-01-01T01:00:00Z", "1.10", 11).await;
    let b = harness.record_data(5, "2024-01-01T02:00:00Z", "2.20", 22).await;
    harness.record_voice(5, "2024-01-02T03:00:00Z", "3.30", 33).await;

    let b_id = b["id"].as_str().unwrap();
    harness
        .server
        .put(&format!("/v1/records/{b_id}"))
        .add_header("x-api-key", &harness.service_api_key)
        .json(&json!({
            "subscription_id": 5,
            "usage_date": "2024-01-03T02:00:00Z",
            "price": "4.40",
            "kilobytes_used": 44
        }))
        .await
        .assert_status_ok();

    let a_id = a["id"].as_str().unwrap();
    harness
        .server
        .delete(&format!("/v1/records/{a_id}"))
        .add_header("x-api-key", &harness.service_api_key)
        .await
        .assert_status(StatusCode::NO_CONTENT);

    assert!(harness.store.audit_aggregates().unwrap().is_empty());

    let totals = metrics(&harness, 5, &[]).await;
    assert_eq!(totals[0]["total_price"], "7.70");
}
