//! Common test utilities for wingtel usage integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::sync::Arc;

use axum::Router;
use axum_test::TestServer;
use serde_json::{json, Value};
use tempfile::TempDir;

use wingtel_usage_service::{create_router, AppState, ServiceConfig};
use wingtel_usage_store::RocksStore;

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// The store behind the server, for direct assertions.
    pub store: Arc<RocksStore>,
    /// Temporary directory for the database (kept alive for test duration).
    pub _temp_dir: TempDir,
    /// The service API key for raw record writes.
    pub service_api_key: String,
    /// The admin API key for aggregate maintenance.
    pub admin_api_key: String,
}

impl TestHarness {
    /// Create a new test harness with a fresh database.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = Arc::new(RocksStore::open(temp_dir.path()).expect("Failed to open store"));

        let service_api_key = "test-service-key".to_string();
        let admin_api_key = "test-admin-key".to_string();

        let config = ServiceConfig {
            listen_addr: "127.0.0.1:0".into(),
            data_dir: temp_dir.path().to_string_lossy().to_string(),
            service_api_key: Some(service_api_key.clone()),
            admin_api_key: Some(admin_api_key.clone()),
            ..ServiceConfig::default()
        };

        let state = AppState::new(Arc::clone(&store), config);
        let router: Router = create_router(state);

        let server = TestServer::new(router).expect("Failed to create test server");

        Self {
            server,
            store,
            _temp_dir: temp_dir,
            service_api_key,
            admin_api_key,
        }
    }

    /// Record a data event and return the created record.
    pub async fn record_data(&self, subscription_id: u64, date: &str, price: &str, kb: i64) -> Value {
        self.create_record(
            "data",
            json!({
                "subscription_id": subscription_id,
                "usage_date": date,
                "price": price,
                "kilobytes_used": kb
            }),
        )
        .await
    }

    /// Record a voice event and return the created record.
    pub async fn record_voice(
        &self,
        subscription_id: u64,
        date: &str,
        price: &str,
        seconds: i64,
    ) -> Value {
        self.create_record(
            "voice",
            json!({
                "subscription_id": subscription_id,
                "usage_date": date,
                "price": price,
                "seconds_used": seconds
            }),
        )
        .await
    }

    async fn create_record(&self, kind: &str, body: Value) -> Value {
        let response = self
            .server
            .post(&format!("/v1/records/{kind}"))
            .add_header("x-api-key", &self.service_api_key)
            .add_header("x-service-name", "test-suite")
            .json(&body)
            .await;

        response.assert_status(axum::http::StatusCode::CREATED);
        response.json()
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
