//! Application state.

use std::sync::Arc;

use wingtel_usage_core::QueryService;
use wingtel_usage_store::RocksStore;

use crate::config::ServiceConfig;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// The storage backend.
    pub store: Arc<RocksStore>,

    /// Read-only queries over the rollup held by `store`.
    pub queries: QueryService<Arc<RocksStore>>,

    /// Service configuration.
    pub config: ServiceConfig,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(store: Arc<RocksStore>, config: ServiceConfig) -> Self {
        if config.service_api_key.is_none() {
            tracing::warn!("SERVICE_API_KEY not set - raw record writes will be rejected");
        }
        if config.admin_api_key.is_none() {
            tracing::warn!("ADMIN_API_KEY not set - aggregate maintenance is disabled");
        }

        Self {
            queries: QueryService::new(Arc::clone(&store)),
            store,
            config,
        }
    }
}
