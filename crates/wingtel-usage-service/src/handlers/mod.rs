//! API handlers.

use std::sync::Arc;

use wingtel_usage_store::{RocksStore, StoreError};

use crate::error::ApiError;
use crate::state::AppState;

pub mod admin;
pub mod health;
pub mod records;
pub mod usage;

/// Run a store call on the blocking pool.
///
/// Mutations can wait on row locks and maintenance takes the store
/// exclusively; neither may hold a runtime worker while it waits.
pub(crate) async fn blocking<T, F>(state: &AppState, call: F) -> Result<T, ApiError>
where
    F: FnOnce(&RocksStore) -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    let store = Arc::clone(&state.store);
    tokio::task::spawn_blocking(move || call(&store))
        .await?
        .map_err(ApiError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceConfig;
    use tempfile::TempDir;
    use wingtel_usage_core::{Cents, SubscriptionId, UsageRecord};
    use wingtel_usage_store::Store;

    fn state() -> (AppState, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RocksStore::open(dir.path()).unwrap());
        (AppState::new(store, ServiceConfig::default()), dir)
    }

    #[tokio::test]
    async fn blocking_returns_store_result() {
        let (state, _dir) = state();
        let record =
            UsageRecord::data(SubscriptionId(3), chrono::Utc::now(), Cents(100), 5).unwrap();
        let id = record.id;

        blocking(&state, move |store| store.insert_record(&record))
            .await
            .unwrap();
        assert!(state.store.get_record(&id).unwrap().is_some());

        let deleted = blocking(&state, move |store| store.delete_record(&id))
            .await
            .unwrap();
        assert_eq!(deleted.id, id);

        let err = blocking(&state, move |store| store.delete_record(&id))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn blocking_maps_panicked_call_to_internal() {
        let (state, _dir) = state();
        let err = blocking(&state, |_store| -> Result<(), StoreError> {
            panic!("store call panicked")
        })
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::Internal(_)));
    }
}
