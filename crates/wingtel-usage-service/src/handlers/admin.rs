//! Aggregate maintenance handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use wingtel_usage_store::{AggregateDrift, Store};

use crate::auth::AdminAuth;
use crate::error::ApiError;
use crate::handlers::blocking;
use crate::state::AppState;

/// Rebuild response.
#[derive(Debug, Serialize)]
pub struct RebuildResponse {
    /// Number of rollup rows written.
    pub rows_written: usize,
}

/// One diverging rollup row.
#[derive(Debug, Serialize)]
pub struct DriftResponse {
    /// Subscription ID.
    pub subscription_id: u64,
    /// `data` or `voice`.
    pub type_of_usage: &'static str,
    /// Rollup day.
    pub usage_date: String,
    /// Stored price.
    pub stored_price: String,
    /// Stored usage.
    pub stored_used: i64,
    /// Price summed from raw records.
    pub expected_price: String,
    /// Usage summed from raw records.
    pub expected_used: i64,
}

impl From<&AggregateDrift> for DriftResponse {
    fn from(drift: &AggregateDrift) -> Self {
        Self {
            subscription_id: drift.key.subscription_id.0,
            type_of_usage: drift.key.usage_type.as_str(),
            usage_date: drift.key.usage_date.to_string(),
            stored_price: drift.stored_price.to_string(),
            stored_used: drift.stored_used,
            expected_price: drift.expected_price.to_string(),
            expected_used: drift.expected_used,
        }
    }
}

/// Audit response.
#[derive(Debug, Serialize)]
pub struct AuditResponse {
    /// Whether every stored row matches its raw records.
    pub consistent: bool,
    /// Rows that do not.
    pub drift: Vec<DriftResponse>,
}

/// Recompute the whole rollup from raw records.
pub async fn rebuild_aggregates(
    State(state): State<Arc<AppState>>,
    auth: AdminAuth,
) -> Result<Json<RebuildResponse>, ApiError> {
    tracing::info!(admin_id = %auth.admin_id, "Rebuilding usage aggregates");

    let rows_written = blocking(&state, |store| store.rebuild_aggregates()).await?;

    Ok(Json(RebuildResponse { rows_written }))
}

/// Compare the stored rollup against raw records without writing.
pub async fn audit_aggregates(
    State(state): State<Arc<AppState>>,
    auth: AdminAuth,
) -> Result<Json<AuditResponse>, ApiError> {
    let drift = blocking(&state, |store| store.audit_aggregates()).await?;

    tracing::info!(
        admin_id = %auth.admin_id,
        drifted_rows = drift.len(),
        "Audited usage aggregates"
    );

    Ok(Json(AuditResponse {
        consistent: drift.is_empty(),
        drift: drift.iter().map(DriftResponse::from).collect(),
    }))
}
