//! Raw usage record handlers.
//!
//! Every write goes through the store, which adjusts the rollup in the same
//! transaction as the raw record.

use std::str::FromStr;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use wingtel_usage_core::{
    Carrier, Cents, RecordId, SubscriptionId, SubscriptionRef, UsageError, UsageRecord, UsageType,
};
use wingtel_usage_store::Store;

use crate::auth::ServiceAuth;
use crate::error::ApiError;
use crate::handlers::blocking;
use crate::state::AppState;

/// Upper bound on `limit` for record listings.
const MAX_PAGE_SIZE: usize = 500;

/// A price given either as a JSON number or a decimal string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PriceInput {
    /// `"12.50"`
    Text(String),
    /// `12.5`
    Number(serde_json::Number),
}

impl PriceInput {
    fn to_cents(&self) -> Result<Cents, UsageError> {
        match self {
            Self::Text(s) => s.trim().parse(),
            Self::Number(n) => n.to_string().parse(),
        }
    }
}

/// Body for creating or replacing a raw record.
///
/// Exactly the quantity field matching the record's usage type is read:
/// `kilobytes_used` for data and `seconds_used` for voice.
#[derive(Debug, Clone, Deserialize)]
pub struct RecordRequest {
    /// Subscription the usage belongs to.
    pub subscription_id: u64,
    /// Carrier tag (`att` or `sprint`).
    #[serde(default)]
    pub carrier: Option<String>,
    /// When the usage happened.
    pub usage_date: DateTime<Utc>,
    /// Price, at most two decimals.
    pub price: PriceInput,
    /// Data usage in kilobytes.
    #[serde(default)]
    pub kilobytes_used: Option<i64>,
    /// Voice usage in seconds.
    #[serde(default)]
    pub seconds_used: Option<i64>,
}

impl RecordRequest {
    /// Build the domain record this request describes under `id`.
    fn into_record(self, id: RecordId, usage_type: UsageType) -> Result<UsageRecord, UsageError> {
        let quantity = match usage_type {
            UsageType::Data => self.kilobytes_used,
            UsageType::Voice => self.seconds_used,
        }
        .ok_or_else(|| UsageError::validation(usage_type.quantity_field(), "required"))?;

        let mut subscription = SubscriptionRef::new(SubscriptionId(self.subscription_id));
        if let Some(carrier) = self.carrier.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let carrier = Carrier::from_str(carrier)
                .map_err(|e| UsageError::validation("carrier", e.to_string()))?;
            subscription = subscription.with_carrier(carrier);
        }

        let record = UsageRecord {
            id,
            subscription,
            usage_type,
            usage_date: self.usage_date,
            price: self.price.to_cents()?,
            quantity,
        };
        record.validate()?;
        Ok(record)
    }
}

/// Raw record response.
#[derive(Debug, Serialize)]
pub struct RecordResponse {
    /// Record ID.
    pub id: String,
    /// Subscription ID.
    pub subscription_id: u64,
    /// Carrier tag, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub carrier: Option<&'static str>,
    /// `data` or `voice`.
    pub type_of_usage: &'static str,
    /// Timestamp.
    pub usage_date: String,
    /// Price, formatted with two decimals.
    pub price: String,
    /// Data usage in kilobytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kilobytes_used: Option<i64>,
    /// Voice usage in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seconds_used: Option<i64>,
}

impl From<&UsageRecord> for RecordResponse {
    fn from(record: &UsageRecord) -> Self {
        let (kilobytes_used, seconds_used) = match record.usage_type {
            UsageType::Data => (Some(record.quantity), None),
            UsageType::Voice => (None, Some(record.quantity)),
        };

        Self {
            id: record.id.to_string(),
            subscription_id: record.subscription.id.0,
            carrier: record.subscription.carrier.map(Carrier::as_str),
            type_of_usage: record.usage_type.as_str(),
            usage_date: record.usage_date.to_rfc3339(),
            price: record.price.to_string(),
            kilobytes_used,
            seconds_used,
        }
    }
}

/// Record list query parameters.
#[derive(Debug, Deserialize)]
pub struct ListRecordsQuery {
    /// Maximum number of records to return (default: 50).
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Offset for pagination (default: 0).
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    50
}

/// List records response.
#[derive(Debug, Serialize)]
pub struct ListRecordsResponse {
    /// Records in creation order.
    pub records: Vec<RecordResponse>,
    /// Whether there are more records.
    pub has_more: bool,
}

/// Record a new raw usage event of the type named in the path.
pub async fn create_record(
    State(state): State<Arc<AppState>>,
    auth: ServiceAuth,
    Path(usage_type): Path<String>,
    Json(body): Json<RecordRequest>,
) -> Result<(StatusCode, Json<RecordResponse>), ApiError> {
    let usage_type = UsageType::from_str(&usage_type)?;
    let record = body.into_record(RecordId::generate(), usage_type)?;

    let record = blocking(&state, move |store| {
        store.insert_record(&record)?;
        Ok(record)
    })
    .await?;

    tracing::info!(
        service = %auth.service_name,
        record_id = %record.id,
        subscription_id = %record.subscription.id,
        usage_type = %record.usage_type,
        "Recorded usage"
    );

    Ok((StatusCode::CREATED, Json(RecordResponse::from(&record))))
}

/// Fetch one raw record.
pub async fn get_record(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<RecordResponse>, ApiError> {
    let id = parse_record_id(&id)?;

    let record = state
        .store
        .get_record(&id)?
        .ok_or_else(|| ApiError::NotFound(format!("usage record not found: {id}")))?;

    Ok(Json(RecordResponse::from(&record)))
}

/// Replace the mutable fields of a raw record. The usage type is fixed at
/// creation.
pub async fn update_record(
    State(state): State<Arc<AppState>>,
    auth: ServiceAuth,
    Path(id): Path<String>,
    Json(body): Json<RecordRequest>,
) -> Result<Json<RecordResponse>, ApiError> {
    let id = parse_record_id(&id)?;

    let usage_type = state
        .store
        .get_record(&id)?
        .map(|existing| existing.usage_type)
        .ok_or_else(|| ApiError::NotFound(format!("usage record not found: {id}")))?;

    let record = body.into_record(id, usage_type)?;
    let (record, previous) = blocking(&state, move |store| {
        let previous = store.update_record(&record)?;
        Ok((record, previous))
    })
    .await?;

    tracing::info!(
        service = %auth.service_name,
        record_id = %id,
        from = %previous.aggregate_key(),
        to = %record.aggregate_key(),
        "Updated usage record"
    );

    Ok(Json(RecordResponse::from(&record)))
}

/// Delete a raw record and its rollup contribution.
pub async fn delete_record(
    State(state): State<Arc<AppState>>,
    auth: ServiceAuth,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_record_id(&id)?;

    let deleted = blocking(&state, move |store| store.delete_record(&id)).await?;

    tracing::info!(
        service = %auth.service_name,
        record_id = %id,
        key = %deleted.aggregate_key(),
        "Deleted usage record"
    );

    Ok(StatusCode::NO_CONTENT)
}

/// List raw records.
pub async fn list_records(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListRecordsQuery>,
) -> Result<Json<ListRecordsResponse>, ApiError> {
    // Fetch one more than requested to determine has_more
    let limit = query.limit.min(MAX_PAGE_SIZE);
    let records = state.store.list_records(limit + 1, query.offset)?;

    let has_more = records.len() > limit;
    let records = records.iter().take(limit).map(RecordResponse::from).collect();

    Ok(Json(ListRecordsResponse { records, has_more }))
}

fn parse_record_id(raw: &str) -> Result<RecordId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::NotFound(format!("usage record not found: {raw}")))
}
