//! Order placement and saga outcome queries.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{History, Order, OrderId, OrderItem, TransactionId};
use projections::SagaLogEntry;
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
pub struct PlaceOrderRequest {
    pub products: Vec<OrderItem>,
}

#[derive(Deserialize)]
pub struct EventsQuery {
    pub order_id: Option<String>,
    pub transaction_id: Option<String>,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderPlacedResponse {
    pub order_id: String,
    pub transaction_id: String,
}

/// A finished saga as recorded in the saga log.
#[derive(Serialize)]
pub struct SagaEventResponse {
    pub id: String,
    pub order_id: String,
    pub transaction_id: String,
    pub source: Option<String>,
    pub status: Option<String>,
    pub payload: Order,
    pub history: Vec<History>,
    pub created_at: DateTime<Utc>,
}

impl From<SagaLogEntry> for SagaEventResponse {
    fn from(entry: SagaLogEntry) -> Self {
        let history = entry.envelope.history().to_vec();
        let payload = entry.envelope.payload().clone();
        Self {
            id: entry.id.to_string(),
            order_id: entry.order_id.to_string(),
            transaction_id: entry.transaction_id.to_string(),
            source: entry.source.map(|s| s.as_str().to_string()),
            status: entry.status.map(|s| s.as_str().to_string()),
            payload,
            history,
            created_at: entry.recorded_at,
        }
    }
}

// -- Handlers --

/// POST /orders: starts a saga for a new order attempt.
///
/// Answers as soon as the start message is published; the outcome shows up
/// under `/events` once the saga has finished.
#[tracing::instrument(skip(state, req))]
pub async fn place(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PlaceOrderRequest>,
) -> Result<(StatusCode, Json<OrderPlacedResponse>), ApiError> {
    let envelope = state.initiator.place_order(req.products).await?;
    metrics::counter!("orders_placed_total").increment(1);

    Ok((
        StatusCode::ACCEPTED,
        Json(OrderPlacedResponse {
            order_id: envelope.order_id().to_string(),
            transaction_id: envelope.transaction_id().to_string(),
        }),
    ))
}

/// GET /events?order_id=..|transaction_id=..: latest outcome for one saga.
#[tracing::instrument(skip(state, query))]
pub async fn find(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<SagaEventResponse>, ApiError> {
    let order_id = query.order_id.as_deref().filter(|id| !id.trim().is_empty());
    let transaction_id = query
        .transaction_id
        .as_deref()
        .filter(|id| !id.trim().is_empty());

    let entry = match (order_id, transaction_id) {
        (Some(id), _) => {
            let order_id = parse_order_id(id)?;
            state
                .saga_log
                .find_by_order_id(order_id)
                .await?
                .ok_or_else(|| ApiError::NotFound(format!("No saga found for order {id}")))?
        }
        (None, Some(id)) => state
            .saga_log
            .find_by_transaction_id(&TransactionId::new(id))
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("No saga found for transaction {id}")))?,
        (None, None) => {
            return Err(ApiError::BadRequest(
                "order_id or transaction_id must be informed".to_string(),
            ));
        }
    };

    Ok(Json(entry.into()))
}

/// GET /events/all: every recorded outcome, newest first.
#[tracing::instrument(skip(state))]
pub async fn all(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<SagaEventResponse>>, ApiError> {
    let entries = state.saga_log.find_all().await?;
    Ok(Json(entries.into_iter().map(Into::into).collect()))
}

fn parse_order_id(id: &str) -> Result<OrderId, ApiError> {
    let uuid = uuid::Uuid::parse_str(id)
        .map_err(|e| ApiError::BadRequest(format!("Invalid order_id: {e}")))?;
    Ok(OrderId::from_uuid(uuid))
}
