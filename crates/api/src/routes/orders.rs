//! Checkout and order fulfillment endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use domain::Order;
use event_store::EventStore;
use marketplace::{CartOrderRequest, DirectOrderRequest};
use projections::OrderSummary;
use serde::{Deserialize, Serialize};

use super::parse_aggregate_id;
use crate::error::ApiError;
use crate::extract::Actor;
use crate::state::AppState;

/// Which side of the orders to list.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Party {
    #[default]
    Buyer,
    Seller,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default, rename = "as")]
    pub party: Party,
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelRequest {
    #[serde(default)]
    pub reason: String,
}

#[derive(Serialize)]
pub struct EventEnvelopeResponse {
    pub event_id: String,
    pub event_type: String,
    pub aggregate_id: String,
    pub version: i64,
    pub position: u64,
    pub recorded_at: String,
    pub payload: serde_json::Value,
}

/// POST /orders/direct: buy one product straight from the catalog.
#[tracing::instrument(skip(state, req))]
pub async fn create_direct<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Actor(buyer): Actor,
    Json(req): Json<DirectOrderRequest>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    let order = state.orders.create_direct_order(buyer, req).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// POST /orders/cart: check out selected cart lines.
#[tracing::instrument(skip(state, req))]
pub async fn create_from_cart<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Actor(buyer): Actor,
    Json(req): Json<CartOrderRequest>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    let order = state.orders.create_cart_order(buyer, req).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// GET /orders?as=buyer|seller: orders the caller takes part in.
#[tracing::instrument(skip(state))]
pub async fn list<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Actor(actor): Actor,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<OrderSummary>>, ApiError> {
    let orders = match query.party {
        Party::Buyer => state.orders.orders_for_buyer(actor).await?,
        Party::Seller => state.orders.orders_for_seller(actor).await?,
    };
    Ok(Json(orders))
}

/// GET /orders/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Actor(actor): Actor,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    let order_id = parse_aggregate_id(&id)?;
    Ok(Json(state.orders.get_order(actor, order_id).await?))
}

/// GET /orders/{id}/events: the order's stored history.
#[tracing::instrument(skip(state))]
pub async fn events<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Actor(actor): Actor,
    Path(id): Path<String>,
) -> Result<Json<Vec<EventEnvelopeResponse>>, ApiError> {
    let order_id = parse_aggregate_id(&id)?;
    let envelopes = state.orders.order_events(actor, order_id).await?;

    let responses = envelopes
        .into_iter()
        .map(|e| EventEnvelopeResponse {
            event_id: e.event_id.to_string(),
            event_type: e.event_type,
            aggregate_id: e.aggregate_id.to_string(),
            version: e.version.as_i64(),
            position: e.position,
            recorded_at: e.recorded_at.to_rfc3339(),
            payload: e.payload,
        })
        .collect();

    Ok(Json(responses))
}

/// POST /orders/{id}/confirm
#[tracing::instrument(skip(state))]
pub async fn confirm<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Actor(seller): Actor,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    let order_id = parse_aggregate_id(&id)?;
    Ok(Json(state.orders.confirm_order(seller, order_id).await?))
}

/// POST /orders/{id}/process
#[tracing::instrument(skip(state))]
pub async fn process<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Actor(seller): Actor,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    let order_id = parse_aggregate_id(&id)?;
    Ok(Json(state.orders.process_order(seller, order_id).await?))
}

/// POST /orders/{id}/ship-complete: seller marks their details delivered.
#[tracing::instrument(skip(state))]
pub async fn seller_complete<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Actor(seller): Actor,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    let order_id = parse_aggregate_id(&id)?;
    Ok(Json(state.orders.seller_complete_order(seller, order_id).await?))
}

/// POST /orders/{id}/complete: buyer confirms receipt.
#[tracing::instrument(skip(state))]
pub async fn complete<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Actor(buyer): Actor,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    let order_id = parse_aggregate_id(&id)?;
    Ok(Json(state.orders.complete_order(buyer, order_id).await?))
}

/// POST /orders/{id}/cancel
#[tracing::instrument(skip(state, req))]
pub async fn cancel<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Actor(buyer): Actor,
    Path(id): Path<String>,
    Json(req): Json<CancelRequest>,
) -> Result<Json<Order>, ApiError> {
    let order_id = parse_aggregate_id(&id)?;
    Ok(Json(
        state.orders.cancel_order(buyer, order_id, &req.reason).await?,
    ))
}

/// POST /orders/{id}/seller-cancel
#[tracing::instrument(skip(state, req))]
pub async fn seller_cancel<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Actor(seller): Actor,
    Path(id): Path<String>,
    Json(req): Json<CancelRequest>,
) -> Result<Json<Order>, ApiError> {
    let order_id = parse_aggregate_id(&id)?;
    Ok(Json(
        state
            .orders
            .seller_cancel_order(seller, order_id, &req.reason)
            .await?,
    ))
}

/// POST /orders/{id}/refunds/settle: issue refunds a seller cancellation
/// still owes.
#[tracing::instrument(skip(state))]
pub async fn settle_refunds<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Actor(actor): Actor,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    let order_id = parse_aggregate_id(&id)?;
    Ok(Json(state.orders.settle_refunds(actor, order_id).await?))
}
