//! Seller promotion endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use domain::{NewPromotion, Promotion};
use event_store::EventStore;
use serde::Deserialize;

use super::parse_aggregate_id;
use crate::error::ApiError;
use crate::extract::Actor;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SetActiveRequest {
    pub active: bool,
}

/// POST /promotions
#[tracing::instrument(skip(state, req))]
pub async fn create<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Actor(seller): Actor,
    Json(req): Json<NewPromotion>,
) -> Result<(StatusCode, Json<Promotion>), ApiError> {
    let promotion = state
        .orders
        .promotions()
        .create_promotion(seller, req)
        .await?;
    Ok((StatusCode::CREATED, Json(promotion)))
}

/// GET /promotions/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<Promotion>, ApiError> {
    let promotion_id = parse_aggregate_id(&id)?;
    let promotion = state
        .orders
        .promotions()
        .get_promotion(promotion_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Promotion {id} not found")))?;
    Ok(Json(promotion))
}

/// POST /promotions/{id}/active: switch a promotion on or off.
#[tracing::instrument(skip(state))]
pub async fn set_active<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Actor(seller): Actor,
    Path(id): Path<String>,
    Json(req): Json<SetActiveRequest>,
) -> Result<Json<Promotion>, ApiError> {
    let promotion_id = parse_aggregate_id(&id)?;
    let promotion = state
        .orders
        .promotions()
        .set_active(seller, promotion_id, req.active)
        .await?;
    Ok(Json(promotion))
}
