//! Trade post and proposal negotiation endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::AggregateId;
use domain::{
    AccountId, Aggregate, ProductId, ProposalId, TradePost, TradePostStatus, TradeProposal,
};
use event_store::EventStore;
use projections::TradePostSummary;
use serde::{Deserialize, Serialize};

use super::{parse_aggregate_id, parse_proposal_id};
use crate::error::ApiError;
use crate::extract::Actor;
use crate::state::AppState;

// -- Request types --

#[derive(Debug, Deserialize)]
pub struct CreateTradeRequest {
    pub item_id: ProductId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListTradesQuery {
    #[serde(default)]
    pub status: Option<TradePostStatus>,
}

#[derive(Debug, Deserialize)]
pub struct ModerateRequest {
    pub status: TradePostStatus,
}

#[derive(Debug, Deserialize)]
pub struct OfferRequest {
    pub items: Vec<ProductId>,
    #[serde(default)]
    pub message: Option<String>,
}

// -- Response types --

/// A post with its proposals in creation order.
#[derive(Serialize)]
pub struct TradePostResponse {
    pub id: Option<AggregateId>,
    pub author: Option<AccountId>,
    pub item_id: Option<ProductId>,
    pub title: String,
    pub description: Option<String>,
    pub status: TradePostStatus,
    pub completed_proposal: Option<ProposalId>,
    pub proposals: Vec<TradeProposal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<TradePost> for TradePostResponse {
    fn from(post: TradePost) -> Self {
        Self {
            id: post.id(),
            author: post.author(),
            item_id: post.item_id().cloned(),
            title: post.title().to_string(),
            description: post.description().map(str::to_string),
            status: post.status(),
            completed_proposal: post.completed_proposal(),
            proposals: post.proposals().into_iter().cloned().collect(),
            created_at: post.created_at(),
            updated_at: post.updated_at(),
        }
    }
}

#[derive(Serialize)]
pub struct ProposalCreatedResponse {
    pub proposal_id: ProposalId,
    pub post: TradePostResponse,
}

/// POST /trades: offer an opened item for barter.
#[tracing::instrument(skip(state))]
pub async fn create<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Actor(author): Actor,
    Json(req): Json<CreateTradeRequest>,
) -> Result<(StatusCode, Json<TradePostResponse>), ApiError> {
    let post = state
        .trades
        .create_trade(author, req.item_id, &req.title, req.description)
        .await?;
    Ok((StatusCode::CREATED, Json(post.into())))
}

/// GET /trades?status=
#[tracing::instrument(skip(state))]
pub async fn list<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Query(query): Query<ListTradesQuery>,
) -> Result<Json<Vec<TradePostSummary>>, ApiError> {
    Ok(Json(state.trades.list_posts(query.status).await?))
}

/// GET /trades/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<TradePostResponse>, ApiError> {
    let post_id = parse_aggregate_id(&id)?;
    Ok(Json(state.trades.get_post(post_id).await?.into()))
}

/// POST /trades/{id}/moderate: admin review of a post.
#[tracing::instrument(skip(state))]
pub async fn moderate<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Actor(admin): Actor,
    Path(id): Path<String>,
    Json(req): Json<ModerateRequest>,
) -> Result<Json<TradePostResponse>, ApiError> {
    let post_id = parse_aggregate_id(&id)?;
    let post = state.trades.moderate_post(admin, post_id, req.status).await?;
    Ok(Json(post.into()))
}

/// POST /trades/{id}/proposals
#[tracing::instrument(skip(state))]
pub async fn propose<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Actor(proposer): Actor,
    Path(id): Path<String>,
    Json(req): Json<OfferRequest>,
) -> Result<(StatusCode, Json<ProposalCreatedResponse>), ApiError> {
    let post_id = parse_aggregate_id(&id)?;
    let (proposal_id, post) = state
        .trades
        .propose_trade(post_id, proposer, req.items, req.message)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ProposalCreatedResponse {
            proposal_id,
            post: post.into(),
        }),
    ))
}

/// POST /proposals/{id}/counter
#[tracing::instrument(skip(state))]
pub async fn counter<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Actor(actor): Actor,
    Path(id): Path<String>,
    Json(req): Json<OfferRequest>,
) -> Result<(StatusCode, Json<ProposalCreatedResponse>), ApiError> {
    let proposal_id = parse_proposal_id(&id)?;
    let (counter_id, post) = state
        .trades
        .create_counter_offer(proposal_id, actor, req.items, req.message)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ProposalCreatedResponse {
            proposal_id: counter_id,
            post: post.into(),
        }),
    ))
}

/// POST /proposals/{id}/accept
#[tracing::instrument(skip(state))]
pub async fn accept<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Actor(actor): Actor,
    Path(id): Path<String>,
) -> Result<Json<TradePostResponse>, ApiError> {
    let proposal_id = parse_proposal_id(&id)?;
    let post = state.trades.accept_proposal(proposal_id, actor).await?;
    Ok(Json(post.into()))
}

/// POST /proposals/{id}/reject
#[tracing::instrument(skip(state))]
pub async fn reject<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Actor(actor): Actor,
    Path(id): Path<String>,
) -> Result<Json<TradePostResponse>, ApiError> {
    let proposal_id = parse_proposal_id(&id)?;
    let post = state.trades.reject_proposal(proposal_id, actor).await?;
    Ok(Json(post.into()))
}
