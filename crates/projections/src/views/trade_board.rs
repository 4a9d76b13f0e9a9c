//! Trade board: posts by status and the proposal to post index.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::AggregateId;
use domain::{
    AccountId, Aggregate, ProductId, ProposalId, TradeEvent, TradePost, TradePostStatus,
};
use event_store::EventEnvelope;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::Result;
use crate::projection::{Projection, ProjectionPosition};
use crate::read_model::ReadModel;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TradePostSummary {
    pub post_id: AggregateId,
    pub author: Option<AccountId>,
    pub item_id: Option<ProductId>,
    pub title: String,
    pub status: TradePostStatus,
    pub proposal_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TradePostSummary {
    fn of(post_id: AggregateId, post: &TradePost) -> Self {
        Self {
            post_id,
            author: post.author(),
            item_id: post.item_id().cloned(),
            title: post.title().to_string(),
            status: post.status(),
            proposal_count: post.proposals().len(),
            created_at: post.created_at(),
            updated_at: post.updated_at(),
        }
    }
}

#[derive(Default)]
struct TradeBoardState {
    posts: HashMap<AggregateId, TradePost>,
    post_of_proposal: HashMap<ProposalId, AggregateId>,
    position: ProjectionPosition,
}

/// Read model over every trade post.
///
/// Proposal ids are global, but a proposal only lives inside its post's
/// stream; this view is how a bare proposal id finds its post.
#[derive(Clone, Default)]
pub struct TradeBoardView {
    state: Arc<RwLock<TradeBoardState>>,
}

impl TradeBoardView {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn post_for_proposal(&self, proposal_id: ProposalId) -> Option<AggregateId> {
        self.state
            .read()
            .await
            .post_of_proposal
            .get(&proposal_id)
            .copied()
    }

    pub async fn get(&self, post_id: AggregateId) -> Option<TradePostSummary> {
        let state = self.state.read().await;
        state
            .posts
            .get(&post_id)
            .map(|p| TradePostSummary::of(post_id, p))
    }

    /// Posts, newest first, optionally restricted to one status.
    pub async fn list(&self, status: Option<TradePostStatus>) -> Vec<TradePostSummary> {
        let state = self.state.read().await;
        let mut rows: Vec<_> = state
            .posts
            .iter()
            .filter(|(_, p)| status.is_none_or(|s| p.status() == s))
            .map(|(id, p)| TradePostSummary::of(*id, p))
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows
    }

    pub async fn by_author(&self, author: AccountId) -> Vec<TradePostSummary> {
        let mut rows = self.list(None).await;
        rows.retain(|r| r.author == Some(author));
        rows
    }
}

#[async_trait]
impl Projection for TradeBoardView {
    fn name(&self) -> &'static str {
        "TradeBoardView"
    }

    async fn handle(&self, event: &EventEnvelope) -> Result<()> {
        let mut state = self.state.write().await;
        if state.position.covers(event.position) {
            return Ok(());
        }
        state.position = ProjectionPosition::at(event.position);
        if event.aggregate_type != TradePost::aggregate_type() {
            return Ok(());
        }

        let trade_event: TradeEvent = serde_json::from_value(event.payload.clone())?;
        let post_id = event.aggregate_id;

        match &trade_event {
            TradeEvent::ProposalSubmitted(data) => {
                state.post_of_proposal.insert(data.proposal_id, post_id);
            }
            TradeEvent::CounterOffered(data) => {
                state.post_of_proposal.insert(data.proposal_id, post_id);
            }
            _ => {}
        }

        let post = state.posts.entry(post_id).or_default();
        post.apply(trade_event);
        post.set_version(event.version);
        Ok(())
    }

    async fn position(&self) -> ProjectionPosition {
        self.state.read().await.position
    }

    async fn reset(&self) -> Result<()> {
        *self.state.write().await = TradeBoardState::default();
        Ok(())
    }
}

impl ReadModel for TradeBoardView {
    fn name(&self) -> &'static str {
        "TradeBoardView"
    }

    fn count(&self) -> usize {
        self.state.try_read().map(|s| s.posts.len()).unwrap_or(0)
    }
}
