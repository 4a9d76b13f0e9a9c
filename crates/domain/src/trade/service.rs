//! Trade service wrapping the command handler.

use chrono::Utc;
use common::AggregateId;
use event_store::EventStore;

use crate::command::{CommandHandler, CommandResult};
use crate::error::DomainError;
use crate::value_objects::{AccountId, ProductId, ProposalId};

use super::{TradePost, TradePostStatus};

/// Service for trade posts and their negotiations.
///
/// Every mutation of a post, accepting included, is an append conditional on
/// the post's version. Two concurrent accepts therefore cannot both land: the
/// loser decides again against a completed post and fails.
pub struct TradeService<S: EventStore> {
    handler: CommandHandler<S, TradePost>,
}

impl<S: EventStore> TradeService<S> {
    pub fn new(store: S) -> Self {
        Self {
            handler: CommandHandler::new(store),
        }
    }

    pub fn with_retry_limit(mut self, retry_limit: usize) -> Self {
        self.handler = self.handler.with_retry_limit(retry_limit);
        self
    }

    #[tracing::instrument(skip(self, description))]
    pub async fn create_post(
        &self,
        author: AccountId,
        item_id: ProductId,
        title: &str,
        description: Option<String>,
    ) -> Result<CommandResult<TradePost>, DomainError> {
        let post_id = AggregateId::new();
        let now = Utc::now();
        self.handler
            .execute(post_id, Some(author), |post| {
                post.create(
                    post_id,
                    author,
                    item_id.clone(),
                    title,
                    description.clone(),
                    now,
                )
            })
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn moderate(
        &self,
        post_id: AggregateId,
        moderator: AccountId,
        status: TradePostStatus,
    ) -> Result<CommandResult<TradePost>, DomainError> {
        let now = Utc::now();
        self.handler
            .execute_existing(post_id, Some(moderator), |post| {
                post.moderate(moderator, status, now)
            })
            .await
    }

    #[tracing::instrument(skip(self, items, message))]
    pub async fn propose(
        &self,
        post_id: AggregateId,
        proposer: AccountId,
        items: Vec<ProductId>,
        message: Option<String>,
    ) -> Result<(ProposalId, CommandResult<TradePost>), DomainError> {
        let proposal_id = ProposalId::new();
        let now = Utc::now();
        let result = self
            .handler
            .execute_existing(post_id, Some(proposer), |post| {
                post.propose(proposal_id, proposer, items.clone(), message.clone(), now)
            })
            .await?;

        metrics::counter!("trade_proposals_total", "kind" => "root").increment(1);
        Ok((proposal_id, result))
    }

    #[tracing::instrument(skip(self, items, message))]
    pub async fn counter(
        &self,
        post_id: AggregateId,
        countered: ProposalId,
        actor: AccountId,
        items: Vec<ProductId>,
        message: Option<String>,
    ) -> Result<(ProposalId, CommandResult<TradePost>), DomainError> {
        let proposal_id = ProposalId::new();
        let now = Utc::now();
        let result = self
            .handler
            .execute_existing(post_id, Some(actor), |post| {
                post.counter(
                    countered,
                    proposal_id,
                    actor,
                    items.clone(),
                    message.clone(),
                    now,
                )
            })
            .await?;

        metrics::counter!("trade_proposals_total", "kind" => "counter").increment(1);
        Ok((proposal_id, result))
    }

    #[tracing::instrument(skip(self))]
    pub async fn accept(
        &self,
        post_id: AggregateId,
        proposal_id: ProposalId,
        actor: AccountId,
    ) -> Result<CommandResult<TradePost>, DomainError> {
        let now = Utc::now();
        self.handler
            .execute_existing(post_id, Some(actor), |post| {
                post.accept(proposal_id, actor, now)
            })
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn reject(
        &self,
        post_id: AggregateId,
        proposal_id: ProposalId,
        actor: AccountId,
    ) -> Result<CommandResult<TradePost>, DomainError> {
        let now = Utc::now();
        self.handler
            .execute_existing(post_id, Some(actor), |post| {
                post.reject(proposal_id, actor, now)
            })
            .await
    }

    pub async fn get_post(&self, post_id: AggregateId) -> Result<Option<TradePost>, DomainError> {
        self.handler.load_existing(post_id).await
    }
}
