//! Trade manager: barter posts, proposals and counter-offers.

use common::AggregateId;
use domain::{
    AccountId, ProductId, ProposalId, TradeEvent, TradePost, TradePostStatus, TradeProposal,
    TradeService,
};
use event_store::EventStore;
use projections::{ProjectionProcessor, TradeBoardView, TradePostSummary};

use crate::error::{MarketplaceError, Result};
use crate::services::notifications::notify_quietly;
use crate::services::{
    AccountDirectory, Catalog, NotificationKind, NotificationSink, ProductCategory, Role,
};

/// Orchestrates trade posts on top of [`TradeService`].
///
/// Callers address proposals by id alone; the trade board maps each
/// proposal to the post whose stream holds it.
pub struct TradeManager<S, C, A, N>
where
    S: EventStore,
    C: Catalog,
    A: AccountDirectory,
    N: NotificationSink,
{
    trades: TradeService<S>,
    catalog: C,
    accounts: A,
    notifier: N,
    processor: ProjectionProcessor<S>,
    board: TradeBoardView,
}

impl<S, C, A, N> TradeManager<S, C, A, N>
where
    S: EventStore + Clone,
    C: Catalog,
    A: AccountDirectory,
    N: NotificationSink,
{
    pub fn new(store: S, catalog: C, accounts: A, notifier: N) -> Self {
        let board = TradeBoardView::new();
        let mut processor = ProjectionProcessor::new(store.clone());
        processor.register(Box::new(board.clone()));

        Self {
            trades: TradeService::new(store),
            catalog,
            accounts,
            notifier,
            processor,
            board,
        }
    }

    pub fn with_retry_limit(mut self, retry_limit: usize) -> Self {
        self.trades = self.trades.with_retry_limit(retry_limit);
        self
    }

    /// Opens a post offering one of the author's opened items.
    #[tracing::instrument(skip(self, description))]
    pub async fn create_trade(
        &self,
        author: AccountId,
        item_id: ProductId,
        title: &str,
        description: Option<String>,
    ) -> Result<TradePost> {
        let item = self
            .catalog
            .get_product(&item_id)
            .await?
            .ok_or_else(|| MarketplaceError::not_found("Product", &item_id))?;
        if item.category != ProductCategory::OpenedItem {
            return Err(MarketplaceError::InvalidInput(format!(
                "{item_id} is not an opened item"
            )));
        }

        let post = self
            .trades
            .create_post(author, item_id, title, description)
            .await?
            .aggregate;
        tracing::info!(%author, title, "trade post created");
        Ok(post)
    }

    #[tracing::instrument(skip(self, items, message))]
    pub async fn propose_trade(
        &self,
        post_id: AggregateId,
        proposer: AccountId,
        items: Vec<ProductId>,
        message: Option<String>,
    ) -> Result<(ProposalId, TradePost)> {
        self.ensure_items_exist(&items).await?;
        let (proposal_id, result) = self
            .trades
            .propose(post_id, proposer, items, message)
            .await?;
        let post = result.aggregate;

        if let Some(author) = post.author() {
            notify_quietly(
                &self.notifier,
                author,
                NotificationKind::TradeProposalReceived,
                serde_json::json!({ "post_id": post_id, "proposal_id": proposal_id }),
            )
            .await;
        }
        Ok((proposal_id, post))
    }

    /// Answers a proposal with a new one from the other side of the chain.
    #[tracing::instrument(skip(self, items, message))]
    pub async fn create_counter_offer(
        &self,
        proposal_id: ProposalId,
        actor: AccountId,
        items: Vec<ProductId>,
        message: Option<String>,
    ) -> Result<(ProposalId, TradePost)> {
        let post_id = self.post_of(proposal_id).await?;
        self.ensure_items_exist(&items).await?;
        let (counter_id, result) = self
            .trades
            .counter(post_id, proposal_id, actor, items, message)
            .await?;
        let post = result.aggregate;

        if let Some(countered) = post.proposal(proposal_id) {
            notify_quietly(
                &self.notifier,
                countered.proposer,
                NotificationKind::TradeCounterOffered,
                serde_json::json!({
                    "post_id": post_id,
                    "countered": proposal_id,
                    "proposal_id": counter_id,
                }),
            )
            .await;
        }
        Ok((counter_id, post))
    }

    /// Author accepts a proposal; every other open proposal is rejected and
    /// the post completes.
    #[tracing::instrument(skip(self))]
    pub async fn accept_proposal(
        &self,
        proposal_id: ProposalId,
        actor: AccountId,
    ) -> Result<TradePost> {
        let post_id = self.post_of(proposal_id).await?;
        let result = self.trades.accept(post_id, proposal_id, actor).await?;
        let post = result.aggregate;

        let rejected: Vec<ProposalId> = result
            .events
            .iter()
            .flat_map(|e| match e {
                TradeEvent::ProposalAccepted(data) => data.rejected.clone(),
                _ => Vec::new(),
            })
            .collect();
        tracing::info!(%post_id, %proposal_id, rejected = rejected.len(), "trade completed");

        if let Some(accepted) = post.proposal(proposal_id) {
            notify_quietly(
                &self.notifier,
                accepted.proposer,
                NotificationKind::TradeProposalAccepted,
                serde_json::json!({ "post_id": post_id, "proposal_id": proposal_id }),
            )
            .await;
        }
        for id in rejected {
            if let Some(proposal) = post.proposal(id).filter(|p| p.proposer != actor) {
                notify_quietly(
                    &self.notifier,
                    proposal.proposer,
                    NotificationKind::TradeProposalRejected,
                    serde_json::json!({ "post_id": post_id, "proposal_id": id }),
                )
                .await;
            }
        }
        Ok(post)
    }

    /// Rejects a proposal together with the later offers of its chain.
    #[tracing::instrument(skip(self))]
    pub async fn reject_proposal(
        &self,
        proposal_id: ProposalId,
        actor: AccountId,
    ) -> Result<TradePost> {
        let post_id = self.post_of(proposal_id).await?;
        let result = self.trades.reject(post_id, proposal_id, actor).await?;
        let post = result.aggregate;

        let mut parties: Vec<AccountId> = result
            .events
            .iter()
            .flat_map(|e| match e {
                TradeEvent::ProposalsRejected(data) => data.rejected.clone(),
                _ => Vec::new(),
            })
            .filter_map(|id| post.proposal(id).map(|p| p.proposer))
            .chain(post.author())
            .filter(|account| *account != actor)
            .collect();
        parties.sort();
        parties.dedup();

        for account in parties {
            notify_quietly(
                &self.notifier,
                account,
                NotificationKind::TradeProposalRejected,
                serde_json::json!({ "post_id": post_id, "proposal_id": proposal_id }),
            )
            .await;
        }
        Ok(post)
    }

    /// Admin review of a post waiting for approval.
    #[tracing::instrument(skip(self))]
    pub async fn moderate_post(
        &self,
        admin: AccountId,
        post_id: AggregateId,
        status: TradePostStatus,
    ) -> Result<TradePost> {
        let account = self.accounts.get_account(admin).await?;
        if account.map(|a| a.role) != Some(Role::Admin) {
            return Err(MarketplaceError::Forbidden(format!(
                "account {admin} is not an admin"
            )));
        }

        let post = self
            .trades
            .moderate(post_id, admin, status)
            .await?
            .aggregate;
        if let Some(author) = post.author() {
            notify_quietly(
                &self.notifier,
                author,
                NotificationKind::TradePostModerated,
                serde_json::json!({ "post_id": post_id, "status": post.status() }),
            )
            .await;
        }
        Ok(post)
    }

    pub async fn get_post(&self, post_id: AggregateId) -> Result<TradePost> {
        self.trades
            .get_post(post_id)
            .await?
            .ok_or_else(|| MarketplaceError::not_found("TradePost", post_id))
    }

    /// Posts, newest first, optionally restricted to one status.
    pub async fn list_posts(&self, status: Option<TradePostStatus>) -> Result<Vec<TradePostSummary>> {
        self.processor.run_catch_up().await?;
        Ok(self.board.list(status).await)
    }

    /// Proposals of a post in creation order.
    pub async fn proposals_for_post(&self, post_id: AggregateId) -> Result<Vec<TradeProposal>> {
        let post = self.get_post(post_id).await?;
        Ok(post.proposals().into_iter().cloned().collect())
    }

    async fn post_of(&self, proposal_id: ProposalId) -> Result<AggregateId> {
        self.processor.run_catch_up().await?;
        self.board
            .post_for_proposal(proposal_id)
            .await
            .ok_or_else(|| MarketplaceError::not_found("Proposal", proposal_id))
    }

    async fn ensure_items_exist(&self, items: &[ProductId]) -> Result<()> {
        for item in items {
            if self.catalog.get_product(item).await?.is_none() {
                return Err(MarketplaceError::not_found("Product", item));
            }
        }
        Ok(())
    }
}
