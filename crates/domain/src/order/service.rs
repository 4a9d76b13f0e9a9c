//! Order service wrapping the command handler.

use chrono::Utc;
use common::AggregateId;
use event_store::{EventEnvelope, EventStore};

use crate::command::{CommandHandler, CommandResult};
use crate::error::DomainError;
use crate::value_objects::{AccountId, Money};

use super::{Order, PlaceOrder, SellerTransition};

/// Service for placing orders and moving them through fulfillment.
///
/// Every method decides against a freshly loaded order and appends with the
/// version it loaded, so concurrent sellers never overwrite each other's
/// view of the aggregated status.
pub struct OrderService<S: EventStore> {
    handler: CommandHandler<S, Order>,
}

impl<S: EventStore> OrderService<S> {
    pub fn new(store: S) -> Self {
        Self {
            handler: CommandHandler::new(store),
        }
    }

    pub fn with_retry_limit(mut self, retry_limit: usize) -> Self {
        self.handler = self.handler.with_retry_limit(retry_limit);
        self
    }

    pub fn handler(&self) -> &CommandHandler<S, Order> {
        &self.handler
    }

    #[tracing::instrument(skip(self, cmd), fields(order_id = %cmd.order_id, buyer = %cmd.buyer))]
    pub async fn place_order(&self, cmd: PlaceOrder) -> Result<CommandResult<Order>, DomainError> {
        let now = Utc::now();
        let order_id = cmd.order_id;
        let buyer = cmd.buyer;

        self.handler
            .execute(order_id, Some(buyer), |order| order.place(cmd.clone(), now))
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn advance(
        &self,
        order_id: AggregateId,
        seller: AccountId,
        transition: SellerTransition,
    ) -> Result<CommandResult<Order>, DomainError> {
        let now = Utc::now();
        self.handler
            .execute_existing(order_id, Some(seller), |order| {
                order.advance(seller, transition, now)
            })
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn cancel_by_buyer(
        &self,
        order_id: AggregateId,
        buyer: AccountId,
        reason: &str,
    ) -> Result<CommandResult<Order>, DomainError> {
        let now = Utc::now();
        self.handler
            .execute_existing(order_id, Some(buyer), |order| {
                order.cancel_by_buyer(buyer, reason, now)
            })
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn cancel_by_seller(
        &self,
        order_id: AggregateId,
        seller: AccountId,
        reason: &str,
    ) -> Result<CommandResult<Order>, DomainError> {
        let now = Utc::now();
        self.handler
            .execute_existing(order_id, Some(seller), |order| {
                order.cancel_by_seller(seller, reason, now)
            })
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn complete_by_buyer(
        &self,
        order_id: AggregateId,
        buyer: AccountId,
    ) -> Result<CommandResult<Order>, DomainError> {
        let now = Utc::now();
        self.handler
            .execute_existing(order_id, Some(buyer), |order| {
                order.complete_by_buyer(buyer, now)
            })
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn force_complete(
        &self,
        order_id: AggregateId,
    ) -> Result<CommandResult<Order>, DomainError> {
        let now = Utc::now();
        self.handler
            .execute_existing(order_id, None, |order| order.force_complete(now))
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn record_refund(
        &self,
        order_id: AggregateId,
        promotion_id: AggregateId,
        seller: AccountId,
        amount: Money,
    ) -> Result<CommandResult<Order>, DomainError> {
        let now = Utc::now();
        self.handler
            .execute_existing(order_id, Some(seller), |order| {
                order.record_refund(promotion_id, seller, amount, now)
            })
            .await
    }

    /// Returns None if the order was never placed.
    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, order_id: AggregateId) -> Result<Option<Order>, DomainError> {
        self.handler.load_existing(order_id).await
    }

    /// Raw stored events of one order, oldest first.
    pub async fn history(&self, order_id: AggregateId) -> Result<Vec<EventEnvelope>, DomainError> {
        Ok(self.handler.store().load_stream(order_id).await?)
    }
}
