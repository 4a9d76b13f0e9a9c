//! Order manager: seller fulfillment, cancellations and completion.
//!
//! Checkout lives in [`crate::checkout`]; both halves share [`OrderManager`].

use chrono::{DateTime, Duration, Utc};
use common::AggregateId;
use domain::{
    AccountId, CommandResult, DomainError, Order, OrderEvent, OrderService, OrderStatus,
    PromotionService, SellerCancellation, SellerTransition,
};
use event_store::{EventEnvelope, EventStore};
use projections::{OrderBoardView, OrderSummary, ProjectionProcessor};
use serde::Serialize;

use crate::error::{MarketplaceError, Result};
use crate::services::notifications::notify_quietly;
use crate::services::{CartStore, Catalog, NotificationKind, NotificationSink};

/// Orders the sweep could not complete, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedOrder {
    pub order_id: AggregateId,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ForceCompleteReport {
    pub completed: Vec<AggregateId>,
    pub skipped: Vec<SkippedOrder>,
}

/// Drives orders from checkout to completion.
///
/// Owns the order and promotion services plus the order board, and talks to
/// the catalog for stock, the cart for checkout lines and the notification
/// sink for the other party of every transition.
pub struct OrderManager<S, C, K, N>
where
    S: EventStore,
    C: Catalog,
    K: CartStore,
    N: NotificationSink,
{
    pub(crate) orders: OrderService<S>,
    pub(crate) promotions: PromotionService<S>,
    pub(crate) catalog: C,
    pub(crate) carts: K,
    pub(crate) notifier: N,
    processor: ProjectionProcessor<S>,
    board: OrderBoardView,
}

impl<S, C, K, N> OrderManager<S, C, K, N>
where
    S: EventStore + Clone,
    C: Catalog,
    K: CartStore,
    N: NotificationSink,
{
    pub fn new(store: S, catalog: C, carts: K, notifier: N) -> Self {
        let board = OrderBoardView::new();
        let mut processor = ProjectionProcessor::new(store.clone());
        processor.register(Box::new(board.clone()));

        Self {
            orders: OrderService::new(store.clone()),
            promotions: PromotionService::new(store),
            catalog,
            carts,
            notifier,
            processor,
            board,
        }
    }

    /// Bounds how often a command is re-decided after a version conflict.
    pub fn with_retry_limit(mut self, retry_limit: usize) -> Self {
        self.orders = self.orders.with_retry_limit(retry_limit);
        self.promotions = self.promotions.with_retry_limit(retry_limit);
        self
    }

    pub fn promotions(&self) -> &PromotionService<S> {
        &self.promotions
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    #[tracing::instrument(skip(self))]
    pub async fn confirm_order(&self, seller: AccountId, order_id: AggregateId) -> Result<Order> {
        self.advance(seller, order_id, SellerTransition::Confirm).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn process_order(&self, seller: AccountId, order_id: AggregateId) -> Result<Order> {
        self.advance(seller, order_id, SellerTransition::Process).await
    }

    /// Seller marks their shipped details as delivered.
    #[tracing::instrument(skip(self))]
    pub async fn seller_complete_order(
        &self,
        seller: AccountId,
        order_id: AggregateId,
    ) -> Result<Order> {
        self.advance(seller, order_id, SellerTransition::Complete).await
    }

    async fn advance(
        &self,
        seller: AccountId,
        order_id: AggregateId,
        transition: SellerTransition,
    ) -> Result<Order> {
        let result = self.orders.advance(order_id, seller, transition).await?;
        let order = result.aggregate;

        metrics::counter!("order_transitions_total", "transition" => transition.as_str())
            .increment(1);
        tracing::info!(%order_id, %seller, status = %order.status(), "order advanced");

        if let Some(buyer) = order.buyer() {
            notify_quietly(
                &self.notifier,
                buyer,
                NotificationKind::OrderStatusChanged,
                status_payload(order_id, &order),
            )
            .await;
        }
        Ok(order)
    }

    /// Buyer withdraws a pending order. Stock of every line goes back.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_order(
        &self,
        buyer: AccountId,
        order_id: AggregateId,
        reason: &str,
    ) -> Result<Order> {
        let result = self.orders.cancel_by_buyer(order_id, buyer, reason).await?;
        self.restore_cancelled_stock(&result).await;

        metrics::counter!("orders_cancelled_total", "by" => "buyer").increment(1);
        tracing::info!(%order_id, %buyer, "order cancelled by buyer");

        let order = result.aggregate;
        for seller in order.sellers() {
            notify_quietly(
                &self.notifier,
                seller,
                NotificationKind::OrderCancelled,
                status_payload(order_id, &order),
            )
            .await;
        }
        Ok(order)
    }

    /// Seller drops their pending or confirmed details.
    ///
    /// The order total shrinks by the cancelled subtotal. A prepaid order
    /// additionally gets a single-use refund promotion for that amount,
    /// issued to the buyer and recorded on the order. If the refund fails
    /// after the cancellation is stored, [`Self::settle_refunds`] issues it
    /// later.
    #[tracing::instrument(skip(self))]
    pub async fn seller_cancel_order(
        &self,
        seller: AccountId,
        order_id: AggregateId,
        reason: &str,
    ) -> Result<Order> {
        let result = self.orders.cancel_by_seller(order_id, seller, reason).await?;
        self.restore_cancelled_stock(&result).await;
        metrics::counter!("orders_cancelled_total", "by" => "seller").increment(1);

        let mut order = result.aggregate;
        let Some(buyer) = order.buyer() else {
            return Ok(order);
        };
        tracing::info!(%order_id, %seller, status = %order.status(), "details cancelled by seller");

        order = self.issue_pending_refunds(order_id, order).await?;

        notify_quietly(
            &self.notifier,
            buyer,
            NotificationKind::OrderCancelled,
            status_payload(order_id, &order),
        )
        .await;
        Ok(order)
    }

    /// Issues every refund the order's seller cancellations still owe.
    ///
    /// Refund ids derive from the order and the seller, so repeated calls
    /// never issue a second promotion for the same cancellation.
    #[tracing::instrument(skip(self))]
    pub async fn settle_refunds(&self, actor: AccountId, order_id: AggregateId) -> Result<Order> {
        let order = self.get_order(actor, order_id).await?;
        self.issue_pending_refunds(order_id, order).await
    }

    async fn issue_pending_refunds(&self, order_id: AggregateId, mut order: Order) -> Result<Order> {
        let Some(buyer) = order.buyer() else {
            return Ok(order);
        };
        let pending: Vec<SellerCancellation> =
            order.pending_refunds().into_iter().cloned().collect();

        for cancellation in pending {
            let SellerCancellation {
                seller,
                amount,
                reason,
                ..
            } = cancellation;
            let promotion_id = order
                .refund_promotion_id(seller)
                .ok_or_else(|| MarketplaceError::not_found("Order", order_id))?;
            let note = format!("Seller cancelled part of order {order_id}: {reason}");

            if let Err(e) = self
                .promotions
                .issue_refund(promotion_id, seller, buyer, amount, &note, order_id)
                .await
            {
                tracing::error!(%order_id, %seller, %amount, error = %e, "refund could not be issued");
                return Err(e.into());
            }
            order = self
                .orders
                .record_refund(order_id, promotion_id, seller, amount)
                .await?
                .aggregate;

            notify_quietly(
                &self.notifier,
                buyer,
                NotificationKind::RefundIssued,
                serde_json::json!({
                    "order_id": order_id,
                    "promotion_id": promotion_id,
                    "amount": amount,
                }),
            )
            .await;
        }
        Ok(order)
    }

    /// Buyer confirms receipt of an order in processing.
    #[tracing::instrument(skip(self))]
    pub async fn complete_order(&self, buyer: AccountId, order_id: AggregateId) -> Result<Order> {
        let order = self
            .orders
            .complete_by_buyer(order_id, buyer)
            .await?
            .aggregate;

        metrics::counter!("order_transitions_total", "transition" => "complete").increment(1);
        tracing::info!(%order_id, %buyer, "order completed by buyer");
        self.notify_sellers(order_id, &order, NotificationKind::OrderStatusChanged)
            .await;
        Ok(order)
    }

    /// Orders in `status` untouched for longer than `older_than`.
    pub async fn find_stale(
        &self,
        status: OrderStatus,
        older_than: Duration,
    ) -> Result<Vec<AggregateId>> {
        self.find_stale_at(status, older_than, Utc::now()).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn find_stale_at(
        &self,
        status: OrderStatus,
        older_than: Duration,
        now: DateTime<Utc>,
    ) -> Result<Vec<AggregateId>> {
        self.processor.run_catch_up().await?;
        Ok(self.board.stale(status, now - older_than).await)
    }

    /// Completes each order on the buyer's behalf.
    ///
    /// Orders that are no longer in processing, or no longer exist, are
    /// skipped and reported. Storage failures abort the run.
    #[tracing::instrument(skip(self, order_ids), fields(count = order_ids.len()))]
    pub async fn force_complete(&self, order_ids: &[AggregateId]) -> Result<ForceCompleteReport> {
        let mut report = ForceCompleteReport::default();

        for &order_id in order_ids {
            match self.orders.force_complete(order_id).await {
                Ok(result) => {
                    metrics::counter!("order_transitions_total", "transition" => "force_complete")
                        .increment(1);
                    self.notify_sellers(
                        order_id,
                        &result.aggregate,
                        NotificationKind::OrderStatusChanged,
                    )
                    .await;
                    report.completed.push(order_id);
                }
                Err(e @ (DomainError::Order(_) | DomainError::AggregateNotFound { .. })) => {
                    tracing::warn!(%order_id, reason = %e, "order skipped by force completion");
                    report.skipped.push(SkippedOrder {
                        order_id,
                        reason: e.to_string(),
                    });
                }
                Err(e) => return Err(e.into()),
            }
        }

        tracing::info!(
            completed = report.completed.len(),
            skipped = report.skipped.len(),
            "force completion finished"
        );
        Ok(report)
    }

    /// The order, visible to its buyer and to sellers with a detail in it.
    pub async fn get_order(&self, actor: AccountId, order_id: AggregateId) -> Result<Order> {
        let order = self
            .orders
            .get_order(order_id)
            .await?
            .ok_or_else(|| MarketplaceError::not_found("Order", order_id))?;

        if order.buyer() != Some(actor) && !order.sellers().contains(&actor) {
            return Err(MarketplaceError::Forbidden(format!(
                "account {actor} is not a party to order {order_id}"
            )));
        }
        Ok(order)
    }

    /// Stored events of an order, oldest first.
    pub async fn order_events(
        &self,
        actor: AccountId,
        order_id: AggregateId,
    ) -> Result<Vec<EventEnvelope>> {
        self.get_order(actor, order_id).await?;
        Ok(self.orders.history(order_id).await?)
    }

    pub async fn orders_for_buyer(&self, buyer: AccountId) -> Result<Vec<OrderSummary>> {
        self.processor.run_catch_up().await?;
        Ok(self.board.for_buyer(buyer).await)
    }

    pub async fn orders_for_seller(&self, seller: AccountId) -> Result<Vec<OrderSummary>> {
        self.processor.run_catch_up().await?;
        Ok(self.board.for_seller(seller).await)
    }

    /// Puts the stock of freshly cancelled details back.
    ///
    /// The cancellation is already stored at this point, so a failed
    /// restoration is logged rather than returned.
    async fn restore_cancelled_stock(&self, result: &CommandResult<Order>) {
        for event in &result.events {
            let OrderEvent::DetailsCancelled(data) = event else {
                continue;
            };
            for detail_id in &data.detail_ids {
                let Some(detail) = result.aggregate.detail(*detail_id) else {
                    continue;
                };
                if let Err(e) = self
                    .catalog
                    .adjust_stock(&detail.product_id, i64::from(detail.quantity))
                    .await
                {
                    tracing::error!(
                        product_id = %detail.product_id,
                        quantity = detail.quantity,
                        error = %e,
                        "stock restoration failed"
                    );
                }
            }
        }
    }

    pub(crate) async fn notify_sellers(
        &self,
        order_id: AggregateId,
        order: &Order,
        kind: NotificationKind,
    ) {
        for seller in order.sellers() {
            notify_quietly(&self.notifier, seller, kind, status_payload(order_id, order)).await;
        }
    }
}

pub(crate) fn status_payload(order_id: AggregateId, order: &Order) -> serde_json::Value {
    serde_json::json!({
        "order_id": order_id,
        "status": order.status(),
        "total_price": order.total_price(),
    })
}

#[cfg(test)]
mod tests {
    use domain::{Aggregate, Money, OrderLine, PaymentMethod, PlaceOrder, ProductId};
    use event_store::{EventQuery, InMemoryEventStore};

    use super::*;
    use crate::services::{InMemoryCart, InMemoryCatalog, RecordingNotifier};
    use crate::testing::FlakyStore;

    type Manager = OrderManager<InMemoryEventStore, InMemoryCatalog, InMemoryCart, RecordingNotifier>;

    fn manager() -> Manager {
        OrderManager::new(
            InMemoryEventStore::new(),
            InMemoryCatalog::new(),
            InMemoryCart::new(),
            RecordingNotifier::new(),
        )
    }

    type FlakyManager = OrderManager<FlakyStore, InMemoryCatalog, InMemoryCart, RecordingNotifier>;

    fn flaky_manager() -> (FlakyStore, FlakyManager) {
        let store = FlakyStore::default();
        let manager = OrderManager::new(
            store.clone(),
            InMemoryCatalog::new(),
            InMemoryCart::new(),
            RecordingNotifier::new(),
        );
        (store, manager)
    }

    async fn place(manager: &Manager, buyer: AccountId, sellers: &[AccountId]) -> AggregateId {
        place_paid(manager, buyer, sellers, PaymentMethod::CashOnDelivery).await
    }

    async fn place_paid<S: EventStore + Clone>(
        manager: &OrderManager<S, InMemoryCatalog, InMemoryCart, RecordingNotifier>,
        buyer: AccountId,
        sellers: &[AccountId],
        payment_method: PaymentMethod,
    ) -> AggregateId {
        let lines: Vec<OrderLine> = sellers
            .iter()
            .map(|seller| OrderLine {
                detail_id: domain::DetailId::new(),
                product_id: ProductId::new("box"),
                product_name: "Box".to_string(),
                unit_price: Money::new(50_000),
                image: None,
                quantity: 1,
                seller: *seller,
            })
            .collect();
        let total = Money::new(50_000 * sellers.len() as i64);
        let cmd = PlaceOrder::new(AggregateId::new(), buyer, lines, total)
            .payment_method(payment_method);
        let result = manager.orders.place_order(cmd).await.unwrap();
        result.aggregate.id().unwrap()
    }

    async fn refunds_created(store: &FlakyStore) -> usize {
        store
            .query_events(EventQuery::new().event_type("PromotionCreated"))
            .await
            .unwrap()
            .len()
    }

    #[tokio::test]
    async fn refund_that_failed_to_issue_is_settled_once() {
        let (store, manager) = flaky_manager();
        let (buyer, a, b) = (AccountId::new(), AccountId::new(), AccountId::new());
        let order_id = place_paid(&manager, buyer, &[a, b], PaymentMethod::Banking).await;

        store.fail("PromotionCreated");
        assert!(manager.seller_cancel_order(a, order_id, "sold out").await.is_err());
        assert!(manager.settle_refunds(buyer, order_id).await.is_err());

        let order = manager.get_order(buyer, order_id).await.unwrap();
        assert_eq!(order.status(), OrderStatus::PartiallyCancelled);
        assert!(order.refunds().is_empty());
        assert_eq!(order.pending_refunds().len(), 1);

        store.recover();
        let order = manager.settle_refunds(buyer, order_id).await.unwrap();
        assert_eq!(order.refunds().len(), 1);
        assert_eq!(order.refunds()[0].seller, a);
        assert_eq!(order.refunds()[0].amount, Money::new(50_000));
        assert!(order.pending_refunds().is_empty());

        let again = manager.settle_refunds(a, order_id).await.unwrap();
        assert_eq!(again.refunds().len(), 1);
        assert_eq!(refunds_created(&store).await, 1);
        let refund_notices = manager
            .notifier
            .sent_to(buyer)
            .await
            .into_iter()
            .filter(|k| *k == NotificationKind::RefundIssued)
            .count();
        assert_eq!(refund_notices, 1);
    }

    #[tokio::test]
    async fn refund_issued_but_not_recorded_is_recorded_once() {
        let (store, manager) = flaky_manager();
        let (buyer, seller) = (AccountId::new(), AccountId::new());
        let order_id = place_paid(&manager, buyer, &[seller], PaymentMethod::Banking).await;

        store.fail("RefundIssued");
        assert!(
            manager
                .seller_cancel_order(seller, order_id, "closing shop")
                .await
                .is_err()
        );
        let order = manager.get_order(buyer, order_id).await.unwrap();
        let promotion_id = order.refund_promotion_id(seller).unwrap();
        assert!(
            manager
                .promotions
                .get_promotion(promotion_id)
                .await
                .unwrap()
                .is_some()
        );

        store.recover();
        let order = manager.settle_refunds(buyer, order_id).await.unwrap();
        assert_eq!(order.status(), OrderStatus::Cancelled);
        assert_eq!(order.refunds().len(), 1);
        assert_eq!(order.refunds()[0].promotion_id, promotion_id);
        assert_eq!(refunds_created(&store).await, 1);
    }

    #[tokio::test]
    async fn settling_is_limited_to_parties_of_the_order() {
        let manager = manager();
        let (buyer, seller) = (AccountId::new(), AccountId::new());
        let order_id = place(&manager, buyer, &[seller]).await;

        let err = manager
            .settle_refunds(AccountId::new(), order_id)
            .await
            .unwrap_err();
        assert!(matches!(err, MarketplaceError::Forbidden(_)));
        let order = manager.settle_refunds(buyer, order_id).await.unwrap();
        assert!(order.refunds().is_empty());
    }

    #[tokio::test]
    async fn advancing_notifies_the_buyer() {
        let manager = manager();
        let (buyer, seller) = (AccountId::new(), AccountId::new());
        let order_id = place(&manager, buyer, &[seller]).await;

        let order = manager.confirm_order(seller, order_id).await.unwrap();
        assert_eq!(order.status(), OrderStatus::Confirmed);
        assert_eq!(
            manager.notifier.sent_to(buyer).await,
            vec![NotificationKind::OrderStatusChanged]
        );
    }

    #[tokio::test]
    async fn strangers_cannot_read_an_order() {
        let manager = manager();
        let (buyer, seller) = (AccountId::new(), AccountId::new());
        let order_id = place(&manager, buyer, &[seller]).await;

        assert!(manager.get_order(buyer, order_id).await.is_ok());
        assert!(manager.get_order(seller, order_id).await.is_ok());
        let err = manager
            .get_order(AccountId::new(), order_id)
            .await
            .unwrap_err();
        assert!(matches!(err, MarketplaceError::Forbidden(_)));

        let err = manager
            .get_order(buyer, AggregateId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, MarketplaceError::NotFound { entity: "Order", .. }));
    }

    #[tokio::test]
    async fn force_complete_reports_skipped_orders() {
        let manager = manager();
        let (buyer, seller) = (AccountId::new(), AccountId::new());
        let ready = place(&manager, buyer, &[seller]).await;
        manager.confirm_order(seller, ready).await.unwrap();
        manager.process_order(seller, ready).await.unwrap();
        let pending = place(&manager, buyer, &[seller]).await;
        let missing = AggregateId::new();

        let report = manager
            .force_complete(&[ready, pending, missing])
            .await
            .unwrap();

        assert_eq!(report.completed, vec![ready]);
        let skipped: Vec<_> = report.skipped.iter().map(|s| s.order_id).collect();
        assert_eq!(skipped, vec![pending, missing]);
    }

    #[tokio::test]
    async fn board_lists_orders_per_party() {
        let manager = manager();
        let buyer = AccountId::new();
        let (a, b) = (AccountId::new(), AccountId::new());
        place(&manager, buyer, &[a, b]).await;
        place(&manager, buyer, &[b]).await;

        assert_eq!(manager.orders_for_buyer(buyer).await.unwrap().len(), 2);
        assert_eq!(manager.orders_for_seller(a).await.unwrap().len(), 1);
        assert_eq!(manager.orders_for_seller(b).await.unwrap().len(), 2);
    }
}
