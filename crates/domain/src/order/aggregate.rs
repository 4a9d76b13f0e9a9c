//! Order aggregate implementation.

use chrono::{DateTime, Utc};
use common::AggregateId;
use event_store::Version;
use serde::Serialize;
use uuid::Uuid;

use crate::aggregate::Aggregate;
use crate::value_objects::{AccountId, DetailId, Money, PaymentMethod, ProductId, ReceiverInfo};

use super::{
    CancelledBy, CompletedBy, FulfillmentStage, OrderError, OrderEvent, OrderStatus, PlaceOrder,
    SellerTransition, aggregate_status,
    events::{DetailsCancelledData, OrderCompletedData, OrderLine, OrderPlacedData},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusHistoryEntry {
    pub status: OrderStatus,
    pub at: DateTime<Utc>,
    pub reason: Option<String>,
    /// Details touched by the transition that produced this entry.
    pub affected: Vec<DetailId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageHistoryEntry {
    pub stage: FulfillmentStage,
    pub at: DateTime<Utc>,
    pub reason: Option<String>,
}

/// One seller's line within an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderDetail {
    pub id: DetailId,
    pub product_id: ProductId,
    pub product_name: String,
    pub unit_price: Money,
    pub image: Option<String>,
    pub quantity: u32,
    pub seller: AccountId,
    pub stage: FulfillmentStage,
    pub history: Vec<StageHistoryEntry>,
}

impl OrderDetail {
    fn from_line(line: OrderLine, at: DateTime<Utc>) -> Self {
        Self {
            id: line.detail_id,
            product_id: line.product_id,
            product_name: line.product_name,
            unit_price: line.unit_price,
            image: line.image,
            quantity: line.quantity,
            seller: line.seller,
            stage: FulfillmentStage::Pending,
            history: vec![StageHistoryEntry {
                stage: FulfillmentStage::Pending,
                at,
                reason: None,
            }],
        }
    }

    pub fn subtotal(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }

    fn move_to(&mut self, stage: FulfillmentStage, at: DateTime<Utc>, reason: Option<&str>) {
        self.stage = stage;
        self.history.push(StageHistoryEntry {
            stage,
            at,
            reason: reason.map(str::to_string),
        });
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefundRecord {
    pub promotion_id: AggregateId,
    pub seller: AccountId,
    pub amount: Money,
    pub at: DateTime<Utc>,
}

/// Details a seller dropped in one cancellation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SellerCancellation {
    pub seller: AccountId,
    pub amount: Money,
    pub reason: String,
    pub at: DateTime<Utc>,
}

/// A checkout by one buyer, spanning details from any number of sellers.
///
/// The status is never set directly: every event that touches a detail
/// recomputes it with [`aggregate_status`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct Order {
    id: Option<AggregateId>,
    version: Version,
    buyer: Option<AccountId>,
    receiver: Option<ReceiverInfo>,
    payment_method: PaymentMethod,
    notes: Option<String>,
    promotion_id: Option<AggregateId>,
    subtotal: Money,
    total_price: Money,
    status: OrderStatus,
    status_history: Vec<StatusHistoryEntry>,
    details: Vec<OrderDetail>,
    refunds: Vec<RefundRecord>,
    seller_cancellations: Vec<SellerCancellation>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Aggregate for Order {
    type Event = OrderEvent;
    type Error = OrderError;

    fn aggregate_type() -> &'static str {
        "Order"
    }

    fn id(&self) -> Option<AggregateId> {
        self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            OrderEvent::OrderPlaced(data) => self.apply_order_placed(data),
            OrderEvent::DetailsAdvanced(data) => {
                for detail in self.details_mut(&data.detail_ids) {
                    detail.move_to(data.stage, data.at, None);
                }
                self.record_status(data.at, None, data.detail_ids);
            }
            OrderEvent::DetailsCancelled(data) => self.apply_details_cancelled(data),
            OrderEvent::OrderCompleted(data) => self.apply_order_completed(data),
            OrderEvent::RefundIssued(data) => {
                self.refunds.push(RefundRecord {
                    promotion_id: data.promotion_id,
                    seller: data.seller,
                    amount: data.amount,
                    at: data.at,
                });
                self.updated_at = data.at;
            }
        }
    }
}

// Query methods
impl Order {
    pub fn buyer(&self) -> Option<AccountId> {
        self.buyer
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn details(&self) -> &[OrderDetail] {
        &self.details
    }

    pub fn detail(&self, id: DetailId) -> Option<&OrderDetail> {
        self.details.iter().find(|d| d.id == id)
    }

    pub fn details_of_seller(&self, seller: AccountId) -> impl Iterator<Item = &OrderDetail> {
        self.details.iter().filter(move |d| d.seller == seller)
    }

    /// Distinct sellers in first-appearance order.
    pub fn sellers(&self) -> Vec<AccountId> {
        let mut sellers = Vec::new();
        for detail in &self.details {
            if !sellers.contains(&detail.seller) {
                sellers.push(detail.seller);
            }
        }
        sellers
    }

    pub fn receiver(&self) -> Option<&ReceiverInfo> {
        self.receiver.as_ref()
    }

    pub fn payment_method(&self) -> PaymentMethod {
        self.payment_method
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn promotion_id(&self) -> Option<AggregateId> {
        self.promotion_id
    }

    /// Sum of every detail as placed, before any promotion.
    pub fn subtotal(&self) -> Money {
        self.subtotal
    }

    /// What the buyer owes now, after promotions and cancellations.
    pub fn total_price(&self) -> Money {
        self.total_price
    }

    pub fn status_history(&self) -> &[StatusHistoryEntry] {
        &self.status_history
    }

    pub fn refunds(&self) -> &[RefundRecord] {
        &self.refunds
    }

    pub fn seller_cancellations(&self) -> &[SellerCancellation] {
        &self.seller_cancellations
    }

    /// Seller cancellations of a prepaid order still owed a refund.
    ///
    /// A seller cancels all of their cancellable details at once, so each
    /// seller is owed at most one refund per order.
    pub fn pending_refunds(&self) -> Vec<&SellerCancellation> {
        if !self.payment_method.is_prepaid() {
            return Vec::new();
        }
        self.seller_cancellations
            .iter()
            .filter(|c| c.amount.is_positive())
            .filter(|c| !self.refunds.iter().any(|r| r.seller == c.seller))
            .collect()
    }

    /// Id of the refund promotion owed to the buyer for `seller`'s
    /// cancellation. Stable across retries.
    pub fn refund_promotion_id(&self, seller: AccountId) -> Option<AggregateId> {
        let order_id = self.id?;
        let id = Uuid::new_v5(&order_id.as_uuid(), seller.as_uuid().as_bytes());
        Some(AggregateId::from_uuid(id))
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

// Command methods (return events)
impl Order {
    pub fn place(&self, cmd: PlaceOrder, now: DateTime<Utc>) -> Result<Vec<OrderEvent>, OrderError> {
        if self.id.is_some() {
            return Err(OrderError::AlreadyPlaced);
        }
        if cmd.lines.is_empty() {
            return Err(OrderError::NoLines);
        }
        if let Some(line) = cmd.lines.iter().find(|l| l.quantity == 0) {
            return Err(OrderError::InvalidQuantity {
                product_id: line.product_id.clone(),
                quantity: line.quantity,
            });
        }

        let subtotal: Money = cmd.lines.iter().map(OrderLine::subtotal).sum();
        if cmd.total_price > subtotal || cmd.total_price.is_negative() {
            return Err(OrderError::InvalidTotal {
                total: cmd.total_price,
                subtotal,
            });
        }

        Ok(vec![OrderEvent::OrderPlaced(OrderPlacedData {
            order_id: cmd.order_id,
            buyer: cmd.buyer,
            receiver: cmd.receiver,
            payment_method: cmd.payment_method,
            notes: cmd.notes,
            promotion_id: cmd.promotion_id,
            subtotal,
            total_price: cmd.total_price,
            lines: cmd.lines,
            placed_at: now,
        })])
    }

    /// Moves every detail of `seller` at the transition's source stage
    /// one stage forward.
    pub fn advance(
        &self,
        seller: AccountId,
        transition: SellerTransition,
        now: DateTime<Utc>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        let action = transition.as_str();
        self.ensure_sells_here(seller, action)?;

        if !transition.allowed_from(self.status) {
            return Err(OrderError::InvalidTransition {
                current: self.status,
                action,
            });
        }

        let ids: Vec<DetailId> = self
            .details_of_seller(seller)
            .filter(|d| d.stage == transition.from_stage())
            .map(|d| d.id)
            .collect();
        if ids.is_empty() {
            return Err(OrderError::Forbidden {
                actor: seller,
                action,
            });
        }

        Ok(vec![OrderEvent::details_advanced(
            seller,
            ids,
            transition.to_stage(),
            now,
        )])
    }

    /// Buyer withdraws the whole order before any seller acted on it.
    pub fn cancel_by_buyer(
        &self,
        buyer: AccountId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_buyer(buyer, "cancel")?;
        if !self.status.can_buyer_cancel() {
            return Err(OrderError::InvalidTransition {
                current: self.status,
                action: "cancel",
            });
        }

        let ids: Vec<DetailId> = self
            .details
            .iter()
            .filter(|d| d.stage.is_active())
            .map(|d| d.id)
            .collect();
        let amount = self.cancellation_amount(&ids);

        Ok(vec![OrderEvent::details_cancelled(
            CancelledBy::Buyer(buyer),
            ids,
            reason,
            amount,
            now,
        )])
    }

    /// Seller drops their own details that have not been shipped yet.
    pub fn cancel_by_seller(
        &self,
        seller: AccountId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_sells_here(seller, "seller cancel")?;
        if !self.status.can_seller_cancel() {
            return Err(OrderError::InvalidTransition {
                current: self.status,
                action: "seller cancel",
            });
        }

        let ids: Vec<DetailId> = self
            .details_of_seller(seller)
            .filter(|d| d.stage.can_cancel())
            .map(|d| d.id)
            .collect();
        if ids.is_empty() {
            return Err(OrderError::Forbidden {
                actor: seller,
                action: "seller cancel",
            });
        }
        let amount = self.cancellation_amount(&ids);

        Ok(vec![OrderEvent::details_cancelled(
            CancelledBy::Seller(seller),
            ids,
            reason,
            amount,
            now,
        )])
    }

    /// Buyer confirms receipt.
    pub fn complete_by_buyer(
        &self,
        buyer: AccountId,
        now: DateTime<Utc>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_buyer(buyer, "complete")?;
        self.complete(CompletedBy::Buyer, now)
    }

    /// Completion on the buyer's behalf once an order sat in processing
    /// for too long.
    pub fn force_complete(&self, now: DateTime<Utc>) -> Result<Vec<OrderEvent>, OrderError> {
        self.complete(CompletedBy::System, now)
    }

    pub fn record_refund(
        &self,
        promotion_id: AggregateId,
        seller: AccountId,
        amount: Money,
        now: DateTime<Utc>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        if self.refunds.iter().any(|r| r.promotion_id == promotion_id) {
            return Ok(Vec::new());
        }
        Ok(vec![OrderEvent::refund_issued(
            promotion_id,
            seller,
            amount,
            now,
        )])
    }

    fn complete(
        &self,
        completed_by: CompletedBy,
        now: DateTime<Utc>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        if !self.status.can_buyer_complete() {
            return Err(OrderError::InvalidTransition {
                current: self.status,
                action: "complete",
            });
        }

        let ids = self
            .details
            .iter()
            .filter(|d| d.stage.is_active())
            .map(|d| d.id)
            .collect();
        Ok(vec![OrderEvent::order_completed(completed_by, ids, now)])
    }

    fn ensure_buyer(&self, actor: AccountId, action: &'static str) -> Result<(), OrderError> {
        if self.buyer != Some(actor) {
            return Err(OrderError::Forbidden { actor, action });
        }
        Ok(())
    }

    fn ensure_sells_here(&self, actor: AccountId, action: &'static str) -> Result<(), OrderError> {
        if self.details_of_seller(actor).next().is_none() {
            return Err(OrderError::Forbidden { actor, action });
        }
        Ok(())
    }

    /// Subtotal of `ids`, capped at what is still owed.
    fn cancellation_amount(&self, ids: &[DetailId]) -> Money {
        let cancelled: Money = self
            .details
            .iter()
            .filter(|d| ids.contains(&d.id))
            .map(OrderDetail::subtotal)
            .sum();
        cancelled.min(self.total_price)
    }
}

// Apply event helpers
impl Order {
    fn apply_order_placed(&mut self, data: OrderPlacedData) {
        let at = data.placed_at;
        self.id = Some(data.order_id);
        self.buyer = Some(data.buyer);
        self.receiver = data.receiver;
        self.payment_method = data.payment_method;
        self.notes = data.notes;
        self.promotion_id = data.promotion_id;
        self.subtotal = data.subtotal;
        self.total_price = data.total_price;
        self.created_at = at;
        self.details = data
            .lines
            .into_iter()
            .map(|line| OrderDetail::from_line(line, at))
            .collect();

        let ids = self.details.iter().map(|d| d.id).collect();
        self.record_status(at, None, ids);
    }

    fn apply_details_cancelled(&mut self, data: DetailsCancelledData) {
        for detail in self.details_mut(&data.detail_ids) {
            detail.move_to(FulfillmentStage::Cancelled, data.at, Some(&data.reason));
        }
        self.total_price = self.total_price.saturating_sub(data.amount);
        if let CancelledBy::Seller(seller) = data.cancelled_by {
            self.seller_cancellations.push(SellerCancellation {
                seller,
                amount: data.amount,
                reason: data.reason.clone(),
                at: data.at,
            });
        }
        self.record_status(data.at, Some(data.reason), data.detail_ids);
    }

    fn apply_order_completed(&mut self, data: OrderCompletedData) {
        let reason = match data.completed_by {
            CompletedBy::Buyer => "received by buyer",
            CompletedBy::System => "completed automatically",
        };
        for detail in self.details_mut(&data.detail_ids) {
            detail.move_to(FulfillmentStage::Completed, data.at, Some(reason));
        }
        self.record_status(data.at, Some(reason.to_string()), data.detail_ids);
    }

    fn details_mut<'a>(
        &'a mut self,
        ids: &'a [DetailId],
    ) -> impl Iterator<Item = &'a mut OrderDetail> + 'a {
        self.details.iter_mut().filter(move |d| ids.contains(&d.id))
    }

    fn record_status(&mut self, at: DateTime<Utc>, reason: Option<String>, affected: Vec<DetailId>) {
        self.status = aggregate_status(self.details.iter().map(|d| d.stage));
        self.updated_at = at;
        self.status_history.push(StatusHistoryEntry {
            status: self.status,
            at,
            reason,
            affected,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        order: Order,
        buyer: AccountId,
        seller_a: AccountId,
        seller_b: AccountId,
    }

    fn line(seller: AccountId, price: i64, quantity: u32) -> OrderLine {
        OrderLine {
            detail_id: DetailId::new(),
            product_id: ProductId::new(format!("p-{price}")),
            product_name: "Blind box".to_string(),
            unit_price: Money::new(price),
            image: None,
            quantity,
            seller,
        }
    }

    /// Two sellers, A with two lines and B with one.
    fn placed(payment_method: PaymentMethod) -> Fixture {
        let buyer = AccountId::new();
        let seller_a = AccountId::new();
        let seller_b = AccountId::new();
        let lines = vec![
            line(seller_a, 100_000, 1),
            line(seller_a, 50_000, 2),
            line(seller_b, 80_000, 1),
        ];
        let cmd = PlaceOrder::new(AggregateId::new(), buyer, lines, Money::new(280_000))
            .payment_method(payment_method);

        let mut order = Order::default();
        let events = order.place(cmd, Utc::now()).unwrap();
        order.apply_events(events);

        Fixture {
            order,
            buyer,
            seller_a,
            seller_b,
        }
    }

    fn run(
        order: &mut Order,
        decision: impl FnOnce(&Order) -> Result<Vec<OrderEvent>, OrderError>,
    ) {
        let events = decision(order).unwrap();
        order.apply_events(events);
        assert_eq!(
            order.status(),
            aggregate_status(order.details().iter().map(|d| d.stage))
        );
    }

    #[test]
    fn place_creates_pending_details() {
        let f = placed(PaymentMethod::CashOnDelivery);

        assert_eq!(f.order.status(), OrderStatus::Pending);
        assert_eq!(f.order.details().len(), 3);
        assert_eq!(f.order.subtotal(), Money::new(280_000));
        assert_eq!(f.order.sellers(), vec![f.seller_a, f.seller_b]);
        assert_eq!(f.order.status_history().len(), 1);
    }

    #[test]
    fn place_rejects_total_above_subtotal() {
        let order = Order::default();
        let cmd = PlaceOrder::new(
            AggregateId::new(),
            AccountId::new(),
            vec![line(AccountId::new(), 10_000, 1)],
            Money::new(20_000),
        );

        assert!(matches!(
            order.place(cmd, Utc::now()),
            Err(OrderError::InvalidTotal { .. })
        ));
    }

    #[test]
    fn place_twice_fails() {
        let f = placed(PaymentMethod::CashOnDelivery);
        let cmd = PlaceOrder::new(
            AggregateId::new(),
            f.buyer,
            vec![line(f.seller_a, 1, 1)],
            Money::new(1),
        );
        assert!(matches!(
            f.order.place(cmd, Utc::now()),
            Err(OrderError::AlreadyPlaced)
        ));
    }

    #[test]
    fn one_seller_confirming_gives_partially_confirmed() {
        let mut f = placed(PaymentMethod::CashOnDelivery);
        let now = Utc::now();

        run(&mut f.order, |o| {
            o.advance(f.seller_a, SellerTransition::Confirm, now)
        });
        assert_eq!(f.order.status(), OrderStatus::PartiallyConfirmed);
        let last = f.order.status_history().last().unwrap();
        assert_eq!(last.affected.len(), 2);

        run(&mut f.order, |o| {
            o.advance(f.seller_b, SellerTransition::Confirm, now)
        });
        assert_eq!(f.order.status(), OrderStatus::Confirmed);
    }

    #[test]
    fn full_pipeline_to_completed() {
        let mut f = placed(PaymentMethod::CashOnDelivery);
        let now = Utc::now();

        for transition in [SellerTransition::Confirm, SellerTransition::Process] {
            for seller in [f.seller_a, f.seller_b] {
                run(&mut f.order, |o| o.advance(seller, transition, now));
            }
        }
        assert_eq!(f.order.status(), OrderStatus::Processing);

        run(&mut f.order, |o| {
            o.advance(f.seller_b, SellerTransition::Complete, now)
        });
        assert_eq!(f.order.status(), OrderStatus::PartiallyCompleted);

        // Buyer completion requires every active detail in processing.
        assert!(matches!(
            f.order.complete_by_buyer(f.buyer, now),
            Err(OrderError::InvalidTransition {
                current: OrderStatus::PartiallyCompleted,
                ..
            })
        ));

        run(&mut f.order, |o| {
            o.advance(f.seller_a, SellerTransition::Complete, now)
        });
        assert_eq!(f.order.status(), OrderStatus::Completed);
    }

    #[test]
    fn processing_before_confirming_is_invalid() {
        let f = placed(PaymentMethod::CashOnDelivery);

        let err = f
            .order
            .advance(f.seller_a, SellerTransition::Process, Utc::now())
            .unwrap_err();
        assert!(matches!(
            err,
            OrderError::InvalidTransition {
                current: OrderStatus::Pending,
                action: "process"
            }
        ));
    }

    #[test]
    fn outsider_seller_is_forbidden() {
        let f = placed(PaymentMethod::CashOnDelivery);

        let err = f
            .order
            .advance(AccountId::new(), SellerTransition::Confirm, Utc::now())
            .unwrap_err();
        assert!(matches!(err, OrderError::Forbidden { .. }));
    }

    #[test]
    fn seller_with_nothing_at_stage_is_forbidden() {
        let mut f = placed(PaymentMethod::CashOnDelivery);
        let now = Utc::now();
        run(&mut f.order, |o| {
            o.advance(f.seller_a, SellerTransition::Confirm, now)
        });

        // A already confirmed everything; the order is still confirmable for B.
        let err = f
            .order
            .advance(f.seller_a, SellerTransition::Confirm, now)
            .unwrap_err();
        assert!(matches!(err, OrderError::Forbidden { .. }));
    }

    #[test]
    fn seller_cancel_reduces_total_by_cancelled_subtotal() {
        let mut f = placed(PaymentMethod::Banking);
        let now = Utc::now();

        run(&mut f.order, |o| o.cancel_by_seller(f.seller_b, "sold out", now));

        assert_eq!(f.order.status(), OrderStatus::PartiallyCancelled);
        assert_eq!(f.order.total_price(), Money::new(200_000));
        let cancelled = f.order.details_of_seller(f.seller_b).next().unwrap();
        assert_eq!(cancelled.stage, FulfillmentStage::Cancelled);
        assert_eq!(
            cancelled.history.last().unwrap().reason.as_deref(),
            Some("sold out")
        );
    }

    #[test]
    fn seller_cancel_of_everything_cancels_order() {
        let buyer = AccountId::new();
        let seller = AccountId::new();
        let mut order = Order::default();
        let cmd = PlaceOrder::new(
            AggregateId::new(),
            buyer,
            vec![line(seller, 10_000, 1), line(seller, 5_000, 1)],
            Money::new(15_000),
        );
        order.apply_events(order.place(cmd, Utc::now()).unwrap());

        run(&mut order, |o| o.cancel_by_seller(seller, "closing shop", Utc::now()));

        assert_eq!(order.status(), OrderStatus::Cancelled);
        assert_eq!(order.total_price(), Money::zero());
    }

    #[test]
    fn seller_cannot_cancel_processing_details() {
        let mut f = placed(PaymentMethod::CashOnDelivery);
        let now = Utc::now();
        run(&mut f.order, |o| {
            o.advance(f.seller_b, SellerTransition::Confirm, now)
        });
        run(&mut f.order, |o| {
            o.advance(f.seller_b, SellerTransition::Process, now)
        });

        let err = f.order.cancel_by_seller(f.seller_b, "late", now).unwrap_err();
        assert!(matches!(err, OrderError::Forbidden { .. }));
    }

    #[test]
    fn buyer_cancel_only_while_pending() {
        let mut f = placed(PaymentMethod::CashOnDelivery);
        let now = Utc::now();

        run(&mut f.order, |o| {
            o.advance(f.seller_a, SellerTransition::Confirm, now)
        });
        let err = f.order.cancel_by_buyer(f.buyer, "changed mind", now).unwrap_err();
        assert!(matches!(
            err,
            OrderError::InvalidTransition {
                current: OrderStatus::PartiallyConfirmed,
                ..
            }
        ));
    }

    #[test]
    fn buyer_cancel_cancels_everything() {
        let mut f = placed(PaymentMethod::CashOnDelivery);

        run(&mut f.order, |o| {
            o.cancel_by_buyer(f.buyer, "changed mind", Utc::now())
        });

        assert_eq!(f.order.status(), OrderStatus::Cancelled);
        assert_eq!(f.order.total_price(), Money::zero());
        assert!(
            f.order
                .details()
                .iter()
                .all(|d| d.stage == FulfillmentStage::Cancelled)
        );
    }

    #[test]
    fn only_the_buyer_may_cancel_or_complete() {
        let f = placed(PaymentMethod::CashOnDelivery);
        let stranger = AccountId::new();

        assert!(matches!(
            f.order.cancel_by_buyer(stranger, "x", Utc::now()),
            Err(OrderError::Forbidden { .. })
        ));
        assert!(matches!(
            f.order.complete_by_buyer(stranger, Utc::now()),
            Err(OrderError::Forbidden { .. })
        ));
    }

    #[test]
    fn force_complete_requires_processing() {
        let mut f = placed(PaymentMethod::CashOnDelivery);
        let now = Utc::now();
        assert!(f.order.force_complete(now).is_err());

        for transition in [SellerTransition::Confirm, SellerTransition::Process] {
            for seller in [f.seller_a, f.seller_b] {
                run(&mut f.order, |o| o.advance(seller, transition, now));
            }
        }
        run(&mut f.order, |o| o.force_complete(now));

        assert_eq!(f.order.status(), OrderStatus::Completed);
        assert_eq!(
            f.order.status_history().last().unwrap().reason.as_deref(),
            Some("completed automatically")
        );
    }

    #[test]
    fn refunds_are_recorded() {
        let mut f = placed(PaymentMethod::Banking);
        let promotion_id = AggregateId::new();

        run(&mut f.order, |o| {
            o.record_refund(promotion_id, f.seller_a, Money::new(10), Utc::now())
        });

        assert_eq!(f.order.refunds().len(), 1);
        assert_eq!(f.order.refunds()[0].promotion_id, promotion_id);
    }

    #[test]
    fn recording_the_same_refund_twice_is_a_no_op() {
        let mut f = placed(PaymentMethod::Banking);
        let promotion_id = AggregateId::new();
        let now = Utc::now();

        run(&mut f.order, |o| {
            o.record_refund(promotion_id, f.seller_a, Money::new(10), now)
        });
        let again = f
            .order
            .record_refund(promotion_id, f.seller_a, Money::new(10), now)
            .unwrap();

        assert!(again.is_empty());
        assert_eq!(f.order.refunds().len(), 1);
    }

    #[test]
    fn prepaid_seller_cancel_is_owed_a_refund_until_recorded() {
        let mut f = placed(PaymentMethod::Banking);
        let now = Utc::now();

        run(&mut f.order, |o| o.cancel_by_seller(f.seller_b, "sold out", now));

        let pending = f.order.pending_refunds();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].seller, f.seller_b);
        assert_eq!(pending[0].amount, Money::new(80_000));
        assert_eq!(pending[0].reason, "sold out");

        let promotion_id = f.order.refund_promotion_id(f.seller_b).unwrap();
        run(&mut f.order, |o| {
            o.record_refund(promotion_id, f.seller_b, Money::new(80_000), now)
        });
        assert!(f.order.pending_refunds().is_empty());
    }

    #[test]
    fn cash_and_buyer_cancellations_owe_no_refund() {
        let mut cash = placed(PaymentMethod::CashOnDelivery);
        run(&mut cash.order, |o| {
            o.cancel_by_seller(cash.seller_b, "sold out", Utc::now())
        });
        assert_eq!(cash.order.seller_cancellations().len(), 1);
        assert!(cash.order.pending_refunds().is_empty());

        let mut banked = placed(PaymentMethod::Banking);
        run(&mut banked.order, |o| {
            o.cancel_by_buyer(banked.buyer, "changed mind", Utc::now())
        });
        assert!(banked.order.seller_cancellations().is_empty());
        assert!(banked.order.pending_refunds().is_empty());
    }

    #[test]
    fn refund_promotion_id_is_stable_per_seller() {
        let f = placed(PaymentMethod::Banking);

        let a = f.order.refund_promotion_id(f.seller_a).unwrap();
        assert_eq!(f.order.refund_promotion_id(f.seller_a), Some(a));
        assert_ne!(f.order.refund_promotion_id(f.seller_b), Some(a));
        assert_eq!(Order::default().refund_promotion_id(f.seller_a), None);
    }
}
