//! Order domain events.

use chrono::{DateTime, Utc};
use common::AggregateId;
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;
use crate::value_objects::{AccountId, DetailId, Money, PaymentMethod, ProductId, ReceiverInfo};

use super::FulfillmentStage;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    /// The order and all of its details were created at checkout.
    OrderPlaced(OrderPlacedData),

    /// One seller moved some of their details one stage forward.
    DetailsAdvanced(DetailsAdvancedData),

    /// Details were cancelled by the buyer or by their seller.
    DetailsCancelled(DetailsCancelledData),

    /// Every active detail was completed at once.
    OrderCompleted(OrderCompletedData),

    /// A compensation promotion was issued to the buyer.
    RefundIssued(RefundIssuedData),
}

impl DomainEvent for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderPlaced(_) => "OrderPlaced",
            OrderEvent::DetailsAdvanced(_) => "DetailsAdvanced",
            OrderEvent::DetailsCancelled(_) => "DetailsCancelled",
            OrderEvent::OrderCompleted(_) => "OrderCompleted",
            OrderEvent::RefundIssued(_) => "RefundIssued",
        }
    }
}

/// A detail as it is created: the product snapshot never changes afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub detail_id: DetailId,
    pub product_id: ProductId,
    pub product_name: String,
    pub unit_price: Money,
    pub image: Option<String>,
    pub quantity: u32,
    pub seller: AccountId,
}

impl OrderLine {
    pub fn subtotal(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderPlacedData {
    pub order_id: AggregateId,
    pub buyer: AccountId,
    pub receiver: Option<ReceiverInfo>,
    pub payment_method: PaymentMethod,
    pub notes: Option<String>,
    pub promotion_id: Option<AggregateId>,
    pub subtotal: Money,
    /// Price after the promotion, what the buyer pays.
    pub total_price: Money,
    pub lines: Vec<OrderLine>,
    pub placed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetailsAdvancedData {
    pub seller: AccountId,
    pub detail_ids: Vec<DetailId>,
    pub stage: FulfillmentStage,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "by", content = "account")]
pub enum CancelledBy {
    Buyer(AccountId),
    Seller(AccountId),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetailsCancelledData {
    pub cancelled_by: CancelledBy,
    pub detail_ids: Vec<DetailId>,
    pub reason: String,
    /// Amount taken off the order total.
    pub amount: Money,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompletedBy {
    /// The buyer confirmed receipt.
    Buyer,
    /// The stale order sweep completed it.
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCompletedData {
    pub completed_by: CompletedBy,
    pub detail_ids: Vec<DetailId>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundIssuedData {
    pub promotion_id: AggregateId,
    pub seller: AccountId,
    pub amount: Money,
    pub at: DateTime<Utc>,
}

impl OrderEvent {
    pub fn details_advanced(
        seller: AccountId,
        detail_ids: Vec<DetailId>,
        stage: FulfillmentStage,
        at: DateTime<Utc>,
    ) -> Self {
        OrderEvent::DetailsAdvanced(DetailsAdvancedData {
            seller,
            detail_ids,
            stage,
            at,
        })
    }

    pub fn details_cancelled(
        cancelled_by: CancelledBy,
        detail_ids: Vec<DetailId>,
        reason: impl Into<String>,
        amount: Money,
        at: DateTime<Utc>,
    ) -> Self {
        OrderEvent::DetailsCancelled(DetailsCancelledData {
            cancelled_by,
            detail_ids,
            reason: reason.into(),
            amount,
            at,
        })
    }

    pub fn order_completed(
        completed_by: CompletedBy,
        detail_ids: Vec<DetailId>,
        at: DateTime<Utc>,
    ) -> Self {
        OrderEvent::OrderCompleted(OrderCompletedData {
            completed_by,
            detail_ids,
            at,
        })
    }

    pub fn refund_issued(
        promotion_id: AggregateId,
        seller: AccountId,
        amount: Money,
        at: DateTime<Utc>,
    ) -> Self {
        OrderEvent::RefundIssued(RefundIssuedData {
            promotion_id,
            seller,
            amount,
            at,
        })
    }

    /// When the event took effect.
    pub fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OrderEvent::OrderPlaced(d) => d.placed_at,
            OrderEvent::DetailsAdvanced(d) => d.at,
            OrderEvent::DetailsCancelled(d) => d.at,
            OrderEvent::OrderCompleted(d) => d.at,
            OrderEvent::RefundIssued(d) => d.at,
        }
    }
}
