//! Order commands.

use common::AggregateId;

use crate::value_objects::{AccountId, Money, PaymentMethod, ReceiverInfo};

use super::events::OrderLine;

/// Everything needed to place an order whose stock is already reserved and
/// whose price is already settled.
#[derive(Debug, Clone)]
pub struct PlaceOrder {
    pub order_id: AggregateId,
    pub buyer: AccountId,
    pub lines: Vec<OrderLine>,
    /// Price after the promotion. Must not exceed the lines' subtotal.
    pub total_price: Money,
    pub receiver: Option<ReceiverInfo>,
    pub payment_method: PaymentMethod,
    pub notes: Option<String>,
    pub promotion_id: Option<AggregateId>,
}

impl PlaceOrder {
    pub fn new(
        order_id: AggregateId,
        buyer: AccountId,
        lines: Vec<OrderLine>,
        total_price: Money,
    ) -> Self {
        Self {
            order_id,
            buyer,
            lines,
            total_price,
            receiver: None,
            payment_method: PaymentMethod::default(),
            notes: None,
            promotion_id: None,
        }
    }

    pub fn receiver(mut self, receiver: Option<ReceiverInfo>) -> Self {
        self.receiver = receiver;
        self
    }

    pub fn payment_method(mut self, payment_method: PaymentMethod) -> Self {
        self.payment_method = payment_method;
        self
    }

    pub fn notes(mut self, notes: Option<String>) -> Self {
        self.notes = notes;
        self
    }

    pub fn promotion(mut self, promotion_id: Option<AggregateId>) -> Self {
        self.promotion_id = promotion_id;
        self
    }
}
