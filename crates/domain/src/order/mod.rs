//! Order aggregate and related types.

mod aggregate;
mod commands;
mod events;
mod service;
mod status;

pub use aggregate::{
    Order, OrderDetail, RefundRecord, SellerCancellation, StageHistoryEntry, StatusHistoryEntry,
};
pub use commands::PlaceOrder;
pub use events::{
    CancelledBy, CompletedBy, DetailsAdvancedData, DetailsCancelledData, OrderCompletedData,
    OrderEvent, OrderLine, OrderPlacedData, RefundIssuedData,
};
pub use service::OrderService;
pub use status::{FulfillmentStage, OrderStatus, SellerTransition, aggregate_status};

use thiserror::Error;

use crate::value_objects::{AccountId, Money, ProductId};

#[derive(Debug, Error)]
pub enum OrderError {
    #[error("Order already placed")]
    AlreadyPlaced,

    #[error("Order has no lines")]
    NoLines,

    #[error("Invalid quantity {quantity} for product {product_id}")]
    InvalidQuantity {
        product_id: ProductId,
        quantity: u32,
    },

    #[error("Total {total} is not within 0..={subtotal}")]
    InvalidTotal { total: Money, subtotal: Money },

    /// The order's status does not allow the action.
    #[error("Invalid transition: cannot {action} an order in {current} status")]
    InvalidTransition {
        current: OrderStatus,
        action: &'static str,
    },

    /// The actor has no standing to perform the action on this order.
    #[error("Account {actor} may not {action} this order")]
    Forbidden {
        actor: AccountId,
        action: &'static str,
    },
}
