//! Domain layer of the marketplace.
//!
//! Three event-sourced aggregates live here:
//! - [`Order`]: one checkout spanning details from several sellers, whose
//!   status is always derived from the stages of its details
//! - [`Promotion`]: seller discounts and single-use refund vouchers
//! - [`TradePost`]: a barter post with its tree of proposals and
//!   counter-offers
//!
//! Commands run through [`CommandHandler`], which appends conditionally on
//! the version it decided against and re-decides on conflict.

pub mod aggregate;
pub mod command;
pub mod error;
pub mod order;
pub mod promotion;
pub mod trade;
pub mod value_objects;

pub use aggregate::{Aggregate, DomainEvent};
pub use command::{CommandHandler, CommandResult, DEFAULT_RETRY_LIMIT};
pub use error::DomainError;
pub use order::{
    CancelledBy, CompletedBy, DetailsAdvancedData, DetailsCancelledData, FulfillmentStage, Order,
    OrderCompletedData, OrderDetail, OrderError, OrderEvent, OrderLine, OrderPlacedData,
    OrderService, OrderStatus, PlaceOrder, RefundIssuedData, RefundRecord, SellerCancellation,
    SellerTransition, StageHistoryEntry, StatusHistoryEntry, aggregate_status,
};
pub use promotion::{
    AppliedPromotion, DiscountRule, NewPromotion, Promotion, PromotionError, PromotionEvent,
    PromotionKind, PromotionService, Redemption,
};
pub use trade::{
    CounterOfferedData, ProposalStatus, ProposalSubmittedData, TradeError, TradeEvent, TradePost,
    TradePostCreatedData, TradePostStatus, TradeProposal, TradeService,
};
pub use value_objects::{
    AccountId, DetailId, Money, PaymentMethod, ProductId, ProposalId, ReceiverInfo,
};
