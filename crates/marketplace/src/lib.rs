//! Marketplace orchestration.
//!
//! This crate wires the domain aggregates to their collaborators:
//! - [`OrderManager`] runs checkout against the catalog, cart and promotion
//!   evaluator, then drives fulfillment, cancellations and refunds
//! - [`TradeManager`] runs trade posts and their negotiations
//! - [`StaleOrderSweeper`] completes orders buyers never confirmed
//!
//! Checkout reserves stock with conditional writes and gives it back in
//! reverse order when a later step fails.

pub mod checkout;
pub mod error;
pub mod fulfillment;
pub mod services;
pub mod sweeper;
pub mod trading;

#[cfg(test)]
mod testing;

pub use checkout::{CartLineRequest, CartOrderRequest, DirectOrderRequest};
pub use error::{MarketplaceError, Result};
pub use fulfillment::{ForceCompleteReport, OrderManager, SkippedOrder};
pub use services::{
    Account, AccountDirectory, CartLine, CartLineId, CartStore, Catalog, InMemoryAccounts,
    InMemoryCart, InMemoryCatalog, NotificationKind, NotificationSink, Product, ProductCategory,
    RecordingNotifier, Role, SentNotification, TracingNotifier,
};
pub use sweeper::{DEFAULT_STALE_AFTER_DAYS, StaleOrderSweeper};
pub use trading::TradeManager;
