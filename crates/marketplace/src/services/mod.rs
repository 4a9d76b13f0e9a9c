//! Collaborators the marketplace talks to: catalog, cart, accounts and
//! notifications.

pub mod accounts;
pub mod cart;
pub mod catalog;
pub mod notifications;

pub use accounts::{Account, AccountDirectory, InMemoryAccounts, Role};
pub use cart::{CartLine, CartLineId, CartStore, InMemoryCart};
pub use catalog::{Catalog, InMemoryCatalog, Product, ProductCategory};
pub use notifications::{
    NotificationKind, NotificationSink, RecordingNotifier, SentNotification, TracingNotifier,
};
