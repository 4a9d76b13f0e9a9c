//! Shared application state and start-up seeding.

use std::path::Path;
use std::sync::Arc;

use event_store::EventStore;
use marketplace::{
    Account, InMemoryAccounts, InMemoryCart, InMemoryCatalog, OrderManager, Product,
    TracingNotifier, TradeManager,
};
use serde::Deserialize;
use thiserror::Error;

use crate::config::Config;

pub type Orders<S> = OrderManager<S, InMemoryCatalog, InMemoryCart, TracingNotifier>;
pub type Trades<S> = TradeManager<S, InMemoryCatalog, InMemoryAccounts, TracingNotifier>;

/// Shared application state accessible from all handlers.
pub struct AppState<S: EventStore> {
    pub orders: Arc<Orders<S>>,
    pub trades: Trades<S>,
    pub catalog: InMemoryCatalog,
    pub carts: InMemoryCart,
    pub accounts: InMemoryAccounts,
}

/// Builds the managers over `event_store` with in-memory collaborators.
pub fn create_state<S: EventStore + Clone + 'static>(
    event_store: S,
    config: &Config,
) -> Arc<AppState<S>> {
    let catalog = InMemoryCatalog::new();
    let carts = InMemoryCart::new();
    let accounts = InMemoryAccounts::new();

    let orders = OrderManager::new(
        event_store.clone(),
        catalog.clone(),
        carts.clone(),
        TracingNotifier,
    )
    .with_retry_limit(config.retry_limit);
    let trades = TradeManager::new(event_store, catalog.clone(), accounts.clone(), TracingNotifier)
        .with_retry_limit(config.retry_limit);

    Arc::new(AppState {
        orders: Arc::new(orders),
        trades,
        catalog,
        carts,
        accounts,
    })
}

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("Cannot read seed file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid seed file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Products and accounts loaded at start-up.
#[derive(Debug, Default, Deserialize)]
pub struct Seed {
    #[serde(default)]
    pub products: Vec<Product>,
    #[serde(default)]
    pub accounts: Vec<Account>,
}

impl Seed {
    pub fn from_file(path: &Path) -> Result<Self, SeedError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub async fn load_into<S: EventStore>(self, state: &AppState<S>) {
        let (products, accounts) = (self.products.len(), self.accounts.len());
        for product in self.products {
            state.catalog.insert(product).await;
        }
        for account in self.accounts {
            state.accounts.insert(account).await;
        }
        tracing::info!(products, accounts, "seed data loaded");
    }
}
