//! Shopping cart trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{AccountId, ProductId};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::Result;

/// Identifier of one line in a buyer's cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CartLineId(Uuid);

impl CartLineId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CartLineId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CartLineId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub id: CartLineId,
    pub product_id: ProductId,
    pub quantity: u32,
}

/// The parts of a cart that checkout needs.
#[async_trait]
pub trait CartStore: Send + Sync {
    async fn get_line(&self, buyer: AccountId, line_id: CartLineId) -> Result<Option<CartLine>>;

    async fn remove_line(&self, buyer: AccountId, line_id: CartLineId) -> Result<()>;

    /// Marks the buyer's cart as changed.
    async fn touch(&self, buyer: AccountId) -> Result<()>;
}

#[derive(Debug, Default)]
struct Cart {
    lines: Vec<CartLine>,
    updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryCart {
    carts: Arc<RwLock<HashMap<AccountId, Cart>>>,
}

impl InMemoryCart {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_line(&self, buyer: AccountId, product_id: ProductId, quantity: u32) -> CartLineId {
        let id = CartLineId::new();
        let mut carts = self.carts.write().await;
        let cart = carts.entry(buyer).or_default();
        cart.lines.push(CartLine {
            id,
            product_id,
            quantity,
        });
        cart.updated_at = Some(Utc::now());
        id
    }

    pub async fn lines(&self, buyer: AccountId) -> Vec<CartLine> {
        self.carts
            .read()
            .await
            .get(&buyer)
            .map(|c| c.lines.clone())
            .unwrap_or_default()
    }

    pub async fn updated_at(&self, buyer: AccountId) -> Option<DateTime<Utc>> {
        self.carts
            .read()
            .await
            .get(&buyer)
            .and_then(|c| c.updated_at)
    }
}

#[async_trait]
impl CartStore for InMemoryCart {
    async fn get_line(&self, buyer: AccountId, line_id: CartLineId) -> Result<Option<CartLine>> {
        Ok(self
            .carts
            .read()
            .await
            .get(&buyer)
            .and_then(|c| c.lines.iter().find(|l| l.id == line_id).cloned()))
    }

    async fn remove_line(&self, buyer: AccountId, line_id: CartLineId) -> Result<()> {
        if let Some(cart) = self.carts.write().await.get_mut(&buyer) {
            cart.lines.retain(|l| l.id != line_id);
        }
        Ok(())
    }

    async fn touch(&self, buyer: AccountId) -> Result<()> {
        self.carts.write().await.entry(buyer).or_default().updated_at = Some(Utc::now());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lines_belong_to_their_buyer() {
        let cart = InMemoryCart::new();
        let buyer = AccountId::new();
        let line = cart.add_line(buyer, ProductId::new("box"), 2).await;

        assert!(cart.get_line(buyer, line).await.unwrap().is_some());
        assert!(cart.get_line(AccountId::new(), line).await.unwrap().is_none());

        cart.remove_line(buyer, line).await.unwrap();
        assert!(cart.lines(buyer).await.is_empty());
    }
}
