//! Product catalog trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use domain::{AccountId, Money, ProductId};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::{MarketplaceError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProductCategory {
    BlindBox,
    Accessory,
    /// An unboxed figure, the only kind that can be offered for trade.
    OpenedItem,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub price: Money,
    pub quantity: u32,
    pub owner: AccountId,
    #[serde(default)]
    pub image: Option<String>,
    pub category: ProductCategory,
}

/// Read access to products and conditional stock updates.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn get_product(&self, product_id: &ProductId) -> Result<Option<Product>>;

    /// Adds `delta` to the product's stock and returns the new quantity.
    ///
    /// A negative delta is only applied when enough stock is left; otherwise
    /// the quantity is untouched and `StockConflict` is returned.
    async fn adjust_stock(&self, product_id: &ProductId, delta: i64) -> Result<u32>;
}

/// In-memory catalog for tests and the default server.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    products: Arc<RwLock<HashMap<ProductId, Product>>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, product: Product) {
        self.products
            .write()
            .await
            .insert(product.id.clone(), product);
    }

    pub async fn stock(&self, product_id: &ProductId) -> Option<u32> {
        self.products
            .read()
            .await
            .get(product_id)
            .map(|p| p.quantity)
    }
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn get_product(&self, product_id: &ProductId) -> Result<Option<Product>> {
        Ok(self.products.read().await.get(product_id).cloned())
    }

    async fn adjust_stock(&self, product_id: &ProductId, delta: i64) -> Result<u32> {
        let mut products = self.products.write().await;
        let product = products
            .get_mut(product_id)
            .ok_or_else(|| MarketplaceError::not_found("Product", product_id))?;

        let next = i64::from(product.quantity) + delta;
        if next < 0 {
            return Err(MarketplaceError::StockConflict {
                product_id: product_id.clone(),
                available: product.quantity,
            });
        }
        product.quantity = u32::try_from(next).map_err(|_| {
            MarketplaceError::InvalidInput(format!("stock of {product_id} overflows"))
        })?;
        Ok(product.quantity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn figure(quantity: u32) -> Product {
        Product {
            id: ProductId::new("labubu-v1"),
            name: "Labubu V1".to_string(),
            price: Money::new(100_000),
            quantity,
            owner: AccountId::new(),
            image: None,
            category: ProductCategory::BlindBox,
        }
    }

    #[tokio::test]
    async fn decrement_within_stock() {
        let catalog = InMemoryCatalog::new();
        catalog.insert(figure(5)).await;

        let left = catalog
            .adjust_stock(&ProductId::new("labubu-v1"), -2)
            .await
            .unwrap();
        assert_eq!(left, 3);
    }

    #[tokio::test]
    async fn decrement_below_zero_is_refused() {
        let catalog = InMemoryCatalog::new();
        catalog.insert(figure(1)).await;
        let id = ProductId::new("labubu-v1");

        let err = catalog.adjust_stock(&id, -2).await.unwrap_err();
        assert!(matches!(
            err,
            MarketplaceError::StockConflict { available: 1, .. }
        ));
        assert_eq!(catalog.stock(&id).await, Some(1));
    }

    #[tokio::test]
    async fn concurrent_decrements_never_oversell() {
        let catalog = InMemoryCatalog::new();
        catalog.insert(figure(3)).await;
        let id = ProductId::new("labubu-v1");

        let mut handles = Vec::new();
        for _ in 0..10 {
            let catalog = catalog.clone();
            let id = id.clone();
            handles.push(tokio::spawn(
                async move { catalog.adjust_stock(&id, -1).await },
            ));
        }
        let mut sold = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                sold += 1;
            }
        }

        assert_eq!(sold, 3);
        assert_eq!(catalog.stock(&id).await, Some(0));
    }

    #[tokio::test]
    async fn unknown_product_is_not_found() {
        let catalog = InMemoryCatalog::new();
        let err = catalog
            .adjust_stock(&ProductId::new("ghost"), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, MarketplaceError::NotFound { .. }));
    }
}
