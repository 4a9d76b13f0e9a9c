//! Checkout: direct orders and cart orders.
//!
//! A checkout reserves stock line by line with conditional decrements,
//! prices the lines through the promotion evaluator and then places the
//! order. Any failure before the order is stored gives the reserved stock
//! back in reverse order, so a failed checkout leaves no trace in the
//! catalog.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use common::AggregateId;
use domain::{
    AccountId, DetailId, Money, Order, OrderLine, PaymentMethod, PlaceOrder, ProductId,
    ReceiverInfo,
};
use event_store::EventStore;
use serde::Deserialize;

use crate::error::{MarketplaceError, Result};
use crate::fulfillment::{OrderManager, status_payload};
use crate::services::notifications::notify_quietly;
use crate::services::{
    CartLineId, CartStore, Catalog, NotificationKind, NotificationSink, Product,
};

#[derive(Debug, Clone, Deserialize)]
pub struct DirectOrderRequest {
    pub product_id: ProductId,
    pub quantity: u32,
    #[serde(default)]
    pub receiver: Option<ReceiverInfo>,
    #[serde(default)]
    pub promotion_id: Option<AggregateId>,
    #[serde(default)]
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct CartLineRequest {
    pub line_id: CartLineId,
    pub quantity: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CartOrderRequest {
    pub lines: Vec<CartLineRequest>,
    #[serde(default)]
    pub receiver: Option<ReceiverInfo>,
    #[serde(default)]
    pub promotion_id: Option<AggregateId>,
    #[serde(default)]
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub notes: Option<String>,
}

/// One product and how many units of it to buy.
struct Pick {
    product: Product,
    quantity: u32,
}

/// Order fields that do not depend on where the lines came from.
struct Delivery {
    receiver: Option<ReceiverInfo>,
    promotion_id: Option<AggregateId>,
    payment_method: PaymentMethod,
    notes: Option<String>,
}

impl<S, C, K, N> OrderManager<S, C, K, N>
where
    S: EventStore + Clone,
    C: Catalog,
    K: CartStore,
    N: NotificationSink,
{
    /// Buys a single product straight from its page.
    #[tracing::instrument(skip(self, request), fields(product_id = %request.product_id, quantity = request.quantity))]
    pub async fn create_direct_order(
        &self,
        buyer: AccountId,
        request: DirectOrderRequest,
    ) -> Result<Order> {
        if request.quantity == 0 {
            return Err(MarketplaceError::InvalidInput(
                "quantity must be at least 1".to_string(),
            ));
        }
        let product = self.product(&request.product_id).await?;
        if product.quantity < request.quantity {
            return Err(MarketplaceError::InsufficientStock {
                product_id: product.id,
                requested: request.quantity,
                available: product.quantity,
            });
        }

        let picks = vec![Pick {
            product,
            quantity: request.quantity,
        }];
        let delivery = Delivery {
            receiver: request.receiver,
            promotion_id: request.promotion_id,
            payment_method: request.payment_method,
            notes: request.notes,
        };
        self.checkout(buyer, picks, delivery, &[], "direct").await
    }

    /// Buys a selection of the buyer's cart lines, all or nothing.
    ///
    /// Every line is checked before anything is written: it must be in the
    /// buyer's cart with exactly the requested quantity, and its product must
    /// have enough stock for all lines asking for it.
    #[tracing::instrument(skip(self, request), fields(lines = request.lines.len()))]
    pub async fn create_cart_order(
        &self,
        buyer: AccountId,
        request: CartOrderRequest,
    ) -> Result<Order> {
        if request.lines.is_empty() {
            return Err(MarketplaceError::InvalidInput(
                "a cart order needs at least one line".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = request.lines.iter().find(|l| !seen.insert(l.line_id)) {
            return Err(MarketplaceError::InvalidInput(format!(
                "cart line {} requested twice",
                dup.line_id
            )));
        }

        let mut picks = Vec::with_capacity(request.lines.len());
        let mut wanted: HashMap<ProductId, u32> = HashMap::new();
        for requested in &request.lines {
            let line = self
                .carts
                .get_line(buyer, requested.line_id)
                .await?
                .ok_or_else(|| MarketplaceError::StaleCartLine {
                    line_id: requested.line_id,
                    reason: "not in the buyer's cart".to_string(),
                })?;
            if line.quantity != requested.quantity {
                return Err(MarketplaceError::StaleCartLine {
                    line_id: requested.line_id,
                    reason: format!(
                        "requested {} but the cart holds {}",
                        requested.quantity, line.quantity
                    ),
                });
            }
            if line.quantity == 0 {
                return Err(MarketplaceError::StaleCartLine {
                    line_id: requested.line_id,
                    reason: "quantity is zero".to_string(),
                });
            }

            let product = self.product(&line.product_id).await?;
            let total = wanted.entry(product.id.clone()).or_insert(0);
            *total = total.saturating_add(line.quantity);
            if product.quantity < *total {
                return Err(MarketplaceError::InsufficientStock {
                    product_id: product.id,
                    requested: *total,
                    available: product.quantity,
                });
            }
            picks.push(Pick {
                product,
                quantity: line.quantity,
            });
        }

        let consumed: Vec<CartLineId> = request.lines.iter().map(|l| l.line_id).collect();
        let delivery = Delivery {
            receiver: request.receiver,
            promotion_id: request.promotion_id,
            payment_method: request.payment_method,
            notes: request.notes,
        };
        self.checkout(buyer, picks, delivery, &consumed, "cart").await
    }

    async fn product(&self, product_id: &ProductId) -> Result<Product> {
        self.catalog
            .get_product(product_id)
            .await?
            .ok_or_else(|| MarketplaceError::not_found("Product", product_id))
    }

    async fn checkout(
        &self,
        buyer: AccountId,
        picks: Vec<Pick>,
        delivery: Delivery,
        consumed: &[CartLineId],
        kind: &'static str,
    ) -> Result<Order> {
        let mut reserved: Vec<(ProductId, u32)> = Vec::with_capacity(picks.len());
        for pick in &picks {
            match self
                .catalog
                .adjust_stock(&pick.product.id, -i64::from(pick.quantity))
                .await
            {
                Ok(_) => reserved.push((pick.product.id.clone(), pick.quantity)),
                Err(e) => {
                    self.release(&reserved).await;
                    return Err(match e {
                        MarketplaceError::StockConflict {
                            product_id,
                            available,
                        } => MarketplaceError::InsufficientStock {
                            product_id,
                            requested: pick.quantity,
                            available,
                        },
                        other => other,
                    });
                }
            }
        }

        match self.place(buyer, &picks, delivery).await {
            Ok(order) => {
                for &line_id in consumed {
                    if let Err(e) = self.carts.remove_line(buyer, line_id).await {
                        tracing::warn!(%buyer, %line_id, error = %e, "cart line not removed");
                    }
                }
                if !consumed.is_empty() {
                    if let Err(e) = self.carts.touch(buyer).await {
                        tracing::warn!(%buyer, error = %e, "cart timestamp not updated");
                    }
                }

                metrics::counter!("orders_placed_total", "kind" => kind).increment(1);
                Ok(order)
            }
            Err(e) => {
                tracing::warn!(%buyer, error = %e, "checkout failed, releasing stock");
                self.release(&reserved).await;
                Err(e)
            }
        }
    }

    async fn place(&self, buyer: AccountId, picks: &[Pick], delivery: Delivery) -> Result<Order> {
        let lines: Vec<OrderLine> = picks
            .iter()
            .map(|pick| OrderLine {
                detail_id: DetailId::new(),
                product_id: pick.product.id.clone(),
                product_name: pick.product.name.clone(),
                unit_price: pick.product.price,
                image: pick.product.image.clone(),
                quantity: pick.quantity,
                seller: pick.product.owner,
            })
            .collect();
        let subtotal: Money = lines.iter().map(OrderLine::subtotal).sum();
        let applied = self
            .promotions
            .price_at(subtotal, delivery.promotion_id, Some(buyer), Utc::now())
            .await?;
        let total = applied.price;

        let order_id = AggregateId::new();
        let cmd = PlaceOrder::new(order_id, buyer, lines, total)
            .receiver(delivery.receiver)
            .payment_method(delivery.payment_method)
            .notes(delivery.notes)
            .promotion(delivery.promotion_id);
        let order = match self.orders.place_order(cmd).await {
            Ok(result) => result.aggregate,
            Err(e) => {
                if let Some(promotion_id) = delivery.promotion_id.filter(|_| applied.redeemed) {
                    self.release_promotion(promotion_id, buyer).await;
                }
                return Err(e.into());
            }
        };

        tracing::info!(%order_id, %buyer, %subtotal, %total, "order placed");
        notify_quietly(
            &self.notifier,
            buyer,
            NotificationKind::OrderPlaced,
            status_payload(order_id, &order),
        )
        .await;
        self.notify_sellers(order_id, &order, NotificationKind::OrderPlaced)
            .await;
        Ok(order)
    }

    /// Makes a single-use promotion usable again after its order failed.
    ///
    /// The checkout error is what the buyer sees, so a failed release is
    /// logged rather than returned.
    async fn release_promotion(&self, promotion_id: AggregateId, buyer: AccountId) {
        if let Err(e) = self
            .promotions
            .release_redemption(promotion_id, buyer, "order could not be placed")
            .await
        {
            tracing::error!(%promotion_id, %buyer, error = %e, "promotion redemption not released");
        }
    }

    /// Gives reserved stock back, last reservation first.
    async fn release(&self, reserved: &[(ProductId, u32)]) {
        for (product_id, quantity) in reserved.iter().rev() {
            if let Err(e) = self
                .catalog
                .adjust_stock(product_id, i64::from(*quantity))
                .await
            {
                tracing::error!(%product_id, quantity, error = %e, "reserved stock not released");
            }
        }
    }
}
