//! Order board: orders indexed by buyer, seller and status.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::AggregateId;
use domain::{AccountId, Aggregate, Money, Order, OrderEvent, OrderStatus, PaymentMethod};
use event_store::EventEnvelope;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::Result;
use crate::projection::{Projection, ProjectionPosition};
use crate::read_model::ReadModel;

/// One row of the board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderSummary {
    pub order_id: AggregateId,
    pub buyer: Option<AccountId>,
    pub sellers: Vec<AccountId>,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub total_price: Money,
    pub detail_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderSummary {
    fn of(order_id: AggregateId, order: &Order) -> Self {
        Self {
            order_id,
            buyer: order.buyer(),
            sellers: order.sellers(),
            status: order.status(),
            payment_method: order.payment_method(),
            total_price: order.total_price(),
            detail_count: order.details().len(),
            created_at: order.created_at(),
            updated_at: order.updated_at(),
        }
    }
}

#[derive(Default)]
struct OrderBoardState {
    /// Orders are replayed here with the aggregate's own `apply`, so the
    /// board's status always agrees with the write side's aggregation.
    orders: HashMap<AggregateId, Order>,
    by_buyer: HashMap<AccountId, Vec<AggregateId>>,
    by_seller: HashMap<AccountId, Vec<AggregateId>>,
    position: ProjectionPosition,
}

impl OrderBoardState {
    fn summaries(&self, ids: Option<&Vec<AggregateId>>) -> Vec<OrderSummary> {
        let mut rows: Vec<_> = ids
            .into_iter()
            .flatten()
            .filter_map(|id| self.orders.get(id).map(|o| OrderSummary::of(*id, o)))
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows
    }
}

/// Read model over every order.
///
/// Serves the buyer and seller order lists and the stale order scan used by
/// the automatic completion sweep.
#[derive(Clone, Default)]
pub struct OrderBoardView {
    state: Arc<RwLock<OrderBoardState>>,
}

impl OrderBoardView {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, order_id: AggregateId) -> Option<OrderSummary> {
        let state = self.state.read().await;
        state
            .orders
            .get(&order_id)
            .map(|o| OrderSummary::of(order_id, o))
    }

    /// Orders of one buyer, newest first.
    pub async fn for_buyer(&self, buyer: AccountId) -> Vec<OrderSummary> {
        let state = self.state.read().await;
        state.summaries(state.by_buyer.get(&buyer))
    }

    /// Orders holding at least one detail of `seller`, newest first.
    pub async fn for_seller(&self, seller: AccountId) -> Vec<OrderSummary> {
        let state = self.state.read().await;
        state.summaries(state.by_seller.get(&seller))
    }

    /// Orders in `status` whose last change happened before `cutoff`,
    /// oldest first.
    pub async fn stale(&self, status: OrderStatus, cutoff: DateTime<Utc>) -> Vec<AggregateId> {
        let state = self.state.read().await;
        let mut stale: Vec<_> = state
            .orders
            .iter()
            .filter(|(_, o)| o.status() == status && o.updated_at() < cutoff)
            .map(|(id, o)| (o.updated_at(), *id))
            .collect();
        stale.sort();
        stale.into_iter().map(|(_, id)| id).collect()
    }

    pub async fn count_by_status(&self) -> HashMap<OrderStatus, usize> {
        let state = self.state.read().await;
        let mut counts = HashMap::new();
        for order in state.orders.values() {
            *counts.entry(order.status()).or_insert(0) += 1;
        }
        counts
    }
}

#[async_trait]
impl Projection for OrderBoardView {
    fn name(&self) -> &'static str {
        "OrderBoardView"
    }

    async fn handle(&self, event: &EventEnvelope) -> Result<()> {
        let mut state = self.state.write().await;
        if state.position.covers(event.position) {
            return Ok(());
        }
        state.position = ProjectionPosition::at(event.position);
        if event.aggregate_type != Order::aggregate_type() {
            return Ok(());
        }

        let order_event: OrderEvent = serde_json::from_value(event.payload.clone())?;
        let order_id = event.aggregate_id;

        if let OrderEvent::OrderPlaced(data) = &order_event {
            state.by_buyer.entry(data.buyer).or_default().push(order_id);
            let mut sellers: Vec<AccountId> = data.lines.iter().map(|l| l.seller).collect();
            sellers.sort();
            sellers.dedup();
            for seller in sellers {
                state.by_seller.entry(seller).or_default().push(order_id);
            }
        }

        let order = state.orders.entry(order_id).or_default();
        order.apply(order_event);
        order.set_version(event.version);
        Ok(())
    }

    async fn position(&self) -> ProjectionPosition {
        self.state.read().await.position
    }

    async fn reset(&self) -> Result<()> {
        *self.state.write().await = OrderBoardState::default();
        Ok(())
    }
}

impl ReadModel for OrderBoardView {
    fn name(&self) -> &'static str {
        "OrderBoardView"
    }

    fn count(&self) -> usize {
        self.state.try_read().map(|s| s.orders.len()).unwrap_or(0)
    }
}
