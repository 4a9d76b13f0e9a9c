//! Periodic completion of orders buyers never confirmed.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use domain::OrderStatus;
use event_store::EventStore;
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::fulfillment::{ForceCompleteReport, OrderManager};
use crate::services::{CartStore, Catalog, NotificationSink};

/// Days an order may sit in processing before it is completed for the buyer.
pub const DEFAULT_STALE_AFTER_DAYS: i64 = 3;

/// Completes orders that stayed in `Processing` longer than a threshold.
pub struct StaleOrderSweeper<S, C, K, N>
where
    S: EventStore,
    C: Catalog,
    K: CartStore,
    N: NotificationSink,
{
    manager: Arc<OrderManager<S, C, K, N>>,
    threshold: Duration,
    interval: StdDuration,
}

impl<S, C, K, N> StaleOrderSweeper<S, C, K, N>
where
    S: EventStore + Clone + 'static,
    C: Catalog + 'static,
    K: CartStore + 'static,
    N: NotificationSink + 'static,
{
    pub fn new(manager: Arc<OrderManager<S, C, K, N>>) -> Self {
        Self {
            manager,
            threshold: Duration::days(DEFAULT_STALE_AFTER_DAYS),
            interval: StdDuration::from_secs(24 * 60 * 60),
        }
    }

    pub fn with_threshold(mut self, threshold: Duration) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_interval(mut self, interval: StdDuration) -> Self {
        self.interval = interval;
        self
    }

    /// One pass: find stale orders as of `now` and complete them.
    #[tracing::instrument(skip(self))]
    pub async fn sweep_once(&self, now: DateTime<Utc>) -> Result<ForceCompleteReport> {
        let stale = self
            .manager
            .find_stale_at(OrderStatus::Processing, self.threshold, now)
            .await?;
        if stale.is_empty() {
            return Ok(ForceCompleteReport::default());
        }

        let report = self.manager.force_complete(&stale).await?;
        metrics::counter!("stale_orders_completed_total").increment(report.completed.len() as u64);
        Ok(report)
    }

    /// Runs [`sweep_once`](Self::sweep_once) on every tick until the task is
    /// aborted. The first tick fires immediately.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match self.sweep_once(Utc::now()).await {
                    Ok(report) if !report.completed.is_empty() => {
                        tracing::info!(completed = report.completed.len(), "stale orders completed");
                    }
                    Ok(_) => {}
                    Err(e) => tracing::error!(error = %e, "stale order sweep failed"),
                }
            }
        })
    }
}
