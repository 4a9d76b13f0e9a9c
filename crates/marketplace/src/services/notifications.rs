//! Notification sink.
//!
//! Delivery is fire-and-forget: callers log a failed notification and carry
//! on, a lost message never fails the operation that triggered it.

use std::sync::Arc;

use async_trait::async_trait;
use domain::AccountId;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum NotificationKind {
    OrderPlaced,
    OrderStatusChanged,
    OrderCancelled,
    RefundIssued,
    TradeProposalReceived,
    TradeCounterOffered,
    TradeProposalAccepted,
    TradeProposalRejected,
    TradePostModerated,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::OrderPlaced => "order_placed",
            NotificationKind::OrderStatusChanged => "order_status_changed",
            NotificationKind::OrderCancelled => "order_cancelled",
            NotificationKind::RefundIssued => "refund_issued",
            NotificationKind::TradeProposalReceived => "trade_proposal_received",
            NotificationKind::TradeCounterOffered => "trade_counter_offered",
            NotificationKind::TradeProposalAccepted => "trade_proposal_accepted",
            NotificationKind::TradeProposalRejected => "trade_proposal_rejected",
            NotificationKind::TradePostModerated => "trade_post_moderated",
        }
    }
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(
        &self,
        account: AccountId,
        kind: NotificationKind,
        payload: serde_json::Value,
    ) -> Result<()>;
}

/// Sends `kind` to `account`, logging instead of failing.
pub(crate) async fn notify_quietly<N: NotificationSink>(
    sink: &N,
    account: AccountId,
    kind: NotificationKind,
    payload: serde_json::Value,
) {
    if let Err(e) = sink.notify(account, kind, payload).await {
        tracing::warn!(%account, kind = kind.as_str(), error = %e, "notification dropped");
    }
}

/// Writes notifications to the log. The server's default sink.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

#[async_trait]
impl NotificationSink for TracingNotifier {
    async fn notify(
        &self,
        account: AccountId,
        kind: NotificationKind,
        payload: serde_json::Value,
    ) -> Result<()> {
        tracing::info!(%account, kind = kind.as_str(), %payload, "notification");
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SentNotification {
    pub account: AccountId,
    pub kind: NotificationKind,
    pub payload: serde_json::Value,
}

/// Keeps every notification in memory for assertions.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<SentNotification>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<SentNotification> {
        self.sent.lock().await.clone()
    }

    pub async fn sent_to(&self, account: AccountId) -> Vec<NotificationKind> {
        self.sent
            .lock()
            .await
            .iter()
            .filter(|n| n.account == account)
            .map(|n| n.kind)
            .collect()
    }
}

#[async_trait]
impl NotificationSink for RecordingNotifier {
    async fn notify(
        &self,
        account: AccountId,
        kind: NotificationKind,
        payload: serde_json::Value,
    ) -> Result<()> {
        self.sent.lock().await.push(SentNotification {
            account,
            kind,
            payload,
        });
        Ok(())
    }
}
