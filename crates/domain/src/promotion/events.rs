//! Promotion domain events.

use chrono::{DateTime, Utc};
use common::AggregateId;
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;
use crate::value_objects::{AccountId, Money};

use super::{DiscountRule, PromotionKind};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PromotionEvent {
    PromotionCreated(PromotionCreatedData),
    /// A single-use promotion was consumed.
    PromotionRedeemed(PromotionRedeemedData),
    /// The order a redemption priced was never stored, so the promotion is
    /// usable again.
    RedemptionReleased(RedemptionReleasedData),
    ActivationChanged(ActivationChangedData),
}

impl DomainEvent for PromotionEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PromotionEvent::PromotionCreated(_) => "PromotionCreated",
            PromotionEvent::PromotionRedeemed(_) => "PromotionRedeemed",
            PromotionEvent::RedemptionReleased(_) => "RedemptionReleased",
            PromotionEvent::ActivationChanged(_) => "ActivationChanged",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromotionCreatedData {
    pub promotion_id: AggregateId,
    pub name: String,
    pub seller: AccountId,
    pub rule: DiscountRule,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub single_use: bool,
    pub assigned_to: Option<AccountId>,
    pub kind: PromotionKind,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromotionRedeemedData {
    pub buyer: AccountId,
    pub discount: Money,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedemptionReleasedData {
    pub buyer: AccountId,
    pub reason: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivationChangedData {
    pub active: bool,
    pub at: DateTime<Utc>,
}
