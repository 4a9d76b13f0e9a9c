//! Promotions: seller discounts and single-use compensation refunds.

mod aggregate;
mod events;
mod service;

pub use aggregate::{DiscountRule, NewPromotion, Promotion, PromotionKind, Redemption};
pub use events::{
    ActivationChangedData, PromotionCreatedData, PromotionEvent, PromotionRedeemedData,
    RedemptionReleasedData,
};
pub use service::{AppliedPromotion, PromotionService};

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::value_objects::AccountId;

#[derive(Debug, Error)]
pub enum PromotionError {
    #[error("Promotion already created")]
    AlreadyCreated,

    #[error("Invalid discount rule: {0}")]
    InvalidRule(String),

    #[error("Validity window is empty: {starts_at} to {ends_at}")]
    InvalidWindow {
        starts_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
    },

    #[error("A single-use promotion must be assigned to a buyer")]
    MissingAssignee,

    #[error("Promotion cannot be redeemed")]
    NotRedeemable,

    #[error("Account {actor} does not own this promotion")]
    Forbidden { actor: AccountId },
}
