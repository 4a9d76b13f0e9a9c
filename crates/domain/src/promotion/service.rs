//! Promotion service: evaluation at checkout and refund issuance.

use chrono::{DateTime, Duration, Months, Utc};
use common::AggregateId;
use event_store::EventStore;

use crate::aggregate::Aggregate;
use crate::command::CommandHandler;
use crate::error::DomainError;
use crate::value_objects::{AccountId, Money};

use super::{DiscountRule, NewPromotion, Promotion, PromotionError, PromotionKind};

pub struct PromotionService<S: EventStore> {
    handler: CommandHandler<S, Promotion>,
}

/// Checkout price after a promotion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppliedPromotion {
    pub price: Money,
    /// A single-use promotion was used up by this checkout.
    pub redeemed: bool,
}

impl<S: EventStore> PromotionService<S> {
    pub fn new(store: S) -> Self {
        Self {
            handler: CommandHandler::new(store),
        }
    }

    pub fn with_retry_limit(mut self, retry_limit: usize) -> Self {
        self.handler = self.handler.with_retry_limit(retry_limit);
        self
    }

    /// Price of `subtotal` after the promotion, if any applies.
    ///
    /// A missing, expired, inactive, foreign or already used promotion leaves
    /// the subtotal unchanged. That is a product rule, checkout is never
    /// blocked by a bad code. Only storage failures are errors.
    #[tracing::instrument(skip(self))]
    pub async fn apply(
        &self,
        subtotal: Money,
        promotion_id: Option<AggregateId>,
        buyer: Option<AccountId>,
    ) -> Result<Money, DomainError> {
        self.apply_at(subtotal, promotion_id, buyer, Utc::now()).await
    }

    pub async fn apply_at(
        &self,
        subtotal: Money,
        promotion_id: Option<AggregateId>,
        buyer: Option<AccountId>,
        now: DateTime<Utc>,
    ) -> Result<Money, DomainError> {
        Ok(self
            .price_at(subtotal, promotion_id, buyer, now)
            .await?
            .price)
    }

    /// Same as [`Self::apply_at`], also telling whether a single-use
    /// promotion was used up so a failed checkout can release it.
    pub async fn price_at(
        &self,
        subtotal: Money,
        promotion_id: Option<AggregateId>,
        buyer: Option<AccountId>,
        now: DateTime<Utc>,
    ) -> Result<AppliedPromotion, DomainError> {
        let unchanged = AppliedPromotion {
            price: subtotal,
            redeemed: false,
        };
        let Some(promotion_id) = promotion_id else {
            return Ok(unchanged);
        };

        // Redemption is an append conditional on the version that was
        // evaluated. A concurrent redeemer makes the append conflict, and the
        // retry re-evaluates against a promotion that is already used.
        let mut outcome = None;
        let result = self
            .handler
            .execute(promotion_id, buyer, |promotion| {
                outcome = promotion.evaluate(subtotal, buyer, now);
                match (outcome, buyer) {
                    (Some(r), Some(buyer)) if r.consumes => promotion.redeem(buyer, subtotal, now),
                    _ => Ok(vec![]),
                }
            })
            .await?;

        let Some(redemption) = outcome else {
            tracing::debug!(%promotion_id, "promotion does not apply");
            return Ok(unchanged);
        };
        let redeemed = !result.events.is_empty();
        if redeemed {
            metrics::counter!("promotions_redeemed_total").increment(1);
            tracing::info!(%promotion_id, discount = %redemption.discount, "single-use promotion redeemed");
        }
        Ok(AppliedPromotion {
            price: redemption.final_price(subtotal),
            redeemed,
        })
    }

    /// Gives a single-use promotion back to `buyer` after the order it
    /// priced could not be stored.
    #[tracing::instrument(skip(self))]
    pub async fn release_redemption(
        &self,
        promotion_id: AggregateId,
        buyer: AccountId,
        reason: &str,
    ) -> Result<Promotion, DomainError> {
        let now = Utc::now();
        let result = self
            .handler
            .execute_existing(promotion_id, Some(buyer), |promotion| {
                promotion.release(buyer, reason, now)
            })
            .await?;

        if !result.events.is_empty() {
            metrics::counter!("promotions_released_total").increment(1);
            tracing::info!(%promotion_id, %buyer, "single-use promotion released");
        }
        Ok(result.aggregate)
    }

    #[tracing::instrument(skip(self, new), fields(name = %new.name))]
    pub async fn create_promotion(
        &self,
        seller: AccountId,
        new: NewPromotion,
    ) -> Result<Promotion, DomainError> {
        let promotion_id = AggregateId::new();
        let now = Utc::now();
        let result = self
            .handler
            .execute(promotion_id, Some(seller), |promotion| {
                promotion.create(
                    promotion_id,
                    seller,
                    new.clone(),
                    PromotionKind::General,
                    now,
                )
            })
            .await?;
        Ok(result.aggregate)
    }

    /// Issues a single-use refund promotion worth `amount` to `buyer`, valid
    /// for one month, under the caller-chosen `promotion_id`.
    ///
    /// Issuing again with the same id and order returns the promotion already
    /// stored, so a caller retrying after a partial failure never creates a
    /// second refund.
    #[tracing::instrument(skip(self))]
    pub async fn issue_refund(
        &self,
        promotion_id: AggregateId,
        seller: AccountId,
        buyer: AccountId,
        amount: Money,
        note: &str,
        order_id: AggregateId,
    ) -> Result<Promotion, DomainError> {
        if !amount.is_positive() {
            return Err(PromotionError::InvalidRule(format!("refund of {amount}")).into());
        }

        let now = Utc::now();
        let ends_at = now
            .checked_add_months(Months::new(1))
            .unwrap_or(now + Duration::days(30));
        let new = NewPromotion {
            name: format!("Refund for order {order_id}"),
            rule: DiscountRule::flat(amount),
            starts_at: now,
            ends_at,
            single_use: true,
            assigned_to: Some(buyer),
            note: Some(note.to_string()),
        };
        let kind = PromotionKind::Refund { order_id };

        let result = self
            .handler
            .execute(promotion_id, Some(seller), |promotion| {
                if promotion.id().is_some() && promotion.kind() == kind {
                    return Ok(Vec::new());
                }
                promotion.create(promotion_id, seller, new.clone(), kind, now)
            })
            .await?;

        if result.events.is_empty() {
            tracing::info!(%promotion_id, %order_id, "refund promotion already issued");
        } else {
            metrics::counter!("refunds_issued_total").increment(1);
            tracing::info!(%promotion_id, %buyer, %amount, "refund promotion issued");
        }
        Ok(result.aggregate)
    }

    #[tracing::instrument(skip(self))]
    pub async fn set_active(
        &self,
        seller: AccountId,
        promotion_id: AggregateId,
        active: bool,
    ) -> Result<Promotion, DomainError> {
        let now = Utc::now();
        let result = self
            .handler
            .execute_existing(promotion_id, Some(seller), |promotion| {
                promotion.set_active(seller, active, now)
            })
            .await?;
        Ok(result.aggregate)
    }

    pub async fn get_promotion(
        &self,
        promotion_id: AggregateId,
    ) -> Result<Option<Promotion>, DomainError> {
        self.handler.load_existing(promotion_id).await
    }
}
