//! Promotion aggregate and discount evaluation.

use chrono::{DateTime, Utc};
use common::AggregateId;
use event_store::Version;
use serde::{Deserialize, Serialize};

use crate::aggregate::Aggregate;
use crate::value_objects::{AccountId, Money};

use super::{
    PromotionError,
    events::{
        ActivationChangedData, PromotionCreatedData, PromotionEvent, PromotionRedeemedData,
        RedemptionReleasedData,
    },
};

/// How much a promotion takes off a subtotal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DiscountRule {
    /// Percentage of the subtotal, 0 to 100.
    #[serde(default)]
    pub rate_percent: u32,
    /// Fixed discount. Wins over the rate when positive.
    #[serde(default)]
    pub flat_amount: Money,
    /// Cap applied to the rate-based discount.
    #[serde(default)]
    pub max_discount: Option<Money>,
}

impl DiscountRule {
    pub fn rate(rate_percent: u32, max_discount: Option<Money>) -> Self {
        Self {
            rate_percent,
            flat_amount: Money::zero(),
            max_discount,
        }
    }

    pub fn flat(amount: Money) -> Self {
        Self {
            rate_percent: 0,
            flat_amount: amount,
            max_discount: None,
        }
    }

    pub fn discount_for(&self, subtotal: Money) -> Money {
        if self.flat_amount.is_positive() {
            return self.flat_amount;
        }
        let discount = subtotal.percent(self.rate_percent);
        match self.max_discount {
            Some(cap) => discount.min(cap),
            None => discount,
        }
    }

    fn validate(&self) -> Result<(), PromotionError> {
        if self.rate_percent > 100 {
            return Err(PromotionError::InvalidRule(format!(
                "rate {}% exceeds 100%",
                self.rate_percent
            )));
        }
        if self.flat_amount.is_negative() || self.max_discount.is_some_and(|m| m.is_negative()) {
            return Err(PromotionError::InvalidRule(
                "amounts must not be negative".to_string(),
            ));
        }
        if self.rate_percent == 0 && !self.flat_amount.is_positive() {
            return Err(PromotionError::InvalidRule(
                "rule grants no discount".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum PromotionKind {
    /// Created by a seller for their customers.
    #[default]
    General,
    /// Issued to a buyer after a seller cancelled part of a prepaid order.
    Refund { order_id: AggregateId },
}

/// Input for a seller-created promotion.
#[derive(Debug, Clone, Deserialize)]
pub struct NewPromotion {
    pub name: String,
    pub rule: DiscountRule,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    #[serde(default)]
    pub single_use: bool,
    #[serde(default)]
    pub assigned_to: Option<AccountId>,
    #[serde(default)]
    pub note: Option<String>,
}

/// Result of checking a promotion against a purchase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Redemption {
    pub discount: Money,
    /// The promotion is single-use and applying it uses it up.
    pub consumes: bool,
}

impl Redemption {
    pub fn final_price(&self, subtotal: Money) -> Money {
        subtotal.saturating_sub(self.discount)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Promotion {
    id: Option<AggregateId>,
    version: Version,
    name: String,
    seller: Option<AccountId>,
    rule: DiscountRule,
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
    active: bool,
    single_use: bool,
    assigned_to: Option<AccountId>,
    used: bool,
    used_by: Option<AccountId>,
    used_at: Option<DateTime<Utc>>,
    kind: PromotionKind,
    note: Option<String>,
    created_at: DateTime<Utc>,
}

impl Aggregate for Promotion {
    type Event = PromotionEvent;
    type Error = PromotionError;

    fn aggregate_type() -> &'static str {
        "Promotion"
    }

    fn id(&self) -> Option<AggregateId> {
        self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            PromotionEvent::PromotionCreated(data) => {
                self.id = Some(data.promotion_id);
                self.name = data.name;
                self.seller = Some(data.seller);
                self.rule = data.rule;
                self.starts_at = data.starts_at;
                self.ends_at = data.ends_at;
                self.active = true;
                self.single_use = data.single_use;
                self.assigned_to = data.assigned_to;
                self.kind = data.kind;
                self.note = data.note;
                self.created_at = data.created_at;
            }
            PromotionEvent::PromotionRedeemed(data) => {
                self.used = true;
                self.used_by = Some(data.buyer);
                self.used_at = Some(data.at);
            }
            PromotionEvent::RedemptionReleased(_) => {
                self.used = false;
                self.used_by = None;
                self.used_at = None;
            }
            PromotionEvent::ActivationChanged(data) => self.active = data.active,
        }
    }
}

// Query methods
impl Promotion {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn seller(&self) -> Option<AccountId> {
        self.seller
    }

    pub fn rule(&self) -> DiscountRule {
        self.rule
    }

    pub fn window(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        (self.starts_at, self.ends_at)
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_single_use(&self) -> bool {
        self.single_use
    }

    pub fn assigned_to(&self) -> Option<AccountId> {
        self.assigned_to
    }

    pub fn is_used(&self) -> bool {
        self.used
    }

    pub fn kind(&self) -> PromotionKind {
        self.kind
    }

    pub fn note(&self) -> Option<&str> {
        self.note.as_deref()
    }

    /// Checks the promotion against a purchase without changing it.
    ///
    /// None means the promotion does not apply and the subtotal stands.
    pub fn evaluate(
        &self,
        subtotal: Money,
        buyer: Option<AccountId>,
        now: DateTime<Utc>,
    ) -> Option<Redemption> {
        self.id?;
        if !self.active || now < self.starts_at || now >= self.ends_at {
            return None;
        }
        if self.single_use && (self.used || buyer.is_none() || buyer != self.assigned_to) {
            return None;
        }

        Some(Redemption {
            discount: self.rule.discount_for(subtotal),
            consumes: self.single_use,
        })
    }
}

// Command methods (return events)
impl Promotion {
    pub fn create(
        &self,
        promotion_id: AggregateId,
        seller: AccountId,
        new: NewPromotion,
        kind: PromotionKind,
        now: DateTime<Utc>,
    ) -> Result<Vec<PromotionEvent>, PromotionError> {
        if self.id.is_some() {
            return Err(PromotionError::AlreadyCreated);
        }
        if new.name.trim().is_empty() {
            return Err(PromotionError::InvalidRule("name is required".to_string()));
        }
        if new.ends_at <= new.starts_at {
            return Err(PromotionError::InvalidWindow {
                starts_at: new.starts_at,
                ends_at: new.ends_at,
            });
        }
        new.rule.validate()?;
        if new.single_use && new.assigned_to.is_none() {
            return Err(PromotionError::MissingAssignee);
        }

        Ok(vec![PromotionEvent::PromotionCreated(PromotionCreatedData {
            promotion_id,
            name: new.name,
            seller,
            rule: new.rule,
            starts_at: new.starts_at,
            ends_at: new.ends_at,
            single_use: new.single_use,
            assigned_to: new.assigned_to,
            kind,
            note: new.note,
            created_at: now,
        })])
    }

    /// Uses up a single-use promotion.
    pub fn redeem(
        &self,
        buyer: AccountId,
        subtotal: Money,
        now: DateTime<Utc>,
    ) -> Result<Vec<PromotionEvent>, PromotionError> {
        match self.evaluate(subtotal, Some(buyer), now) {
            Some(redemption) if redemption.consumes => {
                Ok(vec![PromotionEvent::PromotionRedeemed(PromotionRedeemedData {
                    buyer,
                    discount: redemption.discount,
                    at: now,
                })])
            }
            _ => Err(PromotionError::NotRedeemable),
        }
    }

    /// Makes a promotion `buyer` redeemed usable again. A promotion that is
    /// not currently redeemed by `buyer` is left alone.
    pub fn release(
        &self,
        buyer: AccountId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<PromotionEvent>, PromotionError> {
        if !self.used || self.used_by != Some(buyer) {
            return Ok(vec![]);
        }
        Ok(vec![PromotionEvent::RedemptionReleased(
            RedemptionReleasedData {
                buyer,
                reason: reason.to_string(),
                at: now,
            },
        )])
    }

    pub fn set_active(
        &self,
        actor: AccountId,
        active: bool,
        now: DateTime<Utc>,
    ) -> Result<Vec<PromotionEvent>, PromotionError> {
        if self.seller != Some(actor) {
            return Err(PromotionError::Forbidden { actor });
        }
        if self.active == active {
            return Ok(vec![]);
        }
        Ok(vec![PromotionEvent::ActivationChanged(
            ActivationChangedData { active, at: now },
        )])
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn create(new: NewPromotion) -> Promotion {
        let mut promotion = Promotion::default();
        let events = promotion
            .create(
                AggregateId::new(),
                AccountId::new(),
                new,
                PromotionKind::General,
                Utc::now(),
            )
            .unwrap();
        promotion.apply_events(events);
        promotion
    }

    fn new_promotion(rule: DiscountRule) -> NewPromotion {
        let now = Utc::now();
        NewPromotion {
            name: "Summer drop".to_string(),
            rule,
            starts_at: now - Duration::days(1),
            ends_at: now + Duration::days(1),
            single_use: false,
            assigned_to: None,
            note: None,
        }
    }

    #[test]
    fn rate_is_capped() {
        let rule = DiscountRule::rate(10, Some(Money::new(15_000)));
        assert_eq!(rule.discount_for(Money::new(200_000)), Money::new(15_000));
        assert_eq!(rule.discount_for(Money::new(100_000)), Money::new(10_000));
    }

    #[test]
    fn flat_amount_wins_over_rate() {
        let rule = DiscountRule {
            rate_percent: 50,
            flat_amount: Money::new(5_000),
            max_discount: None,
        };
        assert_eq!(rule.discount_for(Money::new(100_000)), Money::new(5_000));
    }

    #[test]
    fn final_price_never_negative() {
        let promotion = create(new_promotion(DiscountRule::flat(Money::new(50_000))));
        let redemption = promotion
            .evaluate(Money::new(20_000), None, Utc::now())
            .unwrap();
        assert_eq!(redemption.final_price(Money::new(20_000)), Money::zero());
    }

    #[test]
    fn outside_window_or_inactive_does_not_apply() {
        let promotion = create(new_promotion(DiscountRule::rate(10, None)));
        let later = Utc::now() + Duration::days(2);
        assert!(promotion.evaluate(Money::new(1_000), None, later).is_none());

        let mut inactive = promotion.clone();
        let owner = inactive.seller().unwrap();
        let events = inactive.set_active(owner, false, Utc::now()).unwrap();
        inactive.apply_events(events);
        assert!(
            inactive
                .evaluate(Money::new(1_000), None, Utc::now())
                .is_none()
        );
    }

    #[test]
    fn window_end_is_exclusive() {
        let promotion = create(new_promotion(DiscountRule::rate(10, None)));
        let (starts_at, ends_at) = promotion.window();
        assert!(promotion.evaluate(Money::new(1_000), None, starts_at).is_some());
        assert!(promotion.evaluate(Money::new(1_000), None, ends_at).is_none());
    }

    #[test]
    fn single_use_only_for_assignee_and_once() {
        let buyer = AccountId::new();
        let mut new = new_promotion(DiscountRule::flat(Money::new(30_000)));
        new.single_use = true;
        new.assigned_to = Some(buyer);
        let mut promotion = create(new);
        let now = Utc::now();

        assert!(
            promotion
                .evaluate(Money::new(100_000), Some(AccountId::new()), now)
                .is_none()
        );
        assert!(promotion.evaluate(Money::new(100_000), None, now).is_none());

        let events = promotion.redeem(buyer, Money::new(100_000), now).unwrap();
        promotion.apply_events(events);
        assert!(promotion.is_used());
        assert!(matches!(
            promotion.redeem(buyer, Money::new(100_000), now),
            Err(PromotionError::NotRedeemable)
        ));
    }

    #[test]
    fn released_redemption_can_be_redeemed_again() {
        let buyer = AccountId::new();
        let mut new = new_promotion(DiscountRule::flat(Money::new(30_000)));
        new.single_use = true;
        new.assigned_to = Some(buyer);
        let mut promotion = create(new);
        let now = Utc::now();

        assert!(promotion.release(buyer, "order not stored", now).unwrap().is_empty());

        let events = promotion.redeem(buyer, Money::new(100_000), now).unwrap();
        promotion.apply_events(events);
        assert!(
            promotion
                .release(AccountId::new(), "order not stored", now)
                .unwrap()
                .is_empty()
        );

        let events = promotion.release(buyer, "order not stored", now).unwrap();
        assert_eq!(events.len(), 1);
        promotion.apply_events(events);
        assert!(!promotion.is_used());
        assert!(promotion.release(buyer, "again", now).unwrap().is_empty());
        assert!(promotion.redeem(buyer, Money::new(100_000), now).is_ok());
    }

    #[test]
    fn create_validates_input() {
        let promotion = Promotion::default();
        let seller = AccountId::new();

        let mut bad_window = new_promotion(DiscountRule::rate(10, None));
        bad_window.ends_at = bad_window.starts_at;
        assert!(matches!(
            promotion.create(
                AggregateId::new(),
                seller,
                bad_window,
                PromotionKind::General,
                Utc::now()
            ),
            Err(PromotionError::InvalidWindow { .. })
        ));

        let too_generous = new_promotion(DiscountRule::rate(120, None));
        assert!(matches!(
            promotion.create(
                AggregateId::new(),
                seller,
                too_generous,
                PromotionKind::General,
                Utc::now()
            ),
            Err(PromotionError::InvalidRule(_))
        ));

        let mut unassigned = new_promotion(DiscountRule::rate(10, None));
        unassigned.single_use = true;
        assert!(matches!(
            promotion.create(
                AggregateId::new(),
                seller,
                unassigned,
                PromotionKind::General,
                Utc::now()
            ),
            Err(PromotionError::MissingAssignee)
        ));
    }

    #[test]
    fn only_owner_toggles_activation() {
        let promotion = create(new_promotion(DiscountRule::rate(10, None)));
        assert!(matches!(
            promotion.set_active(AccountId::new(), false, Utc::now()),
            Err(PromotionError::Forbidden { .. })
        ));

        let owner = promotion.seller().unwrap();
        assert!(promotion.set_active(owner, true, Utc::now()).unwrap().is_empty());
    }
}
