//! Per-detail fulfillment stages and the order status derived from them.

use serde::{Deserialize, Serialize};

/// Stage of a single order detail.
///
/// ```text
/// Pending ──► Confirmed ──► Processing ──► Completed
///    │            │
///    └────────────┴──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FulfillmentStage {
    #[default]
    Pending,
    Confirmed,
    Processing,
    Completed,
    Cancelled,
}

impl FulfillmentStage {
    pub fn is_active(&self) -> bool {
        !matches!(self, FulfillmentStage::Cancelled)
    }

    /// Whether a seller may still cancel a detail at this stage.
    pub fn can_cancel(&self) -> bool {
        matches!(self, FulfillmentStage::Pending | FulfillmentStage::Confirmed)
    }

    /// Position along the pipeline; cancelled details have none.
    fn rank(&self) -> Option<u8> {
        match self {
            FulfillmentStage::Pending => Some(0),
            FulfillmentStage::Confirmed => Some(1),
            FulfillmentStage::Processing => Some(2),
            FulfillmentStage::Completed => Some(3),
            FulfillmentStage::Cancelled => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FulfillmentStage::Pending => "Pending",
            FulfillmentStage::Confirmed => "Confirmed",
            FulfillmentStage::Processing => "Processing",
            FulfillmentStage::Completed => "Completed",
            FulfillmentStage::Cancelled => "Cancelled",
        }
    }
}

impl std::fmt::Display for FulfillmentStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status of a whole order. Always derived from its details, see
/// [`aggregate_status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum OrderStatus {
    #[default]
    Pending,
    Confirmed,
    Processing,
    Completed,
    Cancelled,
    PartiallyConfirmed,
    PartiallyProcessing,
    PartiallyCompleted,
    /// Some details were cancelled and every remaining one is still pending.
    PartiallyCancelled,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }

    /// Only a fully pending order may be cancelled by its buyer.
    pub fn can_buyer_cancel(&self) -> bool {
        matches!(self, OrderStatus::Pending)
    }

    /// The buyer confirms receipt once everything is in processing.
    pub fn can_buyer_complete(&self) -> bool {
        matches!(self, OrderStatus::Processing)
    }

    pub fn can_seller_cancel(&self) -> bool {
        !self.is_terminal()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "Pending",
            OrderStatus::Confirmed => "Confirmed",
            OrderStatus::Processing => "Processing",
            OrderStatus::Completed => "Completed",
            OrderStatus::Cancelled => "Cancelled",
            OrderStatus::PartiallyConfirmed => "PartiallyConfirmed",
            OrderStatus::PartiallyProcessing => "PartiallyProcessing",
            OrderStatus::PartiallyCompleted => "PartiallyCompleted",
            OrderStatus::PartiallyCancelled => "PartiallyCancelled",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "Pending" => OrderStatus::Pending,
            "Confirmed" => OrderStatus::Confirmed,
            "Processing" => OrderStatus::Processing,
            "Completed" => OrderStatus::Completed,
            "Cancelled" => OrderStatus::Cancelled,
            "PartiallyConfirmed" => OrderStatus::PartiallyConfirmed,
            "PartiallyProcessing" => OrderStatus::PartiallyProcessing,
            "PartiallyCompleted" => OrderStatus::PartiallyCompleted,
            "PartiallyCancelled" => OrderStatus::PartiallyCancelled,
            other => return Err(format!("unknown order status: {other}")),
        })
    }
}

/// Derives the order status from the stages of its details.
///
/// - every detail cancelled: `Cancelled`
/// - every active detail at the same stage: that stage, except that all
///   pending alongside a cancelled detail is `PartiallyCancelled`
/// - active details at different stages: `Partially` + the most advanced one
pub fn aggregate_status(stages: impl IntoIterator<Item = FulfillmentStage>) -> OrderStatus {
    let mut any_cancelled = false;
    let mut least: Option<FulfillmentStage> = None;
    let mut most: Option<FulfillmentStage> = None;

    for stage in stages {
        let Some(rank) = stage.rank() else {
            any_cancelled = true;
            continue;
        };
        if least.and_then(|s| s.rank()).is_none_or(|r| rank < r) {
            least = Some(stage);
        }
        if most.and_then(|s| s.rank()).is_none_or(|r| rank > r) {
            most = Some(stage);
        }
    }

    let (Some(least), Some(most)) = (least, most) else {
        return OrderStatus::Cancelled;
    };

    if least == most {
        return match least {
            FulfillmentStage::Pending if any_cancelled => OrderStatus::PartiallyCancelled,
            FulfillmentStage::Pending => OrderStatus::Pending,
            FulfillmentStage::Confirmed => OrderStatus::Confirmed,
            FulfillmentStage::Processing => OrderStatus::Processing,
            FulfillmentStage::Completed => OrderStatus::Completed,
            FulfillmentStage::Cancelled => OrderStatus::Cancelled,
        };
    }

    match most {
        FulfillmentStage::Completed => OrderStatus::PartiallyCompleted,
        FulfillmentStage::Processing => OrderStatus::PartiallyProcessing,
        _ => OrderStatus::PartiallyConfirmed,
    }
}

/// A forward move a seller makes on their own details.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SellerTransition {
    Confirm,
    Process,
    Complete,
}

impl SellerTransition {
    /// Stage the seller's details must be at.
    pub fn from_stage(&self) -> FulfillmentStage {
        match self {
            SellerTransition::Confirm => FulfillmentStage::Pending,
            SellerTransition::Process => FulfillmentStage::Confirmed,
            SellerTransition::Complete => FulfillmentStage::Processing,
        }
    }

    pub fn to_stage(&self) -> FulfillmentStage {
        match self {
            SellerTransition::Confirm => FulfillmentStage::Confirmed,
            SellerTransition::Process => FulfillmentStage::Processing,
            SellerTransition::Complete => FulfillmentStage::Completed,
        }
    }

    /// Order statuses in which this move is accepted.
    pub fn allowed_from(&self, status: OrderStatus) -> bool {
        use OrderStatus::*;
        match self {
            SellerTransition::Confirm => matches!(
                status,
                Pending
                    | PartiallyCancelled
                    | PartiallyConfirmed
                    | PartiallyProcessing
                    | PartiallyCompleted
            ),
            SellerTransition::Process => matches!(
                status,
                Confirmed | PartiallyConfirmed | PartiallyProcessing | PartiallyCompleted
            ),
            SellerTransition::Complete => {
                matches!(status, Processing | PartiallyProcessing | PartiallyCompleted)
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SellerTransition::Confirm => "confirm",
            SellerTransition::Process => "process",
            SellerTransition::Complete => "complete",
        }
    }
}
