//! Trade posts and the proposal negotiation tree.

mod aggregate;
mod events;
mod service;

pub use aggregate::{ProposalStatus, TradePost, TradePostStatus, TradeProposal};
pub use events::{
    CounterOfferedData, PostModeratedData, ProposalAcceptedData, ProposalSubmittedData,
    ProposalsRejectedData, TradeEvent, TradePostCreatedData,
};
pub use service::TradeService;

use thiserror::Error;

use crate::value_objects::{AccountId, ProposalId};

#[derive(Debug, Error)]
pub enum TradeError {
    #[error("Trade post already created")]
    AlreadyCreated,

    #[error("Invalid trade post: {0}")]
    InvalidPost(String),

    #[error("A proposal must offer at least one item")]
    NoItemsOffered,

    #[error("Cannot propose a trade on your own post")]
    SelfTradeRejected,

    #[error("Account {actor} is not part of this negotiation")]
    UnauthorizedCounterOffer { actor: AccountId },

    #[error("Account {actor} cannot counter their own proposal")]
    CounterOutOfTurn { actor: AccountId },

    #[error("Proposal {0} not found on this post")]
    ProposalNotFound(ProposalId),

    #[error("Invalid transition: cannot {action} a trade post in {current} status")]
    InvalidTransition {
        current: TradePostStatus,
        action: &'static str,
    },

    #[error("Invalid transition: cannot {action} proposal {proposal_id} in {current} status")]
    InvalidProposalTransition {
        proposal_id: ProposalId,
        current: ProposalStatus,
        action: &'static str,
    },

    #[error("Account {actor} may not {action} on this trade post")]
    Forbidden {
        actor: AccountId,
        action: &'static str,
    },

    #[error("A trade post cannot be moderated to {0}")]
    InvalidModeration(TradePostStatus),
}
