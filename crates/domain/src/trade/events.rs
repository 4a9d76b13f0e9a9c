//! Trade post domain events.

use chrono::{DateTime, Utc};
use common::AggregateId;
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;
use crate::value_objects::{AccountId, ProductId, ProposalId};

use super::TradePostStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum TradeEvent {
    TradePostCreated(TradePostCreatedData),
    PostModerated(PostModeratedData),
    /// A root proposal, not answering any other.
    ProposalSubmitted(ProposalSubmittedData),
    /// Marks `countered` as countered and adds the answer as its child.
    CounterOffered(CounterOfferedData),
    ProposalAccepted(ProposalAcceptedData),
    ProposalsRejected(ProposalsRejectedData),
}

impl DomainEvent for TradeEvent {
    fn event_type(&self) -> &'static str {
        match self {
            TradeEvent::TradePostCreated(_) => "TradePostCreated",
            TradeEvent::PostModerated(_) => "PostModerated",
            TradeEvent::ProposalSubmitted(_) => "ProposalSubmitted",
            TradeEvent::CounterOffered(_) => "CounterOffered",
            TradeEvent::ProposalAccepted(_) => "ProposalAccepted",
            TradeEvent::ProposalsRejected(_) => "ProposalsRejected",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradePostCreatedData {
    pub post_id: AggregateId,
    pub author: AccountId,
    pub item_id: ProductId,
    pub title: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostModeratedData {
    pub moderator: AccountId,
    pub status: TradePostStatus,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposalSubmittedData {
    pub proposal_id: ProposalId,
    pub proposer: AccountId,
    pub items: Vec<ProductId>,
    pub message: Option<String>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CounterOfferedData {
    pub countered: ProposalId,
    pub proposal_id: ProposalId,
    pub proposer: AccountId,
    pub items: Vec<ProductId>,
    pub message: Option<String>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposalAcceptedData {
    pub proposal_id: ProposalId,
    /// Every other open proposal on the post, rejected by the acceptance.
    pub rejected: Vec<ProposalId>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposalsRejectedData {
    pub proposal_id: ProposalId,
    /// The target followed by the later proposals of its chain.
    pub rejected: Vec<ProposalId>,
    pub by: AccountId,
    pub at: DateTime<Utc>,
}
