//! Trade post aggregate and its proposal arena.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use common::AggregateId;
use event_store::Version;
use serde::{Deserialize, Serialize};

use crate::aggregate::Aggregate;
use crate::value_objects::{AccountId, ProductId, ProposalId};

use super::{
    TradeError,
    events::{
        CounterOfferedData, PostModeratedData, ProposalAcceptedData, ProposalSubmittedData,
        ProposalsRejectedData, TradeEvent, TradePostCreatedData,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TradePostStatus {
    /// Waiting for moderation.
    #[default]
    Processing,
    Sent,
    Approved,
    Cancelled,
    /// A proposal was accepted.
    Completed,
}

impl TradePostStatus {
    /// Completed and cancelled posts take no further negotiation.
    pub fn is_closed(&self) -> bool {
        matches!(self, TradePostStatus::Completed | TradePostStatus::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TradePostStatus::Processing => "Processing",
            TradePostStatus::Sent => "Sent",
            TradePostStatus::Approved => "Approved",
            TradePostStatus::Cancelled => "Cancelled",
            TradePostStatus::Completed => "Completed",
        }
    }
}

impl std::fmt::Display for TradePostStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TradePostStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "Processing" => TradePostStatus::Processing,
            "Sent" => TradePostStatus::Sent,
            "Approved" => TradePostStatus::Approved,
            "Cancelled" => TradePostStatus::Cancelled,
            "Completed" => TradePostStatus::Completed,
            other => return Err(format!("unknown trade post status: {other}")),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ProposalStatus {
    #[default]
    Sent,
    /// Answered by a counter-offer, which now carries the negotiation.
    Countered,
    Accepted,
    Rejected,
}

impl ProposalStatus {
    pub fn is_settled(&self) -> bool {
        matches!(self, ProposalStatus::Accepted | ProposalStatus::Rejected)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalStatus::Sent => "Sent",
            ProposalStatus::Countered => "Countered",
            ProposalStatus::Accepted => "Accepted",
            ProposalStatus::Rejected => "Rejected",
        }
    }
}

impl std::fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TradeProposal {
    pub id: ProposalId,
    pub proposer: AccountId,
    pub items: Vec<ProductId>,
    pub status: ProposalStatus,
    pub message: Option<String>,
    pub parent: Option<ProposalId>,
    pub is_counter_offer: bool,
    /// Creation order within the post.
    pub seq: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A post offering one opened item for barter, together with every
/// proposal made on it.
///
/// Proposals form a forest: roots are direct proposals, children are
/// counter-offers. The tree lives in an arena keyed by id with a separate
/// children index, so walking it never recurses.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TradePost {
    id: Option<AggregateId>,
    version: Version,
    author: Option<AccountId>,
    item_id: Option<ProductId>,
    title: String,
    description: Option<String>,
    status: TradePostStatus,
    proposals: HashMap<ProposalId, TradeProposal>,
    #[serde(skip)]
    children: HashMap<ProposalId, Vec<ProposalId>>,
    #[serde(skip)]
    next_seq: u64,
    completed_proposal: Option<ProposalId>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Aggregate for TradePost {
    type Event = TradeEvent;
    type Error = TradeError;

    fn aggregate_type() -> &'static str {
        "TradePost"
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
            TradeEvent::TradePostCreated(data) => {
                self.id = Some(data.post_id);
                self.author = Some(data.author);
                self.item_id = Some(data.item_id);
                self.title = data.title;
                self.description = data.description;
                self.status = TradePostStatus::Processing;
                self.created_at = data.created_at;
                self.updated_at = data.created_at;
            }
            TradeEvent::PostModerated(data) => {
                self.status = data.status;
                self.updated_at = data.at;
            }
            TradeEvent::ProposalSubmitted(data) => {
                self.insert_proposal(
                    data.proposal_id,
                    data.proposer,
                    data.items,
                    data.message,
                    None,
                    data.at,
                );
            }
            TradeEvent::CounterOffered(data) => {
                self.set_proposal_status(data.countered, ProposalStatus::Countered, data.at);
                self.insert_proposal(
                    data.proposal_id,
                    data.proposer,
                    data.items,
                    data.message,
                    Some(data.countered),
                    data.at,
                );
            }
            TradeEvent::ProposalAccepted(data) => {
                self.set_proposal_status(data.proposal_id, ProposalStatus::Accepted, data.at);
                for id in data.rejected {
                    self.set_proposal_status(id, ProposalStatus::Rejected, data.at);
                }
                self.status = TradePostStatus::Completed;
                self.completed_proposal = Some(data.proposal_id);
            }
            TradeEvent::ProposalsRejected(data) => {
                for id in data.rejected {
                    self.set_proposal_status(id, ProposalStatus::Rejected, data.at);
                }
            }
        }
    }
}

// Query methods
impl TradePost {
    pub fn author(&self) -> Option<AccountId> {
        self.author
    }

    pub fn item_id(&self) -> Option<&ProductId> {
        self.item_id.as_ref()
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn status(&self) -> TradePostStatus {
        self.status
    }

    pub fn completed_proposal(&self) -> Option<ProposalId> {
        self.completed_proposal
    }

    pub fn proposal(&self, id: ProposalId) -> Option<&TradeProposal> {
        self.proposals.get(&id)
    }

    /// Every proposal in creation order.
    pub fn proposals(&self) -> Vec<&TradeProposal> {
        let mut proposals: Vec<_> = self.proposals.values().collect();
        proposals.sort_by_key(|p| p.seq);
        proposals
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// The proposal that started the chain `id` belongs to.
    pub fn chain_root(&self, id: ProposalId) -> Option<ProposalId> {
        let mut current = self.proposals.get(&id)?;
        // A well-formed arena has no cycles; the bound only guards replayed
        // garbage.
        for _ in 0..self.proposals.len() {
            match current.parent.and_then(|p| self.proposals.get(&p)) {
                Some(parent) => current = parent,
                None => return Some(current.id),
            }
        }
        None
    }

    /// Every proposal below `id` in the counter-offer tree, `id` excluded.
    pub fn descendants(&self, id: ProposalId) -> Vec<ProposalId> {
        let mut found = Vec::new();
        let mut stack: Vec<ProposalId> = self.children.get(&id).cloned().unwrap_or_default();

        while let Some(next) = stack.pop() {
            if found.contains(&next) {
                continue;
            }
            found.push(next);
            if let Some(children) = self.children.get(&next) {
                stack.extend(children.iter().copied());
            }
        }
        found
    }

    fn get_proposal(&self, id: ProposalId) -> Result<&TradeProposal, TradeError> {
        self.proposals.get(&id).ok_or(TradeError::ProposalNotFound(id))
    }

    fn ensure_open(&self, action: &'static str) -> Result<(), TradeError> {
        if self.status.is_closed() {
            return Err(TradeError::InvalidTransition {
                current: self.status,
                action,
            });
        }
        Ok(())
    }
}

// Command methods (return events)
impl TradePost {
    pub fn create(
        &self,
        post_id: AggregateId,
        author: AccountId,
        item_id: ProductId,
        title: &str,
        description: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Vec<TradeEvent>, TradeError> {
        if self.id.is_some() {
            return Err(TradeError::AlreadyCreated);
        }
        let title = title.trim();
        if title.is_empty() {
            return Err(TradeError::InvalidPost("title is required".to_string()));
        }

        Ok(vec![TradeEvent::TradePostCreated(TradePostCreatedData {
            post_id,
            author,
            item_id,
            title: title.to_string(),
            description,
            created_at: now,
        })])
    }

    /// Moderation outcome from an administrator. Role checks happen upstream.
    pub fn moderate(
        &self,
        moderator: AccountId,
        status: TradePostStatus,
        now: DateTime<Utc>,
    ) -> Result<Vec<TradeEvent>, TradeError> {
        if !matches!(
            status,
            TradePostStatus::Sent | TradePostStatus::Approved | TradePostStatus::Cancelled
        ) {
            return Err(TradeError::InvalidModeration(status));
        }
        self.ensure_open("moderate")?;
        if self.status == status {
            return Ok(vec![]);
        }

        Ok(vec![TradeEvent::PostModerated(PostModeratedData {
            moderator,
            status,
            at: now,
        })])
    }

    pub fn propose(
        &self,
        proposal_id: ProposalId,
        proposer: AccountId,
        items: Vec<ProductId>,
        message: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Vec<TradeEvent>, TradeError> {
        if self.author == Some(proposer) {
            return Err(TradeError::SelfTradeRejected);
        }
        if items.is_empty() {
            return Err(TradeError::NoItemsOffered);
        }
        self.ensure_open("propose on")?;

        Ok(vec![TradeEvent::ProposalSubmitted(ProposalSubmittedData {
            proposal_id,
            proposer,
            items,
            message,
            at: now,
        })])
    }

    /// Answers `countered` with a new offer.
    ///
    /// Only the post author and the proposer who opened the chain negotiate,
    /// and they take turns: nobody counters their own proposal.
    pub fn counter(
        &self,
        countered: ProposalId,
        proposal_id: ProposalId,
        actor: AccountId,
        items: Vec<ProductId>,
        message: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Vec<TradeEvent>, TradeError> {
        let target = self.get_proposal(countered)?;
        let root = self
            .chain_root(countered)
            .and_then(|id| self.proposals.get(&id))
            .ok_or(TradeError::ProposalNotFound(countered))?;

        if self.author != Some(actor) && root.proposer != actor {
            return Err(TradeError::UnauthorizedCounterOffer { actor });
        }
        if target.proposer == actor {
            return Err(TradeError::CounterOutOfTurn { actor });
        }
        if items.is_empty() {
            return Err(TradeError::NoItemsOffered);
        }
        self.ensure_open("counter on")?;
        if target.status != ProposalStatus::Sent {
            return Err(TradeError::InvalidProposalTransition {
                proposal_id: countered,
                current: target.status,
                action: "counter",
            });
        }

        Ok(vec![TradeEvent::CounterOffered(CounterOfferedData {
            countered,
            proposal_id,
            proposer: actor,
            items,
            message,
            at: now,
        })])
    }

    /// Accepts `proposal_id`, rejects every other open proposal and closes
    /// the post.
    pub fn accept(
        &self,
        proposal_id: ProposalId,
        actor: AccountId,
        now: DateTime<Utc>,
    ) -> Result<Vec<TradeEvent>, TradeError> {
        let target = self.get_proposal(proposal_id)?;
        if self.author != Some(actor) {
            return Err(TradeError::Forbidden {
                actor,
                action: "accept",
            });
        }
        self.ensure_open("accept on")?;
        if target.status != ProposalStatus::Sent {
            return Err(TradeError::InvalidProposalTransition {
                proposal_id,
                current: target.status,
                action: "accept",
            });
        }

        let rejected = self
            .proposals()
            .into_iter()
            .filter(|p| p.id != proposal_id && !p.status.is_settled())
            .map(|p| p.id)
            .collect();

        Ok(vec![TradeEvent::ProposalAccepted(ProposalAcceptedData {
            proposal_id,
            rejected,
            at: now,
        })])
    }

    /// Rejects `proposal_id` and everything its chain produced after it.
    ///
    /// Proposals of the chain created earlier than the target keep their
    /// status.
    pub fn reject(
        &self,
        proposal_id: ProposalId,
        actor: AccountId,
        now: DateTime<Utc>,
    ) -> Result<Vec<TradeEvent>, TradeError> {
        let target = self.get_proposal(proposal_id)?;
        if self.author != Some(actor) && target.proposer != actor {
            return Err(TradeError::Forbidden {
                actor,
                action: "reject",
            });
        }
        if target.status.is_settled() {
            return Err(TradeError::InvalidProposalTransition {
                proposal_id,
                current: target.status,
                action: "reject",
            });
        }

        let root = self.chain_root(proposal_id).unwrap_or(proposal_id);
        let mut later: Vec<&TradeProposal> = self
            .descendants(root)
            .into_iter()
            .filter_map(|id| self.proposals.get(&id))
            .filter(|p| p.seq > target.seq && !p.status.is_settled())
            .collect();
        later.sort_by_key(|p| p.seq);

        let mut rejected = vec![proposal_id];
        rejected.extend(later.into_iter().map(|p| p.id));

        Ok(vec![TradeEvent::ProposalsRejected(ProposalsRejectedData {
            proposal_id,
            rejected,
            by: actor,
            at: now,
        })])
    }
}

// Apply event helpers
impl TradePost {
    fn insert_proposal(
        &mut self,
        id: ProposalId,
        proposer: AccountId,
        items: Vec<ProductId>,
        message: Option<String>,
        parent: Option<ProposalId>,
        at: DateTime<Utc>,
    ) {
        self.next_seq += 1;
        self.proposals.insert(
            id,
            TradeProposal {
                id,
                proposer,
                items,
                status: ProposalStatus::Sent,
                message,
                parent,
                is_counter_offer: parent.is_some(),
                seq: self.next_seq,
                created_at: at,
                updated_at: at,
            },
        );
        if let Some(parent) = parent {
            self.children.entry(parent).or_default().push(id);
        }
        self.updated_at = at;
    }

    fn set_proposal_status(&mut self, id: ProposalId, status: ProposalStatus, at: DateTime<Utc>) {
        if let Some(proposal) = self.proposals.get_mut(&id) {
            proposal.status = status;
            proposal.updated_at = at;
        }
        self.updated_at = at;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        post: TradePost,
        author: AccountId,
        buyer: AccountId,
    }

    fn run(
        post: &mut TradePost,
        decide: impl FnOnce(&TradePost) -> Result<Vec<TradeEvent>, TradeError>,
    ) {
        let events = decide(post).unwrap();
        post.apply_events(events);
    }

    fn fixture() -> Fixture {
        let author = AccountId::new();
        let mut post = TradePost::default();
        run(&mut post, |p| {
            p.create(
                AggregateId::new(),
                author,
                ProductId::new("opened-figure-1"),
                "Trading a rare figure",
                None,
                Utc::now(),
            )
        });
        Fixture {
            post,
            author,
            buyer: AccountId::new(),
        }
    }

    fn items(name: &str) -> Vec<ProductId> {
        vec![ProductId::new(name)]
    }

    fn propose(post: &mut TradePost, proposer: AccountId) -> ProposalId {
        let id = ProposalId::new();
        run(post, |p| p.propose(id, proposer, items("offer"), None, Utc::now()));
        id
    }

    fn counter(post: &mut TradePost, countered: ProposalId, actor: AccountId) -> ProposalId {
        let id = ProposalId::new();
        run(post, |p| {
            p.counter(countered, id, actor, items("counter"), None, Utc::now())
        });
        id
    }

    fn status_of(post: &TradePost, id: ProposalId) -> ProposalStatus {
        post.proposal(id).unwrap().status
    }

    #[test]
    fn new_post_waits_for_moderation() {
        let f = fixture();
        assert_eq!(f.post.status(), TradePostStatus::Processing);
        assert_eq!(f.post.title(), "Trading a rare figure");
    }

    #[test]
    fn self_proposal_is_rejected() {
        let f = fixture();
        let result = f
            .post
            .propose(ProposalId::new(), f.author, items("mine"), None, Utc::now());
        assert!(matches!(result, Err(TradeError::SelfTradeRejected)));
    }

    #[test]
    fn counter_offers_alternate() {
        let mut f = fixture();
        let root = propose(&mut f.post, f.buyer);

        let err = f
            .post
            .counter(root, ProposalId::new(), f.buyer, items("x"), None, Utc::now())
            .unwrap_err();
        assert!(matches!(err, TradeError::CounterOutOfTurn { .. }));

        let stranger = AccountId::new();
        let err = f
            .post
            .counter(root, ProposalId::new(), stranger, items("x"), None, Utc::now())
            .unwrap_err();
        assert!(matches!(err, TradeError::UnauthorizedCounterOffer { .. }));

        let answer = counter(&mut f.post, root, f.author);
        assert_eq!(status_of(&f.post, root), ProposalStatus::Countered);
        let reply = f.post.proposal(answer).unwrap();
        assert!(reply.is_counter_offer);
        assert_eq!(reply.parent, Some(root));

        let err = f
            .post
            .counter(answer, ProposalId::new(), f.author, items("x"), None, Utc::now())
            .unwrap_err();
        assert!(matches!(err, TradeError::CounterOutOfTurn { .. }));

        let back = counter(&mut f.post, answer, f.buyer);
        assert_eq!(f.post.chain_root(back), Some(root));
    }

    #[test]
    fn countered_proposal_cannot_be_countered_again() {
        let mut f = fixture();
        let root = propose(&mut f.post, f.buyer);
        counter(&mut f.post, root, f.author);

        let err = f
            .post
            .counter(root, ProposalId::new(), f.author, items("x"), None, Utc::now())
            .unwrap_err();
        assert!(matches!(
            err,
            TradeError::InvalidProposalTransition {
                current: ProposalStatus::Countered,
                ..
            }
        ));
    }

    #[test]
    fn accept_rejects_other_open_proposals_and_closes_post() {
        let mut f = fixture();
        let other_buyer = AccountId::new();
        let first = propose(&mut f.post, f.buyer);
        let second = propose(&mut f.post, other_buyer);
        let answer = counter(&mut f.post, first, f.author);
        let reply = counter(&mut f.post, answer, f.buyer);

        run(&mut f.post, |p| p.accept(second, f.author, Utc::now()));

        assert_eq!(f.post.status(), TradePostStatus::Completed);
        assert_eq!(f.post.completed_proposal(), Some(second));
        assert_eq!(status_of(&f.post, second), ProposalStatus::Accepted);
        for id in [first, answer, reply] {
            assert_eq!(status_of(&f.post, id), ProposalStatus::Rejected);
        }

        let err = f.post.accept(second, f.author, Utc::now()).unwrap_err();
        assert!(matches!(
            err,
            TradeError::InvalidTransition {
                current: TradePostStatus::Completed,
                ..
            }
        ));
    }

    #[test]
    fn only_author_accepts() {
        let mut f = fixture();
        let root = propose(&mut f.post, f.buyer);
        let err = f.post.accept(root, f.buyer, Utc::now()).unwrap_err();
        assert!(matches!(err, TradeError::Forbidden { .. }));
    }

    #[test]
    fn reject_cascades_to_later_chain_members_only() {
        let mut f = fixture();
        let root = propose(&mut f.post, f.buyer);
        let unrelated = propose(&mut f.post, AccountId::new());
        let c1 = counter(&mut f.post, root, f.author);
        let c2 = counter(&mut f.post, c1, f.buyer);
        let c3 = counter(&mut f.post, c2, f.author);

        run(&mut f.post, |p| p.reject(c2, f.buyer, Utc::now()));

        assert_eq!(status_of(&f.post, root), ProposalStatus::Countered);
        assert_eq!(status_of(&f.post, c1), ProposalStatus::Countered);
        assert_eq!(status_of(&f.post, c2), ProposalStatus::Rejected);
        assert_eq!(status_of(&f.post, c3), ProposalStatus::Rejected);
        assert_eq!(status_of(&f.post, unrelated), ProposalStatus::Sent);
    }

    #[test]
    fn reject_by_outsider_is_forbidden() {
        let mut f = fixture();
        let root = propose(&mut f.post, f.buyer);
        let err = f
            .post
            .reject(root, AccountId::new(), Utc::now())
            .unwrap_err();
        assert!(matches!(err, TradeError::Forbidden { .. }));
    }

    #[test]
    fn descendants_walk_the_whole_subtree() {
        let mut f = fixture();
        let root = propose(&mut f.post, f.buyer);
        let c1 = counter(&mut f.post, root, f.author);
        let c2 = counter(&mut f.post, c1, f.buyer);

        let mut found = f.post.descendants(root);
        found.sort();
        let mut expected = vec![c1, c2];
        expected.sort();
        assert_eq!(found, expected);
        assert!(f.post.descendants(c2).is_empty());
    }

    #[test]
    fn moderation_rules() {
        let mut f = fixture();
        let admin = AccountId::new();

        assert!(matches!(
            f.post.moderate(admin, TradePostStatus::Completed, Utc::now()),
            Err(TradeError::InvalidModeration(TradePostStatus::Completed))
        ));

        run(&mut f.post, |p| {
            p.moderate(admin, TradePostStatus::Approved, Utc::now())
        });
        assert_eq!(f.post.status(), TradePostStatus::Approved);
        assert!(
            f.post
                .moderate(admin, TradePostStatus::Approved, Utc::now())
                .unwrap()
                .is_empty()
        );

        run(&mut f.post, |p| {
            p.moderate(admin, TradePostStatus::Cancelled, Utc::now())
        });
        let err = f
            .post
            .propose(ProposalId::new(), f.buyer, items("x"), None, Utc::now())
            .unwrap_err();
        assert!(matches!(err, TradeError::InvalidTransition { .. }));
    }
}
