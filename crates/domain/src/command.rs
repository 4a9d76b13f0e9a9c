//! Command handling infrastructure.

use std::marker::PhantomData;

use common::AggregateId;
use event_store::{EventEnvelope, EventStore, ExpectedVersion, Version};

use crate::aggregate::{Aggregate, DomainEvent};
use crate::error::DomainError;
use crate::value_objects::AccountId;

/// How many times a command is re-decided after losing an append race.
pub const DEFAULT_RETRY_LIMIT: usize = 3;

/// Outcome of a command.
#[derive(Debug)]
pub struct CommandResult<A: Aggregate> {
    /// The aggregate with the new events applied.
    pub aggregate: A,

    /// Events that were appended. Empty if the decision was a no-op.
    pub events: Vec<A::Event>,

    pub new_version: Version,
}

/// Loads an aggregate, runs a decision against it and appends the result.
///
/// Every append is conditional on the version the decision saw. When another
/// writer got there first the aggregate is reloaded and the decision runs
/// again on the fresh state, up to `retry_limit` times. This is what keeps
/// derived state such as an order's aggregated status consistent with the
/// events it was computed from.
pub struct CommandHandler<S, A>
where
    S: EventStore,
    A: Aggregate,
{
    store: S,
    retry_limit: usize,
    _phantom: PhantomData<A>,
}

impl<S, A> CommandHandler<S, A>
where
    S: EventStore,
    A: Aggregate,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            retry_limit: DEFAULT_RETRY_LIMIT,
            _phantom: PhantomData,
        }
    }

    pub fn with_retry_limit(mut self, retry_limit: usize) -> Self {
        self.retry_limit = retry_limit;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Replays the stream. A missing stream yields a default aggregate.
    pub async fn load(&self, aggregate_id: AggregateId) -> Result<A, DomainError> {
        let events = self.store.load_stream(aggregate_id).await?;
        let mut aggregate = A::default();

        for envelope in events {
            let event: A::Event = serde_json::from_value(envelope.payload)?;
            aggregate.apply(event);
            aggregate.set_version(envelope.version);
        }

        Ok(aggregate)
    }

    pub async fn load_existing(&self, aggregate_id: AggregateId) -> Result<Option<A>, DomainError> {
        let aggregate = self.load(aggregate_id).await?;
        Ok(aggregate.id().is_some().then_some(aggregate))
    }

    /// Runs `decide` against the current state and appends what it returns.
    ///
    /// `decide` may run more than once, so it must not have side effects
    /// beyond what it records in its captures.
    pub async fn execute<F>(
        &self,
        aggregate_id: AggregateId,
        actor: Option<AccountId>,
        mut decide: F,
    ) -> Result<CommandResult<A>, DomainError>
    where
        F: FnMut(&A) -> Result<Vec<A::Event>, A::Error>,
        DomainError: From<A::Error>,
    {
        let mut attempt = 0;
        loop {
            let mut aggregate = self.load(aggregate_id).await?;
            let current_version = aggregate.version();

            let events = decide(&aggregate)?;
            if events.is_empty() {
                return Ok(CommandResult {
                    aggregate,
                    events,
                    new_version: current_version,
                });
            }

            let envelopes = self.build_envelopes(aggregate_id, current_version, actor, &events)?;
            let expected = ExpectedVersion::from_loaded(current_version);

            match self.store.append(envelopes, expected).await {
                Ok(new_version) => {
                    for event in &events {
                        aggregate.apply(event.clone());
                    }
                    aggregate.set_version(new_version);
                    return Ok(CommandResult {
                        aggregate,
                        events,
                        new_version,
                    });
                }
                Err(e) if e.is_conflict() && attempt < self.retry_limit => {
                    attempt += 1;
                    metrics::counter!(
                        "command_conflict_retries_total",
                        "aggregate" => A::aggregate_type()
                    )
                    .increment(1);
                    tracing::debug!(
                        %aggregate_id,
                        aggregate_type = A::aggregate_type(),
                        attempt,
                        "append lost a race, deciding again"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Like [`execute`](Self::execute) but fails with `AggregateNotFound`
    /// instead of deciding against an empty aggregate.
    pub async fn execute_existing<F>(
        &self,
        aggregate_id: AggregateId,
        actor: Option<AccountId>,
        mut decide: F,
    ) -> Result<CommandResult<A>, DomainError>
    where
        F: FnMut(&A) -> Result<Vec<A::Event>, A::Error>,
        DomainError: From<A::Error>,
    {
        let mut missing = false;
        let result = self
            .execute(aggregate_id, actor, |aggregate| {
                missing = aggregate.id().is_none();
                if missing {
                    return Ok(vec![]);
                }
                decide(aggregate)
            })
            .await?;

        if missing {
            return Err(DomainError::AggregateNotFound {
                aggregate_type: A::aggregate_type(),
                aggregate_id: aggregate_id.to_string(),
            });
        }
        Ok(result)
    }

    fn build_envelopes(
        &self,
        aggregate_id: AggregateId,
        current_version: Version,
        actor: Option<AccountId>,
        events: &[A::Event],
    ) -> Result<Vec<EventEnvelope>, DomainError> {
        let mut envelopes = Vec::with_capacity(events.len());
        let mut version = current_version;

        for event in events {
            version = version.next();
            let mut builder = EventEnvelope::builder()
                .aggregate_id(aggregate_id)
                .aggregate_type(A::aggregate_type())
                .event_type(event.event_type())
                .version(version)
                .payload(event)?;
            if let Some(actor) = actor {
                builder = builder.actor(actor);
            }
            envelopes.push(builder.build()?);
        }

        Ok(envelopes)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use async_trait::async_trait;
    use event_store::{EventQuery, EventStoreError, EventStream, InMemoryEventStore};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    enum TallyEvent {
        Opened { id: AggregateId },
        Added { value: i32 },
    }

    impl DomainEvent for TallyEvent {
        fn event_type(&self) -> &'static str {
            match self {
                TallyEvent::Opened { .. } => "TallyOpened",
                TallyEvent::Added { .. } => "TallyAdded",
            }
        }
    }

    #[derive(Debug, Default)]
    struct Tally {
        id: Option<AggregateId>,
        total: i32,
        version: Version,
    }

    #[derive(Debug, thiserror::Error)]
    #[error("negative values are not allowed: {0}")]
    struct NegativeValue(i32);

    impl From<NegativeValue> for DomainError {
        fn from(e: NegativeValue) -> Self {
            DomainError::AggregateNotFound {
                aggregate_type: "Tally",
                aggregate_id: e.to_string(),
            }
        }
    }

    impl Aggregate for Tally {
        type Event = TallyEvent;
        type Error = NegativeValue;

        fn aggregate_type() -> &'static str {
            "Tally"
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
                TallyEvent::Opened { id } => self.id = Some(id),
                TallyEvent::Added { value } => self.total += value,
            }
        }
    }

    /// Store that fails the first `conflicts` appends as if another writer won.
    #[derive(Clone)]
    struct RacingStore {
        inner: InMemoryEventStore,
        conflicts: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl EventStore for RacingStore {
        async fn append(
            &self,
            events: Vec<EventEnvelope>,
            expected: ExpectedVersion,
        ) -> event_store::Result<Version> {
            if self
                .conflicts
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(EventStoreError::ConcurrencyConflict {
                    aggregate_id: events[0].aggregate_id,
                    expected,
                    actual: Version::new(99),
                });
            }
            self.inner.append(events, expected).await
        }

        async fn load_stream(&self, id: AggregateId) -> event_store::Result<Vec<EventEnvelope>> {
            self.inner.load_stream(id).await
        }

        async fn stream_version(&self, id: AggregateId) -> event_store::Result<Option<Version>> {
            self.inner.stream_version(id).await
        }

        async fn read_all_from(&self, after: u64) -> event_store::Result<EventStream> {
            self.inner.read_all_from(after).await
        }

        async fn query_events(&self, query: EventQuery) -> event_store::Result<Vec<EventEnvelope>> {
            self.inner.query_events(query).await
        }
    }

    #[tokio::test]
    async fn execute_creates_and_updates() {
        let handler: CommandHandler<_, Tally> = CommandHandler::new(InMemoryEventStore::new());
        let id = AggregateId::new();

        let created = handler
            .execute(id, None, |_| Ok(vec![TallyEvent::Opened { id }]))
            .await
            .unwrap();
        assert_eq!(created.new_version, Version::first());

        let updated = handler
            .execute(id, None, |_| Ok(vec![TallyEvent::Added { value: 4 }]))
            .await
            .unwrap();
        assert_eq!(updated.new_version, Version::new(2));
        assert_eq!(updated.aggregate.total, 4);
    }

    #[tokio::test]
    async fn decision_errors_are_returned_without_appending() {
        let store = InMemoryEventStore::new();
        let handler: CommandHandler<_, Tally> = CommandHandler::new(store.clone());

        let result = handler
            .execute(AggregateId::new(), None, |_| Err(NegativeValue(-1)))
            .await;

        assert!(result.is_err());
        assert_eq!(store.event_count().await, 0);
    }

    #[tokio::test]
    async fn empty_decision_persists_nothing() {
        let store = InMemoryEventStore::new();
        let handler: CommandHandler<_, Tally> = CommandHandler::new(store.clone());

        let result = handler
            .execute(AggregateId::new(), None, |_| Ok(vec![]))
            .await
            .unwrap();

        assert!(result.events.is_empty());
        assert_eq!(result.new_version, Version::initial());
        assert_eq!(store.event_count().await, 0);
    }

    #[tokio::test]
    async fn actor_is_recorded_in_metadata() {
        let store = InMemoryEventStore::new();
        let handler: CommandHandler<_, Tally> = CommandHandler::new(store.clone());
        let id = AggregateId::new();
        let actor = AccountId::new();

        handler
            .execute(id, Some(actor), |_| Ok(vec![TallyEvent::Opened { id }]))
            .await
            .unwrap();

        let stream = store.load_stream(id).await.unwrap();
        assert_eq!(stream[0].actor(), Some(actor.to_string().as_str()));
    }

    #[tokio::test]
    async fn conflicts_are_retried_with_a_fresh_decision() {
        let store = RacingStore {
            inner: InMemoryEventStore::new(),
            conflicts: Arc::new(AtomicUsize::new(2)),
        };
        let handler: CommandHandler<_, Tally> = CommandHandler::new(store);
        let id = AggregateId::new();

        let mut decisions = 0;
        let result = handler
            .execute(id, None, |_| {
                decisions += 1;
                Ok(vec![TallyEvent::Opened { id }])
            })
            .await
            .unwrap();

        assert_eq!(decisions, 3);
        assert_eq!(result.new_version, Version::first());
    }

    #[tokio::test]
    async fn gives_up_after_retry_limit() {
        let store = RacingStore {
            inner: InMemoryEventStore::new(),
            conflicts: Arc::new(AtomicUsize::new(10)),
        };
        let handler: CommandHandler<_, Tally> = CommandHandler::new(store).with_retry_limit(1);
        let id = AggregateId::new();

        let err = handler
            .execute(id, None, |_| Ok(vec![TallyEvent::Opened { id }]))
            .await
            .unwrap_err();

        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn execute_existing_rejects_missing_aggregates() {
        let handler: CommandHandler<_, Tally> = CommandHandler::new(InMemoryEventStore::new());

        let err = handler
            .execute_existing(AggregateId::new(), None, |_| {
                Ok(vec![TallyEvent::Added { value: 1 }])
            })
            .await
            .unwrap_err();

        assert!(matches!(err, DomainError::AggregateNotFound { .. }));
    }
}
