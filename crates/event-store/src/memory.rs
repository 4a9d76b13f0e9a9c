use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    AggregateId, EventEnvelope, EventQuery, EventStoreError, Result, Version,
    store::{EventStore, EventStream, ExpectedVersion, validate_append},
};

#[derive(Default)]
struct Log {
    /// Every event in append order; index + 1 is the global position.
    events: Vec<EventEnvelope>,
    /// Indices into `events` per stream.
    streams: HashMap<AggregateId, Vec<usize>>,
}

impl Log {
    fn version_of(&self, aggregate_id: AggregateId) -> Version {
        self.streams
            .get(&aggregate_id)
            .and_then(|indices| indices.last())
            .map(|&i| self.events[i].version)
            .unwrap_or_else(Version::initial)
    }
}

/// Event store held in process memory.
///
/// Used by tests and by the API server when no database is configured.
/// Cloning shares the underlying log.
#[derive(Clone, Default)]
pub struct InMemoryEventStore {
    log: Arc<RwLock<Log>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn event_count(&self) -> usize {
        self.log.read().await.events.len()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(
        &self,
        events: Vec<EventEnvelope>,
        expected: ExpectedVersion,
    ) -> Result<Version> {
        validate_append(&events)?;
        let aggregate_id = events[0].aggregate_id;

        let mut log = self.log.write().await;
        let actual = log.version_of(aggregate_id);

        if !expected.matches(actual) || events[0].version != actual.next() {
            metrics::counter!("event_store_conflicts_total").increment(1);
            return Err(EventStoreError::ConcurrencyConflict {
                aggregate_id,
                expected,
                actual,
            });
        }

        let mut last_version = actual;
        for mut event in events {
            let index = log.events.len();
            event.position = index as u64 + 1;
            last_version = event.version;
            log.events.push(event);
            log.streams.entry(aggregate_id).or_default().push(index);
        }

        Ok(last_version)
    }

    async fn load_stream(&self, aggregate_id: AggregateId) -> Result<Vec<EventEnvelope>> {
        let log = self.log.read().await;
        Ok(log
            .streams
            .get(&aggregate_id)
            .map(|indices| indices.iter().map(|&i| log.events[i].clone()).collect())
            .unwrap_or_default())
    }

    async fn stream_version(&self, aggregate_id: AggregateId) -> Result<Option<Version>> {
        let log = self.log.read().await;
        Ok(log
            .streams
            .contains_key(&aggregate_id)
            .then(|| log.version_of(aggregate_id)))
    }

    async fn read_all_from(&self, after: u64) -> Result<EventStream> {
        let log = self.log.read().await;
        let start = (after as usize).min(log.events.len());
        let tail: Vec<_> = log.events[start..].to_vec();
        Ok(Box::pin(futures_util::stream::iter(tail.into_iter().map(Ok))))
    }

    async fn query_events(&self, query: EventQuery) -> Result<Vec<EventEnvelope>> {
        let log = self.log.read().await;
        let matching = log.events.iter().filter(|e| query.matches(e)).cloned();
        Ok(match query.limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        })
    }
}
