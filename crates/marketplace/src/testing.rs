//! Test doubles shared by the unit tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use common::AggregateId;
use event_store::{
    EventEnvelope, EventQuery, EventStore, EventStoreError, EventStream, ExpectedVersion,
    InMemoryEventStore, Version,
};

/// Store that rejects appends carrying one event type until recovered.
#[derive(Clone, Default)]
pub(crate) struct FlakyStore {
    inner: InMemoryEventStore,
    failing: Arc<Mutex<Option<&'static str>>>,
}

impl FlakyStore {
    pub(crate) fn fail(&self, event_type: &'static str) {
        *self.failing.lock().unwrap() = Some(event_type);
    }

    pub(crate) fn recover(&self) {
        *self.failing.lock().unwrap() = None;
    }
}

#[async_trait]
impl EventStore for FlakyStore {
    async fn append(
        &self,
        events: Vec<EventEnvelope>,
        expected: ExpectedVersion,
    ) -> event_store::Result<Version> {
        let failing = *self.failing.lock().unwrap();
        if let Some(event_type) = failing {
            if events.iter().any(|e| e.event_type == event_type) {
                return Err(EventStoreError::InvalidAppend(format!(
                    "{event_type} is unavailable"
                )));
            }
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
