use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;
use serde::{Deserialize, Serialize};

use crate::{AggregateId, EventEnvelope, EventQuery, EventStoreError, Result, Version};

/// Condition an append is subject to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpectedVersion {
    /// Append unconditionally.
    Any,
    /// The stream must not exist yet.
    NoStream,
    /// The stream must be exactly at this version.
    Exact(Version),
}

impl ExpectedVersion {
    /// Expectation matching a stream that was read at `version`.
    pub fn from_loaded(version: Version) -> Self {
        if version == Version::initial() {
            ExpectedVersion::NoStream
        } else {
            ExpectedVersion::Exact(version)
        }
    }

    pub fn matches(&self, actual: Version) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::NoStream => actual == Version::initial(),
            ExpectedVersion::Exact(expected) => *expected == actual,
        }
    }
}

impl std::fmt::Display for ExpectedVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExpectedVersion::Any => write!(f, "any version"),
            ExpectedVersion::NoStream => write!(f, "no stream"),
            ExpectedVersion::Exact(v) => write!(f, "version {v}"),
        }
    }
}

/// Events read from the global log in position order.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<EventEnvelope>> + Send>>;

/// Storage for aggregate event streams.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Appends a batch to one stream if the stream is at `expected`.
    ///
    /// The batch is written atomically. Positions are assigned by the store.
    /// Returns the stream version after the append.
    async fn append(&self, events: Vec<EventEnvelope>, expected: ExpectedVersion)
    -> Result<Version>;

    /// Every event of one stream, oldest first.
    async fn load_stream(&self, aggregate_id: AggregateId) -> Result<Vec<EventEnvelope>>;

    /// Current version of a stream, or None if it was never written.
    async fn stream_version(&self, aggregate_id: AggregateId) -> Result<Option<Version>>;

    /// Events of the global log with a position greater than `after`.
    async fn read_all_from(&self, after: u64) -> Result<EventStream>;

    async fn query_events(&self, query: EventQuery) -> Result<Vec<EventEnvelope>>;
}

/// Checks that a batch targets one stream with consecutive versions.
pub fn validate_append(events: &[EventEnvelope]) -> Result<()> {
    let Some(first) = events.first() else {
        return Err(EventStoreError::InvalidAppend(
            "cannot append an empty batch".to_string(),
        ));
    };

    let mut expected_version = first.version;
    for event in events.iter().skip(1) {
        if event.aggregate_id != first.aggregate_id {
            return Err(EventStoreError::InvalidAppend(
                "a batch must target a single aggregate".to_string(),
            ));
        }
        expected_version = expected_version.next();
        if event.version != expected_version {
            return Err(EventStoreError::InvalidAppend(format!(
                "versions must be consecutive: expected {expected_version}, got {}",
                event.version
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(aggregate_id: AggregateId, version: i64) -> EventEnvelope {
        EventEnvelope::builder()
            .event_type("Test")
            .aggregate_id(aggregate_id)
            .aggregate_type("Test")
            .version(Version::new(version))
            .payload_raw(serde_json::json!({}))
            .build()
            .unwrap()
    }

    #[test]
    fn expected_version_matching() {
        assert!(ExpectedVersion::Any.matches(Version::new(7)));
        assert!(ExpectedVersion::NoStream.matches(Version::initial()));
        assert!(!ExpectedVersion::NoStream.matches(Version::first()));
        assert!(ExpectedVersion::Exact(Version::new(2)).matches(Version::new(2)));
        assert!(!ExpectedVersion::Exact(Version::new(2)).matches(Version::new(3)));
    }

    #[test]
    fn from_loaded_picks_no_stream_for_fresh_aggregates() {
        assert_eq!(
            ExpectedVersion::from_loaded(Version::initial()),
            ExpectedVersion::NoStream
        );
        assert_eq!(
            ExpectedVersion::from_loaded(Version::new(4)),
            ExpectedVersion::Exact(Version::new(4))
        );
    }

    #[test]
    fn rejects_empty_and_gapped_batches() {
        assert!(validate_append(&[]).is_err());

        let id = AggregateId::new();
        assert!(validate_append(&[envelope(id, 1), envelope(id, 3)]).is_err());
        assert!(validate_append(&[envelope(id, 1), envelope(AggregateId::new(), 2)]).is_err());
        assert!(validate_append(&[envelope(id, 1), envelope(id, 2)]).is_ok());
    }
}
