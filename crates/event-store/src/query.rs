use chrono::{DateTime, Utc};

use crate::{AggregateId, EventEnvelope};

/// Filter over the global event log.
#[derive(Debug, Clone, Default)]
pub struct EventQuery {
    pub aggregate_id: Option<AggregateId>,
    pub aggregate_type: Option<String>,
    /// Matches any of these event types.
    pub event_types: Option<Vec<String>>,
    /// Inclusive lower bound on `recorded_at`.
    pub from_timestamp: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `recorded_at`.
    pub to_timestamp: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl EventQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_aggregate(aggregate_id: AggregateId) -> Self {
        Self {
            aggregate_id: Some(aggregate_id),
            ..Default::default()
        }
    }

    pub fn aggregate_type(mut self, aggregate_type: impl Into<String>) -> Self {
        self.aggregate_type = Some(aggregate_type.into());
        self
    }

    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_types
            .get_or_insert_with(Vec::new)
            .push(event_type.into());
        self
    }

    pub fn from_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.from_timestamp = Some(timestamp);
        self
    }

    pub fn to_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.to_timestamp = Some(timestamp);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether `event` passes every filter except `limit`.
    pub fn matches(&self, event: &EventEnvelope) -> bool {
        if self.aggregate_id.is_some_and(|id| id != event.aggregate_id) {
            return false;
        }
        if self
            .aggregate_type
            .as_deref()
            .is_some_and(|t| t != event.aggregate_type)
        {
            return false;
        }
        if self
            .event_types
            .as_ref()
            .is_some_and(|types| !types.contains(&event.event_type))
        {
            return false;
        }
        if self.from_timestamp.is_some_and(|from| event.recorded_at < from) {
            return false;
        }
        if self.to_timestamp.is_some_and(|to| event.recorded_at > to) {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Version;

    fn envelope(aggregate_type: &str, event_type: &str) -> EventEnvelope {
        EventEnvelope::builder()
            .event_type(event_type)
            .aggregate_id(AggregateId::new())
            .aggregate_type(aggregate_type)
            .version(Version::first())
            .payload_raw(serde_json::json!({}))
            .build()
            .unwrap()
    }

    #[test]
    fn event_type_accumulates() {
        let query = EventQuery::new()
            .event_type("OrderPlaced")
            .event_type("OrderCompleted");

        assert_eq!(
            query.event_types,
            Some(vec!["OrderPlaced".to_string(), "OrderCompleted".to_string()])
        );
    }

    #[test]
    fn matches_on_type_filters() {
        let query = EventQuery::new()
            .aggregate_type("Order")
            .event_type("OrderPlaced");

        assert!(query.matches(&envelope("Order", "OrderPlaced")));
        assert!(!query.matches(&envelope("Order", "DetailsAdvanced")));
        assert!(!query.matches(&envelope("TradePost", "OrderPlaced")));
    }

    #[test]
    fn matches_on_time_window() {
        let event = envelope("Order", "OrderPlaced");
        let before = event.recorded_at - chrono::Duration::seconds(1);
        let after = event.recorded_at + chrono::Duration::seconds(1);

        assert!(EventQuery::new().from_timestamp(before).matches(&event));
        assert!(!EventQuery::new().from_timestamp(after).matches(&event));
        assert!(!EventQuery::new().to_timestamp(before).matches(&event));
    }
}
