//! Append-only event log backing every marketplace aggregate.
//!
//! Appends are conditional on the stream's current version, which is what
//! keeps order status aggregation, promotion redemption and trade acceptance
//! safe when requests interleave.

pub mod error;
pub mod event;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod store;

pub use common::AggregateId;
pub use error::{EventStoreError, Result};
pub use event::{EventEnvelope, EventEnvelopeBuilder, EventId, Version};
pub use memory::InMemoryEventStore;
pub use postgres::{APPEND_LOCK_KEY, PostgresEventStore};
pub use query::EventQuery;
pub use store::{EventStore, EventStream, ExpectedVersion};
