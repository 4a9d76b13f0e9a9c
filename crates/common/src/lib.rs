//! Identifier types shared across the marketplace workspace.

mod types;

pub use types::{AggregateId, ParseIdError};
