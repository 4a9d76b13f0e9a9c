//! Read models fed from the global event log.
//!
//! - [`Projection`] turns events into a read model, checkpointed by log position
//! - [`ProjectionProcessor`] catches registered projections up with the store
//! - [`OrderBoardView`] lists orders per buyer and seller and finds stale ones
//! - [`TradeBoardView`] lists trade posts and maps proposals to their post

pub mod error;
pub mod processor;
pub mod projection;
pub mod read_model;
pub mod views;

pub use error::{ProjectionError, Result};
pub use processor::ProjectionProcessor;
pub use projection::{Projection, ProjectionPosition};
pub use read_model::ReadModel;
pub use views::{OrderBoardView, OrderSummary, TradeBoardView, TradePostSummary};
