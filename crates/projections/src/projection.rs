//! Core projection trait and checkpoint tracking.

use async_trait::async_trait;
use event_store::EventEnvelope;

use crate::Result;

/// Global log position a projection has applied up to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct ProjectionPosition(u64);

impl ProjectionPosition {
    pub fn zero() -> Self {
        Self(0)
    }

    pub fn at(position: u64) -> Self {
        Self(position)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    /// True if the event at `position` was already applied.
    pub fn covers(&self, position: u64) -> bool {
        position <= self.0
    }
}

impl std::fmt::Display for ProjectionPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "position({})", self.0)
    }
}

/// Turns events from the global log into a read model.
///
/// Implementations must ignore events their position already covers, so
/// overlapping catch-ups never apply an event twice.
#[async_trait]
pub trait Projection: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle(&self, event: &EventEnvelope) -> Result<()>;

    async fn position(&self) -> ProjectionPosition;

    async fn reset(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_covers_nothing() {
        let pos = ProjectionPosition::zero();
        assert!(!pos.covers(1));
    }

    #[test]
    fn covers_up_to_and_including() {
        let pos = ProjectionPosition::at(5);
        assert!(pos.covers(5));
        assert!(pos.covers(2));
        assert!(!pos.covers(6));
    }

    #[test]
    fn position_display() {
        assert_eq!(ProjectionPosition::at(42).to_string(), "position(42)");
    }
}
