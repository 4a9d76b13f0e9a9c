//! Projection processor feeding the global log to read models.

use event_store::{EventEnvelope, EventStore};
use futures_util::StreamExt;

use crate::Result;
use crate::projection::Projection;

/// Delivers events from the store to registered projections.
///
/// Catch-up reads the log after the lowest checkpoint among the projections
/// and hands every event to each projection that has not applied it yet.
/// Callers that need read-your-writes run a catch-up before querying.
pub struct ProjectionProcessor<S: EventStore> {
    store: S,
    projections: Vec<Box<dyn Projection>>,
}

impl<S: EventStore> ProjectionProcessor<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            projections: Vec::new(),
        }
    }

    pub fn register(&mut self, projection: Box<dyn Projection>) {
        self.projections.push(projection);
    }

    pub fn projection_count(&self) -> usize {
        self.projections.len()
    }

    /// Applies every event the projections have not seen yet and returns how
    /// many events were read.
    #[tracing::instrument(skip(self))]
    pub async fn run_catch_up(&self) -> Result<u64> {
        let mut from = u64::MAX;
        for projection in &self.projections {
            from = from.min(projection.position().await.value());
        }
        if from == u64::MAX {
            return Ok(0);
        }

        let mut stream = self.store.read_all_from(from).await?;
        let mut read: u64 = 0;

        while let Some(result) = stream.next().await {
            let event = result?;
            read += 1;

            for projection in &self.projections {
                if !projection.position().await.covers(event.position) {
                    projection.handle(&event).await?;
                    metrics::counter!(
                        "projection_events_applied_total",
                        "projection" => projection.name()
                    )
                    .increment(1);
                }
            }
        }

        if read > 0 {
            tracing::debug!(events = read, from, "catch-up complete");
        }
        Ok(read)
    }

    /// Hands one event to every projection.
    #[tracing::instrument(skip(self, event), fields(event_type = %event.event_type))]
    pub async fn process_event(&self, event: &EventEnvelope) -> Result<()> {
        for projection in &self.projections {
            projection.handle(event).await?;
        }
        Ok(())
    }

    /// Resets every projection and replays the whole log.
    #[tracing::instrument(skip(self))]
    pub async fn rebuild_all(&self) -> Result<u64> {
        for projection in &self.projections {
            projection.reset().await?;
        }
        let read = self.run_catch_up().await?;
        tracing::info!(events = read, "projections rebuilt");
        Ok(read)
    }
}
