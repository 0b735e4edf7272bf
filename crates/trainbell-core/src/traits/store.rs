use async_trait::async_trait;

use crate::error::Result;
use crate::slot::{SlotChange, SlotQuery, SlotUpdate, TrainingSlot};

/// The record store holding slot documents.
///
/// Implementations must be usable from concurrent invocations; the watcher
/// adds no locking of its own on top of what the store guarantees.
#[async_trait]
pub trait SlotStore: Send + Sync {
    /// Slots matching `query`, in a stable order, at most `query.limit`.
    ///
    /// Fails with `TrainbellError::StoreQuery`.
    async fn query(&self, query: &SlotQuery) -> Result<Vec<TrainingSlot>>;

    /// Apply every update or none of them.
    ///
    /// An update naming a missing record fails the whole batch with
    /// `TrainbellError::StoreMutate`.
    async fn batch_mutate(&self, updates: &[SlotUpdate]) -> Result<()>;

    /// Apply one update to one record.
    async fn mutate(&self, update: &SlotUpdate) -> Result<()>;
}

/// Ordered, at-least-once feed of record updates.
///
/// An entry stays in the feed until it is acked, so a crash between `poll`
/// and `ack` redelivers it.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Up to `max` pending changes, oldest first.
    async fn poll(&self, max: usize) -> Result<Vec<SlotChange>>;

    /// Remove a handled change.
    async fn ack(&self, seq: i64) -> Result<()>;

    /// Record a failed handling attempt; returns the attempt count so far.
    async fn fail(&self, seq: i64) -> Result<u32>;
}
