//! Best-effort aggregation of independent asynchronous sources.
//!
//! Runs every source concurrently and joins them into a fixed-arity
//! tuple of slots. A failing source becomes a sentinel slot instead of
//! aborting the join: the device may be offline while the directory
//! lookup still succeeds, and downstream mergers decide what a missing
//! slot means.

use futures::future::{BoxFuture, join_all};
use serde_json::Value;
use tracing::warn;

/// Ordered fixed-arity tuple of independently-resolved outcomes.
///
/// Slot position is source position, never completion order. A `None`
/// slot is the sentinel for a source that failed.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedResult {
    slots: Vec<Option<Value>>,
}

impl AggregatedResult {
    /// Build a result from already-settled slots. Mostly useful in
    /// tests; production results come from [`gather_all`].
    pub fn from_slots(slots: Vec<Option<Value>>) -> Self {
        Self { slots }
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the tuple has no slots.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// The value in a slot, or `None` for a sentinel or out-of-range
    /// position.
    pub fn slot(&self, index: usize) -> Option<&Value> {
        self.slots.get(index).and_then(Option::as_ref)
    }
}

/// Run all sources concurrently and join them into one result.
///
/// Completes only once every source has settled. Failures are caught
/// locally, logged, and converted to sentinel slots; they never
/// propagate out of the join.
pub async fn gather_all<E>(sources: Vec<BoxFuture<'_, Result<Value, E>>>) -> AggregatedResult
where
    E: std::fmt::Display,
{
    let settled = join_all(sources).await;

    let slots = settled
        .into_iter()
        .enumerate()
        .map(|(index, outcome)| match outcome {
            Ok(value) => Some(value),
            Err(error) => {
                warn!(slot = index, %error, "aggregation source failed, using sentinel");
                None
            }
        })
        .collect();

    AggregatedResult { slots }
}
