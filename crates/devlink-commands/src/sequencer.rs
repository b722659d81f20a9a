//! Exchange id sequencing.

use std::sync::atomic::{AtomicU64, Ordering};

use devlink_core::ExchangeId;

/// Process-wide monotonic exchange id generator.
///
/// The counter is the only state shared across concurrent flows; a
/// single atomic fetch-add keeps ids duplicate-free and strictly
/// increasing without locking.
#[derive(Debug)]
pub struct RequestSequencer {
    next: AtomicU64,
}

impl RequestSequencer {
    /// Create a sequencer starting at 1.
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// Create a sequencer starting at an explicit value.
    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }

    /// Allocate the next exchange id.
    pub fn next(&self) -> ExchangeId {
        ExchangeId::new(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for RequestSequencer {
    fn default() -> Self {
        Self::new()
    }
}
