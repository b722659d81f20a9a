//! Command/response correlation core.
//!
//! Sits between a cloud-facing API and a pool of persistent,
//! multiplexed device connections. Provides:
//! - Exchange id sequencing
//! - Send-and-await-one-matching-reply with timeout and cleanup
//! - Parallel aggregation of independent sources with partial-failure
//!   tolerance
//! - Device description merging
//! - Variable fetch and firmware push flows

pub mod aggregate;
pub mod api;
pub mod describe;
pub mod exchange;
pub mod firmware;
pub mod sequencer;
pub mod variable;

// Re-exports
pub use sequencer::RequestSequencer;

pub use exchange::{Exchange, ExchangeCoordinator, ExchangeError};

pub use aggregate::{AggregatedResult, gather_all};

pub use describe::{DescriptionMerger, DeviceDescription, MergeError};

pub use variable::{FetchError, NamedValue};

pub use firmware::{FirmwareOutcome, FlashState};

pub use api::{ApiError, DeviceApi, DeviceApiConfig};
