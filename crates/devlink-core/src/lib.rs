//! Core traits and types for Devlink.
//!
//! This crate defines the foundational abstractions shared across the
//! project: the message envelope and matcher shapes used to correlate
//! inbound device traffic, the channel capability consumed per exchange,
//! and the read-only device directory boundary.

pub mod channel;
pub mod directory;
pub mod message;

// Re-exports
pub use channel::{ChannelError, ChannelFactory, DeviceChannel};
pub use directory::{DeviceDirectory, DeviceRecord};
pub use message::{DeviceId, Envelope, ExchangeId, MatcherShape, cmd, event};
