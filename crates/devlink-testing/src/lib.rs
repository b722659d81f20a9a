//! Testing utilities for Devlink.
//!
//! Provides test doubles for the external collaborator boundaries:
//! - A scripted fake channel that records sends and counts closes
//! - A channel factory handing out prepared fakes
//! - An in-memory device directory

pub mod channel;
pub mod directory;

pub use channel::{FakeChannel, FakeChannelFactory, ScriptedReply};
pub use directory::StaticDirectory;
