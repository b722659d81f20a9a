//! Device directory boundary.
//!
//! The directory holds static device metadata maintained elsewhere
//! (provisioning, flash bookkeeping). This core only reads it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::message::DeviceId;

/// Static metadata record for one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Device identifier.
    pub device_id: DeviceId,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Reference to the last firmware flashed to the device.
    #[serde(default)]
    pub last_flashed: Option<String>,
    /// Driver/firmware version recorded at last contact.
    #[serde(default)]
    pub driver_version: Option<String>,
}

impl DeviceRecord {
    /// Create a record with only the identifier set.
    pub fn new(device_id: impl Into<DeviceId>) -> Self {
        Self {
            device_id: device_id.into(),
            name: None,
            last_flashed: None,
            driver_version: None,
        }
    }

    /// Set the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the last-flashed firmware reference.
    pub fn with_last_flashed(mut self, reference: impl Into<String>) -> Self {
        self.last_flashed = Some(reference.into());
        self
    }

    /// Set the recorded driver version.
    pub fn with_driver_version(mut self, version: impl Into<String>) -> Self {
        self.driver_version = Some(version.into());
        self
    }
}

/// Read-only directory lookup.
#[async_trait]
pub trait DeviceDirectory: Send + Sync {
    /// Look up the record for a device, if one exists.
    async fn record(&self, device_id: &str) -> Option<DeviceRecord>;
}
