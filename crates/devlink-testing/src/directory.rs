//! In-memory device directory.

use std::collections::HashMap;

use async_trait::async_trait;

use devlink_core::{DeviceDirectory, DeviceRecord};

/// Fixed in-memory directory for tests.
#[derive(Debug, Default)]
pub struct StaticDirectory {
    records: HashMap<String, DeviceRecord>,
}

impl StaticDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record, keyed by its device id.
    pub fn with_record(mut self, record: DeviceRecord) -> Self {
        self.records.insert(record.device_id.clone(), record);
        self
    }
}

#[async_trait]
impl DeviceDirectory for StaticDirectory {
    async fn record(&self, device_id: &str) -> Option<DeviceRecord> {
        self.records.get(device_id).cloned()
    }
}
