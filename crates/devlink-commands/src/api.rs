//! Public device API.
//!
//! Composition root tying the sequencer, exchange coordinator,
//! aggregation engine and merger together behind the four caller-facing
//! operations.

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use devlink_core::{
    ChannelError, ChannelFactory, DeviceDirectory, Envelope, MatcherShape, cmd,
};

use crate::aggregate::gather_all;
use crate::describe::{DescriptionMerger, DeviceDescription, MergeError};
use crate::exchange::{ExchangeCoordinator, ExchangeError};
use crate::firmware::{FirmwareOutcome, FirmwarePushFlow};
use crate::sequencer::RequestSequencer;
use crate::variable::{FetchError, NamedValue};

/// Device API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceApiConfig {
    /// Timeout for variable fetch exchanges.
    pub variable_timeout_ms: u64,
    /// Deadline for the firmware update event.
    pub flash_timeout_ms: u64,
    /// Timeout for the describe exchange.
    pub describe_timeout_ms: u64,
    /// Driver version floor; devices recorded below it are flagged with
    /// `requires_deep_update`.
    pub min_driver_version: Option<String>,
    /// Service credential attached to flash commands.
    pub flash_access_token: String,
}

impl Default for DeviceApiConfig {
    fn default() -> Self {
        Self {
            variable_timeout_ms: 5000,
            flash_timeout_ms: 10000,
            describe_timeout_ms: 5000,
            min_driver_version: None,
            flash_access_token: ":cloud:DeviceManager".to_string(),
        }
    }
}

/// API error types for operations without a flow-specific taxonomy.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("device sessions are not supported")]
    Unsupported,
}

/// Failure of one describe aggregation slot. Swallowed into a sentinel
/// by the aggregation engine; never surfaces to callers directly.
#[derive(Debug, thiserror::Error)]
enum SlotError {
    #[error("no directory record")]
    RecordNotFound,

    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    #[error("record serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Caller-facing device API.
pub struct DeviceApi {
    coordinator: ExchangeCoordinator,
    directory: Arc<dyn DeviceDirectory>,
    merger: DescriptionMerger,
    config: DeviceApiConfig,
}

impl DeviceApi {
    /// Create the API over a channel factory and directory.
    pub fn new(
        channels: Arc<dyn ChannelFactory>,
        directory: Arc<dyn DeviceDirectory>,
        config: DeviceApiConfig,
    ) -> Self {
        let sequencer = Arc::new(RequestSequencer::new());
        let merger = DescriptionMerger::new(config.min_driver_version.as_deref());

        Self {
            coordinator: ExchangeCoordinator::new(sequencer, channels),
            directory,
            merger,
            config,
        }
    }

    /// Describe a device: directory record plus live state, merged.
    ///
    /// The directory lookup and the describe exchange run concurrently;
    /// either failing alone degrades rather than aborts. `UnknownDevice`
    /// is returned exactly when the directory has no record, regardless
    /// of how the exchange slot fares.
    pub async fn describe_device(&self, device_id: &str) -> Result<DeviceDescription, MergeError> {
        let lookup: BoxFuture<'_, Result<Value, SlotError>> = async {
            let record = self
                .directory
                .record(device_id)
                .await
                .ok_or(SlotError::RecordNotFound)?;
            Ok(serde_json::to_value(record)?)
        }
        .boxed();

        let exchange: BoxFuture<'_, Result<Value, SlotError>> = async {
            let envelope = self
                .coordinator
                .send_and_await(
                    device_id,
                    json!({"cmd": cmd::DESCRIBE}),
                    MatcherShape::command(cmd::DESCRIBE_RETURN),
                    Some(Duration::from_millis(self.config.describe_timeout_ms)),
                )
                .await?;
            Ok(Envelope::into_value(envelope))
        }
        .boxed();

        let aggregated = gather_all(vec![lookup, exchange]).await;
        self.merger.merge(&aggregated)
    }

    /// Fetch a named variable from a device.
    pub async fn fetch_variable(
        &self,
        device_id: &str,
        name: &str,
    ) -> Result<NamedValue, FetchError> {
        crate::variable::fetch_variable(
            &self.coordinator,
            device_id,
            name,
            Duration::from_millis(self.config.variable_timeout_ms),
        )
        .await
    }

    /// Push a firmware image to a device and await its verdict.
    ///
    /// Firmware content is not validated here; the core pushes the bytes
    /// it is handed.
    pub async fn push_firmware(
        &self,
        device_id: &str,
        firmware: &[u8],
    ) -> Result<FirmwareOutcome, ChannelError> {
        let exchange = self.coordinator.open(device_id);
        FirmwarePushFlow::new(exchange)
            .run(
                firmware,
                &self.config.flash_access_token,
                Duration::from_millis(self.config.flash_timeout_ms),
            )
            .await
    }

    /// Open an interactive device session.
    ///
    /// Extension point: the underlying protocol reserves this operation
    /// but no session semantics are defined yet.
    pub async fn open_session(&self, _device_id: &str) -> Result<(), ApiError> {
        Err(ApiError::Unsupported)
    }
}
