//! Device description retrieval tests.
//!
//! Exercises the aggregation of directory lookup and describe exchange,
//! including partial failure on either slot.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use devlink_commands::{DeviceApi, DeviceApiConfig, MergeError};
use devlink_core::{DeviceRecord, Envelope};
use devlink_testing::{FakeChannel, FakeChannelFactory, StaticDirectory};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("devlink_commands=debug")
        .try_init();
}

fn describe_reply() -> Envelope {
    Envelope::new(
        "device1",
        json!({
            "cmd": "DescribeReturn",
            "state": {
                "v": {"temperature": "double", "uptime": "int32"},
                "f": ["reset"]
            }
        }),
    )
}

fn build_api(channel: Arc<FakeChannel>, directory: StaticDirectory) -> DeviceApi {
    init_tracing();
    DeviceApi::new(
        FakeChannelFactory::with_channel(channel),
        Arc::new(directory),
        DeviceApiConfig::default(),
    )
}

#[tokio::test]
async fn test_describe_connected_device() {
    let channel = FakeChannel::new();
    channel.reply_with(describe_reply());
    let directory = StaticDirectory::new().with_record(
        DeviceRecord::new("device1")
            .with_name("kitchen-sensor")
            .with_last_flashed("blink-v2"),
    );
    let api = build_api(channel.clone(), directory);

    let description = api.describe_device("device1").await.unwrap();

    assert_eq!(description.id, "device1");
    assert_eq!(description.name.as_deref(), Some("kitchen-sensor"));
    assert_eq!(description.last_flashed.as_deref(), Some("blink-v2"));
    assert!(description.connected);
    assert_eq!(
        description.variables.as_ref().unwrap()["temperature"],
        "double"
    );
    assert_eq!(description.functions.as_deref(), Some(&["reset".to_string()][..]));
    assert_eq!(channel.close_count(), 1);
}

#[tokio::test]
async fn test_describe_unknown_device_despite_reply() {
    // The device answers, but the directory has never heard of it.
    let channel = FakeChannel::new();
    channel.reply_with(describe_reply());
    let api = build_api(channel, StaticDirectory::new());

    let result = api.describe_device("device1").await;

    assert_eq!(result.unwrap_err(), MergeError::UnknownDevice);
}

#[tokio::test(start_paused = true)]
async fn test_describe_unknown_device_when_exchange_times_out() {
    let channel = FakeChannel::new();
    let api = build_api(channel.clone(), StaticDirectory::new());

    let result = api.describe_device("device1").await;

    assert_eq!(result.unwrap_err(), MergeError::UnknownDevice);
    assert_eq!(channel.close_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_describe_offline_device_degrades() {
    // Directory record exists, device never replies: the call still
    // succeeds, as disconnected.
    let channel = FakeChannel::new();
    let directory = StaticDirectory::new().with_record(DeviceRecord::new("device1"));
    let api = build_api(channel.clone(), directory);

    let description = api.describe_device("device1").await.unwrap();

    assert!(!description.connected);
    assert!(description.variables.is_none());
    assert!(description.functions.is_none());
    assert_eq!(channel.close_count(), 1);
}

#[tokio::test]
async fn test_describe_malformed_state_degrades() {
    let channel = FakeChannel::new();
    channel.reply_with(Envelope::new(
        "device1",
        json!({"cmd": "DescribeReturn", "unexpected": true}),
    ));
    let directory = StaticDirectory::new().with_record(DeviceRecord::new("device1"));
    let api = build_api(channel, directory);

    let description = api.describe_device("device1").await.unwrap();

    assert!(!description.connected);
    assert!(description.variables.is_none());
}

#[tokio::test]
async fn test_describe_flags_outdated_driver() {
    let channel = FakeChannel::new();
    channel.reply_with(describe_reply());
    let directory = StaticDirectory::new()
        .with_record(DeviceRecord::new("device1").with_driver_version("1.24"));

    let api = DeviceApi::new(
        FakeChannelFactory::with_channel(channel),
        Arc::new(directory),
        DeviceApiConfig {
            min_driver_version: Some("1.28".to_string()),
            ..Default::default()
        },
    );

    let description = api.describe_device("device1").await.unwrap();

    assert!(description.requires_deep_update);
    assert_eq!(description.driver_version.as_deref(), Some("1.24"));
}

#[tokio::test(start_paused = true)]
async fn test_describe_resolves_within_timeout_window() {
    let channel = FakeChannel::new();
    let directory = StaticDirectory::new().with_record(DeviceRecord::new("device1"));
    let api = build_api(channel, directory);

    let started = tokio::time::Instant::now();
    api.describe_device("device1").await.unwrap();

    // The silent exchange slot is bounded by the describe timeout.
    assert!(started.elapsed() <= Duration::from_millis(5100));
}
