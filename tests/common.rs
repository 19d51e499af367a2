//! Test utilities & fixtures.
//! Builds drivers over the scripted mock modem with timings short enough
//! for tests to finish in milliseconds.

use std::time::Duration;

use smsbridge::config::KeepaliveConfig;
use smsbridge::control::Bridge;
use smsbridge::forward::Forwarder;
use smsbridge::modem::mock::MockModem;
use smsbridge::modem::{Modem, ModemOptions, ModemTimings, RedeliveryPolicy};
use smsbridge::storage::Storage;
use smsbridge::worker::PollSettings;

/// One unread listing entry as the modem prints it.
pub const LISTING: [&str; 3] = [
    "+CMGL: 0,\"REC UNREAD\",\"+1555\",,\"24/01/01,10:00:00+00\"",
    "Hi there",
    "OK",
];

pub fn fast_timings() -> ModemTimings {
    ModemTimings {
        settle: Duration::ZERO,
        read_timeout: Duration::from_millis(5),
        drain_timeout: Duration::from_millis(2),
        command_wait: Duration::ZERO,
        fetch_wait: Duration::ZERO,
        list_wait: Duration::ZERO,
        prompt_wait: Duration::ZERO,
        body_wait: Duration::ZERO,
        send_deadline: Duration::from_millis(200),
    }
}

#[allow(dead_code)]
pub fn fast_poll() -> PollSettings {
    PollSettings {
        interval: Duration::from_millis(20),
        recovery_delay: Duration::from_millis(30),
        stop_wait: Duration::from_millis(500),
    }
}

pub fn modem(mock: &MockModem, redelivery: RedeliveryPolicy) -> Modem {
    Modem::new(
        Box::new(mock.clone()),
        ModemOptions {
            timings: fast_timings(),
            redelivery,
            seen_capacity: 64,
            buffer_capacity: None,
        },
    )
}

/// Storage rooted in a fresh temp dir; keep the dir alive for the test.
#[allow(dead_code)]
pub async fn temp_storage() -> (tempfile::TempDir, Storage) {
    let tmp = tempfile::tempdir().expect("tempdir");
    let storage = Storage::new(tmp.path().join("data").to_str().expect("utf8 path"))
        .await
        .expect("storage");
    (tmp, storage)
}

#[allow(dead_code)]
pub async fn bridge(mock: &MockModem, keepalive: KeepaliveConfig) -> (tempfile::TempDir, Bridge, Storage) {
    let (tmp, storage) = temp_storage().await;
    let bridge = Bridge::new(
        modem(mock, RedeliveryPolicy::Allow),
        storage.clone(),
        Forwarder::new(Default::default()),
        fast_poll(),
        keepalive,
    );
    (tmp, bridge, storage)
}

/// Poll `check` every few milliseconds until it holds or `limit` passes.
#[allow(dead_code)]
pub async fn wait_until<F, Fut>(limit: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check().await
}
