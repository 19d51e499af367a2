use smsbridge::config::KeepaliveConfig;
use smsbridge::control::SendStatus;
use smsbridge::modem::mock::MockModem;
use smsbridge::modem::{OutboundRequest, RedeliveryPolicy};
use smsbridge::storage::Direction;
use std::time::{Duration, Instant};
mod common;

fn keepalive_to(number: &str) -> KeepaliveConfig {
    KeepaliveConfig {
        enabled: true,
        number: number.to_string(),
        message: "OK".to_string(),
    }
}

#[tokio::test]
async fn send_stops_at_first_completion_marker() {
    let mock = MockModem::new().with_healthy_init();
    mock.reply("AT+CMGS=\"+1555\"", &["> "]);
    mock.reply("Hello\u{1a}", &["+CMGS: 17", "OK"]);
    let mut modem = common::modem(&mock, RedeliveryPolicy::Allow);
    modem.open().await.expect("open");

    let req = OutboundRequest::new("+1555", "Hello").expect("valid");
    let transcript = modem.send_message(&req).await.expect("send");
    assert_eq!(transcript, vec![">", "+CMGS: 17"]);
    // the trailing OK stays unread
    assert_eq!(mock.pending(), 1);
}

#[tokio::test]
async fn send_without_markers_ends_at_deadline() {
    let mock = MockModem::new().with_healthy_init();
    mock.reply("AT+CMGS=\"+1555\"", &["> "]);
    let mut modem = common::modem(&mock, RedeliveryPolicy::Allow);
    modem.open().await.expect("open");

    let req = OutboundRequest::new("+1555", "Hello").expect("valid");
    let started = Instant::now();
    let transcript = modem.send_message(&req).await.expect("send");
    let elapsed = started.elapsed();
    assert_eq!(transcript, vec![">"]);
    assert!(elapsed >= common::fast_timings().send_deadline);
    assert!(elapsed < Duration::from_secs(3));
}

#[tokio::test]
async fn manual_send_opens_one_shot_session_and_records() {
    let mock = MockModem::new().with_healthy_init();
    mock.reply("AT+CMGS=\"+1555\"", &["> "]);
    mock.reply("Ping\u{1a}", &["+CMGS: 3", "OK"]);
    let (_tmp, bridge, storage) = common::bridge(&mock, KeepaliveConfig::default()).await;

    let report = bridge.send("+1555", "Ping").await;
    assert!(report.ok, "{:?}", report);
    assert_eq!(report.status, Some(SendStatus::Accepted));
    assert_eq!(report.raw.as_deref(), Some(&[">".to_string(), "+CMGS: 3".to_string()][..]));
    assert_eq!(mock.connects(), 1);
    assert!(!bridge.status().await.session_open);

    let recent = storage.recent(5).await.expect("recent");
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].remote, "+1555");
    assert_eq!(recent[0].content, "Ping");
    assert_eq!(recent[0].direction, Direction::Out);
}

#[tokio::test]
async fn modem_error_is_reported_not_raised() {
    let mock = MockModem::new().with_healthy_init();
    mock.reply("Ping\u{1a}", &["+CMS ERROR: 500"]);
    let (_tmp, bridge, _storage) = common::bridge(&mock, KeepaliveConfig::default()).await;

    let report = bridge.send("+1555", "Ping").await;
    assert!(report.ok);
    assert_eq!(report.status, Some(SendStatus::Rejected));
    assert_eq!(report.raw, Some(vec!["+CMS ERROR: 500".to_string()]));
}

#[tokio::test]
async fn invalid_requests_never_touch_the_modem() {
    let mock = MockModem::new().with_healthy_init();
    let (_tmp, bridge, storage) = common::bridge(&mock, KeepaliveConfig::default()).await;

    let report = bridge.send("", "text").await;
    assert!(!report.ok);
    assert_eq!(report.error.as_deref(), Some("number and text required"));
    let report = bridge.send("+1555", "").await;
    assert_eq!(report.error.as_deref(), Some("number and text required"));
    let report = bridge.send("+1555\"\r\nATD112;", "x").await;
    assert!(!report.ok);

    assert_eq!(mock.connects(), 0);
    assert!(storage.recent(5).await.expect("recent").is_empty());
}

#[tokio::test]
async fn unreachable_modem_fails_the_send() {
    let mock = MockModem::new();
    mock.refuse_connect(true);
    let (_tmp, bridge, storage) = common::bridge(&mock, KeepaliveConfig::default()).await;
    let report = bridge.send("+1555", "Ping").await;
    assert!(!report.ok);
    assert!(report.error.is_some());
    assert!(storage.recent(5).await.expect("recent").is_empty());
}

#[tokio::test]
async fn keepalive_disabled_reports_reason() {
    let mock = MockModem::new();
    let (_tmp, bridge, _storage) = common::bridge(&mock, KeepaliveConfig::default()).await;
    let report = bridge.keepalive().await;
    assert_eq!(report.to_json(), "{\"ok\":false,\"reason\":\"keepalive disabled\"}");
    assert_eq!(mock.connects(), 0);
}

#[tokio::test]
async fn keepalive_sends_configured_message() {
    let mock = MockModem::new().with_healthy_init();
    mock.reply("OK\u{1a}", &["+CMGS: 9", "OK"]);
    let (_tmp, bridge, storage) = common::bridge(&mock, keepalive_to("+1999")).await;

    let report = bridge.keepalive().await;
    assert!(report.ok);
    assert!(report.raw.is_some());
    assert_eq!(mock.count_written("AT+CMGS=\"+1999\""), 1);
    let recent = storage.recent(1).await.expect("recent");
    assert_eq!(recent[0].remote, "+1999");
    assert_eq!(recent[0].content, "OK");
}

#[tokio::test]
async fn send_while_worker_runs_reuses_session() {
    let mock = MockModem::new().with_healthy_init();
    mock.reply("Ping\u{1a}", &["OK"]);
    let (_tmp, bridge, _storage) = common::bridge(&mock, KeepaliveConfig::default()).await;

    assert!(bridge.start().await.ok);
    assert!(bridge.start().await.ok);
    let report = bridge.send("+1555", "Ping").await;
    assert_eq!(report.status, Some(SendStatus::Accepted));
    let status = bridge.status().await;
    assert!(status.running);
    assert!(status.session_open);
    assert!(bridge.stop().await.ok);
    assert!(bridge.stop().await.ok);
    assert_eq!(mock.connects(), 1);
    assert!(!bridge.status().await.running);
}
