//! Forwarding of received messages to chat services.
//!
//! Two sinks exist, each enabled independently in `[forward]`:
//! a Telegram bot (`sendMessage`) and PushPlus. [`Forwarder::relay`] tries
//! every enabled sink and only logs failures; a broken sink never blocks
//! message storage or the poll loop.
//!
//! HTTP support sits behind the `forward` cargo feature. Without it,
//! relaying only logs what would have been sent.

use log::{debug, warn};
use serde_json::{json, Value};
#[cfg(feature = "forward")]
use std::time::Duration;

use crate::config::ForwardConfig;
use crate::metrics;

pub const TELEGRAM_API: &str = "https://api.telegram.org";
pub const PUSHPLUS_URL: &str = "http://www.pushplus.plus/send";

/// Telegram `sendMessage` URL for a bot token.
pub fn telegram_url(bot_token: &str) -> String {
    format!("{}/bot{}/sendMessage", TELEGRAM_API, bot_token)
}

pub fn telegram_payload(chat_id: &str, remote: &str, content: &str) -> Value {
    json!({
        "chat_id": chat_id,
        "text": format!("📩 From: {}\n{}", remote, content),
    })
}

pub fn pushplus_payload(token: &str, remote: &str, content: &str) -> Value {
    json!({
        "token": token,
        "title": format!("SMS from {}", remote),
        "content": content,
    })
}

pub struct Forwarder {
    config: ForwardConfig,
    #[cfg(feature = "forward")]
    client: reqwest::Client,
}

impl Forwarder {
    pub fn new(config: ForwardConfig) -> Self {
        #[cfg(feature = "forward")]
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .unwrap_or_else(|e| {
                warn!("Failed to build HTTP client with timeout ({}), using defaults", e);
                reqwest::Client::new()
            });
        Self {
            config,
            #[cfg(feature = "forward")]
            client,
        }
    }

    /// Whether any sink is enabled.
    pub fn is_active(&self) -> bool {
        self.config.telegram.enabled || self.config.pushplus.enabled
    }

    /// Send one received message to every enabled sink.
    pub async fn relay(&self, remote: &str, content: &str) {
        if self.config.telegram.enabled {
            let tg = &self.config.telegram;
            let url = telegram_url(&tg.bot_token);
            let payload = telegram_payload(&tg.chat_id, remote, content);
            self.post("Telegram", &url, &payload).await;
        }
        if self.config.pushplus.enabled {
            let payload = pushplus_payload(&self.config.pushplus.token, remote, content);
            self.post("PushPlus", PUSHPLUS_URL, &payload).await;
        }
    }

    #[cfg(feature = "forward")]
    async fn post(&self, sink: &str, url: &str, payload: &Value) {
        match self.client.post(url).json(payload).send().await {
            Ok(resp) => {
                let status = resp.status();
                log::info!("{} status: {}", sink, status);
                if !status.is_success() {
                    metrics::inc_forward_failures();
                    match resp.text().await {
                        Ok(body) => debug!("{} response: {}", sink, crate::logutil::escape_line(&body)),
                        Err(e) => debug!("{} response unreadable: {}", sink, e),
                    }
                }
            }
            Err(e) => {
                warn!("{} forward failed: {}", sink, e);
                metrics::inc_forward_failures();
            }
        }
    }

    #[cfg(not(feature = "forward"))]
    async fn post(&self, sink: &str, url: &str, payload: &Value) {
        warn!("{} forwarding unavailable (built without `forward`), dropping post to {}", sink, url);
        debug!("{} payload: {}", sink, payload);
        metrics::inc_forward_failures();
    }
}
