//! # Control Surface
//!
//! [`Bridge`] wires the shared modem, the poll worker, storage and the
//! forwarder together and exposes the operator actions: start, stop,
//! keepalive, manual send, recent messages and status. Every action returns
//! a [`ControlReport`] that serializes to the JSON shape the CLI prints.
//!
//! Manual sends share the modem lock with the worker, so a send never
//! interleaves with a poll exchange.

use anyhow::Result;
use log::{info, warn};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::config::{Config, KeepaliveConfig};
use crate::forward::Forwarder;
use crate::metrics::{self, Snapshot};
use crate::modem::response::Response;
use crate::modem::{Modem, ModemError, OutboundRequest, SharedModem};
use crate::storage::{Direction, Storage, StoredMessage};
use crate::worker::{PollSettings, PollWorker, StartOutcome};

/// What a send transcript says about the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SendStatus {
    /// `+CMGS:` or `OK` seen.
    Accepted,
    /// An `ERROR` line seen.
    Rejected,
    /// Neither, typically the deadline passed.
    Unconfirmed,
}

impl SendStatus {
    pub fn from_transcript(lines: &[String]) -> Self {
        let mut status = SendStatus::Unconfirmed;
        for line in lines {
            match Response::classify(line) {
                Response::Error => return SendStatus::Rejected,
                Response::SendAck | Response::Ok => status = SendStatus::Accepted,
                _ => {}
            }
        }
        status
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ControlReport {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<SendStatus>,
}

impl ControlReport {
    pub fn ok() -> Self {
        Self {
            ok: true,
            ..Default::default()
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn declined(reason: impl Into<String>) -> Self {
        Self {
            ok: false,
            reason: Some(reason.into()),
            ..Default::default()
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{\"ok\":false}".to_string())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BridgeStatus {
    pub running: bool,
    pub session_open: bool,
    pub metrics: Snapshot,
}

pub struct Bridge {
    modem: SharedModem,
    worker: Mutex<PollWorker>,
    storage: Storage,
    keepalive: KeepaliveConfig,
}

impl Bridge {
    pub fn new(
        modem: Modem,
        storage: Storage,
        forwarder: Forwarder,
        settings: PollSettings,
        keepalive: KeepaliveConfig,
    ) -> Self {
        let modem = modem.into_shared();
        let worker = PollWorker::new(modem.clone(), storage.clone(), Arc::new(forwarder), settings);
        Self {
            modem,
            worker: Mutex::new(worker),
            storage,
            keepalive,
        }
    }

    /// Build every component from configuration.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let storage = Storage::new(&config.storage.data_dir).await?;
        Ok(Self::new(
            Modem::from_config(&config.modem),
            storage,
            Forwarder::new(config.forward.clone()),
            PollSettings::from_config(&config.modem),
            config.keepalive.clone(),
        ))
    }

    pub fn modem(&self) -> SharedModem {
        self.modem.clone()
    }

    pub async fn start(&self) -> ControlReport {
        match self.worker.lock().await.start().await {
            Ok(StartOutcome::Started) | Ok(StartOutcome::AlreadyRunning) => ControlReport::ok(),
            Err(e) => {
                warn!("Start failed: {}", e);
                ControlReport::error(e.to_string())
            }
        }
    }

    pub async fn stop(&self) -> ControlReport {
        self.worker.lock().await.stop().await;
        ControlReport::ok()
    }

    pub async fn keepalive(&self) -> ControlReport {
        if !self.keepalive.enabled {
            return ControlReport::declined("keepalive disabled");
        }
        let number = self.keepalive.number.clone();
        let message = self.keepalive.message.clone();
        let mut report = self.send(&number, &message).await;
        report.status = None;
        report
    }

    /// Manual send. Opens a one-shot session when none is open.
    pub async fn send(&self, number: &str, text: &str) -> ControlReport {
        let request = match OutboundRequest::new(number, text) {
            Ok(r) => r,
            Err(e) => return ControlReport::error(e.to_string()),
        };
        let transcript = match self.send_exchange(&request).await {
            Ok(lines) => lines,
            Err(e) => {
                warn!("Send to {} failed: {}", request.number(), e);
                return ControlReport::error(e.to_string());
            }
        };
        if let Err(e) = self
            .storage
            .record(request.number(), request.text(), Direction::Out)
            .await
        {
            warn!("Failed to store sent message to {}: {}", request.number(), e);
        }
        let status = SendStatus::from_transcript(&transcript);
        info!("Send to {} finished: {:?}", request.number(), status);
        ControlReport {
            ok: true,
            raw: Some(transcript),
            status: Some(status),
            ..Default::default()
        }
    }

    async fn send_exchange(&self, request: &OutboundRequest) -> Result<Vec<String>, ModemError> {
        let mut modem = self.modem.lock().await;
        if modem.is_open() {
            return modem.send_message(request).await;
        }
        info!("No open session, opening one for this send");
        modem.open().await?;
        let result = modem.send_message(request).await;
        modem.close();
        result
    }

    pub async fn recent(&self, limit: usize) -> Result<Vec<StoredMessage>> {
        self.storage.recent(limit).await
    }

    pub async fn status(&self) -> BridgeStatus {
        let running = self.worker.lock().await.is_running();
        let session_open = self.modem.lock().await.is_open();
        BridgeStatus {
            running,
            session_open,
            metrics: metrics::snapshot(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn transcript_interpretation() {
        assert_eq!(
            SendStatus::from_transcript(&lines(&[">", "+CMGS: 12"])),
            SendStatus::Accepted
        );
        assert_eq!(SendStatus::from_transcript(&lines(&["OK"])), SendStatus::Accepted);
        assert_eq!(
            SendStatus::from_transcript(&lines(&[">", "+CMS ERROR: 330"])),
            SendStatus::Rejected
        );
        assert_eq!(SendStatus::from_transcript(&[]), SendStatus::Unconfirmed);
        assert_eq!(
            SendStatus::from_transcript(&lines(&[">"])),
            SendStatus::Unconfirmed
        );
    }

    #[test]
    fn report_json_shapes() {
        assert_eq!(ControlReport::ok().to_json(), "{\"ok\":true}");
        assert_eq!(
            ControlReport::declined("keepalive disabled").to_json(),
            "{\"ok\":false,\"reason\":\"keepalive disabled\"}"
        );
        let sent = ControlReport {
            ok: true,
            raw: Some(lines(&["+CMGS: 1"])),
            status: Some(SendStatus::Accepted),
            ..Default::default()
        };
        assert_eq!(
            sent.to_json(),
            "{\"ok\":true,\"raw\":[\"+CMGS: 1\"],\"status\":\"accepted\"}"
        );
    }
}
