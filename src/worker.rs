//! Poll worker: the background task that drives extraction on a cadence.
//!
//! Each cycle locks the modem, runs one extraction, releases the lock, and
//! hands every message to storage and then to the forwarder. A failed cycle
//! is logged and followed by the shorter recovery delay; the task never ends
//! on its own. Stop requests are observed between cycles and during the
//! sleeps, never in the middle of an exchange.

use anyhow::{anyhow, Result};
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::config::ModemConfig;
use crate::forward::Forwarder;
use crate::logutil::escape_line;
use crate::metrics;
use crate::modem::{ModemError, SharedModem};
use crate::storage::{Direction, Storage};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub recovery_delay: Duration,
    /// Bounded wait for the task in [`PollWorker::stop`].
    pub stop_wait: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(8),
            recovery_delay: Duration::from_secs(5),
            stop_wait: Duration::from_secs(2),
        }
    }
}

impl PollSettings {
    pub fn from_config(cfg: &ModemConfig) -> Self {
        Self {
            interval: cfg.poll_interval(),
            recovery_delay: cfg.recovery_delay(),
            stop_wait: cfg.stop_wait(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
}

struct RunningTask {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

pub struct PollWorker {
    modem: SharedModem,
    storage: Storage,
    forwarder: Arc<Forwarder>,
    settings: PollSettings,
    task: Option<RunningTask>,
}

impl PollWorker {
    pub fn new(modem: SharedModem, storage: Storage, forwarder: Arc<Forwarder>, settings: PollSettings) -> Self {
        Self {
            modem,
            storage,
            forwarder,
            settings,
            task: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .as_ref()
            .map(|t| !t.handle.is_finished())
            .unwrap_or(false)
    }

    /// Open the session and launch the poll loop. A second call while the
    /// loop runs changes nothing.
    pub async fn start(&mut self) -> Result<StartOutcome, ModemError> {
        if self.is_running() {
            info!("Worker already running");
            return Ok(StartOutcome::AlreadyRunning);
        }
        self.modem.lock().await.open().await?;

        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(poll_loop(
            self.modem.clone(),
            self.storage.clone(),
            self.forwarder.clone(),
            self.settings.clone(),
            stop_rx,
        ));
        self.task = Some(RunningTask { stop_tx, handle });
        info!("Worker started");
        Ok(StartOutcome::Started)
    }

    /// Signal the loop, wait up to `stop_wait` for it, then close the session.
    /// The session is closed even when the wait times out. No-op when stopped.
    pub async fn stop(&mut self) {
        let Some(RunningTask { stop_tx, mut handle }) = self.task.take() else {
            debug!("Worker not running");
            return;
        };
        let _ = stop_tx.send(true);
        match tokio::time::timeout(self.settings.stop_wait, &mut handle).await {
            Ok(Ok(())) => debug!("Poll loop exited"),
            Ok(Err(e)) => warn!("Poll loop ended abnormally: {}", e),
            Err(_) => warn!(
                "Poll loop did not stop within {:?}, forcing session closed",
                self.settings.stop_wait
            ),
        }
        // Holding the lock means no exchange is in flight; the loop cannot
        // reopen the session once aborted.
        let mut modem = self.modem.lock().await;
        modem.close();
        handle.abort();
        info!("Worker stopped");
    }
}

async fn poll_loop(
    modem: SharedModem,
    storage: Storage,
    forwarder: Arc<Forwarder>,
    settings: PollSettings,
    mut stop_rx: watch::Receiver<bool>,
) {
    loop {
        if *stop_rx.borrow() {
            break;
        }
        let delay = match run_cycle(&modem, &storage, &forwarder).await {
            Ok(_) => settings.interval,
            Err(e) => {
                error!("Error while polling modem: {:#}", e);
                metrics::inc_cycle_failures();
                settings.recovery_delay
            }
        };
        tokio::select! {
            changed = stop_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = sleep(delay) => {}
        }
    }
    debug!("poll loop terminated");
}

/// One poll cycle. Returns how many messages were handed off.
///
/// A session found closed is reopened first. An I/O failure closes it so
/// the next cycle starts from a fresh connection. Only messages that
/// reached storage are marked delivered; the rest stay eligible for
/// redelivery.
pub async fn run_cycle(modem: &SharedModem, storage: &Storage, forwarder: &Forwarder) -> Result<usize> {
    let messages = {
        let mut modem = modem.lock().await;
        if !modem.is_open() {
            info!("Reconnecting modem on {}", modem.target());
            modem.open().await?;
        }
        match modem.poll_messages().await {
            Ok(messages) => messages,
            Err(e) => {
                if matches!(e, ModemError::Io(_)) {
                    modem.close();
                }
                return Err(e.into());
            }
        }
    };

    let mut first_store_error = None;
    let mut stored = Vec::with_capacity(messages.len());
    for msg in &messages {
        info!("Got SMS from {}: {}", msg.remote, escape_line(&msg.content));
        match storage.record(&msg.remote, &msg.content, Direction::In).await {
            Ok(_) => stored.push(msg.clone()),
            Err(e) => {
                warn!("Failed to store message from {}: {}", msg.remote, e);
                first_store_error.get_or_insert(e);
            }
        }
        forwarder.relay(&msg.remote, &msg.content).await;
    }
    modem.lock().await.mark_delivered(&stored);
    metrics::inc_cycles();
    match first_store_error {
        Some(e) => Err(anyhow!("Failed to store received messages: {}", e)),
        None => Ok(messages.len()),
    }
}
