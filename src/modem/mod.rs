//! # Modem Driver
//!
//! Talks AT commands to a GSM/4G modem over a serial line and turns what
//! comes back into [`InboundMessage`]s.
//!
//! ## Features
//!
//! - **Command Execution**: [`Modem::run_at`] sends one command and collects
//!   up to N lines within a wait window; [`Modem::safe_at`] logs failures and
//!   returns nothing instead.
//! - **Initialization**: echo off, text mode, and new-message indications
//!   routed to the terminal, each step best-effort.
//! - **Unsolicited Lines**: a drain step moves everything the modem said on
//!   its own into a FIFO before any parsing happens.
//! - **Extraction**: inline `+CMT` deliveries, `+CMTI` indications resolved
//!   with `AT+CMGR`, and an `AT+CMGL` listing fallback, deduplicated.
//! - **Sending**: the `AT+CMGS` prompt/body/Ctrl-Z exchange, returning the
//!   raw transcript.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use smsbridge::modem::{Modem, ModemOptions, SerialConnector};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let connector = SerialConnector::new("/dev/ttyUSB2", 115200);
//!     let mut modem = Modem::new(Box::new(connector), ModemOptions::default());
//!     modem.open().await?;
//!     for msg in modem.poll_messages().await? {
//!         println!("{}: {}", msg.remote, msg.content);
//!     }
//!     modem.close();
//!     Ok(())
//! }
//! ```
//!
//! ## Concurrency
//!
//! A `Modem` is not internally synchronized. Share it as a [`SharedModem`]
//! and hold the lock for a whole exchange (command, drain, or send) so two
//! exchanges never interleave on the wire.

pub mod buffer;
pub mod commands;
pub mod dedup;
pub mod mock;
pub mod response;
pub mod transport;

use std::io;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, trace, warn};
use thiserror::Error;
use tokio::time::{sleep, Instant};

use crate::config::ModemConfig;
use crate::logutil::{escape_line, escape_lines};
use crate::metrics;
use crate::validation::{self, OutboundError};

pub use buffer::UnsolicitedBuffer;
pub use dedup::{dedup_in_order, InboundMessage, RedeliveryPolicy, SeenFilter};
pub use response::{Response, StorageSlot};
pub use transport::{Connect, SerialConnector, Transport};

/// Lines read for an ordinary command.
const COMMAND_MAX_LINES: usize = 8;
/// Lines read for a single `AT+CMGR` fetch.
const FETCH_MAX_LINES: usize = 20;
/// Lines read for an `AT+CMGL` listing.
const LIST_MAX_LINES: usize = 80;
/// Upper bound on lines moved per drain, so one drain cannot hold the port forever.
const MAX_DRAIN_LINES: usize = 512;

pub type SharedModem = Arc<tokio::sync::Mutex<Modem>>;

#[derive(Debug, Error)]
pub enum ModemError {
    /// The serial session could not be opened.
    #[error("failed to open modem on {port}: {source}")]
    Connection {
        port: String,
        #[source]
        source: io::Error,
    },

    /// An operation was attempted without an open session.
    #[error("modem session is not open")]
    NotOpen,

    /// I/O failure during an exchange.
    #[error("serial I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid outbound request: {0}")]
    InvalidRequest(#[from] OutboundError),
}

/// Waits and timeouts of the wire protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModemTimings {
    /// Delay after opening the port before the first command.
    pub settle: Duration,
    /// Per-line read timeout inside an exchange.
    pub read_timeout: Duration,
    /// Shortened read window while draining unsolicited output.
    pub drain_timeout: Duration,
    pub command_wait: Duration,
    pub fetch_wait: Duration,
    pub list_wait: Duration,
    /// Delay between the compose command and the body.
    pub prompt_wait: Duration,
    /// Delay after the body before reading the outcome.
    pub body_wait: Duration,
    /// Total time allowed to collect the send outcome.
    pub send_deadline: Duration,
}

impl Default for ModemTimings {
    fn default() -> Self {
        Self {
            settle: Duration::from_millis(500),
            read_timeout: Duration::from_millis(1000),
            drain_timeout: Duration::from_millis(100),
            command_wait: Duration::from_millis(200),
            fetch_wait: Duration::from_millis(300),
            list_wait: Duration::from_millis(500),
            prompt_wait: Duration::from_millis(500),
            body_wait: Duration::from_millis(1000),
            send_deadline: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ModemOptions {
    pub timings: ModemTimings,
    pub redelivery: RedeliveryPolicy,
    /// Size of the cross-poll memory when redelivery is suppressed.
    pub seen_capacity: usize,
    /// Unsolicited buffer bound; `None` for unbounded.
    pub buffer_capacity: Option<usize>,
}

impl ModemOptions {
    pub fn from_config(cfg: &ModemConfig) -> Self {
        Self {
            timings: cfg.timings(),
            redelivery: cfg.redelivery,
            seen_capacity: cfg.seen_capacity,
            buffer_capacity: cfg.buffer_capacity,
        }
    }
}

/// A validated outbound text message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRequest {
    number: String,
    text: String,
}

impl OutboundRequest {
    pub fn new(number: &str, text: &str) -> Result<Self, OutboundError> {
        let number = validation::validate_number(number)?;
        let text = validation::validate_text(text)?;
        Ok(Self { number, text })
    }

    pub fn number(&self) -> &str {
        &self.number
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Driver for one modem.
pub struct Modem {
    connector: Box<dyn Connect>,
    timings: ModemTimings,
    transport: Option<Box<dyn Transport>>,
    buffer: UnsolicitedBuffer,
    /// `+CMT` header whose body had not arrived when the last pass ended.
    held_header: Option<String>,
    seen: Option<SeenFilter>,
}

impl Modem {
    pub fn new(connector: Box<dyn Connect>, options: ModemOptions) -> Self {
        let buffer = match options.buffer_capacity {
            Some(cap) => UnsolicitedBuffer::bounded(cap),
            None => UnsolicitedBuffer::new(),
        };
        let seen = match options.redelivery {
            RedeliveryPolicy::Allow => None,
            RedeliveryPolicy::Suppress => Some(SeenFilter::new(options.seen_capacity)),
        };
        Modem {
            connector,
            timings: options.timings,
            transport: None,
            buffer,
            held_header: None,
            seen,
        }
    }

    /// Driver for the serial device named in the config.
    pub fn from_config(cfg: &ModemConfig) -> Self {
        let connector = SerialConnector::new(cfg.port.clone(), cfg.baud_rate);
        Self::new(Box::new(connector), ModemOptions::from_config(cfg))
    }

    pub fn into_shared(self) -> SharedModem {
        Arc::new(tokio::sync::Mutex::new(self))
    }

    pub fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    pub fn target(&self) -> String {
        self.connector.describe()
    }

    pub fn timings(&self) -> &ModemTimings {
        &self.timings
    }

    /// Lines waiting in the unsolicited buffer.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Open the session, bring the modem into text mode, and buffer
    /// whatever it printed meanwhile. Reopens if already open.
    pub async fn open(&mut self) -> Result<(), ModemError> {
        if self.is_open() {
            debug!("Modem already open, reopening");
            self.close();
        }
        let target = self.connector.describe();
        info!("Opening modem on {}", target);
        let transport = self
            .connector
            .connect()
            .map_err(|source| ModemError::Connection {
                port: target.clone(),
                source,
            })?;
        self.transport = Some(transport);
        sleep(self.timings.settle).await;
        self.initialize().await;
        if let Err(e) = self.drain().await {
            warn!("Draining after init failed on {}: {}", target, e);
        }
        info!("Modem ready on {}", target);
        Ok(())
    }

    /// Release the session. Safe to call when nothing is open.
    pub fn close(&mut self) {
        if self.transport.take().is_some() {
            info!("Modem session on {} closed", self.connector.describe());
        }
    }

    async fn initialize(&mut self) {
        for command in commands::INIT_SEQUENCE {
            self.safe_at(command, self.timings.command_wait).await;
        }
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), ModemError> {
        let transport = self.transport.as_mut().ok_or(ModemError::NotOpen)?;
        transport.write_bytes(bytes)?;
        Ok(())
    }

    /// Read one line on the blocking pool.
    ///
    /// The transport is moved into the blocking task and put back when the
    /// read returns; if this future is dropped mid-read the session ends.
    async fn read_line(&mut self, timeout: Duration) -> Result<Option<String>, ModemError> {
        let mut transport = self.transport.take().ok_or(ModemError::NotOpen)?;
        let (transport, result) = tokio::task::spawn_blocking(move || {
            let result = transport.read_line(timeout);
            (transport, result)
        })
        .await
        .map_err(|e| ModemError::Io(io::Error::new(io::ErrorKind::Other, e)))?;
        self.transport = Some(transport);
        Ok(result?)
    }

    /// Send `command`, wait `wait`, then read up to `max_lines` lines,
    /// stopping at the first read that times out. Blank lines are skipped.
    /// Notifications that arrive mid-exchange go to the unsolicited buffer
    /// instead of the returned response.
    pub async fn run_at(
        &mut self,
        command: &str,
        wait: Duration,
        max_lines: usize,
    ) -> Result<Vec<String>, ModemError> {
        if !self.is_open() {
            return Err(ModemError::NotOpen);
        }
        self.write(&commands::frame(command))?;
        sleep(wait).await;
        let mut out = Vec::new();
        for _ in 0..max_lines {
            match self.read_line(self.timings.read_timeout).await? {
                None => break,
                Some(line) if line.is_empty() => continue,
                Some(line) => out.push(line),
            }
        }
        let out = self.divert_unsolicited(out);
        debug!("AT {} -> [{}]", escape_line(command), escape_lines(&out));
        Ok(out)
    }

    /// Move `+CMT` (with its body line) and `+CMTI` lines out of a command
    /// response into the unsolicited buffer. The line after a `+CMGR`/`+CMGL`
    /// header is a message body and always stays.
    fn divert_unsolicited(&mut self, lines: Vec<String>) -> Vec<String> {
        let mut reply = Vec::with_capacity(lines.len());
        let mut lines = lines.into_iter();
        while let Some(line) = lines.next() {
            match Response::classify(&line) {
                Response::Delivered { .. } => {
                    trace!("unsolicited during exchange: {}", escape_line(&line));
                    self.buffer.enqueue(line);
                    if let Some(body) = lines.next() {
                        self.buffer.enqueue(body);
                    }
                }
                Response::Stored(_) => {
                    trace!("unsolicited during exchange: {}", escape_line(&line));
                    self.buffer.enqueue(line);
                }
                Response::Fetched { .. } | Response::Listed(_) => {
                    reply.push(line);
                    if let Some(body) = lines.next() {
                        reply.push(body);
                    }
                }
                _ => reply.push(line),
            }
        }
        reply
    }

    /// [`Modem::run_at`] with failures logged and turned into an empty response.
    pub async fn safe_at(&mut self, command: &str, wait: Duration) -> Vec<String> {
        match self.run_at(command, wait, COMMAND_MAX_LINES).await {
            Ok(lines) => lines,
            Err(e) => {
                warn!("AT cmd failed ({}): {}", escape_line(command), e);
                metrics::inc_command_failures();
                Vec::new()
            }
        }
    }

    /// Move everything the modem has already said into the unsolicited
    /// buffer, reading with the short drain window until it goes quiet.
    /// At most `MAX_DRAIN_LINES` reads happen per call, blank ones included.
    pub async fn drain(&mut self) -> Result<usize, ModemError> {
        let mut moved = 0;
        for _ in 0..MAX_DRAIN_LINES {
            match self.read_line(self.timings.drain_timeout).await? {
                None => break,
                Some(line) if line.is_empty() => continue,
                Some(line) => {
                    trace!("unsolicited: {}", escape_line(&line));
                    self.buffer.enqueue(line);
                    moved += 1;
                }
            }
        }
        Ok(moved)
    }

    /// One extraction pass.
    ///
    /// Buffered `+CMT` deliveries and `+CMTI` indications come first; only
    /// when they produce nothing is the unread listing consulted. The result
    /// holds each `(remote, content)` at most once.
    ///
    /// A `+CMT` header that ends the buffer is held for one pass so a body
    /// that missed the drain window still pairs with it.
    pub async fn poll_messages(&mut self) -> Result<Vec<InboundMessage>, ModemError> {
        if !self.is_open() {
            return Err(ModemError::NotOpen);
        }
        self.drain().await?;
        let held = self.held_header.take();
        let held_over = held.is_some();
        let mut lines: Vec<String> = held.into_iter().collect();
        lines.extend(self.buffer.drain_all());

        let mut found = Vec::new();
        let mut i = 0;
        while i < lines.len() {
            match Response::classify(&lines[i]) {
                Response::Delivered { sender } => match lines.get(i + 1) {
                    Some(body) => {
                        found.push(InboundMessage::new(sender, body.clone()));
                        i += 2;
                    }
                    None if !(held_over && i == 0) => {
                        debug!("Holding {} until its body arrives", escape_line(&lines[i]));
                        self.held_header = Some(lines[i].clone());
                        i += 1;
                    }
                    None => {
                        warn!("No body arrived for {}", escape_line(&lines[i]));
                        found.push(InboundMessage::new(sender, String::new()));
                        i += 1;
                    }
                },
                Response::Stored(Some(slot)) => {
                    let fetched = self.fetch_stored(&slot).await;
                    found.extend(fetched);
                    i += 1;
                }
                Response::Stored(None) => {
                    debug!("Ignoring malformed indication: {}", escape_line(&lines[i]));
                    i += 1;
                }
                _ => i += 1,
            }
        }

        if found.is_empty() {
            found = self.list_unread().await;
        }

        let mut unique = dedup_in_order(found);
        if let Some(seen) = self.seen.as_ref() {
            let before = unique.len();
            unique = seen.unseen(unique);
            if unique.len() < before {
                debug!("Suppressed {} already delivered message(s)", before - unique.len());
            }
        }
        metrics::add_inbound(unique.len() as u64);
        Ok(unique)
    }

    /// Remember messages that were handed off, so a suppressing policy
    /// filters their redelivery. No-op under [`RedeliveryPolicy::Allow`].
    pub fn mark_delivered(&mut self, messages: &[InboundMessage]) {
        if let Some(seen) = self.seen.as_mut() {
            for message in messages {
                seen.remember(message);
            }
        }
    }

    async fn fetch_stored(&mut self, slot: &StorageSlot) -> Vec<InboundMessage> {
        let command = commands::read_message(slot.index);
        match self
            .run_at(&command, self.timings.fetch_wait, FETCH_MAX_LINES)
            .await
        {
            Ok(lines) => response::parse_fetch(&lines),
            Err(e) => {
                warn!(
                    "Failed to fetch stored message {}/{}: {}",
                    slot.memory, slot.index, e
                );
                metrics::inc_fetch_failures();
                Vec::new()
            }
        }
    }

    async fn list_unread(&mut self) -> Vec<InboundMessage> {
        match self
            .run_at(commands::LIST_UNREAD, self.timings.list_wait, LIST_MAX_LINES)
            .await
        {
            Ok(lines) => {
                for line in &lines {
                    if let Response::Listed(header) = Response::classify(line) {
                        debug!(
                            "Listed entry index={:?} status={:?} sender={}",
                            header.index, header.status, header.sender
                        );
                    }
                }
                response::parse_listing_response(&lines)
            }
            Err(e) => {
                warn!("AT+CMGL failed: {}", e);
                metrics::inc_command_failures();
                Vec::new()
            }
        }
    }

    /// Compose and send one message, returning every non-blank line read
    /// back. Message notifications seen meanwhile are buffered for the next
    /// poll instead of joining the transcript. Reading stops at `OK`, `+CMGS:`, or an `ERROR` line, or when
    /// the send deadline passes. A modem-reported error is not an `Err`;
    /// callers read the transcript.
    pub async fn send_message(&mut self, request: &OutboundRequest) -> Result<Vec<String>, ModemError> {
        if !self.is_open() {
            return Err(ModemError::NotOpen);
        }
        self.drain().await?;
        self.safe_at(commands::TEXT_MODE, self.timings.command_wait)
            .await;

        self.write(&commands::frame(&commands::compose(request.number())))?;
        sleep(self.timings.prompt_wait).await;
        self.write(&commands::frame_body(request.text()))?;
        sleep(self.timings.body_wait).await;

        let deadline = Instant::now() + self.timings.send_deadline;
        let mut transcript = Vec::new();
        let mut body_follows = false;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                debug!("Send deadline reached for {}", request.number());
                break;
            }
            let line = match self
                .read_line(remaining.min(self.timings.read_timeout))
                .await?
            {
                Some(line) if !line.is_empty() => line,
                _ => continue,
            };
            if body_follows {
                self.buffer.enqueue(line);
                body_follows = false;
                continue;
            }
            let response = Response::classify(&line);
            match response {
                Response::Delivered { .. } | Response::Stored(_) => {
                    trace!("unsolicited during send: {}", escape_line(&line));
                    body_follows = matches!(response, Response::Delivered { .. });
                    self.buffer.enqueue(line);
                }
                _ => {
                    let done = response.completes_send();
                    transcript.push(line);
                    if done {
                        break;
                    }
                }
            }
        }
        info!(
            "Send to {} -> [{}]",
            request.number(),
            escape_lines(&transcript)
        );
        metrics::inc_outbound();
        Ok(transcript)
    }
}
