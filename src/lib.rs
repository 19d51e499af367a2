//! # smsbridge - GSM Modem Text Message Bridge
//!
//! smsbridge drives a GSM/4G modem over a serial line with AT commands,
//! picks up incoming text messages, stores them, and forwards them to chat
//! services. Outbound messages can be sent on demand.
//!
//! ## Features
//!
//! - **AT Driver**: command execution with bounded waits, best-effort init, and an
//!   unsolicited line buffer separating notifications from command replies.
//! - **Two Delivery Paths**: inline `+CMT` pushes and stored `+CMTI` notices are both
//!   handled, with an unread listing as fallback and per-poll deduplication.
//! - **Poll Worker**: a Tokio task with cooperative stop and bounded shutdown.
//! - **Forwarding**: Telegram and PushPlus sinks (feature `forward`).
//! - **Serialized Access**: the worker and manual sends share one lock per exchange.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use smsbridge::config::Config;
//! use smsbridge::control::Bridge;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     let bridge = Bridge::from_config(&config).await?;
//!     bridge.start().await;
//!     tokio::signal::ctrl_c().await?;
//!     bridge.stop().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`modem`] - AT protocol driver, response tokenizer, transports
//! - [`worker`] - Background poll loop
//! - [`control`] - Start/stop/send/keepalive actions and JSON reports
//! - [`storage`] - Message log
//! - [`forward`] - Chat service forwarding
//! - [`config`] - Configuration management and validation
//! - [`validation`] - Outbound request checks
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │ Control / Worker│ ← Operator actions and the poll loop
//! └─────────────────┘
//!          │  (one lock per exchange)
//! ┌─────────────────┐
//! │   Modem Driver  │ ← AT commands, buffering, parsing
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │ Storage/Forward │ ← Collaborators for received messages
//! └─────────────────┘
//! ```

pub mod config;
pub mod control;
pub mod forward;
pub mod logutil;
pub mod metrics;
pub mod modem;
pub mod storage;
pub mod validation;
pub mod worker;
