//! Binary entrypoint for the smsbridge CLI.
//!
//! Commands:
//! - `run` - start the poll worker and keep it running until Ctrl-C
//! - `init` - create a starter `config.toml`
//! - `send --number <n> --text <t>` - send one message and print the JSON report
//! - `keepalive` - send the configured keepalive message
//! - `messages [--limit <n>]` - print recently stored messages as JSON
//! - `probe [--port <path>] [-b <baud>]` - check the modem answers AT commands
//!
//! See the library crate docs for module-level details: `smsbridge::`.
use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use log::{error, info};
use std::str::FromStr;

use smsbridge::config::Config;
use smsbridge::control::Bridge;
use smsbridge::modem::{commands, Modem};
use smsbridge::storage::Storage;

#[derive(Parser)]
#[command(name = "smsbridge")]
#[command(about = "Bridge a serial GSM modem's text messages to storage and chat services")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the modem and forward received messages until interrupted
    Run,
    /// Write a default configuration file
    Init,
    /// Send one text message
    Send {
        /// Destination number (e.g., +15551234567)
        #[arg(short, long)]
        number: String,
        /// Message text
        #[arg(short, long)]
        text: String,
    },
    /// Send the configured keepalive message
    Keepalive,
    /// Print recently stored messages, newest first
    Messages {
        #[arg(short, long, default_value_t = 100)]
        limit: usize,
    },
    /// Open the modem, run a few status commands, print the replies
    Probe {
        /// Serial port, overrides the config file
        #[arg(short, long)]
        port: Option<String>,
        /// Baud rate, overrides the config file
        #[arg(short = 'b', long)]
        baud: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Init = cli.command {
        init_logging(&None, cli.verbose);
        info!("Initializing new configuration");
        Config::create_default(&cli.config).await?;
        info!("Configuration file created at {}", cli.config);
        return Ok(());
    }

    // Probe works without a config file; everything else needs one
    let config = match (&cli.command, Config::load(&cli.config).await) {
        (_, Ok(cfg)) => cfg,
        (Commands::Probe { .. }, Err(_)) => Config::default(),
        (_, Err(e)) => {
            init_logging(&None, cli.verbose);
            return Err(e);
        }
    };
    init_logging(&Some(config.clone()), cli.verbose);

    match cli.command {
        // returned early above
        Commands::Init => {}
        Commands::Run => {
            info!("Starting smsbridge v{}", env!("CARGO_PKG_VERSION"));
            let bridge = Bridge::from_config(&config).await?;
            let report = bridge.start().await;
            if !report.ok {
                return Err(anyhow!(
                    "Failed to start: {}",
                    report.error.unwrap_or_default()
                ));
            }
            tokio::signal::ctrl_c()
                .await
                .map_err(|e| anyhow!("Failed to wait for Ctrl-C: {}", e))?;
            info!("Received shutdown signal");
            bridge.stop().await;
        }
        Commands::Send { number, text } => {
            let bridge = Bridge::from_config(&config).await?;
            let report = bridge.send(&number, &text).await;
            println!("{}", report.to_json());
            if !report.ok {
                std::process::exit(1);
            }
        }
        Commands::Keepalive => {
            let bridge = Bridge::from_config(&config).await?;
            let report = bridge.keepalive().await;
            println!("{}", report.to_json());
        }
        Commands::Messages { limit } => {
            let storage = Storage::new(&config.storage.data_dir).await?;
            let messages = storage.recent(limit).await?;
            println!("{}", serde_json::to_string_pretty(&messages)?);
        }
        Commands::Probe { port, baud } => {
            let mut modem_cfg = config.modem.clone();
            if let Some(p) = port {
                modem_cfg.port = p;
            }
            if let Some(b) = baud {
                modem_cfg.baud_rate = b;
            }
            let mut modem = Modem::from_config(&modem_cfg);
            info!("Probing modem on {}", modem.target());
            if let Err(e) = modem.open().await {
                error!("{}", e);
                std::process::exit(2);
            }
            let wait = modem.timings().command_wait;
            let mut replies = serde_json::Map::new();
            for cmd in [commands::ATTENTION, commands::SIGNAL_QUALITY, commands::REGISTRATION] {
                let lines = modem.safe_at(cmd, wait).await;
                replies.insert(cmd.to_string(), serde_json::json!(lines));
            }
            modem.close();
            let alive = replies
                .get(commands::ATTENTION)
                .and_then(|v| v.as_array())
                .map(|lines| lines.iter().any(|l| l.as_str() == Some("OK")))
                .unwrap_or(false);
            let payload = serde_json::json!({
                "port": modem_cfg.port,
                "baud_rate": modem_cfg.baud_rate,
                "status": if alive { "ok" } else { "no_response" },
                "replies": replies,
            });
            println!("{}", payload);
            std::process::exit(if alive { 0 } else { 1 });
        }
    }

    Ok(())
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // CLI verbosity overrides the configured level
    let configured = config
        .as_ref()
        .and_then(|c| log::LevelFilter::from_str(&c.logging.level).ok())
        .unwrap_or(log::LevelFilter::Info);
    let base_level = match verbosity {
        0 => configured,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);

    let log_file = config
        .as_ref()
        .and_then(|c| c.logging.file.as_ref())
        .and_then(|file| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(file)
                .ok()
        });

    if let Some(f) = log_file {
        let write_mutex = std::sync::Arc::new(std::sync::Mutex::new(f));
        // Foreground runs also echo to the console; service runs only hit the file
        let is_tty = atty::is(atty::Stream::Stdout);
        builder.format(move |fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            let line = format!("{} [{}] {}", ts, record.level(), record.args());
            if let Ok(mut guard) = write_mutex.lock() {
                let _ = writeln!(guard, "{}", line);
            }
            if is_tty {
                writeln!(fmt, "{}", line)
            } else {
                Ok(())
            }
        });
    } else {
        builder.format(|fmt, record| {
            writeln!(
                fmt,
                "{} [{}] {}",
                chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ"),
                record.level(),
                record.args()
            )
        });
    }
    let _ = builder.try_init();
}
