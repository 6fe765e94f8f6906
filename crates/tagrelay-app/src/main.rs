//! # tagrelay
//!
//! Relays NFC tag reads to a remote server and reports reader and
//! connection state on the terminal.
//!
//! ## Running
//!
//! ```bash
//! # Mock reader, default configuration
//! tagrelay --host 192.168.1.20 --port 3000 --connect
//!
//! # Configuration file, PC/SC reader (built with `--features pcsc`)
//! tagrelay --config relay.toml --pcsc
//! ```
//!
//! Commands are read from stdin; type `help` for the list.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tagrelay_app::console::{ConsoleCommand, HELP, simulated_tag};
use tagrelay_app::{
    ChannelObserver, LoggingObserver, Relay, RelayConfig, RelayNotification, RelayObserver,
    logging,
};
use tagrelay_reader::ReaderHandle;
use tagrelay_reader::mock::MockReader;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(version, about = "Relay NFC tag reads to a remote server")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Server host, overrides the configuration
    #[arg(long)]
    host: Option<String>,

    /// Server port, overrides the configuration
    #[arg(short, long)]
    port: Option<u32>,

    /// Connect to the server at startup
    #[arg(long)]
    connect: bool,

    /// Debug level output
    #[arg(short, long)]
    verbose: bool,

    /// Use the first PC/SC reader instead of the mock reader
    #[cfg(feature = "pcsc")]
    #[arg(long)]
    pcsc: bool,

    /// Only use a PC/SC reader whose name contains this text
    #[cfg(feature = "pcsc")]
    #[arg(long, requires = "pcsc")]
    reader_name: Option<String>,
}

/// Source of hardware events.
enum Hardware {
    Mock(MockReader),
    #[cfg(feature = "pcsc")]
    Pcsc,
}

impl Hardware {
    #[cfg_attr(not(feature = "pcsc"), allow(unused_variables))]
    fn start(cli: &Cli, reader: ReaderHandle) -> Self {
        #[cfg(feature = "pcsc")]
        if cli.pcsc {
            use tagrelay_reader::pcsc::{PcscConfig, PcscReader};

            let config = PcscConfig {
                reader_name: cli.reader_name.clone(),
                ..PcscConfig::default()
            };
            PcscReader::new(reader, config).spawn();
            return Self::Pcsc;
        }

        Self::Mock(MockReader::attach(reader))
    }

    fn mock(&mut self) -> Option<&mut MockReader> {
        match self {
            Self::Mock(reader) => Some(reader),
            #[cfg(feature = "pcsc")]
            Self::Pcsc => None,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => RelayConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => RelayConfig::default(),
    };
    if let Some(host) = &cli.host {
        config.server.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    config.validate()?;

    logging::init(&config.logging)?;
    info!(version = env!("CARGO_PKG_VERSION"), "Starting tagrelay");

    let (console, mut notifications) = ChannelObserver::new();
    let mut relay = Relay::start(&config, (LoggingObserver, console))?;
    let mut hardware = Hardware::start(&cli, relay.reader().clone());

    if cli.connect {
        relay.connect()?;
    }

    println!("{HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let interrupted = tokio::signal::ctrl_c();
    tokio::pin!(interrupted);

    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => {
                    if !execute(&line, &mut relay, &mut hardware).await {
                        break;
                    }
                }
                None => break,
            },

            Some(notification) = notifications.recv() => print_notification(&notification),

            _ = &mut interrupted => {
                info!("Interrupted");
                break;
            }
        }
    }

    relay.shutdown().await;
    Ok(())
}

/// Run one console line. Returns `false` when the console should exit.
async fn execute<O: RelayObserver>(
    line: &str,
    relay: &mut Relay<O>,
    hardware: &mut Hardware,
) -> bool {
    let command = match ConsoleCommand::parse(line) {
        Ok(Some(command)) => command,
        Ok(None) => return true,
        Err(e) => {
            println!("{e}");
            return true;
        }
    };

    let outcome: anyhow::Result<()> = match command {
        ConsoleCommand::Connect(endpoint) => {
            if let Some(endpoint) = endpoint {
                relay.set_endpoint(endpoint);
            }
            relay.connect().map_err(Into::into)
        }
        ConsoleCommand::Disconnect => relay.disconnect().map_err(Into::into),
        ConsoleCommand::Enable => relay.reader().enable_session().await.map_err(Into::into),
        ConsoleCommand::Disable => relay.reader().disable_session().await.map_err(Into::into),
        ConsoleCommand::PowerOn => match hardware.mock() {
            Some(reader) => reader.power_on().await.map_err(Into::into),
            None => Err(anyhow::anyhow!("power is controlled by the PC/SC reader")),
        },
        ConsoleCommand::PowerOff => match hardware.mock() {
            Some(reader) => reader.power_off().await.map_err(Into::into),
            None => Err(anyhow::anyhow!("power is controlled by the PC/SC reader")),
        },
        ConsoleCommand::Tag { technology, data } => match hardware.mock() {
            Some(reader) => reader
                .present_tag(simulated_tag(technology, data))
                .await
                .map_err(Into::into),
            None => Err(anyhow::anyhow!("tags come from the PC/SC reader")),
        },
        ConsoleCommand::Status => {
            println!(
                "reader: {} (session {}), connection: {} ({})",
                relay.reader().state(),
                if relay.reader().is_session_enabled() { "enabled" } else { "disabled" },
                relay.transport().state(),
                relay.endpoint(),
            );
            Ok(())
        }
        ConsoleCommand::Help => {
            println!("{HELP}");
            Ok(())
        }
        ConsoleCommand::Quit => return false,
    };

    if let Err(e) = outcome {
        warn!(error = %e, "Command failed");
        println!("error: {e}");
    }
    true
}

fn print_notification(notification: &RelayNotification) {
    match notification {
        RelayNotification::ReaderStateChanged(state) => println!("reader: {state}"),
        RelayNotification::ConnectionStatusChanged(true) => println!("connected"),
        RelayNotification::ConnectionStatusChanged(false) => println!("disconnected"),
        RelayNotification::MessageReceived(text) => println!("server: {text}"),
        RelayNotification::CardDiscovered {
            card_type,
            card_number,
        } => println!("card: {card_type} {card_number}"),
    }
}
