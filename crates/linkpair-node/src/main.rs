//! LinkPair node entry point.
//!
//! Runs one MASTER or SLAVE node over the UDP link emulation and lets an
//! operator drive it from stdin.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load config (TOML), apply CLI overrides, generate MAC on first run
//!  └─ FileStorage      -- 7-byte pairing image
//!  └─ UdpTransport     -- rx + send-status threads
//!  └─ PairingEngine    -- handshake, persistence, receive callback
//!  └─ stdin thread     -- forwards operator lines over an mpsc channel
//!  └─ command loop     -- runs commands until `quit`, EOF, or Ctrl-C
//! ```
//!
//! # Commands
//!
//! | Command         | Effect                                                |
//! |-----------------|-------------------------------------------------------|
//! | `pair`          | enter pairing mode; a MASTER also broadcasts REQUEST  |
//! | `stop`          | exit pairing mode                                     |
//! | `unpair`        | forget the paired peer                                |
//! | `status`        | print role, addresses, and pairing state              |
//! | `send <text>`   | send UTF-8 text to the paired peer                    |
//! | `cmd <hex>`     | send an application command record (type 0x10)        |
//! | `quit`          | exit                                                  |

use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use linkpair_core::domain::record::RECORD_LEN;
use linkpair_core::protocol::messages::{APP_COMMAND_TYPE, MESSAGE_DATA_LEN, PAIRING_MESSAGE_LEN};
use linkpair_core::{decode_message, encode_message, DeviceRole, MacAddress, PairingMessage};
use linkpair_node::application::pairing_engine::{EngineConfig, PairingEngine, PairingError};
use linkpair_node::infrastructure::storage::config::{
    config_file_path, load_config, save_config,
};
use linkpair_node::infrastructure::storage::file::FileStorage;
use linkpair_node::infrastructure::transport::udp::{UdpTransport, UdpTransportConfig};

/// Command-line options; each overrides the matching config value.
#[derive(Debug, Parser)]
#[command(name = "linkpair-node", version, about = "MASTER/SLAVE pairing node")]
struct Cli {
    /// Path to config.toml (default: platform config directory).
    #[arg(long, env = "LINKPAIR_CONFIG")]
    config: Option<PathBuf>,

    /// Node role: `master` or `slave`.
    #[arg(long, env = "LINKPAIR_ROLE")]
    role: Option<DeviceRole>,

    /// Logical radio channel.
    #[arg(long, env = "LINKPAIR_CHANNEL")]
    channel: Option<u8>,

    /// Path of the non-volatile pairing image.
    #[arg(long, env = "LINKPAIR_STORAGE")]
    storage: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = match cli.config {
        Some(path) => path,
        None => config_file_path().context("resolving config path")?,
    };
    let mut config = load_config(&config_path)
        .with_context(|| format!("loading config from {}", config_path.display()))?;

    // Initialise structured logging.  Level is overridden by `RUST_LOG`.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.node.log_level)),
        )
        .init();

    let (local, generated) = config.ensure_mac().context("reading radio.mac")?;
    if generated {
        match save_config(&config_path, &config) {
            Ok(()) => info!(mac = %local, "generated node address saved to {}", config_path.display()),
            Err(e) => warn!(mac = %local, "generated node address could not be saved: {e}"),
        }
    }

    if let Some(role) = cli.role {
        config.node.role = role;
    }
    if let Some(channel) = cli.channel {
        config.radio.channel = channel;
    }
    if let Some(storage) = cli.storage {
        config.storage.path = Some(storage);
    }

    info!(role = %config.node.role, mac = %local, "LinkPair node starting");

    let storage_path = config.storage_path(&config_path);
    let storage = FileStorage::open(&storage_path, RECORD_LEN)
        .with_context(|| format!("opening pairing image {}", storage_path.display()))?;

    let transport = Arc::new(UdpTransport::new(UdpTransportConfig {
        local,
        bind_address: config.radio.bind_address,
        broadcast_address: config.radio.broadcast_address,
        base_port: config.radio.base_port,
        max_peers: config.radio.max_peers,
    }));

    let engine = PairingEngine::new(
        EngineConfig {
            role: config.node.role,
            channel: config.radio.channel,
            repair_policy: config.node.repair_policy,
        },
        transport,
        Arc::new(storage),
    );
    engine.set_receive_callback(log_inbound);
    start_engine(&engine);

    info!("ready; commands: pair, stop, unpair, status, send <text>, cmd <hex>, quit");

    let mut lines = spawn_line_reader(io::stdin()).context("spawning stdin reader")?;
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("shutdown signal received");
                break;
            }
            line = lines.recv() => {
                let Some(line) = line else {
                    break;
                };
                match Command::parse(&line) {
                    Ok(Some(Command::Quit)) => break,
                    Ok(Some(command)) => {
                        if let Err(e) = execute(&engine, command) {
                            warn!("command failed: {e}");
                        }
                    }
                    Ok(None) => {}
                    Err(e) => warn!("{e}"),
                }
            }
        }
    }

    info!("LinkPair node stopped");
    Ok(())
}

/// Initialises the engine.  A link that fails to come up is reported and
/// the node keeps running non-operational, so `status` can still show it.
fn start_engine(engine: &PairingEngine) {
    if let Err(e) = engine.initialize() {
        error!("node is not operational: {e}");
    }
}

/// Reads lines on a dedicated thread and forwards them over a channel.
///
/// The blocking read stays off the runtime; the thread is detached and ends
/// with the process.
fn spawn_line_reader<R>(reader: R) -> io::Result<mpsc::Receiver<String>>
where
    R: io::Read + Send + 'static,
{
    let (tx, rx) = mpsc::channel(16);
    std::thread::Builder::new()
        .name("linkpair-stdin".to_string())
        .spawn(move || {
            for line in io::BufReader::new(reader).lines() {
                match line {
                    Ok(line) => {
                        if tx.blocking_send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        error!("stdin read error: {e}");
                        break;
                    }
                }
            }
        })?;
    Ok(rx)
}

/// One operator command read from stdin.
#[derive(Debug, PartialEq, Eq)]
enum Command {
    Pair,
    Stop,
    Unpair,
    Status,
    Send(String),
    Cmd([u8; MESSAGE_DATA_LEN]),
    Quit,
}

impl Command {
    /// Parses one input line.  Blank lines yield `Ok(None)`.
    fn parse(line: &str) -> Result<Option<Self>, String> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };
        let command = match word {
            "" => return Ok(None),
            "pair" => Command::Pair,
            "stop" => Command::Stop,
            "unpair" => Command::Unpair,
            "status" => Command::Status,
            "quit" | "exit" => Command::Quit,
            "send" if !rest.is_empty() => Command::Send(rest.to_string()),
            "send" => return Err("usage: send <text>".to_string()),
            "cmd" => Command::Cmd(parse_command_bytes(rest)?),
            other => return Err(format!("unknown command {other:?}")),
        };
        Ok(Some(command))
    }
}

/// Parses up to eight hex bytes (`"01 ff 3a"` or `"01ff3a"`), zero-padded.
fn parse_command_bytes(text: &str) -> Result<[u8; MESSAGE_DATA_LEN], String> {
    let digits: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    if digits.is_empty() || !digits.is_ascii() || digits.len() % 2 != 0 {
        return Err("usage: cmd <hex bytes>, e.g. cmd 01 ff".to_string());
    }
    let count = digits.len() / 2;
    if count > MESSAGE_DATA_LEN {
        return Err(format!("at most {MESSAGE_DATA_LEN} command bytes, got {count}"));
    }

    let mut data = [0u8; MESSAGE_DATA_LEN];
    for (i, slot) in data.iter_mut().take(count).enumerate() {
        let pair = &digits[2 * i..2 * i + 2];
        *slot = u8::from_str_radix(pair, 16).map_err(|_| format!("invalid hex byte {pair:?}"))?;
    }
    Ok(data)
}

fn execute(engine: &PairingEngine, command: Command) -> Result<(), PairingError> {
    match command {
        Command::Pair => {
            engine.enter_pairing_mode();
            if engine.role() == DeviceRole::Master {
                engine.send_pairing_request()
            } else {
                Ok(())
            }
        }
        Command::Stop => {
            engine.exit_pairing_mode();
            Ok(())
        }
        Command::Unpair => engine.clear_pairing(),
        Command::Status => {
            info!(
                role = %engine.role(),
                local = %engine.local_address(),
                status = ?engine.pairing_status(),
                peer = %engine.paired_address(),
                pairing_mode = engine.is_pairing_mode(),
                operational = engine.is_operational(),
                peers = ?engine.known_peers(),
                "status"
            );
            Ok(())
        }
        Command::Send(text) => engine.send_application_data(text.as_bytes()),
        Command::Cmd(data) => {
            let record = PairingMessage::application(engine.local_address(), data);
            match encode_message(&record) {
                Ok(bytes) => engine.send_application_data(&bytes),
                Err(e) => Err(e.into()),
            }
        }
        Command::Quit => Ok(()),
    }
}

/// Receive callback: logs every inbound frame.
fn log_inbound(sender: MacAddress, payload: &[u8]) {
    if payload.len() >= PAIRING_MESSAGE_LEN {
        if let Ok(record) = decode_message(payload) {
            if record.message_type == APP_COMMAND_TYPE {
                info!(from = %sender, data = ?record.data, "command received");
                return;
            }
            if record.kind().is_some() {
                return;
            }
        }
    }
    match std::str::from_utf8(payload) {
        Ok(text) => info!(from = %sender, "received: {text}"),
        Err(_) => info!(from = %sender, bytes = ?payload, "received binary payload"),
    }
}
