//! NearLink peer application entry point.
//!
//! Wires the TCP transport and the link manager together and drives a very
//! small line-oriented chat: stdin lines go out as payloads, inbound chunks
//! are printed as they arrive.
//!
//! ```text
//! main()
//!  └─ load_config()          -- TOML settings with built-in defaults
//!  └─ LinkManager::new()     -- owns listener/initiator/session slots
//!       ├─ --listen          -- start the accept task
//!       └─ --connect <peer>  -- start a connect task
//!  └─ event pump             -- link events -> ConversationLog -> stdout
//! ```

use std::io::BufRead;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use nearlink_core::{PeerAddr, ServiceId};
use nearlink_peer::application::messaging::{ConversationLog, LinkStatus};
use nearlink_peer::infrastructure::link::manager::LinkManager;
use nearlink_peer::infrastructure::link::{LinkError, LinkEvent};
use nearlink_peer::infrastructure::radio::tcp::{TcpRadio, TcpRadioConfig};
use nearlink_peer::infrastructure::storage::config::{load_config, AppConfig};

/// Command-line arguments for the peer binary.
#[derive(Parser, Debug)]
#[command(
    name = "nearlink-peer",
    about = "Exchange messages with a nearby device over a point-to-point link"
)]
struct Args {
    /// Start listening for an inbound link.
    #[arg(long)]
    listen: bool,

    /// Connect to a peer at the given transport address (host:port).
    #[arg(long, value_name = "PEER")]
    connect: Option<String>,

    /// Override the rendezvous port from the config file.
    #[arg(long, env = "NEARLINK_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Configuration first, so its log level can seed the subscriber.
    let config = load_config().unwrap_or_else(|e| {
        eprintln!("could not load config, using defaults: {e}");
        AppConfig::default()
    });

    // Initialise structured logging.  Level is overridden by `RUST_LOG`.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.peer.log_level.clone())),
        )
        .init();

    info!("NearLink peer starting as {}", config.peer.name);

    let radio = build_radio(&config, args.port)?;
    let service = ServiceId::from_uuid(config.link.service_id);
    let (manager, mut events) = LinkManager::new(radio, service);

    if args.listen {
        if let Err(e) = manager.start_listening() {
            // Reported, not fatal: the manager stays usable and the user can
            // still initiate an outbound connection.
            error!("could not start listening: {e}");
        }
    }
    if let Some(peer) = &args.connect {
        let peer: PeerAddr = peer.parse().context("invalid peer address")?;
        manager.initiate_connection(peer);
    }
    if !args.listen && args.connect.is_none() {
        warn!("neither --listen nor --connect given; nothing will happen");
    }

    // stdin lines arrive on a dedicated thread; reading stdin has no
    // non-blocking story worth having here.
    let mut lines = spawn_stdin_reader();
    let mut stdin_open = true;

    let mut log = ConversationLog::new();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("shutdown signal received");
                manager.shutdown();
                break;
            }
            event = events.recv() => {
                match event {
                    Some(event) => handle_event(&mut log, &event),
                    None => {
                        debug!("event channel closed");
                        break;
                    }
                }
            }
            line = lines.recv(), if stdin_open => {
                match line {
                    Some(line) => {
                        match manager.send(line.as_bytes()) {
                            Ok(()) => log.record_outbound(&line),
                            Err(LinkError::NoActiveSession) => {
                                warn!("not connected; message not sent")
                            }
                            Err(e) => warn!("send failed: {e}"),
                        }
                    }
                    None => {
                        debug!("stdin closed");
                        stdin_open = false;
                    }
                }
            }
        }
    }

    info!("NearLink peer stopped");
    Ok(())
}

/// Builds the TCP transport from the config file plus CLI overrides.
fn build_radio(config: &AppConfig, port_override: Option<u16>) -> anyhow::Result<Arc<TcpRadio>> {
    let bind_address = config
        .link
        .bind_address
        .parse()
        .context("invalid bind_address in config")?;
    let defaults = TcpRadioConfig::default();
    Ok(Arc::new(TcpRadio::new(TcpRadioConfig {
        bind_address,
        port: port_override.unwrap_or(config.link.port),
        accept_poll: Duration::from_millis(config.link.accept_poll_ms),
        read_poll: Duration::from_millis(config.link.read_poll_ms),
        connect_timeout: Duration::from_millis(config.link.connect_timeout_ms),
        ..defaults
    })))
}

/// Applies one link event to the conversation and prints what the user
/// should see.
fn handle_event(log: &mut ConversationLog, event: &LinkEvent) {
    if let Some(entry) = log.apply(event) {
        println!("peer> {}", entry.text);
        return;
    }
    match log.status() {
        LinkStatus::Connecting => info!("connecting..."),
        LinkStatus::Connected => info!("connected; type a line to send it"),
        LinkStatus::Ended => info!("session ended; restart listening or reconnect to continue"),
        LinkStatus::Idle => {}
    }
}

/// Reads stdin line by line on a dedicated thread.
fn spawn_stdin_reader() -> tokio::sync::mpsc::Receiver<String> {
    let (tx, rx) = tokio::sync::mpsc::channel(16);
    std::thread::Builder::new()
        .name("nearlink-stdin".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.blocking_send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("stdin read failed: {e}");
                        break;
                    }
                }
            }
        })
        .expect("failed to spawn stdin thread");
    rx
}
