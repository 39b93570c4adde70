//! vgs-sender entry point: runs a group of senders against a relay.
//!
//! ```text
//! vgs-sender                     Run with vgs-sender.toml
//! vgs-sender --senders 4         Override the group size
//! vgs-sender --peer              Also stream to the rendering peer
//! vgs-sender --gen-config        Write default config to stdout
//! ```

mod config;
mod scene;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use vgs_core::{Connection, PeerGroup, Sender, StatusCode, VgsError};

use crate::config::SenderConfig;

/// Exit status of a run whose sender task panicked.
const PANIC_EXIT: i32 = 101;

/// Exit status for a failed sender: its reason code, never zero.
fn failure_code(e: &VgsError) -> i32 {
    match e.status() {
        StatusCode::Ok => StatusCode::UnexpectedMessage as i32,
        code => code as i32,
    }
}

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "vgs-sender", about = "Vector-graphics stream demo senders")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "vgs-sender.toml")]
    config: PathBuf,

    /// Number of senders, overriding the config file.
    #[arg(short, long)]
    senders: Option<u32>,

    /// Frames to draw, overriding the config file.
    #[arg(short, long)]
    frames: Option<u32>,

    /// Ask the relay to feed the rendering peer.
    #[arg(long)]
    peer: bool,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&SenderConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let mut config = SenderConfig::load(&cli.config);
    if let Some(senders) = cli.senders {
        config.scene.senders = senders;
    }
    if let Some(frames) = cli.frames {
        config.scene.frames = frames;
    }
    if cli.peer {
        config.session.sinks.peer = true;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("vgs-sender v{}", env!("CARGO_PKG_VERSION"));
    info!("relay: {}", config.relay_info());
    info!("senders: {}", config.scene.senders);
    info!("buffer length: {}", config.session.buffer_len);

    config.session.validate()?;
    let senders = config.scene.senders;
    let session = Arc::new(config.session.clone());
    let peers = PeerGroup::new(senders as usize);
    let info = config.relay_info();

    let mut tasks = Vec::with_capacity(senders as usize);
    for rank in 0..senders {
        let link = Connection::connect(&info, rank, senders).await?;
        let sender = Sender::new(rank, session.clone(), link, peers.clone())?;
        tasks.push(tokio::spawn(scene::animate(sender, config.scene.clone())));
    }

    let mut exit = None;
    for (rank, task) in tasks.into_iter().enumerate() {
        match task.await {
            Ok(Ok(feedback)) if rank == 0 => info!(?feedback, "run finished"),
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                error!(rank, "sender failed: {e}");
                exit.get_or_insert(failure_code(&e));
            }
            Err(e) => {
                error!(rank, "sender task panicked: {e}");
                exit.get_or_insert(PANIC_EXIT);
            }
        }
    }
    if let Some(code) = exit {
        std::process::exit(code);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_code_is_the_reason_code() {
        assert_eq!(failure_code(&VgsError::RelayReported(StatusCode::FileOpen)), 2);
        assert_eq!(failure_code(&VgsError::RelayReported(StatusCode::PeerRejected)), 4);
        assert_eq!(
            failure_code(&VgsError::ProtocolViolation("frame already completed")),
            StatusCode::UnexpectedMessage as i32
        );
    }

    #[test]
    fn test_failure_code_is_never_zero() {
        assert_ne!(failure_code(&VgsError::RelayReported(StatusCode::Ok)), 0);
    }
}
