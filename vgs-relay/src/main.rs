//! vgs-relay entry point.
//!
//! ```text
//! vgs-relay                      Serve one session with vgs-relay.toml
//! vgs-relay --config <path>      Load a custom config TOML
//! vgs-relay --senders 4          Override the sender count
//! vgs-relay --gen-config         Write default config to stdout
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use vgs_relay::config::RelayConfig;
use vgs_relay::server::RelayServer;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "vgs-relay", about = "Vector-graphics stream relay")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "vgs-relay.toml")]
    config: PathBuf,

    /// Listen address, overriding the config file.
    #[arg(short, long)]
    listen: Option<String>,

    /// Number of senders, overriding the config file.
    #[arg(short, long)]
    senders: Option<u32>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&RelayConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let mut config = RelayConfig::load(&cli.config);
    if let Some(listen) = cli.listen {
        config.network.listen = listen;
    }
    if let Some(senders) = cli.senders {
        config.network.senders = senders;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("vgs-relay v{}", env!("CARGO_PKG_VERSION"));
    info!("senders: {}", config.network.senders);
    info!("output directory: {}", config.output.directory.display());
    info!("peer frame stride: {}", config.frame_stride());

    let server = RelayServer::new(config);
    tokio::select! {
        result = server.run() => match result {
            Ok(report) if !report.status.is_ok() => {
                error!("session ended with {}", report.status);
                std::process::exit(report.exit_code());
            }
            Ok(_) => {}
            Err(e) => {
                error!("relay failed: {e}");
                std::process::exit(e.code() as i32);
            }
        },
        _ = tokio::signal::ctrl_c() => info!("Ctrl-C received, shutting down"),
    }
    Ok(())
}
